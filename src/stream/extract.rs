/// Brace-depth extraction of complete top-level JSON objects from the
/// logical text stream.
///
/// The model's output-so-far is a text buffer that may hold zero or more
/// complete JSON objects, a trailing partial object, and arbitrary non-JSON
/// noise in between. The scanner walks it once, string- and escape-aware, and
/// emits each object the moment its closing brace arrives.
use serde_json::Value;
use tracing::{debug, warn};

/// Default cap on the logical text buffer.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 512 * 1024;

/// One reassembled top-level JSON object, tagged by its `type` discriminant.
///
/// Ownership transfers to the caller on emission; the extractor retains
/// nothing. The `done` kind is reserved as the end-of-stream marker; all other
/// kinds are opaque content passed through verbatim.
#[derive(Debug, Clone)]
pub struct StreamObject {
    pub kind: String,
    pub value: Value,
}

impl StreamObject {
    pub const DONE_KIND: &'static str = "done";

    fn from_value(value: Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { kind, value }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.kind == Self::DONE_KIND
    }
}

/// Scanner state, one character at a time.
///
/// Braces only count toward depth in `Normal`; a quote toggles string mode
/// unless consumed by a preceding unescaped backslash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    InString,
    InStringEscape,
}

/// Stateful extractor over the logical text buffer.
///
/// `push` appends a text delta and drains every object that completed with
/// it. Scanner position and state persist across pushes, so each byte is
/// examined once and a partial trailing object survives intact to the next
/// append.
pub struct ObjectExtractor {
    buffer: String,
    scanned: usize,
    depth: usize,
    obj_start: Option<usize>,
    state: ScanState,
    max_buffer_bytes: usize,
}

impl ObjectExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER_BYTES)
    }

    #[must_use]
    pub fn with_max_buffer(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            scanned: 0,
            depth: 0,
            obj_start: None,
            state: ScanState::Normal,
            max_buffer_bytes: max_buffer_bytes.max(1),
        }
    }

    /// Append a text delta and return the objects that completed.
    pub fn push(&mut self, text: &str) -> Vec<StreamObject> {
        let mut out = Vec::new();
        self.push_into(text, &mut out);
        out
    }

    /// Append a text delta and drain completed objects into `out`.
    pub fn push_into(&mut self, text: &str, out: &mut Vec<StreamObject>) {
        self.buffer.push_str(text);
        self.scan_into(out);
        self.enforce_cap();
    }

    /// Unconsumed buffer contents (trailing partial object or inert noise).
    #[must_use]
    pub fn remainder(&self) -> &str {
        &self.buffer
    }

    fn scan_into(&mut self, out: &mut Vec<StreamObject>) {
        let mut i = self.scanned;
        while i < self.buffer.len() {
            let byte = self.buffer.as_bytes()[i];
            let mut closed_at = None;
            match self.state {
                ScanState::Normal => match byte {
                    b'{' => {
                        if self.depth == 0 {
                            self.obj_start = Some(i);
                        }
                        self.depth += 1;
                    }
                    b'}' => {
                        // A stray closing brace at depth 0 is noise.
                        if self.depth > 0 {
                            self.depth -= 1;
                            if self.depth == 0 {
                                closed_at = Some(i);
                            }
                        }
                    }
                    b'"' if self.depth > 0 => self.state = ScanState::InString,
                    _ => {}
                },
                ScanState::InString => match byte {
                    b'\\' => self.state = ScanState::InStringEscape,
                    b'"' => self.state = ScanState::Normal,
                    _ => {}
                },
                ScanState::InStringEscape => self.state = ScanState::InString,
            }
            i += 1;

            if let Some(close) = closed_at {
                let start = self.obj_start.take().unwrap_or(0);
                match serde_json::from_str::<Value>(&self.buffer[start..=close]) {
                    Ok(value) => out.push(StreamObject::from_value(value)),
                    Err(err) => debug!(%err, "discarding malformed JSON candidate"),
                }
                // Drop the consumed prefix (leading noise included) and keep
                // scanning what remains from the top.
                self.buffer.drain(..=close);
                i = 0;
            }
        }
        self.scanned = i;
    }

    fn enforce_cap(&mut self) {
        if self.buffer.len() <= self.max_buffer_bytes {
            return;
        }
        let mut cut = self.buffer.len() - self.max_buffer_bytes;
        while cut < self.buffer.len() && !self.buffer.is_char_boundary(cut) {
            cut += 1;
        }
        warn!(
            dropped_bytes = cut,
            "logical text buffer exceeded cap, dropping oldest data"
        );
        self.buffer.drain(..cut);
        // Offsets shifted under the scanner; restart it on the trimmed tail.
        self.scanned = 0;
        self.depth = 0;
        self.obj_start = None;
        self.state = ScanState::Normal;
    }
}

impl Default for ObjectExtractor {
    fn default() -> Self {
        Self::new()
    }
}
