/// SSE (Server-Sent Events) frame splitter and field parser.
///
/// Handles the low-level assembly of SSE frames from decoded text,
/// including buffering partial lines across feeds and field semantics per
/// the [SSE specification](https://html.spec.whatwg.org/multipage/server-sent-events.html).
use memchr::memchr_iter;

/// A parsed SSE frame: optional event name plus the joined data payload.
#[derive(Debug, Clone, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Check if an [`SseEvent`] is the terminal `[DONE]` sentinel frame.
#[must_use]
pub fn is_done_event(event: &SseEvent) -> bool {
    event.data.trim() == "[DONE]"
}

/// Incremental SSE frame parser.
///
/// Feed it decoded text chunks (arriving at arbitrary boundaries) and it
/// yields fully-assembled [`SseEvent`] frames in arrival order.
pub struct SseParser {
    buffer: String,
    read_offset: usize,
    event_type: Option<String>,
    data_buffer: String,
    has_data: bool,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            event_type: None,
            data_buffer: String::new(),
            has_data: false,
        }
    }

    /// Feed decoded text and return any complete frames parsed.
    ///
    /// SSE field rules:
    /// - Lines starting with `event:` set the event name for the next frame
    /// - Lines starting with `data:` append to the data buffer (strip one
    ///   leading space after the colon per spec)
    /// - Empty lines terminate a frame when it carries data; emit and reset
    /// - Lines starting with `:` are comments, ignored
    /// - Unrecognized field names are ignored, not fatal
    /// - Multiple `data:` lines are joined with `\n`
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed decoded text and append complete frames into a caller-provided buffer.
    ///
    /// The final, possibly-incomplete line is held back and re-examined on the
    /// next feed, so frame text may be split at any byte offset.
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            Self::process_line(
                line,
                &mut self.event_type,
                &mut self.data_buffer,
                &mut self.has_data,
                out,
            );
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    fn process_line(
        line: &str,
        event_type: &mut Option<String>,
        data_buffer: &mut String,
        has_data: &mut bool,
        events: &mut Vec<SseEvent>,
    ) {
        if line.is_empty() {
            // Blank line = frame boundary; emit only if data was collected.
            if *has_data {
                events.push(SseEvent {
                    event: event_type.take(),
                    data: std::mem::take(data_buffer),
                });
                *has_data = false;
            } else {
                *event_type = None;
            }
            return;
        }

        if line.starts_with(':') {
            return;
        }

        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            if *has_data {
                data_buffer.push('\n');
            } else {
                *has_data = true;
            }
            data_buffer.push_str(value);
        } else if let Some(value) = line.strip_prefix("event:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            *event_type = Some(value.to_string());
        }
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}
