/// Event dispatch: route one parsed SSE frame to a pipeline action.
///
/// The upstream event vocabulary is open-ended; anything unrecognized is
/// ignored rather than treated as fatal, so housekeeping events the service
/// adds later never break the stream.
use serde::Deserialize;

use super::sse::{is_done_event, SseEvent};

pub(crate) const EVENT_TEXT_DELTA: &str = "response.output_text.delta";
pub(crate) const EVENT_COMPLETED: &str = "response.completed";
pub(crate) const EVENT_DONE: &str = "response.done";
pub(crate) const EVENT_FAILED: &str = "response.failed";
pub(crate) const EVENT_ERROR: &str = "error";

const DEFAULT_ERROR_MESSAGE: &str = "upstream reported an error";

/// What one frame means for the stream pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAction {
    /// Append this text fragment to the logical text buffer.
    AppendText(String),
    /// The upstream finished producing output.
    Complete,
    /// The upstream reported a fatal error.
    Fail(String),
    /// Housekeeping, unknown event, or upstream noise.
    Ignore,
}

/// Closed set of delta payload shapes the upstream is known to emit.
///
/// Either a flat string (`{"delta":"text"}`) or a structured part
/// (`{"delta":{"type":"output_text","text":"..."}}`). Anything else is an
/// unrecognized shape and ignored.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeltaShape {
    Flat(String),
    Structured {
        #[serde(rename = "type")]
        kind: String,
        text: String,
    },
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    delta: Option<DeltaShape>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<ErrorBody>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TypedPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Decide what one complete SSE frame carries.
///
/// Frames without an `event:` name fall back to the payload's `type`
/// discriminant, which the upstream mirrors from the event name.
#[must_use]
pub fn dispatch(frame: &SseEvent) -> StreamAction {
    if is_done_event(frame) {
        return StreamAction::Complete;
    }

    let payload_kind;
    let name = match frame.event.as_deref() {
        Some(name) => name,
        None => {
            payload_kind = serde_json::from_str::<TypedPayload>(&frame.data)
                .ok()
                .and_then(|payload| payload.kind);
            match payload_kind.as_deref() {
                Some(kind) => kind,
                None => return StreamAction::Ignore,
            }
        }
    };

    match name {
        EVENT_TEXT_DELTA => match serde_json::from_str::<DeltaPayload>(&frame.data) {
            Ok(DeltaPayload {
                delta: Some(DeltaShape::Flat(text)),
            }) => StreamAction::AppendText(text),
            Ok(DeltaPayload {
                delta: Some(DeltaShape::Structured { kind, text }),
            }) if kind == "output_text" => StreamAction::AppendText(text),
            _ => StreamAction::Ignore,
        },
        EVENT_COMPLETED | EVENT_DONE => StreamAction::Complete,
        EVENT_FAILED | EVENT_ERROR => StreamAction::Fail(error_message(&frame.data)),
        _ => StreamAction::Ignore,
    }
}

fn error_message(data: &str) -> String {
    serde_json::from_str::<ErrorPayload>(data)
        .ok()
        .and_then(|payload| {
            payload
                .error
                .and_then(|body| body.message)
                .or(payload.message)
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string())
}
