pub mod decode;
pub mod dispatch;
pub mod extract;
pub mod sse;

pub use decode::Utf8Decoder;
pub use dispatch::{dispatch, StreamAction};
pub use extract::{ObjectExtractor, StreamObject, DEFAULT_MAX_BUFFER_BYTES};
pub use sse::{is_done_event, SseEvent, SseParser};
