/// Error type used across the streaming client.
///
/// Fatal conditions surface exactly once through a session's terminal state;
/// recoverable conditions (malformed frames, unparseable payloads, discarded
/// JSON candidates) are absorbed inside the pipeline and never reach here.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Stream idle for {0}s with no data")]
    IdleTimeout(u64),
}
