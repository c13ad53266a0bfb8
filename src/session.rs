/// Stream session lifecycle: the read loop, cancellation, and terminal-state
/// detection.
///
/// One session owns its own decoder, frame parser, and extractor; nothing is
/// shared between sessions. All pipeline work for a chunk runs to completion
/// between reads, so no locks guard the buffers.
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::StreamError;
use crate::stream::{
    dispatch, ObjectExtractor, SseEvent, SseParser, StreamAction, StreamObject, Utf8Decoder,
};
use crate::transport::{ByteStream, HttpTransport};

/// Lifecycle state of one stream session.
///
/// `Running` is the only non-terminal state; the first terminal transition
/// wins and later ones are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    Errored(String),
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// Caller-facing handle to a running session.
///
/// Cheap to clone; cancellation is cooperative and idempotent.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    cancel: CancellationToken,
    status_rx: watch::Receiver<SessionStatus>,
}

impl SessionHandle {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status_rx.borrow().clone()
    }

    /// Request cancellation. A no-op on a session that already reached a
    /// terminal state; never reported as an error.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the session reaches a terminal state.
    pub async fn closed(&self) {
        let mut status_rx = self.status_rx.clone();
        loop {
            if status_rx.borrow_and_update().is_terminal() {
                return;
            }
            if status_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Owns the transport and enforces at-most-one active session.
///
/// Starting a new query cancels the prior session before the new one opens
/// its request.
pub struct StreamController {
    config: Arc<AppConfig>,
    transport: Arc<HttpTransport>,
    active: Option<SessionHandle>,
}

impl StreamController {
    /// Build a controller from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] or [`StreamError::Transport`] when the
    /// endpoint/client cannot be constructed.
    pub fn new(config: AppConfig) -> Result<Self, StreamError> {
        let transport = Arc::new(HttpTransport::new(&config.endpoint)?);
        Ok(Self {
            config: Arc::new(config),
            transport,
            active: None,
        })
    }

    /// Start a stream session for `query`.
    ///
    /// Emitted objects arrive on the returned channel in closing-brace order;
    /// the channel closes when the session reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::InvalidInput`] for an empty (post-trim) query or
    /// an empty credential; no request is issued in that case.
    pub fn start_stream(
        &mut self,
        query: &str,
        credential: &str,
    ) -> Result<(SessionHandle, mpsc::Receiver<StreamObject>), StreamError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(StreamError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }
        if credential.is_empty() {
            return Err(StreamError::InvalidInput(
                "credential must not be empty".to_string(),
            ));
        }

        if let Some(prior) = self.active.take() {
            prior.cancel();
        }

        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Running);
        let (sink, rx) = mpsc::channel(self.config.stream.channel_capacity);
        let handle = SessionHandle {
            id: Uuid::new_v4(),
            cancel: cancel.clone(),
            status_rx,
        };

        let idle = match self.config.endpoint.read_idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let worker = SessionWorker {
            transport: Arc::clone(&self.transport),
            max_buffer_bytes: self.config.stream.max_text_buffer_bytes(),
            read_idle_timeout: idle,
            query: query.to_string(),
            credential: credential.to_string(),
            cancel,
            status: status_tx,
            sink,
        };
        tracing::info!(session_id = %handle.id(), "starting stream session");
        tokio::spawn(worker.run());

        self.active = Some(handle.clone());
        Ok((handle, rx))
    }

    /// Handle of the most recently started session, if any.
    #[must_use]
    pub fn active(&self) -> Option<&SessionHandle> {
        self.active.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Read loop
// ---------------------------------------------------------------------------

enum ReadOutcome {
    Chunk(bytes::Bytes),
    Eof,
    Failed(String),
}

enum SessionExit {
    Completed,
    Errored(String),
    ReceiverGone,
}

struct SessionWorker {
    transport: Arc<HttpTransport>,
    max_buffer_bytes: usize,
    read_idle_timeout: Option<Duration>,
    query: String,
    credential: String,
    cancel: CancellationToken,
    status: watch::Sender<SessionStatus>,
    sink: mpsc::Sender<StreamObject>,
}

impl SessionWorker {
    async fn run(self) {
        let SessionWorker {
            transport,
            max_buffer_bytes,
            read_idle_timeout,
            query,
            credential,
            cancel,
            status,
            sink,
        } = self;

        let opened = tokio::select! {
            () = cancel.cancelled() => {
                set_terminal(&status, SessionStatus::Cancelled);
                return;
            }
            opened = transport.open_stream(&query, &credential) => opened,
        };
        let mut body = match opened {
            Ok(body) => body,
            Err(err) => {
                tracing::error!(error = %err, "failed to open stream");
                set_terminal(&status, SessionStatus::Errored(err.to_string()));
                return;
            }
        };

        let mut decoder = Utf8Decoder::new();
        let mut parser = SseParser::new();
        let mut extractor = ObjectExtractor::with_max_buffer(max_buffer_bytes);
        let mut frames: Vec<SseEvent> = Vec::with_capacity(8);
        let mut objects: Vec<StreamObject> = Vec::with_capacity(8);

        loop {
            // Cancellation is only observed between reads; pipeline work for
            // an already-received chunk always runs to completion.
            let outcome = tokio::select! {
                () = cancel.cancelled() => {
                    set_terminal(&status, SessionStatus::Cancelled);
                    return;
                }
                outcome = next_chunk(&mut body, read_idle_timeout) => outcome,
            };

            match outcome {
                ReadOutcome::Chunk(bytes) => {
                    let text = decoder.decode(&bytes);
                    parser.feed_into(&text, &mut frames);
                    if let Some(exit) =
                        drain_frames(&mut frames, &mut extractor, &mut objects, &sink).await
                    {
                        finish(&status, exit);
                        return;
                    }
                }
                ReadOutcome::Eof => {
                    let tail = decoder.finish();
                    if !tail.is_empty() {
                        parser.feed_into(&tail, &mut frames);
                        if let Some(exit) =
                            drain_frames(&mut frames, &mut extractor, &mut objects, &sink).await
                        {
                            finish(&status, exit);
                            return;
                        }
                    }
                    // Clean end-of-transport with no error counts as done.
                    set_terminal(&status, SessionStatus::Completed);
                    return;
                }
                ReadOutcome::Failed(message) => {
                    set_terminal(&status, SessionStatus::Errored(message));
                    return;
                }
            }
        }
    }
}

async fn next_chunk(
    body: &mut Pin<Box<ByteStream>>,
    idle: Option<Duration>,
) -> ReadOutcome {
    let item = match idle {
        Some(limit) => match tokio::time::timeout(limit, body.next()).await {
            Ok(item) => item,
            Err(_) => {
                return ReadOutcome::Failed(StreamError::IdleTimeout(limit.as_secs()).to_string())
            }
        },
        None => body.next().await,
    };
    match item {
        Some(Ok(bytes)) => ReadOutcome::Chunk(bytes),
        Some(Err(err)) => ReadOutcome::Failed(format!("transport read failed: {err}")),
        None => ReadOutcome::Eof,
    }
}

/// Route every complete frame through dispatch and the extractor, emitting
/// finished objects in order. Returns `Some` when a terminal condition fires.
async fn drain_frames(
    frames: &mut Vec<SseEvent>,
    extractor: &mut ObjectExtractor,
    objects: &mut Vec<StreamObject>,
    sink: &mpsc::Sender<StreamObject>,
) -> Option<SessionExit> {
    for frame in frames.drain(..) {
        match dispatch(&frame) {
            StreamAction::AppendText(delta) => {
                extractor.push_into(&delta, objects);
                for object in objects.drain(..) {
                    let done = object.is_done();
                    tracing::debug!(kind = %object.kind, "emitting object");
                    if sink.send(object).await.is_err() {
                        return Some(SessionExit::ReceiverGone);
                    }
                    if done {
                        return Some(SessionExit::Completed);
                    }
                }
            }
            StreamAction::Complete => return Some(SessionExit::Completed),
            StreamAction::Fail(message) => return Some(SessionExit::Errored(message)),
            StreamAction::Ignore => {}
        }
    }
    None
}

fn finish(status: &watch::Sender<SessionStatus>, exit: SessionExit) {
    let next = match exit {
        SessionExit::Completed => SessionStatus::Completed,
        SessionExit::Errored(message) => {
            tracing::error!(error = %message, "stream session failed");
            SessionStatus::Errored(message)
        }
        // The caller dropped the receiver; treat it like a cancellation, not
        // an error.
        SessionExit::ReceiverGone => SessionStatus::Cancelled,
    };
    set_terminal(status, next);
}

fn set_terminal(status: &watch::Sender<SessionStatus>, next: SessionStatus) {
    status.send_if_modified(|current| {
        if current.is_terminal() {
            return false;
        }
        *current = next;
        true
    });
}
