/// HTTP transport for the streaming analysis endpoint.
///
/// Owns the pooled `reqwest` client and knows how to open one streaming
/// request. Everything after the status check (frame parsing, reassembly,
/// terminal detection) belongs to the stream pipeline, not here.
use std::time::Duration;

use futures_util::Stream;
use serde::Serialize;

use crate::config::EndpointConfig;
use crate::error::StreamError;

/// Instruction block sent with every request. The exact analysis content the
/// model returns is a prompt contract with the presentation layer; the
/// pipeline only relies on "JSON objects, terminated by a done object".
const ANALYSIS_INSTRUCTIONS: &str = "\
Analyze the given Turkish word or phrase morpheme by morpheme. \
For each word emit one JSON object on its own line with \
\"type\":\"entry\", the surface form, and its morpheme breakdown. \
After the last entry emit {\"type\":\"done\"}. Emit nothing else.";

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    stream: bool,
}

/// A stream of raw body chunks from the upstream response.
pub type ByteStream = dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send;

pub struct HttpTransport {
    client: reqwest::Client,
    request_url: url::Url,
    model: String,
}

impl HttpTransport {
    /// Build the transport from endpoint configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] for an unusable endpoint URL and
    /// [`StreamError::Transport`] when the HTTP client cannot be built.
    pub fn new(config: &EndpointConfig) -> Result<Self, StreamError> {
        let request_url = config.request_url().map_err(StreamError::Config)?;

        let mut builder = reqwest::Client::builder()
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::none());
        if config.timeout > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout));
        }
        let client = builder
            .build()
            .map_err(|err| StreamError::Transport(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            request_url,
            model: config.model.clone(),
        })
    }

    /// Open one streaming request and return the response body chunks.
    ///
    /// The request carries a bearer credential header, a JSON body with
    /// `stream` enabled, and asks for `text/event-stream`.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Transport`] on connection failure and
    /// [`StreamError::Upstream`] for a non-success status, with a message
    /// derived from the response body.
    pub async fn open_stream(
        &self,
        query: &str,
        credential: &str,
    ) -> Result<std::pin::Pin<Box<ByteStream>>, StreamError> {
        let body = AnalyzeRequest {
            model: &self.model,
            instructions: ANALYSIS_INSTRUCTIONS,
            input: query,
            stream: true,
        };

        tracing::debug!(url = %self.request_url, model = %self.model, "opening stream");
        let response = self
            .client
            .post(self.request_url.clone())
            .bearer_auth(credential)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|err| StreamError::Transport(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(StreamError::Upstream {
                status: status.as_u16(),
                message: upstream_error_message(status.as_u16(), &body_text),
            });
        }

        Ok(Box::pin(response.bytes_stream()))
    }
}

/// Derive a human-readable message from an error response body.
///
/// Providers wrap messages as `{"error":{"message":...}}` or `{"message":...}`;
/// fall back to the raw body, then to the status code alone.
fn upstream_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let nested = value
            .get("error")
            .and_then(|error| error.get("message"))
            .or_else(|| value.get("message"))
            .and_then(serde_json::Value::as_str);
        if let Some(message) = nested {
            if !message.trim().is_empty() {
                return message.to_string();
            }
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("upstream returned status {status}");
    }
    const MAX_BODY_SNIPPET: usize = 300;
    let mut end = trimmed.len().min(MAX_BODY_SNIPPET);
    while end < trimmed.len() && !trimmed.is_char_boundary(end) {
        end += 1;
    }
    trimmed[..end].to_string()
}
