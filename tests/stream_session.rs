use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Response, StatusCode};
use axum::routing::post;
use axum::Router;
use bytes::Bytes;
use futures_util::StreamExt;

use ekstream::config::AppConfig;
use ekstream::error::StreamError;
use ekstream::session::{SessionStatus, StreamController};
use ekstream::stream::StreamObject;

const TEST_CREDENTIAL: &str = "test-key";

/// Spawn a mock SSE upstream that checks the bearer header and then streams
/// the given body chunks with a delay before each one.
async fn spawn_sse_upstream(chunks: Vec<Vec<u8>>, delay: Duration) -> String {
    let handler = move |headers: HeaderMap| {
        let chunks = chunks.clone();
        async move {
            let authorized = headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                == Some(&format!("Bearer {TEST_CREDENTIAL}"));
            if !authorized {
                return Response::builder()
                    .status(StatusCode::UNAUTHORIZED)
                    .body(Body::from(r#"{"error":{"message":"missing bearer"}}"#))
                    .unwrap();
            }

            let body = futures_util::stream::iter(chunks).then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                Ok::<Bytes, Infallible>(Bytes::from(chunk))
            });
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/event-stream")
                .body(Body::from_stream(body))
                .unwrap()
        }
    };

    let app = Router::new().route("/responses", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Spawn a mock upstream that always answers with the given error status.
async fn spawn_error_upstream(status: StatusCode, body: &'static str) -> String {
    let handler = move || async move {
        Response::builder()
            .status(status)
            .body(Body::from(body))
            .unwrap()
    };
    let app = Router::new().route("/responses", post(handler));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn test_config(base_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.endpoint.base_url = base_url.to_string();
    config.endpoint.request_path = "/responses".to_string();
    config.endpoint.timeout = 0;
    config.endpoint.read_idle_timeout_secs = 10;
    config.features.log_level = "DISABLED".to_string();
    config
}

async fn collect(
    controller: &mut StreamController,
    query: &str,
) -> (Vec<StreamObject>, SessionStatus) {
    let (handle, mut rx) = controller.start_stream(query, TEST_CREDENTIAL).unwrap();
    let mut objects = Vec::new();
    while let Some(object) = rx.recv().await {
        objects.push(object);
    }
    handle.closed().await;
    (objects, handle.status())
}

fn delta_frame(payload: &str) -> String {
    format!("event: response.output_text.delta\ndata: {payload}\n\n")
}

#[tokio::test]
async fn end_to_end_two_chunk_example() {
    let chunk1 = delta_frame(r#"{"delta":"{\"type\":\"entry\",\"sur"}"#);
    let chunk2 = format!(
        "{}event: response.completed\ndata: {{}}\n\n",
        delta_frame(r#"{"delta":"face\":\"köpek\"}"}"#)
    );
    let base = spawn_sse_upstream(
        vec![chunk1.into_bytes(), chunk2.into_bytes()],
        Duration::from_millis(5),
    )
    .await;

    let mut controller = StreamController::new(test_config(&base)).unwrap();
    let (objects, status) = collect(&mut controller, "köpek").await;

    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].kind, "entry");
    assert_eq!(objects[0].value["surface"], "köpek");
    assert_eq!(status, SessionStatus::Completed);
}

#[tokio::test]
async fn chunk_split_inside_multibyte_character() {
    let frame = format!(
        "{}event: response.completed\ndata: {{}}\n\n",
        delta_frame(r#"{"delta":"{\"type\":\"entry\",\"surface\":\"köpek\"}"}"#)
    );
    let bytes = frame.into_bytes();
    // Split between the two bytes of 'ö'.
    let split = bytes.iter().position(|byte| *byte == 0xC3).unwrap() + 1;
    let base = spawn_sse_upstream(
        vec![bytes[..split].to_vec(), bytes[split..].to_vec()],
        Duration::from_millis(5),
    )
    .await;

    let mut controller = StreamController::new(test_config(&base)).unwrap();
    let (objects, status) = collect(&mut controller, "köpek").await;

    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].value["surface"], "köpek");
    assert_eq!(status, SessionStatus::Completed);
}

#[tokio::test]
async fn done_sentinel_frame_completes() {
    let chunk = format!(
        "{}data: [DONE]\n\n",
        delta_frame(r#"{"delta":"{\"type\":\"entry\",\"n\":1}"}"#)
    );
    let base = spawn_sse_upstream(vec![chunk.into_bytes()], Duration::from_millis(1)).await;

    let mut controller = StreamController::new(test_config(&base)).unwrap();
    let (objects, status) = collect(&mut controller, "ev").await;

    assert_eq!(objects.len(), 1);
    assert_eq!(status, SessionStatus::Completed);
}

#[tokio::test]
async fn done_object_completes_without_completion_event() {
    let chunk = delta_frame(r#"{"delta":"{\"type\":\"entry\",\"n\":1}{\"type\":\"done\"}"}"#);
    let base = spawn_sse_upstream(vec![chunk.into_bytes()], Duration::from_millis(1)).await;

    let mut controller = StreamController::new(test_config(&base)).unwrap();
    let (objects, status) = collect(&mut controller, "ev").await;

    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].kind, "entry");
    assert!(objects[1].is_done());
    assert_eq!(status, SessionStatus::Completed);
}

#[tokio::test]
async fn natural_end_of_transport_completes() {
    let chunk = delta_frame(r#"{"delta":"{\"type\":\"entry\",\"partial"}"#);
    let base = spawn_sse_upstream(vec![chunk.into_bytes()], Duration::from_millis(1)).await;

    let mut controller = StreamController::new(test_config(&base)).unwrap();
    let (objects, status) = collect(&mut controller, "ev").await;

    assert!(objects.is_empty());
    assert_eq!(status, SessionStatus::Completed);
}

#[tokio::test]
async fn noise_and_unknown_events_are_tolerated() {
    let chunk = format!(
        "event: response.created\ndata: {{}}\n\n\
         : keep-alive comment\n\
         garbage line without prefix\n\
         {}{}data: [DONE]\n\n",
        delta_frame(r#"{"delta":"noise before {\"type\":\"entry\",\"n\":1} noise after "}"#),
        delta_frame(r#"{"delta":"{\"type\":\"entry\",\"n\":2}"}"#),
    );
    let base = spawn_sse_upstream(vec![chunk.into_bytes()], Duration::from_millis(1)).await;

    let mut controller = StreamController::new(test_config(&base)).unwrap();
    let (objects, status) = collect(&mut controller, "ev").await;

    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].value["n"], 1);
    assert_eq!(objects[1].value["n"], 2);
    assert_eq!(status, SessionStatus::Completed);
}

#[tokio::test]
async fn upstream_error_status_reaches_errored() {
    let base = spawn_error_upstream(
        StatusCode::UNAUTHORIZED,
        r#"{"error":{"message":"invalid api key"}}"#,
    )
    .await;

    let mut controller = StreamController::new(test_config(&base)).unwrap();
    let (objects, status) = collect(&mut controller, "ev").await;

    assert!(objects.is_empty());
    match status {
        SessionStatus::Errored(message) => {
            assert!(message.contains("invalid api key"), "message: {message}");
            assert!(message.contains("401"), "message: {message}");
        }
        other => panic!("expected Errored, got {other:?}"),
    }
}

#[tokio::test]
async fn explicit_error_event_reaches_errored() {
    let chunk = "event: response.failed\ndata: {\"error\":{\"message\":\"boom\"}}\n\n".to_string();
    let base = spawn_sse_upstream(vec![chunk.into_bytes()], Duration::from_millis(1)).await;

    let mut controller = StreamController::new(test_config(&base)).unwrap();
    let (objects, status) = collect(&mut controller, "ev").await;

    assert!(objects.is_empty());
    assert_eq!(status, SessionStatus::Errored("boom".to_string()));
}

#[tokio::test]
async fn cancellation_stops_a_running_session() {
    // One delta, then the upstream stalls for longer than the test runs.
    let chunk = delta_frame(r#"{"delta":"{\"type\":\"entry\",\"n\":1}"}"#);
    let base = spawn_sse_upstream(
        vec![chunk.into_bytes(), b"data: never\n\n".to_vec()],
        Duration::from_secs(30),
    )
    .await;

    let mut config = test_config(&base);
    config.endpoint.read_idle_timeout_secs = 0;
    let mut controller = StreamController::new(config).unwrap();
    let (handle, mut rx) = controller.start_stream("ev", TEST_CREDENTIAL).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    handle.closed().await;
    assert_eq!(handle.status(), SessionStatus::Cancelled);

    // Channel closes without further emissions.
    while rx.recv().await.is_some() {}

    // Cancelling a terminal session is a no-op.
    handle.cancel();
    assert_eq!(handle.status(), SessionStatus::Cancelled);
}

#[tokio::test]
async fn new_query_supersedes_running_session() {
    let base = spawn_sse_upstream(vec![b"data: never\n\n".to_vec()], Duration::from_secs(30)).await;

    let mut config = test_config(&base);
    config.endpoint.read_idle_timeout_secs = 0;
    let mut controller = StreamController::new(config).unwrap();

    let (first, _rx1) = controller.start_stream("ev", TEST_CREDENTIAL).unwrap();
    let (second, _rx2) = controller.start_stream("kedi", TEST_CREDENTIAL).unwrap();

    first.closed().await;
    assert_eq!(first.status(), SessionStatus::Cancelled);
    assert_eq!(second.status(), SessionStatus::Running);
    assert_ne!(first.id(), second.id());

    second.cancel();
    second.closed().await;
}

#[tokio::test]
async fn idle_timeout_reaches_errored() {
    let chunk = delta_frame(r#"{"delta":"x"}"#);
    let base = spawn_sse_upstream(vec![chunk.into_bytes()], Duration::from_secs(30)).await;

    let mut config = test_config(&base);
    config.endpoint.read_idle_timeout_secs = 1;
    let mut controller = StreamController::new(config).unwrap();
    let (objects, status) = collect(&mut controller, "ev").await;

    assert!(objects.is_empty());
    match status {
        SessionStatus::Errored(message) => {
            assert!(message.contains("idle"), "message: {message}");
        }
        other => panic!("expected Errored, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_input_is_a_synchronous_no_op() {
    // No server needed; validation fires before any request is issued.
    let mut controller = StreamController::new(test_config("http://127.0.0.1:9")).unwrap();
    assert!(matches!(
        controller.start_stream("   ", TEST_CREDENTIAL),
        Err(StreamError::InvalidInput(_))
    ));
    assert!(matches!(
        controller.start_stream("ev", ""),
        Err(StreamError::InvalidInput(_))
    ));
    assert!(controller.active().is_none());
}
