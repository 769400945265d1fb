//! In-process OpenAI-compatible provider
//!
//! Serves canned replies on an ephemeral port so jobs can run end to end
//! without reaching the network. Every route requires `Bearer TEST_API_KEY`
//! and answers 401 otherwise, the same way the real API does.

use super::constants::*;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value as JsonValue};
use std::convert::Infallible;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Clone)]
struct FakeProviderState {
    api_key: String,
}

pub struct FakeProvider {
    /// Base URL to configure the server with, e.g. "http://127.0.0.1:12345/v1"
    pub base_url: String,

    _shutdown_tx: oneshot::Sender<()>,
}

impl FakeProvider {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake provider");
        let port = listener
            .local_addr()
            .expect("Failed to get fake provider address")
            .port();

        let state = FakeProviderState {
            api_key: TEST_API_KEY.to_string(),
        };
        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/embeddings", post(embeddings))
            .route("/v1/audio/speech", post(speech))
            .route("/v1/hanging/chat/completions", post(hanging_chat_completions))
            .with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Fake provider failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}/v1", port),
            _shutdown_tx: shutdown_tx,
        }
    }
}

fn check_auth(state: &FakeProviderState, headers: &HeaderMap) -> Result<(), Response> {
    let expected = format!("Bearer {}", state.api_key);
    let given = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if given == Some(expected.as_str()) {
        return Ok(());
    }
    let body = json!({
        "error": {
            "message": "Incorrect API key provided",
            "type": "invalid_request_error",
            "code": "invalid_api_key"
        }
    });
    Err((StatusCode::UNAUTHORIZED, Json(body)).into_response())
}

fn sse_chunk(content: &str) -> String {
    let chunk = json!({
        "id": "chatcmpl-fake",
        "object": "chat.completion.chunk",
        "model": "gpt-3.5-turbo",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    });
    format!("data: {}\n\n", chunk)
}

fn event_stream_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .body(body)
        .expect("Failed to build stream response")
}

async fn chat_completions(
    State(state): State<FakeProviderState>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    if body["stream"].as_bool().unwrap_or(false) {
        let mut payload: String = FAKE_CHAT_CHUNKS.iter().map(|c| sse_chunk(c)).collect();
        payload.push_str("data: [DONE]\n\n");
        return event_stream_response(Body::from(payload));
    }

    Json(json!({
        "id": "chatcmpl-fake",
        "object": "chat.completion",
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": FAKE_CHAT_REPLY},
            "finish_reason": "stop"
        }]
    }))
    .into_response()
}

/// Sends one chunk and then keeps the connection open forever.
async fn hanging_chat_completions(
    State(state): State<FakeProviderState>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    let first = futures::stream::iter(vec![Ok::<_, Infallible>(Bytes::from(sse_chunk(
        FAKE_CHAT_CHUNKS[0],
    )))]);
    let stream = first.chain(futures::stream::pending());
    event_stream_response(Body::from_stream(stream))
}

async fn embeddings(
    State(state): State<FakeProviderState>,
    headers: HeaderMap,
    Json(body): Json<JsonValue>,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    Json(json!({
        "object": "list",
        "model": body["model"],
        "data": [{"object": "embedding", "index": 0, "embedding": FAKE_EMBEDDING}],
        "usage": {"prompt_tokens": 2, "total_tokens": 2}
    }))
    .into_response()
}

async fn speech(
    State(state): State<FakeProviderState>,
    headers: HeaderMap,
    Json(_body): Json<JsonValue>,
) -> Response {
    if let Err(response) = check_auth(&state, &headers) {
        return response;
    }

    (
        [(header::CONTENT_TYPE, "audio/mpeg")],
        Bytes::from_static(FAKE_AUDIO),
    )
        .into_response()
}
