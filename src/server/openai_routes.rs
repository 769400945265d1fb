//! Job submission and credential routes.

use super::error::ApiError;
use super::state::{GuardedCredentialStore, ServerState};
use super::ServerConfig;
use crate::background_jobs::jobs::{ChatCompletionJob, EmbeddingsJob, SpeechJob};
use crate::background_jobs::{Dispatcher, JobRunner};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const DEFAULT_MESSAGES: &str = r#"{"messages":[{"role":"user","content":"Tell me your name."}]}"#;
const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_EMBEDDINGS_MODEL: &str = "text-embedding-3-small";
const DEFAULT_SPEECH_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_OUTPUT_FILE: &str = "speech.mp3";

#[derive(Deserialize, Debug)]
struct ChatCompletionQuery {
    messages: Option<String>,
    model: Option<String>,
    stream: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingsQuery {
    input: Option<String>,
    model: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SpeechQuery {
    input: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    url: Option<String>,
    output_file: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SetKeyBody {
    key: String,
}

#[derive(Serialize)]
struct SubmittedResponse {
    id: String,
}

fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(q)| q)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

/// Parse the `messages` parameter: a JSON object holding a `messages` array.
fn parse_messages(raw: &str) -> Result<Vec<JsonValue>, ApiError> {
    let value: JsonValue = serde_json::from_str(raw)
        .map_err(|_| ApiError::validation("JSON decoding error in messages"))?;
    match value.get("messages") {
        Some(JsonValue::Array(messages)) => Ok(messages.clone()),
        _ => Err(ApiError::validation("Invalid messages format")),
    }
}

/// Boolean query flag accepting the spellings Python clients send.
fn parse_flag(name: &str, raw: Option<&str>, default: bool) -> Result<bool, ApiError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Ok(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Ok(false),
        _ => Err(ApiError::validation(format!(
            "{} must be a boolean, got '{}'",
            name, raw
        ))),
    }
}

fn require_input(input: Option<String>) -> Result<String, ApiError> {
    input
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ApiError::validation("input must not be empty"))
}

fn resolve_url(
    config: &ServerConfig,
    url: Option<String>,
    endpoint: &str,
) -> Result<String, ApiError> {
    match url {
        None => Ok(config.provider_endpoint(endpoint)),
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(url),
        Some(url) => Err(ApiError::validation(format!("Invalid url: {}", url))),
    }
}

/// Only a bare file name is accepted; the file always lands in the audio
/// output directory.
fn validate_output_file(name: &str) -> Result<&str, ApiError> {
    let is_bare = !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    if is_bare {
        Ok(name)
    } else {
        Err(ApiError::validation(format!(
            "output_file must be a plain file name: {}",
            name
        )))
    }
}

/// A bearer token on the submission wins over the stored credential.
fn resolve_credential(
    headers: &HeaderMap,
    credentials: &GuardedCredentialStore,
) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .or_else(|| credentials.get())
}

fn submit(
    dispatcher: &Dispatcher,
    runner: impl JobRunner + 'static,
) -> Result<Json<SubmittedResponse>, ApiError> {
    let id = dispatcher.submit(Arc::new(runner))?;
    Ok(Json(SubmittedResponse { id }))
}

async fn chat_completions(
    State(state): State<ServerState>,
    headers: HeaderMap,
    query: Result<Query<ChatCompletionQuery>, QueryRejection>,
) -> Result<Json<SubmittedResponse>, ApiError> {
    let query = parse_query(query)?;
    let messages = parse_messages(query.messages.as_deref().unwrap_or(DEFAULT_MESSAGES))?;
    let job = ChatCompletionJob {
        messages,
        model: query.model.unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
        stream: parse_flag("stream", query.stream.as_deref(), true)?,
        url: resolve_url(&state.config, query.url, "chat/completions")?,
        credential: resolve_credential(&headers, &state.credentials),
    };
    submit(&state.dispatcher, job)
}

async fn embeddings(
    State(state): State<ServerState>,
    headers: HeaderMap,
    query: Result<Query<EmbeddingsQuery>, QueryRejection>,
) -> Result<Json<SubmittedResponse>, ApiError> {
    let query = parse_query(query)?;
    let job = EmbeddingsJob {
        input: require_input(query.input)?,
        model: query
            .model
            .unwrap_or_else(|| DEFAULT_EMBEDDINGS_MODEL.to_string()),
        url: resolve_url(&state.config, query.url, "embeddings")?,
        credential: resolve_credential(&headers, &state.credentials),
    };
    submit(&state.dispatcher, job)
}

async fn speech(
    State(state): State<ServerState>,
    headers: HeaderMap,
    query: Result<Query<SpeechQuery>, QueryRejection>,
) -> Result<Json<SubmittedResponse>, ApiError> {
    let query = parse_query(query)?;
    let output_file = query
        .output_file
        .unwrap_or_else(|| DEFAULT_OUTPUT_FILE.to_string());
    let output_file = state
        .config
        .audio_output_dir
        .join(validate_output_file(&output_file)?);

    let job = SpeechJob {
        input: require_input(query.input)?,
        model: query.model.unwrap_or_else(|| DEFAULT_SPEECH_MODEL.to_string()),
        voice: query.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
        url: resolve_url(&state.config, query.url, "audio/speech")?,
        output_file,
        credential: resolve_credential(&headers, &state.credentials),
    };
    submit(&state.dispatcher, job)
}

async fn api_key_status(State(credentials): State<GuardedCredentialStore>) -> Json<JsonValue> {
    let status = if credentials.is_set() { "set" } else { "not set" };
    Json(json!({ "openai_api_key_status": status }))
}

async fn set_api_key(
    State(credentials): State<GuardedCredentialStore>,
    body: Result<Json<SetKeyBody>, JsonRejection>,
) -> Result<Json<JsonValue>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::validation(rejection.body_text()))?;
    let key = body.key.trim();
    if key.is_empty() {
        return Err(ApiError::validation("key must not be empty"));
    }
    credentials.set(key);
    info!("Provider API key updated");
    Ok(Json(json!({ "message": "API key updated successfully" })))
}

pub fn make_openai_routes(state: ServerState) -> Router {
    Router::new()
        .route("/openai/chat/completions", get(chat_completions))
        .route("/openai/embeddings", get(embeddings))
        .route("/openai/audio/speech", get(speech))
        .route("/openai_api_key_status", get(api_key_status))
        .route("/set_openai_api_key", post(set_api_key))
        .with_state(state)
}
