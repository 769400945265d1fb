//! End-to-end tests for request validation, lookups and credentials

mod common;

use common::{TestClient, TestServer, TEST_API_KEY};
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};

async fn assert_bad_request(response: reqwest::Response, expected_detail: Option<&str>) {
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: JsonValue = response.json().await.unwrap();
    let detail = body["detail"].as_str().expect("error body without detail");
    if let Some(expected) = expected_detail {
        assert_eq!(detail, expected);
    }
}

// ============================================================================
// Server
// ============================================================================

#[tokio::test]
async fn test_home_reports_stats() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.home().await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["active_jobs"], 0);
    assert!(body["uptime"].as_str().unwrap().starts_with("0d "));
}

// ============================================================================
// Unknown jobs
// ============================================================================

#[tokio::test]
async fn test_unknown_job_is_not_found_everywhere() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let id = "00000000-0000-0000-0000-000000000000";

    for response in [
        client.status(id).await,
        client.task_result(id).await,
        client.stop(id).await,
        client.events(id).await,
    ] {
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: JsonValue = response.json().await.unwrap();
        assert_eq!(body, json!({"detail": "Job not found"}));
    }
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_chat_rejects_malformed_messages() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    assert_bad_request(
        client.submit_chat(&[("messages", "{not json")]).await,
        Some("JSON decoding error in messages"),
    )
    .await;
    assert_bad_request(
        client.submit_chat(&[("messages", r#"{"prompt":"hi"}"#)]).await,
        Some("Invalid messages format"),
    )
    .await;
    assert_bad_request(
        client.submit_chat(&[("messages", r#"{"messages":"hi"}"#)]).await,
        Some("Invalid messages format"),
    )
    .await;
}

#[tokio::test]
async fn test_chat_rejects_invalid_query_values() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    assert_bad_request(client.submit_chat(&[("stream", "maybe")]).await, None).await;
    assert_bad_request(client.submit_chat(&[("url", "ftp://provider")]).await, None).await;
}

#[tokio::test]
async fn test_embeddings_and_speech_require_input() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    assert_bad_request(
        client.submit_embeddings(&[]).await,
        Some("input must not be empty"),
    )
    .await;
    assert_bad_request(
        client.submit_embeddings(&[("input", "   ")]).await,
        Some("input must not be empty"),
    )
    .await;
    assert_bad_request(
        client.submit_speech(&[]).await,
        Some("input must not be empty"),
    )
    .await;
}

#[tokio::test]
async fn test_speech_rejects_paths_in_output_file() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    for output_file in ["../escape.mp3", "nested/speech.mp3", ".."] {
        assert_bad_request(
            client
                .submit_speech(&[("input", "hello"), ("output_file", output_file)])
                .await,
            None,
        )
        .await;
    }
}

#[tokio::test]
async fn test_rejected_submissions_create_no_jobs() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    client.submit_chat(&[("messages", "{not json")]).await;
    client.submit_embeddings(&[]).await;

    let jobs: Vec<JsonValue> = client.list_jobs(None).await.json().await.unwrap();
    assert!(jobs.is_empty());
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn test_set_api_key_enables_jobs() {
    let server = TestServer::spawn_with_key(None).await;
    let client = TestClient::new(server.base_url.clone());

    let body: JsonValue = client.api_key_status().await.json().await.unwrap();
    assert_eq!(body, json!({"openai_api_key_status": "not set"}));

    let response = client.set_api_key(TEST_API_KEY).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: JsonValue = response.json().await.unwrap();
    assert_eq!(body, json!({"message": "API key updated successfully"}));

    let body: JsonValue = client.api_key_status().await.json().await.unwrap();
    assert_eq!(body, json!({"openai_api_key_status": "set"}));

    let id = client
        .submit_ok(client.submit_embeddings(&[("input", "hello")]).await)
        .await;
    assert_eq!(client.wait_for_terminal(&id).await["status"], "SUCCESS");
}

#[tokio::test]
async fn test_set_api_key_rejects_empty_key() {
    let server = TestServer::spawn_with_key(None).await;
    let client = TestClient::new(server.base_url.clone());

    assert_bad_request(client.set_api_key("  ").await, Some("key must not be empty")).await;

    let body: JsonValue = client.api_key_status().await.json().await.unwrap();
    assert_eq!(body["openai_api_key_status"], "not set");
}
