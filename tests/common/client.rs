//! HTTP client for end-to-end tests
//!
//! Thin wrappers over every route, returning raw responses so tests can
//! assert on status codes as well as bodies.

use super::constants::*;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;

pub struct TestClient {
    client: Client,
    base_url: String,
}

#[allow(dead_code)]
impl TestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    async fn get(&self, path: &str) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Request failed")
    }

    async fn get_with_query(&self, path: &str, query: &[(&str, &str)]) -> Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .query(query)
            .send()
            .await
            .expect("Request failed")
    }

    // ========================================================================
    // Server
    // ========================================================================

    pub async fn home(&self) -> Response {
        self.get("/").await
    }

    // ========================================================================
    // Submission
    // ========================================================================

    pub async fn submit_chat(&self, query: &[(&str, &str)]) -> Response {
        self.get_with_query("/api/openai/chat/completions", query).await
    }

    pub async fn submit_chat_with_bearer(&self, query: &[(&str, &str)], key: &str) -> Response {
        self.client
            .get(format!("{}/api/openai/chat/completions", self.base_url))
            .query(query)
            .bearer_auth(key)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn submit_embeddings(&self, query: &[(&str, &str)]) -> Response {
        self.get_with_query("/api/openai/embeddings", query).await
    }

    pub async fn submit_speech(&self, query: &[(&str, &str)]) -> Response {
        self.get_with_query("/api/openai/audio/speech", query).await
    }

    /// Submits and returns the new job id, asserting the submission succeeded.
    pub async fn submit_ok(&self, response: Response) -> String {
        assert_eq!(response.status(), StatusCode::OK);
        let body: JsonValue = response.json().await.expect("Invalid submit body");
        body["id"]
            .as_str()
            .expect("Submit response without id")
            .to_string()
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub async fn status(&self, id: &str) -> Response {
        self.get(&format!("/api/status/{}", id)).await
    }

    pub async fn task_result(&self, id: &str) -> Response {
        self.get(&format!("/api/task_result/{}", id)).await
    }

    pub async fn stop(&self, id: &str) -> Response {
        self.get(&format!("/api/stop/{}", id)).await
    }

    pub async fn list_jobs(&self, limit: Option<usize>) -> Response {
        match limit {
            Some(limit) => {
                self.get_with_query("/api/jobs", &[("limit", &limit.to_string())])
                    .await
            }
            None => self.get("/api/jobs").await,
        }
    }

    pub async fn events(&self, id: &str) -> Response {
        self.get(&format!("/api/events/{}", id)).await
    }

    /// Polls the status route until the job reaches `status`.
    pub async fn wait_for_status(&self, id: &str, status: &str) -> JsonValue {
        let timeout = Duration::from_millis(JOB_TIMEOUT_MS);
        let start = std::time::Instant::now();
        let mut last = JsonValue::Null;

        while start.elapsed() < timeout {
            let response = self.status(id).await;
            assert_eq!(response.status(), StatusCode::OK, "status of {} failed", id);
            last = response.json().await.expect("Invalid status body");
            if last["status"] == status {
                return last;
            }
            tokio::time::sleep(Duration::from_millis(JOB_POLL_INTERVAL_MS)).await;
        }

        panic!("Job {} did not reach {} in time, last: {}", id, status, last);
    }

    /// Polls the status route until the job is SUCCESS, FAILURE or REVOKED.
    pub async fn wait_for_terminal(&self, id: &str) -> JsonValue {
        let timeout = Duration::from_millis(JOB_TIMEOUT_MS);
        let start = std::time::Instant::now();
        let mut last = JsonValue::Null;

        while start.elapsed() < timeout {
            let response = self.status(id).await;
            assert_eq!(response.status(), StatusCode::OK, "status of {} failed", id);
            last = response.json().await.expect("Invalid status body");
            if matches!(
                last["status"].as_str(),
                Some("SUCCESS") | Some("FAILURE") | Some("REVOKED")
            ) {
                return last;
            }
            tokio::time::sleep(Duration::from_millis(JOB_POLL_INTERVAL_MS)).await;
        }

        panic!("Job {} did not finish in time, last: {}", id, last);
    }

    // ========================================================================
    // Credentials
    // ========================================================================

    pub async fn api_key_status(&self) -> Response {
        self.get("/api/openai_api_key_status").await
    }

    pub async fn set_api_key(&self, key: &str) -> Response {
        self.client
            .post(format!("{}/api/set_openai_api_key", self.base_url))
            .json(&json!({ "key": key }))
            .send()
            .await
            .expect("Request failed")
    }
}
