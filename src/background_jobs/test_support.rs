//! In-process fakes shared by the background job tests.

use super::progress::ProgressChannel;
use crate::job_store::{JobRecord, JobState, JobStore};
use crate::provider::{ByteStream, ProviderClient, ProviderError};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value as JsonValue;
use std::sync::Mutex;
use std::time::Duration;

/// What the fake provider answers with.
#[derive(Debug, Clone)]
pub enum FakeReply {
    Json(JsonValue),
    /// Raw stream chunks, delivered in order.
    Stream(Vec<String>),
    /// Stream chunks followed by a connection that never closes.
    StreamThenHang(Vec<String>),
    Bytes(Vec<u8>),
    Status(u16, String),
    Hang,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub credential: Option<String>,
    pub body: JsonValue,
}

pub struct FakeProvider {
    reply: FakeReply,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeProvider {
    pub fn new(reply: FakeReply) -> Self {
        Self {
            reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, url: &str, credential: Option<&str>, body: &JsonValue) {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            credential: credential.map(str::to_string),
            body: body.clone(),
        });
    }

    async fn fail_or_hang(&self) -> ProviderError {
        match &self.reply {
            FakeReply::Status(status, message) => ProviderError::Api {
                status: *status,
                message: message.clone(),
            },
            FakeReply::Hang => futures::future::pending().await,
            other => ProviderError::InvalidResponse(format!("unexpected call for {:?}", other)),
        }
    }
}

fn chunk_stream(chunks: &[String]) -> impl futures::Stream<Item = Result<Vec<u8>, ProviderError>> {
    futures::stream::iter(
        chunks
            .iter()
            .map(|chunk| Ok(chunk.as_bytes().to_vec()))
            .collect::<Vec<_>>(),
    )
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn post_json(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<JsonValue, ProviderError> {
        self.record(url, credential, body);
        match &self.reply {
            FakeReply::Json(value) => Ok(value.clone()),
            _ => Err(self.fail_or_hang().await),
        }
    }

    async fn post_stream(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<ByteStream, ProviderError> {
        self.record(url, credential, body);
        match &self.reply {
            FakeReply::Stream(chunks) => Ok(chunk_stream(chunks).boxed()),
            FakeReply::StreamThenHang(chunks) => Ok(chunk_stream(chunks)
                .chain(futures::stream::pending())
                .boxed()),
            _ => Err(self.fail_or_hang().await),
        }
    }

    async fn post_bytes(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<Vec<u8>, ProviderError> {
        self.record(url, credential, body);
        match &self.reply {
            FakeReply::Bytes(bytes) => Ok(bytes.clone()),
            _ => Err(self.fail_or_hang().await),
        }
    }
}

/// Progress channel that only remembers what it was told.
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<(f64, Option<JsonValue>)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn updates(&self) -> Vec<(f64, Option<JsonValue>)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl ProgressChannel for RecordingProgress {
    fn report_progress(&self, progress: f64, payload: Option<JsonValue>) {
        self.updates.lock().unwrap().push((progress, payload));
    }

    fn report_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

/// Poll `store` until job `id` reaches `state`, panicking after a few seconds.
pub async fn wait_for_state(store: &dyn JobStore, id: &str, state: JobState) -> JobRecord {
    for _ in 0..500 {
        if let Some(record) = store.get(id).unwrap() {
            if record.state == state {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached {}", id, state);
}
