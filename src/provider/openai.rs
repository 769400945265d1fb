//! OpenAI-compatible HTTP transport.
//!
//! Works with OpenAI and any service exposing the same endpoints.

use super::client::{ByteStream, ProviderClient, ProviderError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

pub struct OpenAIClient {
    client: Client,
    timeout: Duration,
}

impl OpenAIClient {
    /// `timeout` bounds non-streaming requests end to end. Streaming requests
    /// are only bounded by the job timeout, since a long completion can
    /// legitimately keep the connection open for minutes.
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    fn request(&self, url: &str, credential: Option<&str>, body: &JsonValue) -> RequestBuilder {
        let mut builder = self.client.post(url).json(body);
        if let Some(key) = credential {
            builder = builder.bearer_auth(key);
        }
        builder
    }

    async fn check_status(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ProviderClient for OpenAIClient {
    async fn post_json(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<JsonValue, ProviderError> {
        debug!(url = %url, "Sending JSON request to provider");
        let response = self
            .request(url, credential, body)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        response.json::<JsonValue>().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse provider response: {}", e))
        })
    }

    async fn post_stream(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<ByteStream, ProviderError> {
        debug!(url = %url, "Opening streaming request to provider");
        let response = self.request(url, credential, body).send().await?;
        let response = Self::check_status(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ProviderError::from))
            .boxed())
    }

    async fn post_bytes(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<Vec<u8>, ProviderError> {
        debug!(url = %url, "Sending binary request to provider");
        let response = self
            .request(url, credential, body)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        Ok(response.bytes().await?.to_vec())
    }
}
