//! Provider client trait and error type.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Errors that can occur when talking to an AI provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Connection(err.to_string())
        }
    }
}

/// Raw body chunks of a streaming response, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ProviderError>>;

/// Transport to an OpenAI-compatible provider.
///
/// Every call takes the endpoint URL and the credential explicitly; the client
/// itself holds no per-user state. A non-success status is always surfaced as
/// [`ProviderError::Api`] carrying the response body.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// POST a JSON body and decode a JSON reply.
    async fn post_json(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<JsonValue, ProviderError>;

    /// POST a JSON body and return the reply body as a byte stream.
    async fn post_stream(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<ByteStream, ProviderError>;

    /// POST a JSON body and return the raw reply bytes (binary payloads such as audio).
    async fn post_bytes(
        &self,
        url: &str,
        credential: Option<&str>,
        body: &JsonValue,
    ) -> Result<Vec<u8>, ProviderError>;
}
