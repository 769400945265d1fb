//! AI provider access.
//!
//! A trait-based transport so job runners can be exercised against a fake
//! provider, plus the stream decoding shared by streaming completions.

mod client;
mod openai;
mod stream;

pub use client::{ByteStream, ProviderClient, ProviderError};
pub use openai::OpenAIClient;
pub use stream::{merged_content, ChunkAccumulator, SseLineDecoder, StreamLine};
