//! Concrete job runners, one per AI operation.

mod chat_completion;
mod embeddings;
mod speech;

pub use chat_completion::ChatCompletionJob;
pub use embeddings::EmbeddingsJob;
pub use speech::SpeechJob;
