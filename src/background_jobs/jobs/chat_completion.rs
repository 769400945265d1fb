use crate::background_jobs::{JobContext, JobError, JobRunner};
use crate::job_store::JobKind;
use crate::provider::{ChunkAccumulator, SseLineDecoder, StreamLine};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

/// Progress reported for every streamed chunk. The stream length is unknown
/// up front, so intermediate updates carry a constant midpoint.
const CHUNK_PROGRESS: f64 = 0.5;

pub struct ChatCompletionJob {
    pub messages: Vec<JsonValue>,
    pub model: String,
    pub stream: bool,
    pub url: String,
    pub credential: Option<String>,
}

impl ChatCompletionJob {
    fn request_body(&self) -> JsonValue {
        json!({
            "model": self.model,
            "stream": self.stream,
            "messages": self.messages,
        })
    }

    async fn run_streaming(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        let body = self.request_body();
        let mut stream = ctx
            .cancellable(
                ctx.provider
                    .post_stream(&self.url, self.credential.as_deref(), &body),
            )
            .await?;

        let mut decoder = SseLineDecoder::new();
        let mut accumulator = ChunkAccumulator::new();

        let finished_with_marker = loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancellation_token.cancelled() => return Err(JobError::Cancelled),
                next = stream.next() => next,
            };
            let Some(bytes) = next else {
                break false;
            };

            let mut done = false;
            for line in decoder.push(&bytes?)? {
                match line {
                    StreamLine::Done => {
                        done = true;
                        break;
                    }
                    StreamLine::Data(chunk) => {
                        let partial = accumulator.push(chunk).clone();
                        ctx.report_progress(CHUNK_PROGRESS, Some(partial));
                    }
                }
            }
            if done {
                break true;
            }
        };

        if !finished_with_marker {
            if let Some(StreamLine::Data(chunk)) = decoder.finish()? {
                let partial = accumulator.push(chunk).clone();
                ctx.report_progress(CHUNK_PROGRESS, Some(partial));
            }
            debug!(job_id = %ctx.job_id, "Stream ended without a done marker");
        }

        debug!(
            job_id = %ctx.job_id,
            chunks = accumulator.chunk_count(),
            "Completion stream finished"
        );
        ctx.report_progress(1.0, None);
        Ok(accumulator.into_result())
    }

    async fn run_blocking(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        let body = self.request_body();
        let response = ctx
            .cancellable(
                ctx.provider
                    .post_json(&self.url, self.credential.as_deref(), &body),
            )
            .await?;
        ctx.report_progress(1.0, Some(response.clone()));
        Ok(response)
    }
}

#[async_trait]
impl JobRunner for ChatCompletionJob {
    fn kind(&self) -> JobKind {
        JobKind::ChatCompletion
    }

    async fn run(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        if self.stream {
            self.run_streaming(ctx).await
        } else {
            self.run_blocking(ctx).await
        }
    }
}
