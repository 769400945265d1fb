use crate::background_jobs::{JobContext, JobError, JobRunner};
use crate::job_store::JobKind;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

pub struct EmbeddingsJob {
    pub input: String,
    pub model: String,
    pub url: String,
    pub credential: Option<String>,
}

#[async_trait]
impl JobRunner for EmbeddingsJob {
    fn kind(&self) -> JobKind {
        JobKind::Embeddings
    }

    async fn run(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        let body = json!({
            "input": self.input,
            "model": self.model,
        });
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
