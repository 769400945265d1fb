use crate::background_jobs::{JobContext, JobError, JobRunner};
use crate::job_store::JobKind;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use tracing::info;

/// Text-to-speech job. The audio is written to `output_file`, which the
/// caller has already resolved inside the audio output directory.
pub struct SpeechJob {
    pub input: String,
    pub model: String,
    pub voice: String,
    pub url: String,
    pub output_file: PathBuf,
    pub credential: Option<String>,
}

impl SpeechJob {
    /// Sibling of the output file, unique per job.
    fn partial_file(&self, job_id: &str) -> PathBuf {
        let name = self
            .output_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_file
            .with_file_name(format!(".{}.{}.part", name, job_id))
    }
}

#[async_trait]
impl JobRunner for SpeechJob {
    fn kind(&self) -> JobKind {
        JobKind::Speech
    }

    async fn run(&self, ctx: &JobContext) -> Result<JsonValue, JobError> {
        let body = json!({
            "model": self.model,
            "input": self.input,
            "voice": self.voice,
        });
        let audio = ctx
            .cancellable(
                ctx.provider
                    .post_bytes(&self.url, self.credential.as_deref(), &body),
            )
            .await?;

        if let Some(parent) = self.output_file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                JobError::Output(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        // Jobs may share an output name; each writes its own file and the
        // last rename wins, so the file always holds one complete audio.
        let partial = self.partial_file(&ctx.job_id);
        if let Err(e) = tokio::fs::write(&partial, &audio).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(JobError::Output(format!(
                "Failed to write {}: {}",
                partial.display(),
                e
            )));
        }
        tokio::fs::rename(&partial, &self.output_file)
            .await
            .map_err(|e| {
                JobError::Output(format!(
                    "Failed to move audio to {}: {}",
                    self.output_file.display(),
                    e
                ))
            })?;

        info!(
            job_id = %ctx.job_id,
            "Wrote {:#} of audio to {}",
            byte_unit::Byte::from(audio.len()),
            self.output_file.display()
        );

        let result = json!({
            "output_file": self.output_file.display().to_string(),
            "bytes": audio.len(),
        });
        ctx.report_progress(1.0, Some(result.clone()));
        Ok(result)
    }
}
