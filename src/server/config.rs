use super::RequestsLoggingLevel;
use crate::config::DEFAULT_PROVIDER_BASE_URL;
use std::path::PathBuf;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Base URL used when a submission does not pass its own `url`.
    pub provider_base_url: String,
    /// Speech jobs write their audio files inside this directory.
    pub audio_output_dir: PathBuf,
}

impl ServerConfig {
    pub fn provider_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.provider_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 8000,
            provider_base_url: DEFAULT_PROVIDER_BASE_URL.to_string(),
            audio_output_dir: PathBuf::from("."),
        }
    }
}
