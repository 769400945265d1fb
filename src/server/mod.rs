pub mod config;
mod credentials;
mod error;
mod http_layers;
mod job_routes;
pub mod metrics;
mod openai_routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use credentials::CredentialStore;
pub use error::ApiError;
pub use http_layers::*;
pub use server::{make_app, run_server};
