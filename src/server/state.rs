use axum::extract::FromRef;

use crate::background_jobs::Dispatcher;
use crate::job_store::JobStore;
use std::sync::Arc;
use std::time::Instant;

use super::credentials::CredentialStore;
use super::ServerConfig;

pub type GuardedJobStore = Arc<dyn JobStore>;
pub type GuardedCredentialStore = Arc<CredentialStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub dispatcher: Dispatcher,
    pub credentials: GuardedCredentialStore,
}

impl ServerState {
    pub fn new(
        config: ServerConfig,
        dispatcher: Dispatcher,
        credentials: GuardedCredentialStore,
    ) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            dispatcher,
            credentials,
        }
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for Dispatcher {
    fn from_ref(input: &ServerState) -> Self {
        input.dispatcher.clone()
    }
}

impl FromRef<ServerState> for GuardedJobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.dispatcher.store().clone()
    }
}

impl FromRef<ServerState> for GuardedCredentialStore {
    fn from_ref(input: &ServerState) -> Self {
        input.credentials.clone()
    }
}
