use std::sync::RwLock;

/// Provider API key configured at runtime.
///
/// Jobs never read this directly. Submission handlers resolve the key once and
/// hand a copy to the runner, so changing it only affects later submissions.
#[derive(Debug, Default)]
pub struct CredentialStore {
    key: RwLock<Option<String>>,
}

impl CredentialStore {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            key: RwLock::new(initial.filter(|k| !k.trim().is_empty())),
        }
    }

    pub fn set(&self, key: impl Into<String>) {
        let mut guard = self.key.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(key.into());
    }

    pub fn get(&self) -> Option<String> {
        self.key.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_set(&self) -> bool {
        self.key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}
