use std::sync::RwLock;

use tracing::debug;

use crate::models::AccessCredential;

/// Holds the current access credential for every request flow.
///
/// Writes replace the value wholesale; concurrent writers resolve as last
/// write wins, which is fine because any two successful refreshes yield
/// valid credentials for the same principal.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: RwLock<Option<AccessCredential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: impl Into<AccessCredential>) -> Self {
        Self {
            current: RwLock::new(Some(credential.into())),
        }
    }

    pub fn get(&self) -> Option<AccessCredential> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set(&self, credential: impl Into<AccessCredential>) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credential.into());
        debug!(event_name = "credentials.set", event_domain = "auth", "access credential replaced");
    }

    pub fn clear(&self) {
        let previous = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if previous.is_some() {
            debug!(event_name = "credentials.cleared", event_domain = "auth", "access credential cleared");
        }
    }

    /// Clears only while the store still holds `expected`. A newer value
    /// written by another flow is left alone. Returns whether it cleared.
    pub fn clear_if(&self, expected: &AccessCredential) -> bool {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.as_ref() != Some(expected) {
            return false;
        }
        *current = None;
        debug!(event_name = "credentials.cleared", event_domain = "auth", "rejected access credential cleared");
        true
    }

    pub fn is_present(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}
