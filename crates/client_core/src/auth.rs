use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::{backend::MessagingBackend, error::SyncError};

/// Persistent home of the authentication token; the only state that outlives a session.
pub trait CredentialStore: Send + Sync {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>>;
    fn set(&self, service: &str, key: &str, token: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<(String, String), String>>,
}

impl MemoryCredentialStore {
    pub fn with_token(service: &str, key: &str, token: &str) -> Self {
        let store = Self::default();
        if let Ok(mut entries) = store.entries.lock() {
            entries.insert((service.to_string(), key.to_string()), token.to_string());
        }
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        Ok(entries
            .get(&(service.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, service: &str, key: &str, token: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        entries.insert((service.to_string(), key.to_string()), token.to_string());
        Ok(())
    }
}

/// Token restore and phone verification against the backend.
pub struct Authenticator {
    backend: Arc<dyn MessagingBackend>,
    credentials: Arc<dyn CredentialStore>,
    service: String,
    key: String,
    authenticated: AtomicBool,
}

impl Authenticator {
    pub fn new(
        backend: Arc<dyn MessagingBackend>,
        credentials: Arc<dyn CredentialStore>,
        service: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            credentials,
            service: service.into(),
            key: key.into(),
            authenticated: AtomicBool::new(false),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Authenticates with a previously stored token, if any.
    pub async fn restore(&self) -> Result<bool, SyncError> {
        let token = self
            .credentials
            .get(&self.service, &self.key)
            .context("read stored token")?;
        let Some(token) = token else {
            info!("auth: no stored token");
            return Ok(false);
        };

        self.backend
            .authenticate(&token)
            .await
            .context("authenticate with stored token")?;
        self.authenticated.store(true, Ordering::Release);
        info!("auth: stored token accepted");
        Ok(true)
    }

    pub async fn start_verification(&self, phone: &str) -> Result<(), SyncError> {
        info!("auth: requesting verification code");
        self.backend
            .start_verification(phone)
            .await
            .context("request verification code")?;
        Ok(())
    }

    /// Exchanges `code` for a token, authenticates with it, then persists it. Nothing is
    /// persisted unless the backend accepted both steps.
    pub async fn confirm_verification(&self, code: &str) -> Result<(), SyncError> {
        let token = self
            .backend
            .confirm_verification(code)
            .await
            .context("confirm verification code")?
            .ok_or_else(|| SyncError::Auth("verification code rejected".into()))?;

        self.backend
            .authenticate(&token)
            .await
            .map_err(|err| SyncError::Auth(format!("issued token rejected: {err:#}")))?;
        self.authenticated.store(true, Ordering::Release);

        if let Err(err) = self.credentials.set(&self.service, &self.key, &token) {
            warn!("auth: authenticated but token could not be saved: {err:#}");
        }
        info!("auth: verification succeeded");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
