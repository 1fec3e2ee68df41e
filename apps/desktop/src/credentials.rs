use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use client_core::CredentialStore;

type Entries = HashMap<String, HashMap<String, String>>;

/// Tokens kept as `{service: {key: token}}` JSON on disk.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<config dir>/max_sync/credentials.json` for the current user.
    pub fn default_path() -> Result<PathBuf> {
        let base =
            dirs::config_dir().ok_or_else(|| anyhow!("unable to resolve user config dir"))?;
        Ok(base.join("max_sync").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Entries> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("parse credentials {}", self.path.display())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Entries::new()),
            Err(err) => {
                Err(err).with_context(|| format!("read credentials {}", self.path.display()))
            }
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, service: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_entries()?
            .get(service)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn set(&self, service: &str, key: &str, token: &str) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("credential store lock poisoned"))?;
        let mut entries = self.read_entries()?;
        entries
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), token.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(&entries)?)
            .with_context(|| format!("write credentials {}", self.path.display()))
    }
}
