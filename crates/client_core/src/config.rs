use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;
const MAX_HISTORY_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub history_page_size: u32,
    pub event_queue_capacity: usize,
    pub credential_service: String,
    pub credential_key: String,
    pub download_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            event_queue_capacity: 1024,
            credential_service: "maxApp".into(),
            credential_key: "token".into(),
            download_timeout_secs: 30,
        }
    }
}

impl SessionConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
struct SessionConfigFile {
    history_page_size: Option<u32>,
    event_queue_capacity: Option<usize>,
    credential_service: Option<String>,
    credential_key: Option<String>,
    download_timeout_secs: Option<u64>,
}

/// Defaults, then `path` (TOML) if readable, then `APP__*` environment overrides.
pub fn load_settings(path: Option<&Path>) -> SessionConfig {
    load_settings_with(path, |key| std::env::var(key).ok())
}

pub(crate) fn load_settings_with(
    path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> SessionConfig {
    let mut settings = SessionConfig::default();

    if let Some(path) = path {
        match fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<SessionConfigFile>(&raw) {
                Ok(file_cfg) => apply_file(&mut settings, file_cfg),
                Err(err) => warn!(path = %path.display(), "config: ignoring malformed file: {err}"),
            },
            Err(err) => warn!(path = %path.display(), "config: file unreadable: {err}"),
        }
    }

    if let Some(v) = env("APP__HISTORY_PAGE_SIZE").and_then(|v| v.parse().ok()) {
        settings.history_page_size = v;
    }
    if let Some(v) = env("APP__EVENT_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
        settings.event_queue_capacity = v;
    }
    if let Some(v) = env("APP__CREDENTIAL_SERVICE") {
        settings.credential_service = v;
    }
    if let Some(v) = env("APP__CREDENTIAL_KEY") {
        settings.credential_key = v;
    }
    if let Some(v) = env("APP__DOWNLOAD_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.download_timeout_secs = v;
    }

    settings.history_page_size = settings.history_page_size.clamp(1, MAX_HISTORY_PAGE_SIZE);
    settings.event_queue_capacity = settings.event_queue_capacity.max(1);
    settings
}

fn apply_file(settings: &mut SessionConfig, file_cfg: SessionConfigFile) {
    if let Some(v) = file_cfg.history_page_size {
        settings.history_page_size = v;
    }
    if let Some(v) = file_cfg.event_queue_capacity {
        settings.event_queue_capacity = v;
    }
    if let Some(v) = file_cfg.credential_service {
        settings.credential_service = v;
    }
    if let Some(v) = file_cfg.credential_key {
        settings.credential_key = v;
    }
    if let Some(v) = file_cfg.download_timeout_secs {
        settings.download_timeout_secs = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
