//! Client configuration loading: backend location, request timeout and sync behaviour.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::{info, warn};

use crate::sync::SyncOptions;

/// Default location on disk where the client looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/quiz-admin.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_ADMIN_CONFIG_PATH";
/// Environment variable that overrides the configured backend URL.
const BASE_URL_ENV: &str = "QUIZ_ADMIN_BASE_URL";
/// Backend address used when nothing else is configured.
const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Immutable runtime configuration of the admin client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Root URL of the quiz backend.
    pub base_url: String,
    /// Per-request timeout handed to the gateway.
    pub timeout: Duration,
    /// Engine behaviour switches.
    pub sync: SyncOptions,
}

impl ClientConfig {
    /// Load the configuration from disk and the environment, falling back to defaults.
    pub fn load() -> Self {
        let mut config = Self::read(&resolve_config_path());
        if let Some(base_url) = env::var(BASE_URL_ENV).ok().filter(|url| !url.is_empty()) {
            info!(%base_url, "backend URL overridden from environment");
            config.base_url = base_url;
        }
        config
    }

    /// Read the configuration file at `path`, falling back to defaults when it is
    /// missing or unreadable.
    pub fn read(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        base_url = %config.base_url,
                        "loaded client config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    base_url: String,
    timeout_secs: u64,
    optimistic_creates: bool,
    refresh_after_mutation: bool,
    discard_stale_responses: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        let sync = SyncOptions::default();
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            optimistic_creates: sync.optimistic_creates,
            refresh_after_mutation: sync.refresh_after_mutation,
            discard_stale_responses: sync.discard_stale_responses,
        }
    }
}

impl From<RawConfig> for ClientConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            base_url: value.base_url,
            timeout: Duration::from_secs(value.timeout_secs),
            sync: SyncOptions {
                optimistic_creates: value.optimistic_creates,
                refresh_after_mutation: value.refresh_after_mutation,
                discard_stale_responses: value.discard_stale_responses,
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(contents: &str) -> PathBuf {
        let path = env::temp_dir().join(format!("quiz-admin-{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = ClientConfig::read(Path::new("/nonexistent/quiz-admin.json"));
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.sync, SyncOptions::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let path = scratch_file(r#"{ "optimistic_creates": true, "timeout_secs": 3 }"#);
        let config = ClientConfig::read(&path);
        fs::remove_file(&path).unwrap();

        assert!(config.sync.optimistic_creates);
        assert!(config.sync.refresh_after_mutation);
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let path = scratch_file("{ not json");
        let config = ClientConfig::read(&path);
        fs::remove_file(&path).unwrap();

        assert_eq!(config, ClientConfig::default());
    }
}
