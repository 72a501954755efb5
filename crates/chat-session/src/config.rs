use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ChatSessionError;

const ENV_BASE_URL: &str = "CONSOLE_CHAT_BASE_URL";
const ENV_TOKEN: &str = "CONSOLE_CHAT_TOKEN";
const ENV_IDLE_TIMEOUT: &str = "CONSOLE_CHAT_IDLE_TIMEOUT";

/// Connection and session settings for the chat client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the backend API, e.g. "https://console.example.com/api".
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer token attached to every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Seconds without any bytes on an open stream before it is abandoned.
    /// Zero disables the timeout.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// TCP/TLS connect timeout for every request.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Append one JSON line per finished stream to this file.
    #[serde(default)]
    pub stream_log_path: Option<PathBuf>,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    15
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            stream_log_path: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration.
    ///
    /// Reads `path` if given, otherwise `<config_dir>/console-chat/config.toml`
    /// when it exists, otherwise starts from defaults. A `.env` file in the
    /// working directory is loaded, then `CONSOLE_CHAT_*` variables override
    /// file values.
    pub fn load(path: Option<&Path>) -> Result<Self, ChatSessionError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(p) => Self::from_file(&p)?,
                None => Self::default(),
            },
        };

        let _ = dotenvy::dotenv();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ChatSessionError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ChatSessionError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ChatSessionError> {
        toml::from_str(raw).map_err(|e| ChatSessionError::Config(format!("invalid config: {}", e)))
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("console-chat").join("config.toml"))
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ChatSessionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.token = Some(token);
        }
        if let Some(secs) = lookup(ENV_IDLE_TIMEOUT) {
            self.idle_timeout_secs = secs.trim().parse().map_err(|_| {
                ChatSessionError::Config(format!("{} must be a number of seconds", ENV_IDLE_TIMEOUT))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ChatSessionError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ChatSessionError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ChatSessionError::Config(
                "connect_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
