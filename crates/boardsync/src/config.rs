//! Server configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) is a
//! valid starting point. Environment variables override the file:
//!
//! | Variable           | Overrides          |
//! |--------------------|--------------------|
//! | `BOARDSYNC_CONFIG` | path of the TOML file |
//! | `BOARDSYNC_BIND`   | `bind_addr`        |
//! | `JWT_SECRET`       | `tokens.secret`    |
//! | `REDIS_URL`        | `redis_url`        |

use std::path::PathBuf;
use std::time::Duration;

use boardsync_room::HubConfig;
use boardsync_session::TokenConfig;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

pub const CONFIG_ENV: &str = "BOARDSYNC_CONFIG";
pub const BIND_ENV: &str = "BOARDSYNC_BIND";
pub const SECRET_ENV: &str = "JWT_SECRET";
pub const REDIS_ENV: &str = "REDIS_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tokens: TokenConfig,
    pub hub: HubConfig,
    /// Seconds between pings. A connection silent for a whole interval
    /// is closed. `0` disables the heartbeat.
    pub heartbeat_interval_secs: u64,
    /// Seconds a new TCP peer gets to finish the WebSocket upgrade.
    pub handshake_timeout_secs: u64,
    /// Shared store for session records. In-memory when unset.
    pub redis_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tokens: TokenConfig::default(),
            hub: HubConfig::default(),
            heartbeat_interval_secs: 30,
            handshake_timeout_secs: 10,
            redis_url: None,
        }
    }
}

impl ServerConfig {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    /// Fails if the config file cannot be read or parsed, or if no token
    /// secret ends up configured.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) but reads variables through `env`.
    pub fn load_with<F>(env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match env(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(env);
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies the environment overrides listed in the module docs.
    pub fn apply_overrides<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = env(BIND_ENV) {
            self.bind_addr = bind;
        }
        if let Some(secret) = env(SECRET_ENV) {
            self.tokens.secret = secret;
        }
        if let Some(url) = env(REDIS_ENV).filter(|url| !url.is_empty()) {
            self.redis_url = Some(url);
        }
    }

    /// Rejects settings the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        Ok(())
    }

    /// The ping period, or `None` when the heartbeat is disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs.max(1))
    }
}
