//! Runtime configuration from `MAQUILA_*` environment variables.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use maquila_observability::LogFormat;

pub const ENV_LOG: &str = "MAQUILA_LOG";
pub const ENV_LOG_FORMAT: &str = "MAQUILA_LOG_FORMAT";
pub const ENV_ORDER_PREFIX: &str = "MAQUILA_ORDER_PREFIX";
pub const ENV_NOTIFICATIONS: &str = "MAQUILA_NOTIFICATIONS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaquilaConfig {
    /// `EnvFilter` directive.
    pub log_filter: String,
    pub log_format: LogFormat,
    /// First segment of every order number.
    pub order_prefix: String,
    pub notifications_enabled: bool,
}

impl Default for MaquilaConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Json,
            order_prefix: "MAQ".to_string(),
            notifications_enabled: true,
        }
    }
}

impl MaquilaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(filter) = get(ENV_LOG) {
            if let Err(e) = EnvFilter::try_new(&filter) {
                return Err(ConfigError::Invalid {
                    var: ENV_LOG,
                    value: filter,
                    reason: e.to_string(),
                });
            }
            config.log_filter = filter;
        }

        if let Some(format) = get(ENV_LOG_FORMAT) {
            config.log_format = format.parse().map_err(|e: maquila_observability::UnknownLogFormat| {
                ConfigError::Invalid {
                    var: ENV_LOG_FORMAT,
                    value: format.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(prefix) = get(ENV_ORDER_PREFIX) {
            if !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ConfigError::Invalid {
                    var: ENV_ORDER_PREFIX,
                    value: prefix,
                    reason: "only ASCII letters and digits are allowed".to_string(),
                });
            }
            config.order_prefix = prefix.to_ascii_uppercase();
        }

        if let Some(flag) = get(ENV_NOTIFICATIONS) {
            config.notifications_enabled = match flag.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: ENV_NOTIFICATIONS,
                        value: flag,
                        reason: "expected true or false".to_string(),
                    });
                }
            };
        }

        Ok(config)
    }
}
