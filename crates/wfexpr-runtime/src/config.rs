//! Runtime configuration.
//!
//! Reads configuration from environment variables:
//! - `WFEXPR_INVOCATION_CACHE_CAPACITY`: thunk cache capacity (default: 512, 0 disables storage)
//! - `WFEXPR_USE_INVOCATION_CACHE`: `false` routes every accessor call through the slow path (default: true)
//! - `WFEXPR_CHECKED_ARITHMETIC`: treat every arithmetic operator as checked (default: false)

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_CACHE_CAPACITY: &str = "WFEXPR_INVOCATION_CACHE_CAPACITY";
pub const ENV_USE_CACHE: &str = "WFEXPR_USE_INVOCATION_CACHE";
pub const ENV_CHECKED_ARITHMETIC: &str = "WFEXPR_CHECKED_ARITHMETIC";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub invocation_cache_capacity: usize,
    pub use_invocation_cache: bool,
    pub checked_arithmetic_default: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            invocation_cache_capacity: 512,
            use_invocation_cache: true,
            checked_arithmetic_default: false,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by whichever `WFEXPR_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = RuntimeConfig::default();
        if let Some(raw) = lookup(ENV_CACHE_CAPACITY) {
            config.invocation_cache_capacity =
                raw.trim().parse().map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                    key: ENV_CACHE_CAPACITY.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
        }
        if let Some(raw) = lookup(ENV_USE_CACHE) {
            config.use_invocation_cache = parse_flag(ENV_USE_CACHE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CHECKED_ARITHMETIC) {
            config.checked_arithmetic_default = parse_flag(ENV_CHECKED_ARITHMETIC, &raw)?;
        }
        Ok(config)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
