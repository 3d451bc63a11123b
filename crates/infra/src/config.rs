//! Runtime configuration.
//!
//! Read from the process environment after an optional `.env` file has been
//! loaded. Every variable has a default, so an empty environment is valid.

use std::env;

use chrono::{FixedOffset, Offset, Utc};
use thiserror::Error;

use tesouro_observability::LogFormat;

pub const APPEND_RETRIES_VAR: &str = "TESOURO_APPEND_RETRIES";
pub const UTC_OFFSET_VAR: &str = "TESOURO_UTC_OFFSET_MINUTES";
pub const LOG_FORMAT_VAR: &str = "TESOURO_LOG_FORMAT";
pub const ALERT_WINDOW_VAR: &str = "TESOURO_ALERT_WINDOW_DAYS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Extra attempts after an optimistic-concurrency conflict.
    pub append_retries: u32,
    /// Offset, in minutes east of UTC, that decides the local calendar date.
    pub utc_offset_minutes: i32,
    pub log_format: LogFormat,
    /// How many days ahead an open obligation counts as due soon.
    pub alert_window_days: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            append_retries: 3,
            utc_offset_minutes: 0,
            log_format: LogFormat::Json,
            alert_window_days: 3,
        }
    }
}

impl LedgerConfig {
    /// Load `.env` (if present) and then read the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(APPEND_RETRIES_VAR) {
            config.append_retries = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                var: APPEND_RETRIES_VAR,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
        }

        if let Some(raw) = lookup(UTC_OFFSET_VAR) {
            let minutes: i32 = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                var: UTC_OFFSET_VAR,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
            if offset_from_minutes(minutes).is_none() {
                return Err(ConfigError::Invalid {
                    var: UTC_OFFSET_VAR,
                    value: raw,
                    reason: "offset must be within ±24h".to_string(),
                });
            }
            config.utc_offset_minutes = minutes;
        }

        if let Some(raw) = lookup(LOG_FORMAT_VAR) {
            config.log_format = raw.parse().map_err(|e| ConfigError::Invalid {
                var: LOG_FORMAT_VAR,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
        }

        if let Some(raw) = lookup(ALERT_WINDOW_VAR) {
            config.alert_window_days = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                var: ALERT_WINDOW_VAR,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
        }

        Ok(config)
    }

    pub fn utc_offset(&self) -> FixedOffset {
        offset_from_minutes(self.utc_offset_minutes).unwrap_or_else(|| Utc.fix())
    }
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes.checked_mul(60).and_then(FixedOffset::east_opt)
}
