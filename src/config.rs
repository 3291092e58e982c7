// ⚙️ Configuration - environment variables, optional `.env` file

use crate::history::{DEFAULT_HISTORY_LIMIT, FORMER_MEMBER_LABEL};
use crate::retry::RetryPolicy;
use chrono::{FixedOffset, Offset, Utc};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Mexico City standard time
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = -6 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    /// Defines the local calendar: days, months and "today"
    pub utc_offset: FixedOffset,
    pub history_limit: usize,
    pub former_member_label: String,
    /// Used when enrollment omits a due
    pub default_due: Decimal,
    pub bind_addr: String,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("dojo.db"),
            utc_offset: offset_from_minutes(DEFAULT_UTC_OFFSET_MINUTES)
                .unwrap_or_else(|| Utc.fix()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            former_member_label: FORMER_MEMBER_LABEL.to_string(),
            default_due: Decimal::from(600),
            bind_addr: "0.0.0.0:3000".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
}

impl Config {
    /// Load `.env` if present, then read `DUES_*` variables over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(path) = lookup("DUES_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup("DUES_UTC_OFFSET_MINUTES") {
            let minutes: i32 = parse("DUES_UTC_OFFSET_MINUTES", &raw)?;
            config.utc_offset = offset_from_minutes(minutes).ok_or_else(|| ConfigError::Invalid {
                var: "DUES_UTC_OFFSET_MINUTES",
                value: raw.clone(),
                reason: "offset must be within ±24h".to_string(),
            })?;
        }

        if let Some(raw) = lookup("DUES_HISTORY_LIMIT") {
            config.history_limit = parse("DUES_HISTORY_LIMIT", &raw)?;
        }

        if let Some(label) = lookup("DUES_FORMER_MEMBER_LABEL") {
            config.former_member_label = label;
        }

        if let Some(raw) = lookup("DUES_DEFAULT_DUE") {
            let due: Decimal = parse("DUES_DEFAULT_DUE", &raw)?;
            if due < Decimal::ZERO {
                return Err(ConfigError::Invalid {
                    var: "DUES_DEFAULT_DUE",
                    value: raw,
                    reason: "must not be negative".to_string(),
                });
            }
            config.default_due = due;
        }

        if let Some(addr) = lookup("DUES_BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Some(raw) = lookup("DUES_RETRY_ATTEMPTS") {
            config.retry = RetryPolicy::with_max_attempts(parse("DUES_RETRY_ATTEMPTS", &raw)?);
        }

        Ok(config)
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
