use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use joyip_client::ApiTimeouts;
use joyip_core::generation::GenerationMode;

/// A configuration variable held a value that could not be parsed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{var} has invalid value {value:?}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a backend on the local machine.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (default: `http://localhost:28888`).
    pub api_url: String,
    /// Directory holding the persisted chat state (default: `.joyip`).
    pub state_dir: PathBuf,
    /// Interval between job status checks (default: 2500 ms).
    pub poll_interval: Duration,
    pub timeouts: ApiTimeouts,
    /// Generation mode for new requests (default: `3D`).
    pub mode: GenerationMode,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                  |
    /// |------------------------------|--------------------------|
    /// | `JOYIP_API_URL`              | `http://localhost:28888` |
    /// | `JOYIP_STATE_DIR`            | `.joyip`                 |
    /// | `JOYIP_POLL_INTERVAL_MS`     | `2500`                   |
    /// | `JOYIP_ANALYZE_TIMEOUT_SECS` | `180`                    |
    /// | `JOYIP_START_TIMEOUT_SECS`   | `60`                     |
    /// | `JOYIP_STATUS_TIMEOUT_SECS`  | `60`                     |
    /// | `JOYIP_EDIT_TIMEOUT_SECS`    | `120`                    |
    /// | `JOYIP_MODE`                 | `3D`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ApiTimeouts::default();

        let api_url = lookup("JOYIP_API_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "http://localhost:28888".into());

        let state_dir = lookup("JOYIP_STATE_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".joyip"));

        let poll_ms: u64 = parse_var(&lookup, "JOYIP_POLL_INTERVAL_MS", 2500)?;
        if poll_ms == 0 {
            return Err(ConfigError {
                var: "JOYIP_POLL_INTERVAL_MS",
                value: "0".into(),
                reason: "must be positive".into(),
            });
        }

        let timeouts = ApiTimeouts {
            analyze: secs(&lookup, "JOYIP_ANALYZE_TIMEOUT_SECS", defaults.analyze)?,
            start: secs(&lookup, "JOYIP_START_TIMEOUT_SECS", defaults.start)?,
            status: secs(&lookup, "JOYIP_STATUS_TIMEOUT_SECS", defaults.status)?,
            edit: secs(&lookup, "JOYIP_EDIT_TIMEOUT_SECS", defaults.edit)?,
            default: defaults.default,
        };

        let mode = parse_var(&lookup, "JOYIP_MODE", GenerationMode::ThreeD)?;

        Ok(Self {
            api_url,
            state_dir,
            poll_interval: Duration::from_millis(poll_ms),
            timeouts,
            mode,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|e: T::Err| ConfigError {
                var,
                value: value.clone(),
                reason: e.to_string(),
            })
        }
        _ => Ok(default),
    }
}

fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_var(lookup, var, default.as_secs()).map(Duration::from_secs)
}
