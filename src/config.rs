use crate::reconcile::ExpiryStrategy;
use regex::Regex;
use reqwest::Url;
use std::{net::IpAddr, path::PathBuf, sync::LazyLock, time::Duration};
use thiserror::Error;

pub const DEFAULT_CLUSTER_NAME: &str = "local-cluster";
pub const DEFAULT_REPORT_ENDPOINT: &str = "http://localhost:8080/report";
pub const DEFAULT_REPORT_INTERVAL: &str = "30s";
pub const DEFAULT_REPORT_TIMEOUT: &str = "10s";

static DURATION_FORMAT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(?:\d+(?:ms|s|m|h|d))+$").ok());
static DURATION_PART: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?P<number>\d+)(?P<unit>ms|s|m|h|d)").ok());

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field} '{value}': expected <number><unit>[...] with units ms, s, m, h, d (e.g. '30s', '1m30s')")]
    InvalidDuration { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
    #[error("invalid report endpoint '{value}': {reason}")]
    InvalidEndpoint { value: String, reason: String },
    #[error("cluster name cannot be empty")]
    EmptyClusterName,
}

/// Where the metrics surface listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub listen: Option<IpAddr>,
    pub port: u16,
}

/// Source of the JSON-lines change event feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventInput {
    Stdin,
    File(PathBuf),
}

impl EventInput {
    #[must_use]
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(arg))
        }
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub cluster_name: String,
    pub report_endpoint: Url,
    pub report_interval: Duration,
    pub report_timeout: Duration,
    pub expiry_strategy: ExpiryStrategy,
    pub metrics: MetricsConfig,
    pub events: Option<EventInput>,
}

/// Parse a duration such as `30s`, `1m`, `1m30s` or `500ms`
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] for anything else and
/// [`ConfigError::ZeroDuration`] when the total is zero.
pub fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    };

    let trimmed = value.trim().to_lowercase();
    let (Some(format), Some(part)) = (DURATION_FORMAT.as_ref(), DURATION_PART.as_ref()) else {
        return Err(invalid());
    };
    if !format.is_match(&trimmed) {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    for captures in part.captures_iter(&trimmed) {
        let number: u64 = captures
            .name("number")
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(invalid)?;
        let unit = captures.name("unit").map(|m| m.as_str()).ok_or_else(invalid)?;

        let amount = match unit {
            "ms" => Duration::from_millis(number),
            "s" => Duration::from_secs(number),
            "m" => Duration::from_secs(number.checked_mul(60).ok_or_else(invalid)?),
            "h" => Duration::from_secs(number.checked_mul(3600).ok_or_else(invalid)?),
            "d" => Duration::from_secs(number.checked_mul(86_400).ok_or_else(invalid)?),
            _ => return Err(invalid()),
        };
        total = total.checked_add(amount).ok_or_else(invalid)?;
    }

    if total.is_zero() {
        return Err(ConfigError::ZeroDuration { field });
    }

    Ok(total)
}

/// Parse the collector URL, only absolute `http`/`https` URLs are accepted
///
/// # Errors
///
/// Returns [`ConfigError::InvalidEndpoint`] if the URL cannot be used
pub fn parse_endpoint(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim()).map_err(|e| ConfigError::InvalidEndpoint {
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEndpoint {
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidEndpoint {
            value: value.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

/// Reject blank cluster names
///
/// # Errors
///
/// Returns [`ConfigError::EmptyClusterName`] if `value` is blank
pub fn parse_cluster_name(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyClusterName);
    }
    Ok(trimmed.to_string())
}
