//! Typed view of the tunable configuration keys.
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `MAX_RETRIES` | retries after the first attempt | 3 |
//! | `RETRY_BASE_DELAY` | seconds, may be fractional | 2 |
//! | `TIMEOUT` | per-attempt timeout in seconds | 300 |
//! | `MAX_OUTPUT_SIZE` | bytes, `KB`/`MB`/`GB` suffix allowed | 1 MiB |
//! | `RATE_LIMIT_DEFAULT` | calls per second for unlisted services | 50 |
//! | `RATE_LIMIT_<SERVICE>` | calls per second for one service | see [`RateLimits`] |
//!
//! A value that does not parse is logged and replaced by its default.

use super::MergedConfig;
use crate::rate_limit::RateLimits;
use crate::retry::RetryPolicy;
use crate::types::{DEFAULT_MAX_OUTPUT_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT, ExecutionRequest};
use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Prefix of per-service rate limit keys.
const RATE_LIMIT_PREFIX: &str = "RATE_LIMIT_";

/// Slowest accepted rate, one call every 1000 seconds.
const MIN_RATE: f64 = 0.001;

/// Execution limits read from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    /// Default retry budget for requests
    pub max_retries: u32,
    /// Backoff policy
    pub retry: RetryPolicy,
    /// Default per-attempt timeout
    pub timeout: Duration,
    /// Default stdout capture limit
    pub max_output_size: usize,
    /// Per-service rates
    pub rate_limits: RateLimits,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            rate_limits: RateLimits::default(),
        }
    }
}

impl Tunables {
    /// Read tunables from merged configuration.
    pub fn from_config(config: &MergedConfig) -> Self {
        let mut tunables = Self::default();

        if let Some(n) = read(config, "MAX_RETRIES", |v| v.parse::<u32>().ok()) {
            tunables.max_retries = n;
        }
        if let Some(d) = read(config, "RETRY_BASE_DELAY", parse_seconds) {
            tunables.retry.base_delay = d;
        }
        if let Some(d) = read(config, "TIMEOUT", parse_seconds) {
            tunables.timeout = d;
        }
        if let Some(size) = read(config, "MAX_OUTPUT_SIZE", |v| parse_size(v).ok()) {
            tunables.max_output_size = usize::try_from(size).unwrap_or(usize::MAX);
        }

        for (key, _) in config.iter() {
            let Some(service) = key.strip_prefix(RATE_LIMIT_PREFIX) else {
                continue;
            };
            let Some(rate) = read(config, key, parse_rate) else {
                continue;
            };
            if service == "DEFAULT" {
                tunables.rate_limits.default_rate = rate;
            } else {
                tunables.rate_limits.set(&service.to_ascii_lowercase(), rate);
            }
        }

        tunables
    }

    /// Build a request using the configured defaults.
    pub fn request<I, S>(&self, service: impl Into<String>, argv: I) -> ExecutionRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExecutionRequest::new(service, argv)
            .with_timeout(self.timeout)
            .with_max_retries(self.max_retries)
            .with_max_output_size(self.max_output_size)
    }
}

fn read<T>(config: &MergedConfig, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = config.get(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        log::warn!("Ignoring invalid value for {key}: '{raw}'");
    }
    parsed
}

fn parse_seconds(value: &str) -> Option<Duration> {
    let secs: f64 = value.parse().ok()?;
    // Negative, NaN and out-of-range values are all rejected here.
    Duration::try_from_secs_f64(secs).ok()
}

fn parse_rate(value: &str) -> Option<f64> {
    let rate: f64 = value.parse().ok()?;
    (rate.is_finite() && rate >= MIN_RATE).then_some(rate)
}

/// Parse human-readable size string (e.g., "100MB", "1GB", "500")
///
/// Supports suffixes: B, KB, MB, GB (case-insensitive)
pub fn parse_size(size_str: &str) -> Result<u64, String> {
    let size_str = size_str.trim().to_uppercase();

    if size_str.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if let Some(num) = size_str.strip_suffix("GB") {
        (num, GB)
    } else if let Some(num) = size_str.strip_suffix("MB") {
        (num, MB)
    } else if let Some(num) = size_str.strip_suffix("KB") {
        (num, KB)
    } else if let Some(num) = size_str.strip_suffix('B') {
        (num, 1u64)
    } else {
        (size_str.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number in size: '{}'", num_str.trim()))?;

    if num < 0.0 || !num.is_finite() {
        return Err(format!("Size must be a positive number: {num}"));
    }

    Ok((num * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigLayer, Profile, ProfileSource};

    fn config(entries: &[(&str, &str)]) -> MergedConfig {
        Profile::new(
            "default",
            ProfileSource::Fallback,
            vec![ConfigLayer::new("default", entries.iter().copied())],
        )
        .merged(None, None)
    }

    #[test]
    fn test_defaults() {
        let tunables = Tunables::from_config(&MergedConfig::default());
        assert_eq!(tunables.max_retries, 3);
        assert_eq!(tunables.retry.base_delay, Duration::from_secs(2));
        assert_eq!(tunables.timeout, Duration::from_secs(300));
        assert_eq!(tunables.max_output_size, 1024 * 1024);
        assert!((tunables.rate_limits.rate_for("ec2") - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overrides() {
        let tunables = Tunables::from_config(&config(&[
            ("MAX_RETRIES", "5"),
            ("RETRY_BASE_DELAY", "0.5"),
            ("TIMEOUT", "30"),
            ("MAX_OUTPUT_SIZE", "2MB"),
            ("RATE_LIMIT_EC2", "5"),
            ("RATE_LIMIT_DEFAULT", "7"),
        ]));
        assert_eq!(tunables.max_retries, 5);
        assert_eq!(tunables.retry.base_delay, Duration::from_millis(500));
        assert_eq!(tunables.timeout, Duration::from_secs(30));
        assert_eq!(tunables.max_output_size, 2 * 1024 * 1024);
        assert!((tunables.rate_limits.rate_for("ec2") - 5.0).abs() < f64::EPSILON);
        assert!((tunables.rate_limits.rate_for("lambda") - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let tunables = Tunables::from_config(&config(&[
            ("MAX_RETRIES", "many"),
            ("TIMEOUT", "-1"),
            ("RATE_LIMIT_S3", "0"),
        ]));
        assert_eq!(tunables.max_retries, 3);
        assert_eq!(tunables.timeout, Duration::from_secs(300));
        assert!((tunables.rate_limits.rate_for("s3") - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let tunables = Tunables::from_config(&config(&[
            ("TIMEOUT", "1e20"),
            ("RETRY_BASE_DELAY", "1e20"),
            ("RATE_LIMIT_EC2", "1e-300"),
            ("RATE_LIMIT_DEFAULT", "inf"),
        ]));
        assert_eq!(tunables.timeout, Duration::from_secs(300));
        assert_eq!(tunables.retry.base_delay, Duration::from_secs(2));
        assert!((tunables.rate_limits.rate_for("ec2") - 20.0).abs() < f64::EPSILON);
        assert!((tunables.rate_limits.rate_for("lambda") - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("0"), Some(Duration::ZERO));
        assert_eq!(parse_seconds("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_seconds("NaN"), None);
        assert_eq!(parse_seconds("-0.1"), None);
        assert_eq!(parse_rate("0.001"), Some(0.001));
        assert_eq!(parse_rate("0.0001"), None);
    }

    #[test]
    fn test_request_uses_tunables() {
        let tunables = Tunables {
            max_retries: 1,
            timeout: Duration::from_secs(9),
            max_output_size: 10,
            ..Tunables::default()
        };
        let request = tunables.request("sts", ["aws", "sts", "get-caller-identity"]);
        assert_eq!(request.max_retries, 1);
        assert_eq!(request.timeout, Duration::from_secs(9));
        assert_eq!(request.max_output_size, 10);
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("500").unwrap(), 500);
        assert_eq!(parse_size("1kb").unwrap(), 1024);
        assert_eq!(parse_size("1.5MB").unwrap(), 1024 * 1024 * 3 / 2);
        assert_eq!(parse_size("1GB").unwrap(), GB);
        assert!(parse_size("").is_err());
        assert!(parse_size("lots").is_err());
    }
}
