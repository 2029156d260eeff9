//! Failure classification and exponential backoff.
//!
//! A failed attempt is classified against fixed tables, consulted in order:
//!
//! 1. interrupt signals (SIGINT, exit code 130)
//! 2. the AWS error code from `An error occurred (CODE) when calling ...`
//! 3. fatal text patterns
//! 4. retryable text patterns
//!
//! Anything that matches nothing is fatal. The tables are a seed that tracks
//! AWS CLI v2 error output; bump [`CLASSIFIER_VERSION`] when they change.

use crate::error::FatalKind;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Version of the classification tables.
pub const CLASSIFIER_VERSION: u32 = 1;

/// Exit code of a process terminated by SIGINT under a shell convention.
const INTERRUPT_EXIT_CODE: i32 = 130;

/// SIGINT.
const SIGINT: i32 = 2;

/// Why a failed attempt is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// The service throttled the call
    Throttling,
    /// Connection-level failure
    Network,
    /// The service reported an internal or availability error
    ServiceUnavailable,
    /// The attempt hit the per-attempt timeout
    Timeout,
}

impl RetryReason {
    /// Get a user-friendly description.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Throttling => "throttled",
            Self::Network => "network error",
            Self::ServiceUnavailable => "service unavailable",
            Self::Timeout => "timed out",
        }
    }
}

/// Result of classifying a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Transient; the loop may try again
    Retryable(RetryReason),
    /// Stop immediately
    Fatal(FatalKind),
}

/// AWS error codes and their classification.
const CODE_TABLE: &[(&str, Classification)] = &[
    ("Throttling", Classification::Retryable(RetryReason::Throttling)),
    ("ThrottlingException", Classification::Retryable(RetryReason::Throttling)),
    ("ThrottledException", Classification::Retryable(RetryReason::Throttling)),
    ("RequestThrottled", Classification::Retryable(RetryReason::Throttling)),
    ("RequestThrottledException", Classification::Retryable(RetryReason::Throttling)),
    ("TooManyRequestsException", Classification::Retryable(RetryReason::Throttling)),
    ("ProvisionedThroughputExceededException", Classification::Retryable(RetryReason::Throttling)),
    ("TransactionInProgressException", Classification::Retryable(RetryReason::Throttling)),
    ("RequestLimitExceeded", Classification::Retryable(RetryReason::Throttling)),
    ("BandwidthLimitExceeded", Classification::Retryable(RetryReason::Throttling)),
    ("LimitExceededException", Classification::Retryable(RetryReason::Throttling)),
    ("SlowDown", Classification::Retryable(RetryReason::Throttling)),
    ("PriorRequestNotComplete", Classification::Retryable(RetryReason::Throttling)),
    ("EC2ThrottledException", Classification::Retryable(RetryReason::Throttling)),
    ("RequestTimeout", Classification::Retryable(RetryReason::Network)),
    ("RequestTimeoutException", Classification::Retryable(RetryReason::Network)),
    ("InternalError", Classification::Retryable(RetryReason::ServiceUnavailable)),
    ("InternalFailure", Classification::Retryable(RetryReason::ServiceUnavailable)),
    ("InternalServerError", Classification::Retryable(RetryReason::ServiceUnavailable)),
    ("InternalServiceError", Classification::Retryable(RetryReason::ServiceUnavailable)),
    ("ServiceUnavailable", Classification::Retryable(RetryReason::ServiceUnavailable)),
    ("ServiceUnavailableException", Classification::Retryable(RetryReason::ServiceUnavailable)),
    ("AccessDenied", Classification::Fatal(FatalKind::AccessDenied)),
    ("AccessDeniedException", Classification::Fatal(FatalKind::AccessDenied)),
    ("UnauthorizedOperation", Classification::Fatal(FatalKind::AccessDenied)),
    ("AuthorizationError", Classification::Fatal(FatalKind::AccessDenied)),
    ("Forbidden", Classification::Fatal(FatalKind::AccessDenied)),
    ("UnrecognizedClientException", Classification::Fatal(FatalKind::Credentials)),
    ("InvalidClientTokenId", Classification::Fatal(FatalKind::Credentials)),
    ("ExpiredToken", Classification::Fatal(FatalKind::Credentials)),
    ("ExpiredTokenException", Classification::Fatal(FatalKind::Credentials)),
    ("RequestExpired", Classification::Fatal(FatalKind::Credentials)),
    ("InvalidAccessKeyId", Classification::Fatal(FatalKind::Credentials)),
    ("SignatureDoesNotMatch", Classification::Fatal(FatalKind::Credentials)),
    ("AuthFailure", Classification::Fatal(FatalKind::Credentials)),
    ("InvalidToken", Classification::Fatal(FatalKind::Credentials)),
];

/// Lowercase text fragments that mark a fatal failure.
const FATAL_PATTERNS: &[(&str, FatalKind)] = &[
    ("unable to locate credentials", FatalKind::Credentials),
    ("token has expired", FatalKind::Credentials),
    ("error loading sso token", FatalKind::Credentials),
    ("sso session associated with this profile has expired", FatalKind::Credentials),
    ("security token included in the request is invalid", FatalKind::Credentials),
    ("security token included in the request is expired", FatalKind::Credentials),
    ("the config profile", FatalKind::Credentials),
    ("access denied", FatalKind::AccessDenied),
    ("accessdenied", FatalKind::AccessDenied),
    ("is not authorized to perform", FatalKind::AccessDenied),
    ("permission denied", FatalKind::AccessDenied),
    ("keyboardinterrupt", FatalKind::Interrupted),
];

/// Lowercase text fragments that mark a transient failure.
const RETRYABLE_PATTERNS: &[(&str, RetryReason)] = &[
    ("rate exceeded", RetryReason::Throttling),
    ("throttl", RetryReason::Throttling),
    ("too many requests", RetryReason::Throttling),
    ("slow down", RetryReason::Throttling),
    ("could not connect to the endpoint url", RetryReason::Network),
    ("connect timeout on endpoint", RetryReason::Network),
    ("read timeout on endpoint", RetryReason::Network),
    ("connection was closed before we received a valid response", RetryReason::Network),
    ("connection reset", RetryReason::Network),
    ("temporary failure in name resolution", RetryReason::Network),
    ("broken pipe", RetryReason::Network),
    ("service unavailable", RetryReason::ServiceUnavailable),
    ("internal error", RetryReason::ServiceUnavailable),
    ("internal server error", RetryReason::ServiceUnavailable),
    ("please try again", RetryReason::ServiceUnavailable),
];

static ERROR_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"An error occurred \(([A-Za-z0-9.]+)\)").expect("error code pattern is valid")
});

/// Extract the AWS error code from CLI error text.
pub fn error_code(text: &str) -> Option<&str> {
    ERROR_CODE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Classify a failed attempt.
///
/// `exit_code` is `None` when the process was killed by `signal`.
pub fn classify(exit_code: Option<i32>, signal: Option<i32>, stderr: &str) -> Classification {
    if signal == Some(SIGINT) || exit_code == Some(INTERRUPT_EXIT_CODE) {
        return Classification::Fatal(FatalKind::Interrupted);
    }

    if let Some(code) = error_code(stderr) {
        if let Some((_, class)) = CODE_TABLE.iter().find(|(c, _)| *c == code) {
            return *class;
        }
    }

    let lower = stderr.to_lowercase();
    if let Some((_, kind)) = FATAL_PATTERNS.iter().find(|(p, _)| lower.contains(p)) {
        return Classification::Fatal(*kind);
    }
    if let Some((_, reason)) = RETRYABLE_PATTERNS.iter().find(|(p, _)| lower.contains(p)) {
        return Classification::Retryable(*reason);
    }

    Classification::Fatal(FatalKind::Unclassified)
}

/// Backoff between retries: `base_delay * 2^attempt` plus jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Add up to `base_delay / 10` of random delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy without jitter.
    pub fn fixed(base_delay: Duration) -> Self {
        Self {
            base_delay,
            jitter: false,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt + 1` (0-indexed attempt).
    ///
    /// Non-decreasing in `attempt`: jitter never exceeds `base_delay`, which
    /// is less than the gap between consecutive exponential steps.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        let mut delay = self.base_delay.saturating_mul(factor);

        if self.jitter {
            let max_jitter = u64::try_from((self.base_delay / 10).as_millis()).unwrap_or(u64::MAX);
            if max_jitter > 0 {
                let jitter = Duration::from_millis(fastrand::u64(0..=max_jitter));
                delay = delay.saturating_add(jitter);
            }
        }

        delay.min(self.max_delay)
    }
}

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Send + Sync {
    /// Called before sleeping ahead of a retry.
    ///
    /// # Arguments
    /// * `attempt` - Retry about to happen (1-indexed)
    /// * `max_retries` - Retry budget
    /// * `reason` - Why the previous attempt is being retried
    /// * `delay` - Time until the next attempt
    fn on_retry(&self, attempt: u32, max_retries: u32, reason: RetryReason, delay: Duration);
}

/// Callback that logs retries at warn level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_retries: u32, reason: RetryReason, delay: Duration) {
        log::warn!(
            "Call {}; retry {attempt}/{max_retries} in {:.1}s",
            reason.description(),
            delay.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_extraction() {
        let text = "\nAn error occurred (ThrottlingException) when calling the DescribeInstances operation (reached max retries: 2): Rate exceeded";
        assert_eq!(error_code(text), Some("ThrottlingException"));
        assert_eq!(error_code("plain failure"), None);
    }

    #[test]
    fn test_classify_throttling_code() {
        let text = "An error occurred (Throttling) when calling the GetCostAndUsage operation: Rate exceeded";
        assert_eq!(
            classify(Some(254), None, text),
            Classification::Retryable(RetryReason::Throttling)
        );
    }

    #[test]
    fn test_classify_access_denied_code() {
        let text = "An error occurred (AccessDenied) when calling the ListBuckets operation: Access Denied";
        assert_eq!(
            classify(Some(254), None, text),
            Classification::Fatal(FatalKind::AccessDenied)
        );
    }

    #[test]
    fn test_classify_expired_token() {
        let text = "An error occurred (ExpiredToken) when calling the GetCallerIdentity operation: The security token included in the request is expired";
        assert_eq!(
            classify(Some(254), None, text),
            Classification::Fatal(FatalKind::Credentials)
        );
        assert_eq!(
            classify(Some(253), None, "Unable to locate credentials. You can configure credentials by running \"aws configure\"."),
            Classification::Fatal(FatalKind::Credentials)
        );
    }

    #[test]
    fn test_classify_network_text() {
        let text = "Could not connect to the endpoint URL: \"https://ec2.us-east-1.amazonaws.com/\"";
        assert_eq!(
            classify(Some(255), None, text),
            Classification::Retryable(RetryReason::Network)
        );
    }

    #[test]
    fn test_classify_interrupt() {
        assert_eq!(
            classify(Some(130), None, ""),
            Classification::Fatal(FatalKind::Interrupted)
        );
        assert_eq!(
            classify(None, Some(2), "throttled"),
            Classification::Fatal(FatalKind::Interrupted)
        );
    }

    #[test]
    fn test_unknown_code_falls_to_patterns_then_fatal() {
        let text = "An error occurred (InvalidParameterValue) when calling the RunInstances operation: bad AMI";
        assert_eq!(
            classify(Some(254), None, text),
            Classification::Fatal(FatalKind::Unclassified)
        );
        assert_eq!(
            classify(Some(1), None, "something odd happened"),
            Classification::Fatal(FatalKind::Unclassified)
        );
    }

    #[test]
    fn test_fatal_patterns_checked_before_retryable() {
        let text = "access denied while throttled";
        assert_eq!(
            classify(Some(1), None, text),
            Classification::Fatal(FatalKind::AccessDenied)
        );
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::fixed(Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(1),
            ..RetryPolicy::fixed(Duration::from_millis(400))
        };
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_base_delay_saturates_to_cap() {
        let policy = RetryPolicy {
            base_delay: Duration::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(60));
    }

    #[test]
    fn test_jittered_delay_is_bounded_and_non_decreasing() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(3600),
            jitter: true,
        };
        for _ in 0..50 {
            let delays: Vec<_> = (0..6).map(|a| policy.delay_for_attempt(a)).collect();
            for (attempt, delay) in delays.iter().enumerate() {
                let floor = Duration::from_millis(1000 * (1 << attempt));
                assert!(*delay >= floor);
                assert!(*delay <= floor + Duration::from_millis(100));
            }
            assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        }
    }
}
