//! Core types for executing AWS CLI calls.

use crate::error::FatalKind;
use serde::Serialize;
use std::time::Duration;

/// Default number of retries for a transient failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default cap on captured stdout (1 MiB).
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Program invoked when a request does not name one.
pub const DEFAULT_PROGRAM: &str = "aws";

/// How the AWS CLI will authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "method", content = "profile", rename_all = "snake_case")]
pub enum AuthMethod {
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
    EnvVars,
    /// Access keys plus `AWS_SESSION_TOKEN`
    EnvVarsWithSessionToken,
    /// Named profile backed by IAM Identity Center
    ProfileSso(String),
    /// Named profile assuming a role
    ProfileAssumeRole(String),
    /// Named profile with static keys
    ProfileAccessKey(String),
    /// Instance profile from the metadata service
    InstanceProfile,
    /// Web identity token file plus role ARN
    WebIdentity,
    /// Nothing matched
    Unknown,
}

impl AuthMethod {
    /// The profile this method is bound to, if any.
    pub fn profile(&self) -> Option<&str> {
        match self {
            Self::ProfileSso(name) | Self::ProfileAssumeRole(name) | Self::ProfileAccessKey(name) => {
                Some(name)
            }
            _ => None,
        }
    }

    /// Whether detection found a usable method.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnvVars => write!(f, "environment variables"),
            Self::EnvVarsWithSessionToken => write!(f, "environment variables (session token)"),
            Self::ProfileSso(p) => write!(f, "SSO profile '{p}'"),
            Self::ProfileAssumeRole(p) => write!(f, "assume-role profile '{p}'"),
            Self::ProfileAccessKey(p) => write!(f, "access-key profile '{p}'"),
            Self::InstanceProfile => write!(f, "instance profile"),
            Self::WebIdentity => write!(f, "web identity"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A single AWS CLI call to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Service name, used for rate limiting and diagnostics (e.g. "ec2")
    pub service: String,
    /// Full argument vector; `argv[0]` is the program
    pub argv: Vec<String>,
    /// Per-call region override
    pub region: Option<String>,
    /// Per-call profile override
    pub profile: Option<String>,
    /// Timeout for each attempt
    pub timeout: Duration,
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Maximum captured stdout in bytes
    pub max_output_size: usize,
}

impl ExecutionRequest {
    /// Create a request with default limits.
    pub fn new<I, S>(service: impl Into<String>, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            service: service.into(),
            argv: argv.into_iter().map(Into::into).collect(),
            region: None,
            profile: None,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
        }
    }

    /// Create a request for `aws <args...>`.
    pub fn aws<I, S>(service: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut request = Self::new(service, [DEFAULT_PROGRAM]);
        request.argv.extend(args.into_iter().map(Into::into));
        request
    }

    /// Set the region override.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the profile override.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the stdout capture limit.
    pub fn with_max_output_size(mut self, max_output_size: usize) -> Self {
        self.max_output_size = max_output_size;
        self
    }

    /// The command line, for logging.
    pub fn display_command(&self) -> String {
        self.argv.join(" ")
    }
}

/// Terminal state of an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// The process exited 0
    Success,
    /// Every attempt failed with a retryable error
    RetriesExhausted {
        /// Diagnostic text of the last failed attempt
        last_error: String,
    },
    /// A non-retryable failure stopped the loop
    FatalError {
        /// What kind of failure
        kind: FatalKind,
    },
    /// The last attempt ran out of time
    Timeout,
}

impl Outcome {
    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short label for diagnostics.
    pub fn label(&self) -> String {
        match self {
            Self::Success => "success".to_string(),
            Self::RetriesExhausted { .. } => "retries exhausted".to_string(),
            Self::FatalError { kind } => format!("fatal: {kind}"),
            Self::Timeout => "timeout".to_string(),
        }
    }
}

/// Structured result of [`Executor::execute`](crate::Executor::execute).
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Terminal state
    pub outcome: Outcome,
    /// Captured stdout, truncated to the request's limit
    pub stdout: String,
    /// Captured stderr, verbatim
    pub stderr: String,
    /// Wall time from start of execution to terminal state
    #[serde(serialize_with = "serialize_duration_secs")]
    pub elapsed: Duration,
    /// Retries used (attempts minus one)
    pub retries: u32,
    /// Stdout exceeded the capture limit
    pub output_truncated: bool,
    /// Remediation hint for non-success outcomes
    pub hint: Option<&'static str>,
    /// Region the call ran against
    pub region: String,
    /// Profile the call ran under
    pub profile: String,
    /// Detected authentication method
    pub auth: AuthMethod,
}

impl ExecutionResult {
    /// Whether the call succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Process exit code for the overall tool: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Diagnostic text for a failed call: original error plus hint.
    pub fn diagnostic(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }

        let mut text = format!("{} after {} retries", self.outcome.label(), self.retries);
        let detail = match &self.outcome {
            Outcome::RetriesExhausted { last_error } => last_error.trim(),
            _ => self.stderr.trim(),
        };
        if !detail.is_empty() {
            text.push_str(": ");
            text.push_str(detail);
        }
        if let Some(hint) = self.hint {
            text.push_str(&format!("\nhint: {hint}"));
        }
        Some(text)
    }
}

fn serialize_duration_secs<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(outcome: Outcome) -> ExecutionResult {
        ExecutionResult {
            outcome,
            stdout: String::new(),
            stderr: "An error occurred (AccessDenied) when calling the ListBuckets operation"
                .to_string(),
            elapsed: Duration::from_millis(5),
            retries: 0,
            output_truncated: false,
            hint: FatalKind::AccessDenied.hint(),
            region: "us-east-1".to_string(),
            profile: "default".to_string(),
            auth: AuthMethod::Unknown,
        }
    }

    #[test]
    fn test_aws_request_prefixes_program() {
        let request = ExecutionRequest::aws("s3", ["s3api", "list-buckets"]);
        assert_eq!(request.argv, vec!["aws", "s3api", "list-buckets"]);
        assert_eq!(request.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(request.timeout, DEFAULT_TIMEOUT);
        assert_eq!(request.max_output_size, DEFAULT_MAX_OUTPUT_SIZE);
    }

    #[test]
    fn test_request_builders() {
        let request = ExecutionRequest::aws("ec2", ["ec2", "describe-instances"])
            .with_region("eu-west-1")
            .with_profile("prod")
            .with_max_retries(0);
        assert_eq!(request.region.as_deref(), Some("eu-west-1"));
        assert_eq!(request.profile.as_deref(), Some("prod"));
        assert_eq!(request.max_retries, 0);
        assert_eq!(request.display_command(), "aws ec2 describe-instances");
    }

    #[test]
    fn test_exit_code_only_zero_on_success() {
        assert_eq!(result(Outcome::Success).exit_code(), 0);
        assert_eq!(result(Outcome::Timeout).exit_code(), 1);
        assert_eq!(
            result(Outcome::FatalError {
                kind: FatalKind::AccessDenied
            })
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_diagnostic_preserves_error_and_appends_hint() {
        let text = result(Outcome::FatalError {
            kind: FatalKind::AccessDenied,
        })
        .diagnostic()
        .unwrap();
        assert!(text.contains("An error occurred (AccessDenied)"));
        assert!(text.contains("hint: check the access policy"));
        assert!(result(Outcome::Success).diagnostic().is_none());
    }

    #[test]
    fn test_auth_method_profile() {
        assert_eq!(
            AuthMethod::ProfileSso("dev".to_string()).profile(),
            Some("dev")
        );
        assert_eq!(AuthMethod::EnvVars.profile(), None);
        assert!(!AuthMethod::Unknown.is_known());
    }
}
