//! Error types for execution engine operations.
//!
//! Only setup can fail with an [`Error`]: loading configuration layers and
//! demanding a resolved credential method. Failures of the external AWS CLI
//! call itself are never raised; they are reported as an
//! [`Outcome`](crate::types::Outcome) on the
//! [`ExecutionResult`](crate::types::ExecutionResult).

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Kinds of fatal execution failures.
///
/// A fatal failure stops the retry loop immediately, regardless of the
/// remaining retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    /// The caller is authenticated but not allowed to perform the call
    AccessDenied,
    /// Credentials are missing, invalid or expired
    Credentials,
    /// The user interrupted the call
    Interrupted,
    /// The external program could not be started
    Launch,
    /// The error did not match any known signature
    Unclassified,
}

impl FatalKind {
    /// Get a user-friendly description of this failure kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Permission denied",
            Self::Credentials => "Missing or expired credentials",
            Self::Interrupted => "Interrupted",
            Self::Launch => "Could not launch the AWS CLI",
            Self::Unclassified => "Unexpected error",
        }
    }

    /// Get the remediation hint for this failure kind, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Credentials => Some("re-authenticate (for example `aws sso login`) and retry"),
            Self::AccessDenied => Some("check the access policy attached to your identity"),
            Self::Launch => Some("make sure the `aws` executable is installed and on PATH"),
            Self::Interrupted | Self::Unclassified => None,
        }
    }
}

impl std::fmt::Display for FatalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors that can occur while preparing an execution.
#[derive(Debug, Error)]
pub enum Error {
    /// An existing configuration file could not be parsed
    #[error("invalid configuration in {} at line {line}: {message}", path.display())]
    ConfigLoad {
        /// File that failed to parse
        path: PathBuf,
        /// Line number where the parse error occurred (1-indexed)
        line: usize,
        /// Description of the syntax error
        message: String,
    },

    /// An existing configuration source could not be read
    #[error("could not read configuration {}: {source}", path.display())]
    ConfigRead {
        /// Path that could not be read
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Credential detection found no usable authentication method
    #[error("no AWS credentials found for profile {profile}")]
    AuthResolution {
        /// Profile that was active during detection
        profile: String,
    },
}

impl Error {
    /// Get actionable advice for resolving this error.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::ConfigLoad { .. } => "Each line must be KEY=VALUE or a # comment",
            Self::ConfigRead { .. } => "Check the file permissions of your configuration",
            Self::AuthResolution { .. } => FatalKind::Credentials
                .hint()
                .unwrap_or("Configure AWS credentials"),
        }
    }
}

/// Result type for execution engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hints_by_category() {
        assert!(FatalKind::Credentials.hint().unwrap().contains("re-authenticate"));
        assert!(FatalKind::AccessDenied.hint().unwrap().contains("access policy"));
        assert!(FatalKind::Unclassified.hint().is_none());
        assert!(FatalKind::Interrupted.hint().is_none());
    }

    #[test]
    fn test_config_load_display() {
        let err = Error::ConfigLoad {
            path: PathBuf::from("/tmp/default.conf"),
            line: 3,
            message: "missing '='".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration in /tmp/default.conf at line 3: missing '='"
        );
        assert!(err.advice().contains("KEY=VALUE"));
    }

    #[test]
    fn test_auth_resolution_advice() {
        let err = Error::AuthResolution {
            profile: "default".to_string(),
        };
        assert!(err.advice().contains("re-authenticate"));
    }
}
