//! Immutable snapshot of the process environment.
//!
//! Resolvers read variables from an [`EnvSnapshot`] taken once at startup
//! instead of calling [`std::env::var`], so detection is a pure function of
//! the snapshot and tests never touch the real environment.

use std::collections::BTreeMap;

/// `AWS_ACCESS_KEY_ID`
pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
/// `AWS_SECRET_ACCESS_KEY`
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
/// `AWS_SESSION_TOKEN`
pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
/// `AWS_PROFILE`
pub const PROFILE: &str = "AWS_PROFILE";
/// `AWS_REGION`
pub const REGION: &str = "AWS_REGION";
/// `AWS_DEFAULT_REGION`
pub const DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
/// `AWS_WEB_IDENTITY_TOKEN_FILE`
pub const WEB_IDENTITY_TOKEN_FILE: &str = "AWS_WEB_IDENTITY_TOKEN_FILE";
/// `AWS_ROLE_ARN`
pub const ROLE_ARN: &str = "AWS_ROLE_ARN";
/// `AWS_CONFIG_FILE`
pub const CONFIG_FILE: &str = "AWS_CONFIG_FILE";
/// `AWS_SHARED_CREDENTIALS_FILE`
pub const SHARED_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";
/// `AWS_PAGER`
pub const PAGER: &str = "AWS_PAGER";

/// Ambient variables copied into the child environment besides `AWS_*`.
const PASSTHROUGH: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TMPDIR",
    "TZ",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "http_proxy",
    "https_proxy",
    "no_proxy",
    "SSL_CERT_FILE",
    "REQUESTS_CA_BUNDLE",
    "SYSTEMROOT",
];

/// Read-only view of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get a variable, treating empty values as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Whether a variable is set to a non-empty value.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Whether a variable holds a truthy value ("true", "1", "yes").
    pub fn is_truthy(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| {
            matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
        })
    }

    /// Variables that may be inherited by the AWS CLI child process.
    pub fn passthrough(&self) -> BTreeMap<String, String> {
        self.vars
            .iter()
            .filter(|(k, _)| k.starts_with("AWS_") || PASSTHROUGH.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
