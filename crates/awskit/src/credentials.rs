//! Detection of the active AWS authentication method.
//!
//! Detection runs an ordered list of probes and stops at the first match:
//!
//! 1. access keys in the environment
//! 2. the active named profile
//! 3. an instance profile from instance metadata
//! 4. a web identity token file plus role ARN
//! 5. the `default` profile
//!
//! A probe that cannot decide returns `None`; only when every probe declines
//! is the result [`AuthMethod::Unknown`].

use crate::config::DEFAULT_PROFILE;
use crate::env::{self, EnvSnapshot};
use crate::error::{Error, Result};
use crate::metadata::MetadataProbe;
use crate::shared_config::SharedConfig;
use crate::types::AuthMethod;

/// Determines how the AWS CLI will authenticate.
pub struct CredentialResolver<'a> {
    env: &'a EnvSnapshot,
    shared: &'a SharedConfig,
    metadata: &'a dyn MetadataProbe,
    active_profile: Option<&'a str>,
}

impl<'a> CredentialResolver<'a> {
    /// Create a resolver over a snapshot of the environment.
    ///
    /// `active_profile` is the profile selected for this call; `None` or
    /// `"default"` means no named profile is active.
    pub fn new(
        env: &'a EnvSnapshot,
        shared: &'a SharedConfig,
        metadata: &'a dyn MetadataProbe,
        active_profile: Option<&'a str>,
    ) -> Self {
        Self {
            env,
            shared,
            metadata,
            active_profile,
        }
    }

    /// Run the probes in order and return the first match.
    pub fn detect(&self) -> AuthMethod {
        let probes: [(&str, fn(&Self) -> Option<AuthMethod>); 5] = [
            ("environment", Self::probe_env_vars),
            ("active profile", Self::probe_active_profile),
            ("instance metadata", Self::probe_instance_profile),
            ("web identity", Self::probe_web_identity),
            ("default profile", Self::probe_default_profile),
        ];

        for (name, probe) in probes {
            if let Some(method) = probe(self) {
                log::debug!("Credentials detected via {name}: {method}");
                return method;
            }
        }
        log::debug!("No credentials detected");
        AuthMethod::Unknown
    }

    /// Like [`detect`](Self::detect), but an unknown method is an error.
    pub fn require(&self) -> Result<AuthMethod> {
        match self.detect() {
            AuthMethod::Unknown => Err(Error::AuthResolution {
                profile: self.active_profile.unwrap_or(DEFAULT_PROFILE).to_string(),
            }),
            method => Ok(method),
        }
    }

    fn probe_env_vars(&self) -> Option<AuthMethod> {
        if !(self.env.is_set(env::ACCESS_KEY_ID) && self.env.is_set(env::SECRET_ACCESS_KEY)) {
            return None;
        }
        if self.env.is_set(env::SESSION_TOKEN) {
            Some(AuthMethod::EnvVarsWithSessionToken)
        } else {
            Some(AuthMethod::EnvVars)
        }
    }

    fn probe_active_profile(&self) -> Option<AuthMethod> {
        let name = self.active_profile.filter(|p| *p != DEFAULT_PROFILE)?;
        self.classify_profile(name)
    }

    fn probe_instance_profile(&self) -> Option<AuthMethod> {
        self.metadata
            .has_instance_profile()
            .then_some(AuthMethod::InstanceProfile)
    }

    fn probe_web_identity(&self) -> Option<AuthMethod> {
        (self.env.is_set(env::WEB_IDENTITY_TOKEN_FILE) && self.env.is_set(env::ROLE_ARN))
            .then_some(AuthMethod::WebIdentity)
    }

    fn probe_default_profile(&self) -> Option<AuthMethod> {
        self.classify_profile(DEFAULT_PROFILE)
    }

    /// Classify a profile by its stored attributes.
    fn classify_profile(&self, name: &str) -> Option<AuthMethod> {
        let attributes = self.shared.profile(name)?;
        if attributes.is_empty() {
            return None;
        }

        let has = |key: &str| self.shared.attribute(name, key).is_some();
        let method = if has("sso_start_url") || has("sso_session") {
            AuthMethod::ProfileSso(name.to_string())
        } else if has("role_arn") {
            AuthMethod::ProfileAssumeRole(name.to_string())
        } else {
            AuthMethod::ProfileAccessKey(name.to_string())
        };
        Some(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{NoMetadata, StaticMetadata};

    const CONFIG: &str = r"
[default]
region = us-east-1

[profile sso]
sso_session = corp

[profile admin]
role_arn = arn:aws:iam::123456789012:role/Admin

[profile keys]
region = eu-west-1
";

    fn shared() -> SharedConfig {
        SharedConfig::from_strings(CONFIG, "[keys]\naws_access_key_id = AKIA\n")
    }

    fn detect(env: &EnvSnapshot, profile: Option<&str>) -> AuthMethod {
        let shared = shared();
        CredentialResolver::new(env, &shared, &NoMetadata, profile).detect()
    }

    #[test]
    fn test_env_vars_win() {
        let env = EnvSnapshot::from_pairs([
            (env::ACCESS_KEY_ID, "AKIA"),
            (env::SECRET_ACCESS_KEY, "secret"),
        ]);
        assert_eq!(detect(&env, Some("sso")), AuthMethod::EnvVars);
    }

    #[test]
    fn test_env_vars_with_session_token() {
        let env = EnvSnapshot::from_pairs([
            (env::ACCESS_KEY_ID, "AKIA"),
            (env::SECRET_ACCESS_KEY, "secret"),
            (env::SESSION_TOKEN, "token"),
        ]);
        assert_eq!(detect(&env, None), AuthMethod::EnvVarsWithSessionToken);
    }

    #[test]
    fn test_access_key_without_secret_falls_through() {
        let env = EnvSnapshot::from_pairs([(env::ACCESS_KEY_ID, "AKIA")]);
        assert_eq!(
            detect(&env, None),
            AuthMethod::ProfileAccessKey("default".to_string())
        );
    }

    #[test]
    fn test_named_profile_classification() {
        let env = EnvSnapshot::default();
        assert_eq!(
            detect(&env, Some("sso")),
            AuthMethod::ProfileSso("sso".to_string())
        );
        assert_eq!(
            detect(&env, Some("admin")),
            AuthMethod::ProfileAssumeRole("admin".to_string())
        );
        assert_eq!(
            detect(&env, Some("keys")),
            AuthMethod::ProfileAccessKey("keys".to_string())
        );
    }

    #[test]
    fn test_missing_named_profile_falls_through() {
        let env = EnvSnapshot::default();
        assert_eq!(
            detect(&env, Some("ghost")),
            AuthMethod::ProfileAccessKey("default".to_string())
        );
    }

    #[test]
    fn test_instance_profile_before_web_identity() {
        let env = EnvSnapshot::from_pairs([
            (env::WEB_IDENTITY_TOKEN_FILE, "/var/run/token"),
            (env::ROLE_ARN, "arn:aws:iam::1:role/x"),
        ]);
        let empty = SharedConfig::default();
        let metadata = StaticMetadata {
            instance_profile: true,
            region: None,
        };
        let resolver = CredentialResolver::new(&env, &empty, &metadata, None);
        assert_eq!(resolver.detect(), AuthMethod::InstanceProfile);

        let resolver = CredentialResolver::new(&env, &empty, &NoMetadata, None);
        assert_eq!(resolver.detect(), AuthMethod::WebIdentity);
    }

    #[test]
    fn test_web_identity_needs_both_vars() {
        let env = EnvSnapshot::from_pairs([(env::WEB_IDENTITY_TOKEN_FILE, "/var/run/token")]);
        let empty = SharedConfig::default();
        let resolver = CredentialResolver::new(&env, &empty, &NoMetadata, None);
        assert_eq!(resolver.detect(), AuthMethod::Unknown);
    }

    #[test]
    fn test_unknown_and_require() {
        let env = EnvSnapshot::default();
        let empty = SharedConfig::default();
        let resolver = CredentialResolver::new(&env, &empty, &NoMetadata, Some("prod"));
        assert_eq!(resolver.detect(), AuthMethod::Unknown);
        match resolver.require() {
            Err(Error::AuthResolution { profile }) => assert_eq!(profile, "prod"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_detect_is_deterministic() {
        let env = EnvSnapshot::from_pairs([(env::PROFILE, "admin")]);
        let shared = shared();
        let resolver = CredentialResolver::new(&env, &shared, &NoMetadata, Some("admin"));
        assert_eq!(resolver.detect(), resolver.detect());
    }
}
