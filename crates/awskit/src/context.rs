//! The immutable context one AWS CLI call runs under.

use crate::config::MergedConfig;
use crate::env::{self, EnvSnapshot};
use crate::types::AuthMethod;
use std::collections::BTreeMap;

/// Profile, region, credentials and the complete child environment for one
/// call. Built by the resolvers, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Active profile name
    pub profile: String,
    /// Effective region
    pub region: String,
    /// Detected authentication method
    pub auth: AuthMethod,
    /// Merged configuration for this call
    pub config: MergedConfig,
    /// Environment handed to the child process
    pub env: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Assemble the context and its child environment.
    ///
    /// Precedence, lowest to highest: ambient passthrough variables, merged
    /// configuration, then the resolved region and profile.
    pub fn new(
        ambient: &EnvSnapshot,
        config: MergedConfig,
        profile: String,
        region: String,
        auth: AuthMethod,
    ) -> Self {
        let mut vars = ambient.passthrough();

        for (key, value) in config.iter() {
            vars.insert(key.to_string(), value.to_string());
        }

        vars.insert(env::REGION.to_string(), region.clone());
        vars.insert(env::DEFAULT_REGION.to_string(), region.clone());

        match auth.profile() {
            Some(name) => {
                vars.insert(env::PROFILE.to_string(), name.to_string());
            }
            // Environment keys are in use; drop any inherited profile.
            None if matches!(auth, AuthMethod::EnvVars | AuthMethod::EnvVarsWithSessionToken) => {
                vars.remove(env::PROFILE);
            }
            None => {}
        }

        vars.entry(env::PAGER.to_string()).or_default();

        Self {
            profile,
            region,
            auth,
            config,
            env: vars,
        }
    }
}
