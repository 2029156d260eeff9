//! Read-only view of the AWS shared `config` and `credentials` files.
//!
//! Only the attributes the resolvers need are interpreted (`sso_start_url`,
//! `sso_session`, `role_arn`, `region`, access keys). Parsing is lenient:
//! an unreadable file or a malformed line is skipped, never reported, because
//! the credential probes must fall through silently.

use crate::env::{self, EnvSnapshot};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Attributes stored for one profile.
pub type ProfileAttributes = BTreeMap<String, String>;

/// Profiles from `~/.aws/config` and `~/.aws/credentials`, merged by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedConfig {
    profiles: BTreeMap<String, ProfileAttributes>,
}

impl SharedConfig {
    /// Load the shared files at their standard or overridden locations.
    pub fn load(env: &EnvSnapshot, home: Option<&Path>) -> Self {
        let aws_dir = home.map(|h| h.join(".aws"));
        let config_path = env
            .get(env::CONFIG_FILE)
            .map(PathBuf::from)
            .or_else(|| aws_dir.as_ref().map(|d| d.join("config")));
        let credentials_path = env
            .get(env::SHARED_CREDENTIALS_FILE)
            .map(PathBuf::from)
            .or_else(|| aws_dir.as_ref().map(|d| d.join("credentials")));

        let mut shared = Self::default();
        if let Some(content) = config_path.as_deref().and_then(read_lenient) {
            shared.merge(&content, true);
        }
        if let Some(content) = credentials_path.as_deref().and_then(read_lenient) {
            shared.merge(&content, false);
        }
        shared
    }

    /// Build from file contents.
    pub fn from_strings(config: &str, credentials: &str) -> Self {
        let mut shared = Self::default();
        shared.merge(config, true);
        shared.merge(credentials, false);
        shared
    }

    /// Attributes of a profile, if it is defined anywhere.
    pub fn profile(&self, name: &str) -> Option<&ProfileAttributes> {
        self.profiles.get(name)
    }

    /// A single attribute of a profile, empty values treated as unset.
    pub fn attribute(&self, profile: &str, key: &str) -> Option<&str> {
        self.profile(profile)?
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Merge one INI document. In the config file, non-default sections are
    /// written `[profile NAME]`; in the credentials file they are `[NAME]`.
    fn merge(&mut self, content: &str, is_config_file: bool) {
        let mut current: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = section_profile(header.trim(), is_config_file);
                continue;
            }

            let Some(name) = &current else {
                continue;
            };
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            self.profiles
                .entry(name.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
}

/// Map a section header to a profile name.
fn section_profile(header: &str, is_config_file: bool) -> Option<String> {
    if !is_config_file || header == "default" {
        return Some(header.to_string());
    }
    header
        .strip_prefix("profile")
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(|rest| rest.trim().to_string())
}

fn read_lenient(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            log::trace!("Skipping {}: {e}", path.display());
            None
        }
    }
}
