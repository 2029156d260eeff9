//! Layered `KEY=VALUE` configuration.
//!
//! Layers are merged in a fixed order, last one wins per key:
//!
//! 1. `default` - `<config_dir>/default.conf`
//! 2. `override` - `<config_dir>/override.conf`
//! 3. every `*.conf` / `*.env` file under `<config_dir>/profiles/<profile>/`,
//!    recursively, in lexicographic path order
//!
//! Profile files are scoped by naming convention. A path component (directory
//! or file stem) named `env-<name>` only applies when environment `<name>` is
//! requested, `service-<name>` only when service `<name>` is. Everything else
//! is common and always applies.
//!
//! A missing file or directory contributes nothing. Only an existing file
//! that cannot be parsed is an error.

pub mod parser;
pub mod tunables;

use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use tunables::Tunables;

/// Name of the profile used when nothing else selects one.
pub const DEFAULT_PROFILE: &str = "default";

/// File extensions recognised as configuration layers.
const LAYER_EXTENSIONS: &[&str] = &["conf", "env"];

/// Which environment/service a layer is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerScope {
    /// Only applies to this environment
    pub environment: Option<String>,
    /// Only applies to this service
    pub service: Option<String>,
}

impl LayerScope {
    /// Scope that always applies.
    pub fn common() -> Self {
        Self::default()
    }

    /// Derive a scope from a path relative to the profile directory.
    pub fn from_relative_path(path: &Path) -> Self {
        let mut scope = Self::common();
        let stem = path.with_extension("");
        for component in stem.components() {
            let part = component.as_os_str().to_string_lossy();
            if let Some(env) = part.strip_prefix("env-") {
                scope.environment = Some(env.to_string());
            } else if let Some(service) = part.strip_prefix("service-") {
                scope.service = Some(service.to_string());
            }
        }
        scope
    }

    /// Whether a layer with this scope applies to the requested call.
    pub fn applies(&self, environment: Option<&str>, service: Option<&str>) -> bool {
        let env_ok = self
            .environment
            .as_deref()
            .is_none_or(|e| environment == Some(e));
        let service_ok = self.service.as_deref().is_none_or(|s| service == Some(s));
        env_ok && service_ok
    }

    /// Label used in layer names.
    fn kind(&self) -> &'static str {
        match (&self.environment, &self.service) {
            (None, None) => "profile-common",
            (Some(_), None) => "profile-environment",
            (_, Some(_)) => "profile-service",
        }
    }
}

/// One named source of configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLayer {
    /// Layer name, e.g. "default" or "profile-service:service-ec2.conf"
    pub name: String,
    /// Where the values came from, if a file
    pub path: Option<PathBuf>,
    /// Which calls this layer applies to
    pub scope: LayerScope,
    /// Values in file order
    pub entries: Vec<(String, String)>,
}

impl ConfigLayer {
    /// Create an unscoped layer from explicit entries.
    pub fn new<I, K, V>(name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            path: None,
            scope: LayerScope::common(),
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Restrict this layer to a scope.
    pub fn with_scope(mut self, scope: LayerScope) -> Self {
        self.scope = scope;
        self
    }

    /// Load a layer from a file. A missing file yields an empty layer.
    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self> {
        let entries = parser::parse_file(path)?.unwrap_or_default();
        Ok(Self {
            name: name.into(),
            path: Some(path.to_path_buf()),
            scope: LayerScope::common(),
            entries,
        })
    }
}

/// How the active profile name was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    /// `--profile` / `AWS_PROFILE`
    Explicit,
    /// Saved user setting
    Persisted,
    /// Nothing was selected
    Fallback,
}

impl ProfileSource {
    /// Pick the profile name: explicit, then persisted, then `"default"`.
    pub fn select(explicit: Option<&str>, persisted: Option<&str>) -> (String, Self) {
        let non_empty = |s: &&str| !s.trim().is_empty();
        if let Some(name) = explicit.filter(non_empty) {
            return (name.trim().to_string(), Self::Explicit);
        }
        if let Some(name) = persisted.filter(non_empty) {
            return (name.trim().to_string(), Self::Persisted);
        }
        (DEFAULT_PROFILE.to_string(), Self::Fallback)
    }
}

/// A profile name plus the ordered configuration layers selected for it.
///
/// Built once per invocation and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Profile name
    pub name: String,
    /// How the name was chosen
    pub source: ProfileSource,
    /// Layers in merge order
    pub layers: Vec<ConfigLayer>,
}

impl Profile {
    /// Create a profile from already loaded layers.
    pub fn new(name: impl Into<String>, source: ProfileSource, layers: Vec<ConfigLayer>) -> Self {
        Self {
            name: name.into(),
            source,
            layers,
        }
    }

    /// Merge every applicable layer, last one wins.
    pub fn merged(&self, environment: Option<&str>, service: Option<&str>) -> MergedConfig {
        let mut merged = MergedConfig::default();
        for layer in self
            .layers
            .iter()
            .filter(|l| l.scope.applies(environment, service))
        {
            for (key, value) in &layer.entries {
                merged.values.insert(key.clone(), value.clone());
                merged.origins.insert(key.clone(), layer.name.clone());
            }
        }
        merged
    }
}

/// The effective key/value environment after merging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedConfig {
    values: BTreeMap<String, String>,
    origins: BTreeMap<String, String>,
}

impl MergedConfig {
    /// Get a value, treating empty strings as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Name of the layer that supplied a key.
    pub fn origin(&self, key: &str) -> Option<&str> {
        self.origins.get(key).map(String::as_str)
    }

    /// All values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no layer defined anything.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Locations of the configuration layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSources {
    /// The always-loaded default layer
    pub default_file: PathBuf,
    /// Repository-level override layer
    pub override_file: PathBuf,
    /// Directory holding one sub-directory per profile, if configured
    pub profiles_dir: Option<PathBuf>,
}

impl ConfigSources {
    /// Standard layout under a config directory.
    pub fn in_dir(config_dir: &Path) -> Self {
        Self {
            default_file: config_dir.join("default.conf"),
            override_file: config_dir.join("override.conf"),
            profiles_dir: Some(config_dir.join("profiles")),
        }
    }
}

/// Loads and merges configuration layers.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    sources: ConfigSources,
}

impl ConfigResolver {
    /// Create a resolver for the given sources.
    pub fn new(sources: ConfigSources) -> Self {
        Self { sources }
    }

    /// Read every layer for a profile.
    pub fn load_profile(&self, name: &str, source: ProfileSource) -> Result<Profile> {
        let mut layers = vec![
            ConfigLayer::load("default", &self.sources.default_file)?,
            ConfigLayer::load("override", &self.sources.override_file)?,
        ];

        if let Some(dir) = &self.sources.profiles_dir {
            layers.extend(load_profile_dir(&dir.join(name))?);
        }

        log::debug!(
            "Loaded {} configuration layers for profile {name}",
            layers.len()
        );
        Ok(Profile::new(name, source, layers))
    }

    /// Load the `default` profile and merge it for one call.
    pub fn resolve(&self, environment: Option<&str>, service: Option<&str>) -> Result<MergedConfig> {
        let profile = self.load_profile(DEFAULT_PROFILE, ProfileSource::Fallback)?;
        Ok(profile.merged(environment, service))
    }
}

/// Recursively load every layer file under a profile directory.
fn load_profile_dir(dir: &Path) -> Result<Vec<ConfigLayer>> {
    if !dir.is_dir() {
        log::debug!("Profile directory {} not found, skipping", dir.display());
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {e}", dir.display());
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| LAYER_EXTENSIONS.contains(&ext))
        })
        .collect();
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let relative = path.strip_prefix(dir).unwrap_or(&path).to_path_buf();
            let scope = LayerScope::from_relative_path(&relative);
            let name = format!("{}:{}", scope.kind(), relative.display());
            ConfigLayer::load(name, &path).map(|layer| layer.with_scope(scope))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_merge_last_layer_wins() {
        let profile = Profile::new(
            "default",
            ProfileSource::Fallback,
            vec![
                ConfigLayer::new("default", [("A", "1"), ("B", "1")]),
                ConfigLayer::new("override", [("B", "2")]),
                ConfigLayer::new("profile-common", [("C", "3"), ("B", "3")]),
            ],
        );
        let merged = profile.merged(None, None);
        assert_eq!(merged.get("A"), Some("1"));
        assert_eq!(merged.get("B"), Some("3"));
        assert_eq!(merged.get("C"), Some("3"));
        assert_eq!(merged.origin("B"), Some("profile-common"));
        assert_eq!(merged.get("UNDEFINED"), None);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_scoped_layers_only_apply_when_requested() {
        let profile = Profile::new(
            "default",
            ProfileSource::Fallback,
            vec![
                ConfigLayer::new("common", [("REGION", "us-east-1")]),
                ConfigLayer::new("prod", [("REGION", "eu-west-1")]).with_scope(LayerScope {
                    environment: Some("prod".to_string()),
                    service: None,
                }),
                ConfigLayer::new("ec2", [("TIMEOUT", "30")]).with_scope(LayerScope {
                    environment: None,
                    service: Some("ec2".to_string()),
                }),
            ],
        );

        assert_eq!(profile.merged(None, None).get("REGION"), Some("us-east-1"));
        assert_eq!(
            profile.merged(Some("prod"), None).get("REGION"),
            Some("eu-west-1")
        );
        assert_eq!(profile.merged(None, Some("s3")).get("TIMEOUT"), None);
        assert_eq!(profile.merged(None, Some("ec2")).get("TIMEOUT"), Some("30"));
    }

    #[test]
    fn test_scope_from_path() {
        assert_eq!(
            LayerScope::from_relative_path(Path::new("common.conf")),
            LayerScope::common()
        );
        assert_eq!(
            LayerScope::from_relative_path(Path::new("env-prod.conf")).environment,
            Some("prod".to_string())
        );
        let nested = LayerScope::from_relative_path(Path::new("env-dev/service-s3.env"));
        assert_eq!(nested.environment.as_deref(), Some("dev"));
        assert_eq!(nested.service.as_deref(), Some("s3"));
    }

    #[test]
    fn test_profile_source_priority() {
        assert_eq!(
            ProfileSource::select(Some("cli"), Some("saved")),
            ("cli".to_string(), ProfileSource::Explicit)
        );
        assert_eq!(
            ProfileSource::select(None, Some("saved")),
            ("saved".to_string(), ProfileSource::Persisted)
        );
        assert_eq!(
            ProfileSource::select(Some(""), None),
            ("default".to_string(), ProfileSource::Fallback)
        );
    }

    #[test]
    fn test_load_profile_from_disk_in_path_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join("default.conf"), "REGION=us-east-1\nA=default\n");
        write(&root.join("override.conf"), "A=override\n");
        write(&root.join("profiles/dev/a-common.conf"), "B=first\n");
        write(&root.join("profiles/dev/b/nested.env"), "B=second\n");
        write(&root.join("profiles/dev/env-prod.conf"), "REGION=eu-west-1\n");
        write(&root.join("profiles/dev/README.md"), "not a layer");

        let resolver = ConfigResolver::new(ConfigSources::in_dir(root));
        let profile = resolver
            .load_profile("dev", ProfileSource::Explicit)
            .unwrap();
        assert_eq!(profile.layers.len(), 5);

        let merged = profile.merged(None, None);
        assert_eq!(merged.get("A"), Some("override"));
        assert_eq!(merged.get("B"), Some("second"));
        assert_eq!(merged.get("REGION"), Some("us-east-1"));

        let prod = profile.merged(Some("prod"), None);
        assert_eq!(prod.get("REGION"), Some("eu-west-1"));
    }

    #[test]
    fn test_missing_profile_dir_equals_omitted_layer() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("default.conf"), "A=1\n");

        let with_dir = ConfigResolver::new(ConfigSources::in_dir(dir.path()))
            .load_profile("nope", ProfileSource::Explicit)
            .unwrap()
            .merged(None, None);

        let mut sources = ConfigSources::in_dir(dir.path());
        sources.profiles_dir = None;
        let without_dir = ConfigResolver::new(sources)
            .load_profile("nope", ProfileSource::Explicit)
            .unwrap()
            .merged(None, None);

        assert_eq!(with_dir, without_dir);
    }

    #[test]
    fn test_missing_everything_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let merged = ConfigResolver::new(ConfigSources::in_dir(&dir.path().join("absent")))
            .resolve(None, None)
            .unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_malformed_existing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("override.conf"), "A=1\nbroken line\n");

        let err = ConfigResolver::new(ConfigSources::in_dir(dir.path()))
            .resolve(None, None)
            .unwrap_err();
        assert!(matches!(err, Error::ConfigLoad { line: 2, .. }));
    }
}
