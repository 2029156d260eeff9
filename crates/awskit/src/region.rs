//! Region resolution by ordered fallback.

use crate::config::MergedConfig;
use crate::env::{self, EnvSnapshot};
use crate::metadata::MetadataProbe;
use crate::shared_config::SharedConfig;

/// Region used when nothing else names one.
pub const FALLBACK_REGION: &str = "us-east-1";

/// Configuration keys holding a default region, in priority order.
const CONFIG_KEYS: &[&str] = &["REGION", "default_region"];

/// Where the resolved region came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionSource {
    /// Per-call override
    Override,
    /// Merged configuration
    Config,
    /// `AWS_REGION`
    RegionEnv,
    /// `AWS_DEFAULT_REGION`
    DefaultRegionEnv,
    /// `region` of the active profile
    Profile,
    /// Instance metadata
    InstanceMetadata,
    /// Hard-coded fallback
    Fallback,
}

impl std::fmt::Display for RegionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Override => "override",
            Self::Config => "configuration",
            Self::RegionEnv => env::REGION,
            Self::DefaultRegionEnv => env::DEFAULT_REGION,
            Self::Profile => "profile",
            Self::InstanceMetadata => "instance metadata",
            Self::Fallback => "fallback",
        };
        f.write_str(label)
    }
}

/// Picks the region for a call.
pub struct RegionResolver<'a> {
    override_region: Option<&'a str>,
    config: &'a MergedConfig,
    env: &'a EnvSnapshot,
    shared: &'a SharedConfig,
    profile: &'a str,
    metadata: &'a dyn MetadataProbe,
}

impl<'a> RegionResolver<'a> {
    /// Create a resolver. `profile` is the active profile name.
    pub fn new(
        config: &'a MergedConfig,
        env: &'a EnvSnapshot,
        shared: &'a SharedConfig,
        profile: &'a str,
        metadata: &'a dyn MetadataProbe,
    ) -> Self {
        Self {
            override_region: None,
            config,
            env,
            shared,
            profile,
            metadata,
        }
    }

    /// Set the per-call override.
    pub fn with_override(mut self, region: Option<&'a str>) -> Self {
        self.override_region = region;
        self
    }

    /// The effective region. Never fails.
    pub fn resolve(&self) -> String {
        self.resolve_with_source().0
    }

    /// The effective region and the step that produced it.
    pub fn resolve_with_source(&self) -> (String, RegionSource) {
        let steps: [(RegionSource, fn(&Self) -> Option<String>); 6] = [
            (RegionSource::Override, |r| non_empty(r.override_region)),
            (RegionSource::Config, |r| {
                CONFIG_KEYS.iter().find_map(|key| non_empty(r.config.get(key)))
            }),
            (RegionSource::RegionEnv, |r| non_empty(r.env.get(env::REGION))),
            (RegionSource::DefaultRegionEnv, |r| {
                non_empty(r.env.get(env::DEFAULT_REGION))
            }),
            (RegionSource::Profile, |r| {
                non_empty(r.shared.attribute(r.profile, "region"))
            }),
            (RegionSource::InstanceMetadata, |r| {
                non_empty(r.metadata.region().as_deref())
            }),
        ];

        for (source, step) in steps {
            if let Some(region) = step(self) {
                log::debug!("Region {region} from {source}");
                return (region, source);
            }
        }
        (FALLBACK_REGION.to_string(), RegionSource::Fallback)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
