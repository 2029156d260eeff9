pub mod auth;
pub mod config;
pub mod profile;
pub mod region;
pub mod run;

use anyhow::{Context as _, Result, anyhow};
use awskit::{ConfigResolver, ConfigSources, EnvSnapshot, Executor, Profile, ProfileSource};

use crate::Context;
use crate::paths;
use crate::settings::Settings;

/// Profile, environment and config sources for one invocation.
pub struct Session {
    pub profile: Profile,
    pub environment: Option<String>,
    pub sources: ConfigSources,
    pub env: EnvSnapshot,
}

impl Session {
    /// Resolve the profile and load its configuration layers.
    pub fn load(ctx: &Context) -> Result<Self> {
        let settings = Settings::load()?;
        let (name, source) =
            ProfileSource::select(ctx.profile.as_deref(), settings.profile.as_deref());
        let environment = ctx
            .environment
            .clone()
            .or(settings.environment)
            .filter(|e| !e.trim().is_empty());

        let sources = ConfigSources::in_dir(&paths::config_dir()?);
        let profile = ConfigResolver::new(sources.clone())
            .load_profile(&name, source)
            .map_err(|e| anyhow!("{e}\n  {}", e.advice()))
            .with_context(|| format!("Failed to load configuration for profile '{name}'"))?;

        Ok(Self {
            profile,
            environment,
            sources,
            env: EnvSnapshot::capture(),
        })
    }

    /// Build an executor for this session.
    pub fn executor(&self) -> Executor {
        Executor::new(self.profile.clone(), self.env.clone())
            .with_environment(self.environment.clone())
    }
}

/// Human-readable label for how the profile was chosen.
pub fn profile_source_label(source: ProfileSource) -> &'static str {
    match source {
        ProfileSource::Explicit => "--profile / AWS_PROFILE",
        ProfileSource::Persisted => "saved setting",
        ProfileSource::Fallback => "default",
    }
}
