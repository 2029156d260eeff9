//! Orchestration of one AWS CLI call.
//!
//! [`Executor::execute`] resolves the [`ExecutionContext`], takes a rate
//! limit permit and then runs the retry loop:
//!
//! ```text
//! Pending ──run──▶ exit 0 ───────────────────────▶ Success
//!    ▲              timeout / retryable ──budget──▶ Retrying ──backoff──┐
//!    │                                  └─spent──▶ Timeout | RetriesExhausted
//!    │              fatal / unknown ─────────────▶ FatalError
//!    └──────────────────────────────────────────────────────────────────┘
//! ```

use crate::backend::{self, AttemptOutput, AttemptStatus, Backend, Invocation};
use crate::cancel::CancelToken;
use crate::clock::{Clock, SystemClock};
use crate::config::{MergedConfig, Profile, Tunables};
use crate::context::ExecutionContext;
use crate::credentials::CredentialResolver;
use crate::env::EnvSnapshot;
use crate::error::{Error, FatalKind};
use crate::metadata::{ImdsProbe, MetadataProbe};
use crate::rate_limit::RateLimiter;
use crate::region::{RegionResolver, RegionSource};
use crate::retry::{self, Classification, LogCallback, RetryCallback, RetryReason};
use crate::shared_config::SharedConfig;
use crate::types::{ExecutionRequest, ExecutionResult, Outcome};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Runs AWS CLI calls with resolution, rate limiting and retries.
///
/// One executor runs one external process at a time; `execute` blocks until
/// the call reaches a terminal state.
pub struct Executor {
    profile: Profile,
    environment: Option<String>,
    env: EnvSnapshot,
    shared: SharedConfig,
    metadata: Arc<dyn MetadataProbe>,
    backend: Box<dyn Backend>,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
    cancel: CancelToken,
    callback: Box<dyn RetryCallback>,
    require_credentials: bool,
}

impl Executor {
    /// Create an executor for a loaded profile and environment snapshot.
    ///
    /// Reads the AWS shared config files under `$HOME/.aws` and probes
    /// instance metadata lazily, on first need.
    pub fn new(profile: Profile, env: EnvSnapshot) -> Self {
        let home = env.get("HOME").or_else(|| env.get("USERPROFILE")).map(PathBuf::from);
        let shared = SharedConfig::load(&env, home.as_deref());
        let metadata: Arc<dyn MetadataProbe> = Arc::new(ImdsProbe::from_env(&env));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let rates = Tunables::from_config(&profile.merged(None, None)).rate_limits;
        let limiter = RateLimiter::with_clock(rates, clock.clone());

        Self {
            profile,
            environment: None,
            env,
            shared,
            metadata,
            backend: Box::new(backend::default_backend()),
            clock,
            limiter,
            cancel: CancelToken::new(),
            callback: Box::new(LogCallback),
            require_credentials: false,
        }
    }

    /// Select the environment whose scoped layers apply.
    pub fn with_environment(mut self, environment: Option<String>) -> Self {
        self.environment = environment;
        self.rebuild_limits();
        self
    }

    /// Use a custom backend (useful for testing).
    pub fn with_backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    /// Use a custom clock for backoff and rate limiting.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self.rebuild_limits();
        self
    }

    /// Use a custom instance metadata probe.
    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataProbe>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the AWS shared config snapshot.
    pub fn with_shared_config(mut self, shared: SharedConfig) -> Self {
        self.shared = shared;
        self
    }

    /// Share an interrupt token with a signal handler.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report retries through a custom callback.
    pub fn with_callback(mut self, callback: Box<dyn RetryCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Refuse to launch when no credentials can be detected.
    pub fn require_credentials(mut self, require: bool) -> Self {
        self.require_credentials = require;
        self
    }

    /// Limits read from configuration, including `service-` scoped layers
    /// when a service is given.
    ///
    /// Rate limits are the exception: buckets are shared by the whole
    /// process, so their rates come from the environment-wide merge.
    pub fn tunables(&self, service: Option<&str>) -> Tunables {
        Tunables::from_config(&self.profile.merged(self.environment.as_deref(), service))
    }

    /// Build a request with the default limits configured for its service.
    pub fn request<I, S>(&self, service: impl Into<String>, argv: I) -> ExecutionRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let service = service.into();
        self.tunables(Some(&service)).request(service, argv)
    }

    /// Resolve configuration, credentials and region for a request.
    pub fn context_for(&self, request: &ExecutionRequest) -> ExecutionContext {
        let profile = self.active_profile(request);
        let config = self
            .profile
            .merged(self.environment.as_deref(), Some(&request.service));
        let auth = self.credentials(&profile).detect();
        let (region, _) = self.region_for(&config, &profile, request.region.as_deref());

        ExecutionContext::new(&self.env, config, profile, region, auth)
    }

    /// Credential probing for a named profile.
    pub fn credentials<'a>(&'a self, profile: &'a str) -> CredentialResolver<'a> {
        CredentialResolver::new(&self.env, &self.shared, self.metadata.as_ref(), Some(profile))
    }

    /// Resolve the region for a request and report where it came from.
    pub fn resolve_region(&self, request: &ExecutionRequest) -> (String, RegionSource) {
        let profile = self.active_profile(request);
        let config = self
            .profile
            .merged(self.environment.as_deref(), Some(&request.service));
        self.region_for(&config, &profile, request.region.as_deref())
    }

    fn region_for(
        &self,
        config: &MergedConfig,
        profile: &str,
        region_override: Option<&str>,
    ) -> (String, RegionSource) {
        RegionResolver::new(config, &self.env, &self.shared, profile, self.metadata.as_ref())
            .with_override(region_override)
            .resolve_with_source()
    }

    /// Per-call profile override, else the loaded profile.
    fn active_profile(&self, request: &ExecutionRequest) -> String {
        request
            .profile
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.profile.name)
            .to_string()
    }

    /// Run a request to a terminal state.
    pub fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let started = self.clock.now();
        let ctx = self.context_for(request);
        log::debug!(
            "Executing `{}` (service {}, profile {}, region {}, auth {})",
            request.display_command(),
            request.service,
            ctx.profile,
            ctx.region,
            ctx.auth
        );

        if self.require_credentials && !ctx.auth.is_known() {
            let err = Error::AuthResolution {
                profile: ctx.profile.clone(),
            };
            let output = AttemptOutput {
                stderr: err.to_string(),
                ..AttemptOutput::with_status(AttemptStatus::Exited(-1))
            };
            return self.finish(&ctx, started, fatal(FatalKind::Credentials), output, 0);
        }

        let policy = Tunables::from_config(&ctx.config).retry;
        if !self.limiter.acquire_cancellable(&request.service, &self.cancel) {
            let output = AttemptOutput::with_status(AttemptStatus::Interrupted);
            return self.finish(&ctx, started, fatal(FatalKind::Interrupted), output, 0);
        }

        let mut attempt: u32 = 0;
        loop {
            let output = self.backend.run(&Invocation {
                argv: &request.argv,
                env: &ctx.env,
                timeout: request.timeout,
                max_output_size: request.max_output_size,
                cancel: &self.cancel,
            });

            if output.is_success() {
                return self.finish(&ctx, started, Outcome::Success, output, attempt);
            }

            let reason = match self.classify(&output) {
                Classification::Fatal(kind) => {
                    log::debug!("Attempt {} failed fatally: {kind}", attempt + 1);
                    return self.finish(&ctx, started, fatal(kind), output, attempt);
                }
                Classification::Retryable(reason) => reason,
            };

            if attempt >= request.max_retries {
                let outcome = if reason == RetryReason::Timeout {
                    Outcome::Timeout
                } else {
                    Outcome::RetriesExhausted {
                        last_error: last_error(&output, reason),
                    }
                };
                return self.finish(&ctx, started, outcome, output, attempt);
            }

            let delay = policy.delay_for_attempt(attempt);
            self.callback
                .on_retry(attempt + 1, request.max_retries, reason, delay);
            if !self.cancel.sleep(self.clock.as_ref(), delay) {
                return self.finish(&ctx, started, fatal(FatalKind::Interrupted), output, attempt);
            }
            attempt += 1;
        }
    }

    fn classify(&self, output: &AttemptOutput) -> Classification {
        if self.cancel.is_cancelled() {
            return Classification::Fatal(FatalKind::Interrupted);
        }
        match &output.status {
            AttemptStatus::Exited(code) => retry::classify(Some(*code), None, &output.stderr),
            AttemptStatus::Signaled(signal) => retry::classify(None, Some(*signal), &output.stderr),
            AttemptStatus::TimedOut => Classification::Retryable(RetryReason::Timeout),
            AttemptStatus::Interrupted => Classification::Fatal(FatalKind::Interrupted),
            AttemptStatus::LaunchFailed(_) => Classification::Fatal(FatalKind::Launch),
        }
    }

    fn finish(
        &self,
        ctx: &ExecutionContext,
        started: Instant,
        outcome: Outcome,
        output: AttemptOutput,
        retries: u32,
    ) -> ExecutionResult {
        let hint = match &outcome {
            Outcome::FatalError { kind } => kind.hint(),
            _ => None,
        };
        let elapsed = self.clock.now().saturating_duration_since(started);
        log::debug!("Call finished: {} in {elapsed:?}", outcome.label());

        let stderr = match output.status {
            AttemptStatus::LaunchFailed(message) if output.stderr.is_empty() => message,
            _ => output.stderr,
        };

        ExecutionResult {
            outcome,
            stdout: output.stdout,
            stderr,
            elapsed,
            retries,
            output_truncated: output.truncated,
            hint,
            region: ctx.region.clone(),
            profile: ctx.profile.clone(),
            auth: ctx.auth.clone(),
        }
    }

    fn rebuild_limits(&mut self) {
        let rates = self.tunables(None).rate_limits;
        self.limiter = RateLimiter::with_clock(rates, self.clock.clone());
    }
}

fn fatal(kind: FatalKind) -> Outcome {
    Outcome::FatalError { kind }
}

fn last_error(output: &AttemptOutput, reason: RetryReason) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        reason.description().to_string()
    } else {
        stderr.to_string()
    }
}
