//! # awskit
//!
//! Pure Rust execution engine for AWS CLI calls.
//!
//! This crate provides functionality for:
//! - Loading layered `KEY=VALUE` configuration per profile, environment and service
//! - Detecting how the AWS CLI will authenticate
//! - Resolving the effective region
//! - Per-service rate limiting
//! - Running the CLI with timeouts, bounded output and classified retries
//!
//! ## Example
//!
//! ```no_run
//! use awskit::{ConfigResolver, ConfigSources, EnvSnapshot, Executor, ProfileSource};
//! use std::path::Path;
//!
//! let resolver = ConfigResolver::new(ConfigSources::in_dir(Path::new("/etc/awsctl")));
//! let profile = resolver
//!     .load_profile("default", ProfileSource::Fallback)
//!     .expect("Failed to load configuration");
//!
//! let executor = Executor::new(profile, EnvSnapshot::capture());
//! let request = executor.request("sts", ["aws", "sts", "get-caller-identity"]);
//!
//! let result = executor.execute(&request);
//! if let Some(diagnostic) = result.diagnostic() {
//!     eprintln!("{diagnostic}");
//! }
//! ```
//!
//! ## Retry Logic
//!
//! Failed attempts are classified from the exit status and stderr. Throttling,
//! network and service-side errors are retried with exponential backoff;
//! credential, permission and unrecognised errors stop immediately.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod cancel;
pub mod clock;
pub mod config;
pub mod context;
pub mod credentials;
pub mod env;
pub mod error;
pub mod executor;
pub mod metadata;
pub mod rate_limit;
pub mod region;
pub mod retry;
pub mod shared_config;
pub mod types;

pub use cancel::CancelToken;
pub use config::{
    ConfigLayer, ConfigResolver, ConfigSources, MergedConfig, Profile, ProfileSource, Tunables,
};
pub use context::ExecutionContext;
pub use credentials::CredentialResolver;
pub use env::EnvSnapshot;
pub use error::{Error, FatalKind, Result};
pub use executor::Executor;
pub use rate_limit::{RateLimiter, RateLimits};
pub use region::{RegionResolver, RegionSource};
pub use shared_config::SharedConfig;
pub use types::{AuthMethod, ExecutionRequest, ExecutionResult, Outcome};
