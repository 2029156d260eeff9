//! Centralized path resolution for awsctl
//!
//! # Environment Variables
//!
//! - `AWSCTL_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/awsctl`)
//! - `AWSCTL_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `AWSCTL_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/awsctl` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\awsctl`
//!    - macOS/Linux: `~/.config/awsctl`
//!
//! For state_dir():
//! 1. `AWSCTL_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/awsctl` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\awsctl`
//!    - macOS/Linux: `~/.local/state/awsctl`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "AWSCTL_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "AWSCTL_STATE_DIR";

const APP_DIR: &str = "awsctl";

/// Get the awsctl config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Some(path) = env_override(ENV_CONFIG_DIR) {
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Some(xdg_config) = non_empty_var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join(APP_DIR));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the awsctl state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Some(path) = env_override(ENV_STATE_DIR) {
        log::debug!("Using state dir from {ENV_STATE_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Some(xdg_state) = non_empty_var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP_DIR);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            return Ok(local_app_data.join(APP_DIR));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join(APP_DIR);
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

fn env_override(key: &str) -> Option<PathBuf> {
    non_empty_var(key).map(|dir| expand(&dir))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
