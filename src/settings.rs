use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

const SETTINGS_FILE: &str = "settings.toml";

// ============================================================================
// Settings
// ============================================================================

/// User selections persisted between invocations
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Profile used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Environment used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl Settings {
    /// Get the settings file path
    pub fn path() -> Result<PathBuf> {
        Ok(paths::state_dir()?.join(SETTINGS_FILE))
    }

    /// Load settings from the state directory
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Save settings to the state directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Settings file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        let settings: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;

        fs::write(path, &content)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;

        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load_from(&temp.path().join("settings.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("settings.toml");

        let settings = Settings {
            profile: Some("prod".to_string()),
            environment: Some("staging".to_string()),
        };
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_cleared_profile_is_omitted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");

        Settings::default().save_to(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(!content.contains("profile"));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("settings.toml");
        fs::write(&path, "profile = [").unwrap();

        let err = Settings::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings file"));
    }
}
