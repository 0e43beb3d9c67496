//! Persisted user settings.
//!
//! Stored as pretty-printed JSON at `<config dir>/bqwizard/config.json`, or at
//! the path in `BQWIZARD_CONFIG` when that is set.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use crate::error::{BqWizardError, Result};

pub const CONFIG_ENV: &str = "BQWIZARD_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<String>,
}

impl Settings {
    pub fn project(&self) -> Option<&str> {
        Some(self.project.as_str()).filter(|p| !p.is_empty())
    }

    pub fn dataset(&self) -> Option<&str> {
        self.default_dataset.as_deref().filter(|d| !d.is_empty())
    }

    /// Reads `path`, creating it with empty settings if it does not exist yet.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Creating initial configuration file {}", path.display());
            let settings = Settings::default();
            settings.save(path)?;
            return Ok(settings);
        }

        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            BqWizardError::Config(format!("{}: {}", path.display(), e))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Location of the settings file.
pub fn config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|dir| dir.join("bqwizard").join("config.json"))
        .ok_or_else(|| BqWizardError::Config(format!(
            "Could not determine a config directory; set {}",
            CONFIG_ENV
        )))
}

/// First non-empty project out of the explicit flag and the saved settings.
pub fn resolve_project(flag: Option<&str>, settings: &Settings) -> Result<String> {
    flag.filter(|p| !p.is_empty())
        .or_else(|| settings.project())
        .map(str::to_string)
        .ok_or_else(|| BqWizardError::Config(
            "Project ID required (--project, GOOGLE_CLOUD_PROJECT or 'bqwizard config set-project')".to_string()
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_or_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let settings = Settings::load_or_init(&path).unwrap();

        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let settings = Settings {
            project: "my-proj".to_string(),
            default_dataset: Some("sales".to_string()),
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load_or_init(&path).unwrap();
        assert_eq!(loaded.project(), Some("my-proj"));
        assert_eq!(loaded.dataset(), Some("sales"));
    }

    #[test]
    fn test_missing_fields_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"project": "p"}"#).unwrap();

        let loaded = Settings::load_or_init(&path).unwrap();
        assert_eq!(loaded.project(), Some("p"));
        assert_eq!(loaded.dataset(), None);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        let err = Settings::load_or_init(&path).unwrap_err();
        assert!(matches!(err, BqWizardError::Config(_)));
    }

    #[test]
    fn test_resolve_project_order() {
        let saved = Settings {
            project: "saved".to_string(),
            default_dataset: None,
        };

        assert_eq!(resolve_project(Some("flag"), &saved).unwrap(), "flag");
        assert_eq!(resolve_project(Some(""), &saved).unwrap(), "saved");
        assert_eq!(resolve_project(None, &saved).unwrap(), "saved");
        assert!(resolve_project(None, &Settings::default()).is_err());
    }
}
