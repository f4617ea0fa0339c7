use crate::errors::{HistogramError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Parallelism
    /// Process the frames of a batch on the rayon pool
    pub parallel_frames: bool,
    /// Frames with more pixels than this are binned in parallel row tiles
    pub parallel_tile_threshold: u64,

    // Memory
    pub pool_limit_mb: usize,

    // Logging
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallel_frames: true,
            parallel_tile_threshold: 1_000_000,
            pool_limit_mb: 256,
            debug_logging: false,
        }
    }
}

impl Settings {
    /// Default location: `<config dir>/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "framehist", "framehist")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Loads from the default location, falling back to defaults
    pub fn load() -> Self {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                match Self::load_from(&path) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!("Ignoring settings at {}: {}", path.display(), e),
                }
            }
        }
        Self::default()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_limit_mb == 0 {
            return Err(HistogramError::SettingsError {
                message: "pool_limit_mb must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings {
            parallel_frames: false,
            parallel_tile_threshold: 42,
            pool_limit_mb: 8,
            debug_logging: true,
        };
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "parallel_frames": false }"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert!(!settings.parallel_frames);
        assert_eq!(settings.pool_limit_mb, Settings::default().pool_limit_mb);
    }

    #[test]
    fn test_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load_from(&path).unwrap_err().error_code(), "JSON_ERROR");

        std::fs::write(&path, r#"{ "pool_limit_mb": 0 }"#).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap_err().error_code(), "SETTINGS_ERROR");

        assert_eq!(
            Settings::load_from(&dir.path().join("absent.json")).unwrap_err().error_code(),
            "IO_ERROR"
        );
    }
}
