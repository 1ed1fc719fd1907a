use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fatigue_core::shared::constants::{
    DEFAULT_CLASS_NAMES, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_DB_PATH, DEFAULT_DISPLAY_HEIGHT,
    DEFAULT_DISPLAY_WIDTH, DEFAULT_MODEL_PATH, DEFAULT_NMS_THRESHOLD, DEFAULT_SAVE_INTERVAL_MS,
};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to access settings at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid settings in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

/// Persistent monitor settings. Keys missing from the file take their
/// default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_path: PathBuf,
    pub db_path: PathBuf,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub save_interval_ms: u64,
    pub display_width: u32,
    pub display_height: u32,
    pub class_names: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            save_interval_ms: DEFAULT_SAVE_INTERVAL_MS,
            display_width: DEFAULT_DISPLAY_WIDTH,
            display_height: DEFAULT_DISPLAY_HEIGHT,
            class_names: DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Settings {
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|d| d.join("FatigueMonitor").join("config.json"))
            .ok_or(SettingsError::NoConfigDir)
    }

    /// Reads `path`, writing the defaults there first if it does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            let settings = Self::default();
            settings.save(path)?;
            log::info!("Created default settings at {}", path.display());
            return Ok(settings);
        }
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&json).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    pub fn display_size(&self) -> Option<(u32, u32)> {
        (self.display_width > 0 && self.display_height > 0)
            .then_some((self.display_width, self.display_height))
    }
}
