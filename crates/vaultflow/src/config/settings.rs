use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::loader::load_file;
use crate::error::ConfigError;

pub const SETTINGS_FILE_NAME: &str = "settings.yaml";

/// Top-level settings file that points at the vault and the two config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub vault: PathBuf,
    #[serde(default = "default_models_path")]
    pub models: PathBuf,
    #[serde(default = "default_pipeline_path")]
    pub pipeline: PathBuf,
    #[serde(default)]
    pub processing: ProcessingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

fn default_models_path() -> PathBuf {
    PathBuf::from("models.yaml")
}

fn default_pipeline_path() -> PathBuf {
    PathBuf::from("pipeline.yaml")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSettings {
    /// Continue into the next step after a successful one.
    #[serde(default = "default_true")]
    pub follow_chain: bool,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
    /// Used for model configs without their own temperature.
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> usize {
    100
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            follow_chain: true,
            max_iterations: default_max_iterations(),
            continue_on_error: true,
            default_temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Settings {
    /// Makes relative paths relative to `base` instead of the working directory.
    pub fn resolve_relative_to(mut self, base: &Path) -> Self {
        let anchor = |path: PathBuf| {
            let expanded = PathBuf::from(crate::secrets::expand_home(&path.to_string_lossy()));
            if expanded.is_absolute() {
                expanded
            } else {
                base.join(expanded)
            }
        };
        self.vault = anchor(self.vault);
        self.models = anchor(self.models);
        self.pipeline = anchor(self.pipeline);
        self
    }
}

/// Loads a settings file; relative paths inside it are anchored at its directory.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let settings: Settings = load_file(path)?;

    if settings.processing.max_iterations == 0 {
        return Err(ConfigError::Validation {
            message: "processing.maxIterations must be at least 1".to_string(),
        });
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(settings.resolve_relative_to(base))
}

/// `<config dir>/vaultflow/settings.yaml`, if the platform has a config dir.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vaultflow").join(SETTINGS_FILE_NAME))
}
