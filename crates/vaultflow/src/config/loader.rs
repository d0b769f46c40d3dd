use std::path::{Path, PathBuf};

use log::debug;
use serde::de::DeserializeOwned;

use crate::config::schema::{ModelsConfig, PipelineConfiguration};
use crate::error::ConfigError;

/// Serialization format of a config file, picked from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match extension.as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

pub fn load_models_config<P: AsRef<Path>>(path: P) -> Result<ModelsConfig, ConfigError> {
    load_file(path.as_ref())
}

pub fn load_pipeline_config<P: AsRef<Path>>(
    path: P,
) -> Result<PipelineConfiguration, ConfigError> {
    load_file(path.as_ref())
}

pub fn parse_models_config(content: &str, format: ConfigFormat) -> Result<ModelsConfig, ConfigError> {
    parse_str(content, format, Path::new("<inline>"))
}

pub fn parse_pipeline_config(
    content: &str,
    format: ConfigFormat,
) -> Result<PipelineConfiguration, ConfigError> {
    parse_str(content, format, Path::new("<inline>"))
}

pub(crate) fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    debug!("Loaded config file {:?} ({} bytes)", path, content.len());
    parse_str(&content, format, path)
}

fn parse_str<T: DeserializeOwned>(
    content: &str,
    format: ConfigFormat,
    origin: &Path,
) -> Result<T, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: PathBuf::from(origin),
        message,
    };

    match format {
        ConfigFormat::Json => serde_json::from_str(content).map_err(|e| parse_error(e.to_string())),
        ConfigFormat::Yaml => serde_yaml::from_str(content).map_err(|e| parse_error(e.to_string())),
    }
}
