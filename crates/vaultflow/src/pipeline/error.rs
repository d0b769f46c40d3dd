use serde::Serialize;
use thiserror::Error;

use crate::error::{ConfigError, ModelError, StorageError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("Failed to render output frontmatter: {0}")]
    Frontmatter(#[from] serde_yaml::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Pipeline configuration has no steps")]
    EmptyConfiguration,

    #[error("Step '{step_id}' cannot run: {reason}")]
    UnsupportedConfiguration { step_id: String, reason: String },

    #[error("Chain cannot continue with '{path}': {reason}")]
    ChainBroken { path: String, reason: String },

    #[error("Another file is currently being processed")]
    AlreadyProcessing,

    #[error("No pipeline step watches '{0}'")]
    NoStepForFile(String),
}

/// Coarse error category reported with failed results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Configuration,
    Validation,
    FileSystem,
    Pipeline,
    Parsing,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(ConfigError::UnknownStep(_)) => ErrorKind::Pipeline,
            PipelineError::Config(_) | PipelineError::UnsupportedConfiguration { .. } => {
                ErrorKind::Configuration
            }
            PipelineError::Storage(_) => ErrorKind::FileSystem,
            PipelineError::Model(ModelError::ResponseParse(_) | ModelError::EmptyResponse)
            | PipelineError::Frontmatter(_) => ErrorKind::Parsing,
            PipelineError::Model(_) => ErrorKind::Pipeline,
            PipelineError::InvalidInput(_) => ErrorKind::Validation,
            PipelineError::EmptyConfiguration
            | PipelineError::ChainBroken { .. }
            | PipelineError::AlreadyProcessing
            | PipelineError::NoStepForFile(_) => ErrorKind::Pipeline,
        }
    }
}

/// Non-fatal problems collected while a step runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineWarning {
    ArchiveFailed { path: String, error: String },
    RoutingFallback { requested: Option<String> },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::ArchiveFailed { path, error } => {
                write!(f, "archiving '{}' failed: {}", path, error)
            }
            PipelineWarning::RoutingFallback { requested: Some(step) } => {
                write!(f, "'{}' is not a valid next step, used default output", step)
            }
            PipelineWarning::RoutingFallback { requested: None } => {
                write!(f, "no next step chosen, used default output")
            }
        }
    }
}
