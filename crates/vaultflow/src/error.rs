use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultflowError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config file format '{0}' (expected .json, .yaml or .yml)")]
    UnsupportedFormat(PathBuf),

    #[error("Unknown pipeline step '{0}'")]
    UnknownStep(String),

    #[error("Step '{step}' references unknown model config '{model}'")]
    UnknownModel { step: String, model: String },

    #[error("Model config '{model}' has unsupported implementation '{implementation}'")]
    UnsupportedImplementation {
        model: String,
        implementation: String,
    },

    #[error("Model config '{model}' has no API key")]
    MissingApiKey { model: String },

    #[error("Failed to resolve API key for model config '{model}': {source}")]
    Secret {
        model: String,
        #[source]
        source: crate::secrets::SecretError,
    },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Unsafe path '{path}': {reason}")]
    UnsafePath { path: String, reason: String },

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Path is a directory: {0}")]
    IsDirectory(String),

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read metadata for '{path}': {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File already exists: {0}")]
    FileExists(String),
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Failed to parse model response: {0}")]
    ResponseParse(String),

    #[error("Unsupported model operation: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, VaultflowError>;
