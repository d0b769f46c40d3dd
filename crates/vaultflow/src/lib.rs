pub mod app;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod model;
pub mod path;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod storage;

pub use app::Vaultflow;
pub use config::{
    load_settings, ConfigResolver, ModelsConfig, OutputTarget, PipelineConfiguration,
    PipelineStep, Settings, ValidationReport,
};
pub use discovery::{DiscoveryOptions, FileDiscovery, FileInfo};
pub use error::{ConfigError, ModelError, Result, StorageError, VaultflowError};
pub use logging::init_tracing;
pub use model::{ModelClient, StructuredRequest, StructuredResponse};
pub use pipeline::{
    BatchRun, ExecutionState, PipelineError, PipelineExecutor, ProcessingResult, ProcessingStatus,
};
pub use secrets::SecretError;
pub use storage::{FileSystemStorage, Storage};
