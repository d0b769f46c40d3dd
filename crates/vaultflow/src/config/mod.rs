pub mod loader;
pub mod resolver;
pub mod schema;
pub mod settings;

pub use loader::{
    load_models_config, load_pipeline_config, parse_models_config, parse_pipeline_config,
    ConfigFormat,
};
pub use resolver::{
    find_routing_cycles, ConfigResolver, ResolvedModel, ResolvedPipelineStep, ValidationReport,
};
pub use schema::{
    ExecutionPath, Implementation, ModelConfig, ModelsConfig, OutputTarget, PipelineConfiguration,
    PipelineStep, DEFAULT_ROUTE,
};
pub use settings::{
    default_settings_path, load_settings, LoggingSettings, ProcessingSettings, Settings,
};
