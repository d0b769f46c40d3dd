//! Wiring of storage, configuration and model client into a ready executor.

use std::sync::Arc;

use log::info;

use crate::config::{
    load_models_config, load_pipeline_config, ConfigResolver, Settings, ValidationReport,
};
use crate::error::{ConfigError, Result};
use crate::model::{HttpModelClient, ModelClient};
use crate::pipeline::{ExecutionState, ExecutorOptions, PipelineExecutor};
use crate::storage::{FileSystemStorage, Storage};

/// A loaded vault with its pipeline, ready to process files.
pub struct Vaultflow {
    settings: Settings,
    executor: PipelineExecutor,
}

impl Vaultflow {
    /// Loads the config files named in `settings` and connects to the HTTP model APIs.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let client: Arc<dyn ModelClient> = Arc::new(HttpModelClient::new()?);
        Self::with_client(settings, client)
    }

    /// Like [`from_settings`](Self::from_settings) with a caller-supplied model client.
    pub fn with_client(settings: Settings, client: Arc<dyn ModelClient>) -> Result<Self> {
        if !settings.vault.is_dir() {
            return Err(ConfigError::Validation {
                message: format!("vault directory {:?} does not exist", settings.vault),
            }
            .into());
        }

        let models = load_models_config(&settings.models)?;
        let pipeline = load_pipeline_config(&settings.pipeline)?;
        info!(
            "Loaded {} models and {} pipeline steps for vault {:?}",
            models.models.len(),
            pipeline.len(),
            settings.vault
        );

        let resolver = Arc::new(
            ConfigResolver::new(models, pipeline)
                .with_default_temperature(settings.processing.default_temperature),
        );
        let storage: Arc<dyn Storage> = Arc::new(FileSystemStorage::new(&settings.vault));
        let executor = PipelineExecutor::new(
            resolver,
            storage,
            client,
            Arc::new(ExecutionState::new()),
        )
        .with_options(ExecutorOptions::from(&settings.processing));

        Ok(Self { settings, executor })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    pub fn validate(&self) -> ValidationReport {
        self.executor.validate()
    }
}
