use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::{ConfigResolver, ExecutionPath, ResolvedPipelineStep};
use crate::discovery::FileInfo;
use crate::error::{ConfigError, ModelError, StorageError};
use crate::model::{ModelClient, ResponseSection, StructuredResponse, TranscriptionRequest};
use crate::path as vpath;
use crate::sanitize::redact_path;
use crate::storage::{Storage, WriteOptions};

use super::context::{ProcessingContext, RoutingDecision};
use super::error::{PipelineError, PipelineWarning};
use super::output::{self, OutputFrontmatter, PIPELINE_TAG};
use super::prompt::{self, ReferenceFile};
use super::result::ProcessingResult;

/// Runs a single pipeline step on a single file.
pub struct StepExecutor {
    resolver: Arc<ConfigResolver>,
    storage: Arc<dyn Storage>,
    client: Arc<dyn ModelClient>,
}

impl StepExecutor {
    pub fn new(
        resolver: Arc<ConfigResolver>,
        storage: Arc<dyn Storage>,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            resolver,
            storage,
            client,
        }
    }

    /// Processes `file` with `step_id`: call the model, archive the input,
    /// write the outputs. Errors before archiving leave the input in place.
    pub async fn execute(
        &self,
        step_id: &str,
        file: &FileInfo,
    ) -> Result<ProcessingResult, PipelineError> {
        let span = info_span!("step", step_id = %step_id, file = %redact_path(&file.path));
        self.run(step_id, file).instrument(span).await
    }

    async fn run(&self, step_id: &str, file: &FileInfo) -> Result<ProcessingResult, PipelineError> {
        if step_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("step id is empty".into()));
        }
        if file.path.trim().is_empty() {
            return Err(PipelineError::InvalidInput("file path is empty".into()));
        }

        let step = self.resolver.resolve_step(step_id)?;
        if !step.model.has_api_key() {
            return Err(ConfigError::MissingApiKey {
                model: step.model.id.clone(),
            }
            .into());
        }

        let mut ctx = ProcessingContext::new(step_id, file);

        // Step 1: model call
        let response = match (step.model.implementation.execution_path(), file.is_audio()) {
            (ExecutionPath::Transcription, true) => self.transcribe(&step, file).await?,
            (ExecutionPath::Transcription, false) => {
                return Err(PipelineError::UnsupportedConfiguration {
                    step_id: step_id.to_string(),
                    reason: format!(
                        "{} model '{}' only accepts audio, got '.{}'",
                        step.model.implementation, step.model.id, file.extension
                    ),
                })
            }
            (ExecutionPath::Chat, _) => self.chat(&step, file).await?,
        };
        debug!(sections = response.sections.len(), "Model returned response");

        // Step 2: archive (best effort)
        self.archive_input(&step, file, &mut ctx).await;

        // Step 3: outputs
        self.write_outputs(&step, &response, &mut ctx).await?;

        // Step 4: routing
        self.decide_next_step(&step, &response, &mut ctx);

        info!(
            outputs = ctx.output_files.len(),
            next_step = ctx.next_step.as_deref().unwrap_or("-"),
            "Step completed"
        );
        Ok(ProcessingResult::completed(&ctx))
    }

    async fn transcribe(
        &self,
        step: &ResolvedPipelineStep,
        file: &FileInfo,
    ) -> Result<StructuredResponse, PipelineError> {
        let audio = self.storage.read_bytes(&file.path).await?;
        let request = TranscriptionRequest {
            filename: file.name.clone(),
            mime_type: file.mime_type.clone(),
            audio,
        };

        let transcript = self.client.transcribe(&step.model, &request).await?;
        if transcript.trim().is_empty() {
            return Err(ModelError::EmptyResponse.into());
        }
        Ok(StructuredResponse::single(ResponseSection::new(
            file.stem(),
            transcript,
        )))
    }

    async fn chat(
        &self,
        step: &ResolvedPipelineStep,
        file: &FileInfo,
    ) -> Result<StructuredResponse, PipelineError> {
        let mut prompts = Vec::with_capacity(step.step.prompts.len());
        for path in &step.step.prompts {
            prompts.push(self.storage.read_file(path).await?);
        }

        let mut context = Vec::with_capacity(step.step.context.len());
        for path in &step.step.context {
            context.push(ReferenceFile {
                path: path.clone(),
                content: self.storage.read_file(path).await?,
            });
        }

        let input = self.storage.read_file(&file.path).await?;
        let request = prompt::build_structured_request(
            &prompts,
            &context,
            &file.name,
            &input,
            &step.available_next_steps(),
            step.model.temperature,
        );

        Ok(self
            .client
            .process_structured_request(&step.model, &request)
            .await?)
    }

    async fn archive_input(
        &self,
        step: &ResolvedPipelineStep,
        file: &FileInfo,
        ctx: &mut ProcessingContext,
    ) {
        match self.try_archive(step, file).await {
            Ok(archived) => {
                debug!(archive = %archived, "Archived input");
                ctx.archive_path = Some(archived);
            }
            Err(e) => {
                warn!(error = %e, "Archiving failed, keeping input in place");
                ctx.warnings.push(PipelineWarning::ArchiveFailed {
                    path: file.path.clone(),
                    error: e.to_string(),
                });
                ctx.archive_path = Some(file.path.clone());
            }
        }
    }

    async fn try_archive(
        &self,
        step: &ResolvedPipelineStep,
        file: &FileInfo,
    ) -> Result<String, StorageError> {
        let directory = vpath::normalize(&step.step.archive)?;
        let target = self
            .storage
            .unique_path(&vpath::join(&directory, &file.name))
            .await?;
        self.storage.move_file(&file.path, &target).await?;
        Ok(target)
    }

    async fn write_outputs(
        &self,
        step: &ResolvedPipelineStep,
        response: &StructuredResponse,
        ctx: &mut ProcessingContext,
    ) -> Result<(), PipelineError> {
        let multi = response.sections.len() > 1;

        for section in &response.sections {
            let (location, chosen) =
                output::resolve_location(&step.step.output, section.next_step.as_deref());
            let location = if multi {
                location.into_directory()
            } else {
                location
            };

            let filename = output::resolve_output_filename(&section.filename, &ctx.input_path);
            let path = vpath::normalize(&location.path_for(&filename))?;
            let path = self.storage.unique_path(&path).await?;

            let frontmatter = OutputFrontmatter {
                source: ctx.source_path().to_string(),
                processed: ctx.processed_timestamp(),
                step: ctx.step_id.clone(),
                next_step: chosen,
                pipeline: PIPELINE_TAG.to_string(),
            };
            let document = frontmatter.render(&section.content)?;

            self.storage
                .write_file(&path, &document, WriteOptions::default())
                .await?;
            info!(output = %redact_path(&path), "Wrote output");
            ctx.output_files.push(path);
        }

        ctx.output_path = ctx.output_files.first().cloned();
        Ok(())
    }

    fn decide_next_step(
        &self,
        step: &ResolvedPipelineStep,
        response: &StructuredResponse,
        ctx: &mut ProcessingContext,
    ) {
        if !step.step.output.is_routed() {
            return;
        }

        let available = step.available_next_steps();
        let requested = response
            .sections
            .iter()
            .find_map(|s| s.next_step.clone());
        let chosen = response
            .sections
            .iter()
            .filter_map(|s| s.next_step.as_deref())
            .find(|next| available.iter().any(|a| a == next))
            .map(str::to_string);

        if chosen.is_none() {
            info!(
                requested = requested.as_deref().unwrap_or("-"),
                "No valid next step, used default fallback"
            );
            ctx.warnings.push(PipelineWarning::RoutingFallback {
                requested: requested.clone(),
            });
        }

        ctx.next_step = chosen.clone();
        ctx.routing_decision = Some(RoutingDecision {
            requested,
            fallback_used: chosen.is_none(),
            chosen,
            available,
        });
    }
}
