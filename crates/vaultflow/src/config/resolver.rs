use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use secrecy::SecretString;
use serde::Serialize;

use crate::config::schema::{
    ExecutionPath, Implementation, ModelConfig, ModelsConfig, OutputTarget, PipelineConfiguration,
    PipelineStep,
};
use crate::error::ConfigError;
use crate::path as vpath;
use crate::secrets::{self, SecretSource};

pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// A model config with its key resolved and implementation checked.
#[derive(Debug)]
pub struct ResolvedModel {
    pub id: String,
    pub model: String,
    /// Empty when no key source is configured; checked before a step runs.
    pub api_key: SecretString,
    pub base_url: Option<String>,
    pub organization: Option<String>,
    pub implementation: Implementation,
    pub temperature: f32,
}

impl ResolvedModel {
    pub fn has_api_key(&self) -> bool {
        !secrets::is_blank(&self.api_key)
    }
}

/// A pipeline step joined with its resolved model.
#[derive(Debug)]
pub struct ResolvedPipelineStep {
    pub id: String,
    pub step: PipelineStep,
    pub model: ResolvedModel,
}

impl ResolvedPipelineStep {
    /// Routing keys of the step's output; empty for simple outputs.
    pub fn available_next_steps(&self) -> Vec<String> {
        self.step.output.next_steps().map(str::to_string).collect()
    }
}

/// Outcome of a whole-configuration check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub models_errors: Vec<String>,
    pub pipeline_errors: Vec<String>,
    pub cross_ref_errors: Vec<String>,
    pub output_routing_errors: Vec<String>,
    pub warnings: Vec<String>,
    pub entry_points: Vec<String>,
}

impl ValidationReport {
    pub fn errors(&self) -> impl Iterator<Item = &String> {
        self.models_errors
            .iter()
            .chain(&self.pipeline_errors)
            .chain(&self.cross_ref_errors)
            .chain(&self.output_routing_errors)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }
}

/// Read-only view over the models and pipeline configs.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    models: Arc<ModelsConfig>,
    pipeline: Arc<PipelineConfiguration>,
    default_temperature: f32,
}

impl ConfigResolver {
    pub fn new(models: ModelsConfig, pipeline: PipelineConfiguration) -> Self {
        Self {
            models: Arc::new(models),
            pipeline: Arc::new(pipeline),
            default_temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_default_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    pub fn models(&self) -> &ModelsConfig {
        &self.models
    }

    pub fn pipeline(&self) -> &PipelineConfiguration {
        &self.pipeline
    }

    pub fn resolve_step(&self, step_id: &str) -> Result<ResolvedPipelineStep, ConfigError> {
        let step = self
            .pipeline
            .get(step_id)
            .ok_or_else(|| ConfigError::UnknownStep(step_id.to_string()))?;

        if self.models.get(&step.model_config).is_none() {
            return Err(ConfigError::UnknownModel {
                step: step_id.to_string(),
                model: step.model_config.clone(),
            });
        }
        let model = self.resolve_model(&step.model_config)?;

        Ok(ResolvedPipelineStep {
            id: step_id.to_string(),
            step: step.clone(),
            model,
        })
    }

    pub fn resolve_model(&self, model_id: &str) -> Result<ResolvedModel, ConfigError> {
        let config = self
            .models
            .get(model_id)
            .ok_or_else(|| ConfigError::UnknownModel {
                step: String::new(),
                model: model_id.to_string(),
            })?;

        let implementation = config.implementation.parse::<Implementation>().map_err(|_| {
            ConfigError::UnsupportedImplementation {
                model: model_id.to_string(),
                implementation: config.implementation.clone(),
            }
        })?;

        let api_key = key_source(config)
            .resolve_optional()
            .map_err(|e| ConfigError::Secret {
                model: model_id.to_string(),
                source: e,
            })?
            .unwrap_or_else(|| SecretString::from(String::new()));

        Ok(ResolvedModel {
            id: model_id.to_string(),
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            organization: config.organization.clone(),
            implementation,
            temperature: config.temperature.unwrap_or(self.default_temperature),
        })
    }

    pub fn available_next_steps(&self, step_id: &str) -> Result<Vec<String>, ConfigError> {
        let step = self
            .pipeline
            .get(step_id)
            .ok_or_else(|| ConfigError::UnknownStep(step_id.to_string()))?;
        Ok(step.output.next_steps().map(str::to_string).collect())
    }

    /// Checks both configs and their cross-references without touching the vault.
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        self.validate_models(&mut report);
        self.validate_steps(&mut report);

        for cycle in find_routing_cycles(&self.pipeline) {
            report
                .pipeline_errors
                .push(format!("Routing cycle detected: {}", cycle.join(" -> ")));
        }

        report.entry_points = crate::discovery::find_entry_points(&self.pipeline).unwrap_or_default();
        if !self.pipeline.is_empty() && report.entry_points.is_empty() {
            report
                .warnings
                .push("No entry points: every step is the target of another step's routing".into());
        }

        report.is_valid = report.error_count() == 0;
        report
    }

    fn validate_models(&self, report: &mut ValidationReport) {
        let referenced: BTreeSet<&str> = self
            .pipeline
            .iter()
            .map(|(_, step)| step.model_config.as_str())
            .collect();

        for (id, model) in &self.models.models {
            if model.model.trim().is_empty() {
                report
                    .models_errors
                    .push(format!("Model config '{}': model name is required", id));
            }
            if model.implementation.parse::<Implementation>().is_err() {
                report.models_errors.push(format!(
                    "Model config '{}': unsupported implementation '{}' (expected whisper, chatgpt or claude)",
                    id, model.implementation
                ));
            }
            if let Some(t) = model.temperature {
                if !(0.0..=2.0).contains(&t) {
                    report.models_errors.push(format!(
                        "Model config '{}': temperature {} is outside 0.0..=2.0",
                        id, t
                    ));
                }
            }

            if !referenced.contains(id.as_str()) {
                report
                    .warnings
                    .push(format!("Model config '{}' is not used by any step", id));
                continue;
            }

            match key_source(model).resolve_optional() {
                Ok(Some(key)) if !secrets::is_blank(&key) => {}
                Ok(_) => report
                    .models_errors
                    .push(format!("Model config '{}': API key is missing", id)),
                Err(e) => report
                    .models_errors
                    .push(format!("Model config '{}': {}", id, e)),
            }
        }
    }

    fn validate_steps(&self, report: &mut ValidationReport) {
        if self.pipeline.is_empty() {
            report
                .pipeline_errors
                .push("Pipeline has no steps".to_string());
            return;
        }

        for (id, step) in self.pipeline.iter() {
            check_pattern(report, id, "input", &step.input);
            check_pattern(report, id, "archive", &step.archive);
            for pattern in step.output.patterns() {
                check_pattern(report, id, "output", pattern);
            }
            for prompt in &step.prompts {
                check_pattern(report, id, "prompt", prompt);
            }
            for context in &step.context {
                check_pattern(report, id, "context", context);
            }

            if let (Ok(input), Ok(archive)) =
                (vpath::normalize(&step.input), vpath::normalize(&step.archive))
            {
                if !input.is_empty() && input == archive {
                    report.pipeline_errors.push(format!(
                        "Step '{}': archive directory must differ from input directory",
                        id
                    ));
                }
            }

            match self.models.get(&step.model_config) {
                None => report.cross_ref_errors.push(format!(
                    "Step '{}' references unknown model config '{}'",
                    id, step.model_config
                )),
                Some(model) => {
                    if let Ok(implementation) = model.implementation.parse::<Implementation>() {
                        match implementation.execution_path() {
                            ExecutionPath::Chat if step.prompts.is_empty() => {
                                report.warnings.push(format!(
                                    "Step '{}' has no prompts; the model only sees the input",
                                    id
                                ))
                            }
                            ExecutionPath::Transcription if !step.prompts.is_empty() => {
                                report.warnings.push(format!(
                                    "Step '{}' uses a transcription model; its prompts are ignored",
                                    id
                                ))
                            }
                            _ => {}
                        }
                    }
                }
            }

            self.validate_routes(report, id, &step.output);
        }
    }

    fn validate_routes(&self, report: &mut ValidationReport, step_id: &str, output: &OutputTarget) {
        let OutputTarget::Routed { routes, default } = output else {
            return;
        };

        if default.trim().is_empty() {
            report.output_routing_errors.push(format!(
                "Step '{}': routing-aware output needs a non-empty default directory",
                step_id
            ));
        }

        for (key, directory) in routes {
            let Some(target) = self.pipeline.get(key) else {
                report.output_routing_errors.push(format!(
                    "Step '{}': routing key '{}' does not name a pipeline step",
                    step_id, key
                ));
                continue;
            };

            if let (Ok(route_dir), Ok(target_input)) =
                (vpath::normalize(directory), vpath::normalize(&target.input))
            {
                if route_dir != target_input {
                    report.warnings.push(format!(
                        "Step '{}': route '{}' writes to '{}' but step '{}' reads '{}'",
                        step_id, key, directory, key, target.input
                    ));
                }
            }
        }
    }
}

fn key_source(model: &ModelConfig) -> SecretSource<'_> {
    SecretSource::new(
        model.api_key.as_deref(),
        model.api_key_file.as_deref(),
        model.api_key_env.as_deref(),
    )
}

fn check_pattern(report: &mut ValidationReport, step_id: &str, field: &str, pattern: &str) {
    if pattern.trim().is_empty() && field != "output" {
        report
            .pipeline_errors
            .push(format!("Step '{}': {} path is required", step_id, field));
        return;
    }
    if let Err(e) = vpath::normalize(pattern) {
        report
            .pipeline_errors
            .push(format!("Step '{}': invalid {} path: {}", step_id, field, e));
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Finds cycles in the graph formed by routing keys. Each cycle is returned
/// as the list of step ids along it, ending with the step it started from.
pub fn find_routing_cycles(pipeline: &PipelineConfiguration) -> Vec<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = pipeline
        .step_ids()
        .map(|id| (id, Mark::Unvisited))
        .collect();
    let mut cycles = Vec::new();

    for id in pipeline.step_ids() {
        if marks.get(id) == Some(&Mark::Unvisited) {
            let mut stack = Vec::new();
            visit(pipeline, id, &mut marks, &mut stack, &mut cycles);
        }
    }

    cycles
}

fn visit<'a>(
    pipeline: &'a PipelineConfiguration,
    id: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
    cycles: &mut Vec<Vec<String>>,
) {
    marks.insert(id, Mark::InProgress);
    stack.push(id);

    if let Some(step) = pipeline.get(id) {
        for next in step.output.next_steps() {
            match marks.get(next).copied() {
                Some(Mark::Unvisited) => visit(pipeline, next, marks, stack, cycles),
                Some(Mark::InProgress) => {
                    let start = stack.iter().position(|s| *s == next).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(next.to_string());
                    cycles.push(cycle);
                }
                _ => {}
            }
        }
    }

    stack.pop();
    marks.insert(id, Mark::Done);
}
