use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::context::{ProcessingContext, RoutingDecision};
use super::error::{ErrorKind, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
    Skipped,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProcessingStatus::Pending => "PENDING",
            ProcessingStatus::Completed => "COMPLETED",
            ProcessingStatus::Failed => "FAILED",
            ProcessingStatus::Skipped => "SKIPPED",
        };
        f.write_str(label)
    }
}

/// Outcome of processing one file. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    input_file: String,
    status: ProcessingStatus,
    output_files: Vec<String>,
    archive_path: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    step_id: Option<String>,
    next_step: Option<String>,
    error: Option<String>,
    error_kind: Option<ErrorKind>,
    routing_decision: Option<RoutingDecision>,
    warnings: Vec<String>,
}

impl ProcessingResult {
    /// A finished step, built from its context.
    pub fn completed(ctx: &ProcessingContext) -> Self {
        Self {
            input_file: ctx.input_path.clone(),
            status: ProcessingStatus::Completed,
            output_files: ctx.output_files.clone(),
            archive_path: ctx.archive_path.clone(),
            start_time: ctx.timestamp,
            end_time: Utc::now(),
            step_id: Some(ctx.step_id.clone()),
            next_step: ctx.next_step.clone(),
            error: None,
            error_kind: None,
            routing_decision: ctx.routing_decision.clone(),
            warnings: ctx.warnings.iter().map(|w| w.to_string()).collect(),
        }
    }

    pub fn failed(
        input_file: impl Into<String>,
        step_id: Option<String>,
        error: &PipelineError,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            input_file: input_file.into(),
            status: ProcessingStatus::Failed,
            output_files: Vec::new(),
            archive_path: None,
            start_time,
            end_time: Utc::now(),
            step_id,
            next_step: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            routing_decision: None,
            warnings: Vec::new(),
        }
    }

    /// Nothing to do. Not an error.
    pub fn skipped() -> Self {
        let now = Utc::now();
        Self {
            input_file: String::new(),
            status: ProcessingStatus::Skipped,
            output_files: Vec::new(),
            archive_path: None,
            start_time: now,
            end_time: now,
            step_id: None,
            next_step: None,
            error: None,
            error_kind: None,
            routing_decision: None,
            warnings: Vec::new(),
        }
    }

    pub fn input_file(&self) -> &str {
        &self.input_file
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn output_files(&self) -> &[String] {
        &self.output_files
    }

    pub fn archive_path(&self) -> Option<&str> {
        self.archive_path.as_deref()
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    pub fn step_id(&self) -> Option<&str> {
        self.step_id.as_deref()
    }

    pub fn next_step(&self) -> Option<&str> {
        self.next_step.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn routing_decision(&self) -> Option<&RoutingDecision> {
        self.routing_decision.as_ref()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProcessingStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == ProcessingStatus::Failed
    }
}
