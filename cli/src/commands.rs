//! Command handlers. Each prints its outcome and returns whether it succeeded.

use serde::Serialize;
use tracing::warn;

use vaultflow::discovery;
use vaultflow::{PipelineError, ProcessingResult, ProcessingStatus, ValidationReport, Vaultflow};

/// Envelope printed in `--json` mode.
#[derive(Debug, Serialize)]
pub struct Response<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    fn print(&self) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("failed to encode response: {e}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Success,
    Info,
    Error,
}

/// One human-readable line of command output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Notice {
    level: Level,
    message: String,
}

impl Notice {
    fn print(&self) {
        match self.level {
            Level::Success => println!("✓ {}", self.message),
            Level::Info => println!("  {}", self.message),
            Level::Error => eprintln!("✗ {}", self.message),
        }
    }
}

impl From<&ProcessingResult> for Notice {
    fn from(result: &ProcessingResult) -> Self {
        match result.status() {
            ProcessingStatus::Completed => {
                let mut message = format!(
                    "{} -> {}",
                    result.input_file(),
                    result.output_files().join(", ")
                );
                if let Some(next) = result.next_step() {
                    message.push_str(&format!(" (next: {next})"));
                }
                Notice {
                    level: Level::Success,
                    message,
                }
            }
            ProcessingStatus::Skipped | ProcessingStatus::Pending => Notice {
                level: Level::Info,
                message: "No files waiting".to_string(),
            },
            ProcessingStatus::Failed => Notice {
                level: Level::Error,
                message: format!(
                    "{}: {}",
                    result.input_file(),
                    result.error().unwrap_or("unknown error")
                ),
            },
        }
    }
}

impl From<&PipelineError> for Notice {
    fn from(error: &PipelineError) -> Self {
        Notice {
            level: Level::Error,
            message: error.to_string(),
        }
    }
}

fn print_warnings(result: &ProcessingResult) {
    for warning in result.warnings() {
        Notice {
            level: Level::Info,
            message: format!("warning: {warning}"),
        }
        .print();
    }
}

fn report_result(outcome: Result<ProcessingResult, PipelineError>, json: bool) -> bool {
    match outcome {
        Ok(result) => {
            let success = !result.is_failed();
            if json {
                Response {
                    success,
                    error: result.error().map(str::to_string),
                    data: Some(&result),
                }
                .print();
            } else {
                Notice::from(&result).print();
                print_warnings(&result);
            }
            success
        }
        Err(e) => {
            if json {
                Response::<()>::err(e.to_string()).print();
            } else {
                Notice::from(&e).print();
            }
            false
        }
    }
}

fn print_report(report: &ValidationReport) {
    for error in report.errors() {
        Notice {
            level: Level::Error,
            message: error.clone(),
        }
        .print();
    }
    for warning in &report.warnings {
        Notice {
            level: Level::Info,
            message: format!("warning: {warning}"),
        }
        .print();
    }
}

pub fn validate(app: &Vaultflow, json: bool) -> bool {
    let report = app.validate();
    if json {
        Response {
            success: report.is_valid,
            data: Some(&report),
            error: None,
        }
        .print();
        return report.is_valid;
    }

    print_report(&report);
    if report.is_valid {
        Notice {
            level: Level::Success,
            message: format!(
                "Configuration is valid (entry points: {})",
                report.entry_points.join(", ")
            ),
        }
        .print();
    } else {
        Notice {
            level: Level::Error,
            message: format!("{} configuration error(s)", report.error_count()),
        }
        .print();
    }
    report.is_valid
}

/// Runs validation and prints it only when it fails.
pub fn ensure_valid(app: &Vaultflow, json: bool) -> bool {
    let report = app.validate();
    if report.is_valid {
        for warning in &report.warnings {
            warn!("{}", warning);
        }
        return true;
    }

    if json {
        Response {
            success: false,
            data: Some(&report),
            error: Some("configuration is invalid".to_string()),
        }
        .print();
    } else {
        print_report(&report);
        Notice {
            level: Level::Error,
            message: "Refusing to run with an invalid configuration".to_string(),
        }
        .print();
    }
    false
}

pub async fn process(app: &Vaultflow, path: &str, json: bool) -> bool {
    report_result(app.executor().process_file(path).await, json)
}

pub async fn next(app: &Vaultflow, json: bool) -> bool {
    report_result(app.executor().process_next_file().await, json)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSummary {
    processed: usize,
    completed: usize,
    failed: usize,
    results: Vec<ProcessingResult>,
}

pub async fn all(app: &Vaultflow, max: Option<usize>, stop_on_error: bool, json: bool) -> bool {
    let executor = app.executor();
    let options = executor.options();
    let mut batch = executor.process_all_files_with(
        max.unwrap_or(options.max_iterations),
        options.continue_on_error && !stop_on_error,
    );

    let mut results = Vec::new();
    let mut aborted = None;
    while let Some(outcome) = batch.next().await {
        match outcome {
            Ok(result) => {
                if !json {
                    Notice::from(&result).print();
                    print_warnings(&result);
                }
                results.push(result);
            }
            Err(e) => {
                aborted = Some(e);
                break;
            }
        }
    }

    let failed = results.iter().filter(|r| r.is_failed()).count();
    let summary = BatchSummary {
        processed: results.len(),
        completed: results.iter().filter(|r| r.is_completed()).count(),
        failed,
        results,
    };
    let success = aborted.is_none() && failed == 0;

    if json {
        Response {
            success,
            error: aborted.as_ref().map(ToString::to_string),
            data: Some(&summary),
        }
        .print();
    } else {
        if let Some(e) = &aborted {
            Notice::from(e).print();
        }
        let level = if success { Level::Success } else { Level::Error };
        Notice {
            level,
            message: format!(
                "{} processed, {} completed, {} failed",
                summary.processed, summary.completed, summary.failed
            ),
        }
        .print();
    }
    success
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepStatus {
    id: String,
    input: String,
    entry_point: bool,
    waiting: usize,
    next_file: Option<String>,
}

pub async fn status(app: &Vaultflow, json: bool) -> anyhow::Result<bool> {
    let executor = app.executor();
    let pipeline = executor.resolver().pipeline();
    let entry_points = match discovery::find_entry_points(pipeline) {
        Ok(entry_points) => entry_points,
        Err(e) => {
            if json {
                Response::<()>::err(e.to_string()).print();
            } else {
                Notice::from(&e).print();
            }
            return Ok(false);
        }
    };

    let mut steps = Vec::new();
    for (id, step) in pipeline.iter() {
        let files = executor.discovery().waiting_files(pipeline, id).await?;
        steps.push(StepStatus {
            id: id.to_string(),
            input: step.input.clone(),
            entry_point: entry_points.iter().any(|e| e == id),
            waiting: files.len(),
            next_file: files.first().map(|f| f.path.clone()),
        });
    }

    if json {
        Response::ok(&steps).print();
        return Ok(true);
    }

    for step in &steps {
        let marker = if step.entry_point { "*" } else { " " };
        let message = match &step.next_file {
            Some(next) => format!(
                "{marker} {} ({}): {} waiting, next {}",
                step.id, step.input, step.waiting, next
            ),
            None => format!("{marker} {} ({}): idle", step.id, step.input),
        };
        Notice {
            level: Level::Info,
            message,
        }
        .print();
    }
    Ok(true)
}
