use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::discovery::FileInfo;

use super::error::PipelineWarning;

/// How a routed step's output was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    /// First `nextStep` the model suggested, valid or not.
    pub requested: Option<String>,
    /// The valid next step, if any.
    pub chosen: Option<String>,
    pub fallback_used: bool,
    pub available: Vec<String>,
}

/// Working state of one step execution.
pub struct ProcessingContext {
    // Input
    pub step_id: String,
    pub input_path: String,
    /// Input file name without extension.
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    /// `timestamp` as `YYYY-MM-DD`.
    pub date: String,

    // Archive result, the original path when archiving failed
    pub archive_path: Option<String>,

    // Output results
    pub output_files: Vec<String>,
    pub output_path: Option<String>,

    // Routing result, only for routed outputs
    pub routing_decision: Option<RoutingDecision>,
    pub next_step: Option<String>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl ProcessingContext {
    pub fn new(step_id: &str, file: &FileInfo) -> Self {
        let timestamp = Utc::now();
        Self {
            step_id: step_id.to_string(),
            input_path: file.path.clone(),
            filename: file.stem().to_string(),
            date: timestamp.format("%Y-%m-%d").to_string(),
            timestamp,
            archive_path: None,
            output_files: Vec::new(),
            output_path: None,
            routing_decision: None,
            next_step: None,
            warnings: Vec::new(),
        }
    }

    /// RFC 3339 timestamp written to output frontmatter.
    pub fn processed_timestamp(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    /// Where the input file ended up.
    pub fn source_path(&self) -> &str {
        self.archive_path.as_deref().unwrap_or(&self.input_path)
    }
}
