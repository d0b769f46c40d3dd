pub mod chain;
pub mod context;
pub mod error;
pub mod executor;
pub mod output;
pub mod prompt;
pub mod result;
pub mod state;
pub mod step;

pub use chain::ChainExecutor;
pub use context::{ProcessingContext, RoutingDecision};
pub use error::{ErrorKind, PipelineError, PipelineWarning};
pub use executor::{BatchRun, ExecutorOptions, PipelineExecutor};
pub use output::{OutputFrontmatter, OutputLocation, PIPELINE_TAG};
pub use result::{ProcessingResult, ProcessingStatus};
pub use state::{ExecutionState, ProcessingGuard};
pub use step::StepExecutor;
