use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, Stream};
use tracing::{error, info, warn};

use crate::config::{ConfigResolver, ProcessingSettings, ValidationReport};
use crate::discovery::{self, FileDiscovery, FileInfo};
use crate::error::StorageError;
use crate::model::ModelClient;
use crate::path as vpath;
use crate::storage::Storage;

use super::chain::ChainExecutor;
use super::error::PipelineError;
use super::result::ProcessingResult;
use super::state::ExecutionState;
use super::step::StepExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Continue into the next step after a successful one.
    pub follow_chain: bool,
    pub max_iterations: usize,
    pub continue_on_error: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            follow_chain: true,
            max_iterations: 100,
            continue_on_error: true,
        }
    }
}

impl From<&ProcessingSettings> for ExecutorOptions {
    fn from(settings: &ProcessingSettings) -> Self {
        Self {
            follow_chain: settings.follow_chain,
            max_iterations: settings.max_iterations,
            continue_on_error: settings.continue_on_error,
        }
    }
}

/// Entry point for running the pipeline: picks files, guards against
/// concurrent runs and turns execution errors into failed results.
pub struct PipelineExecutor {
    resolver: Arc<ConfigResolver>,
    storage: Arc<dyn Storage>,
    discovery: FileDiscovery,
    steps: Arc<StepExecutor>,
    chain: ChainExecutor,
    state: Arc<ExecutionState>,
    options: ExecutorOptions,
}

impl PipelineExecutor {
    pub fn new(
        resolver: Arc<ConfigResolver>,
        storage: Arc<dyn Storage>,
        client: Arc<dyn ModelClient>,
        state: Arc<ExecutionState>,
    ) -> Self {
        let steps = Arc::new(StepExecutor::new(
            Arc::clone(&resolver),
            Arc::clone(&storage),
            client,
        ));
        Self {
            discovery: FileDiscovery::new(Arc::clone(&storage)),
            chain: ChainExecutor::new(Arc::clone(&steps), Arc::clone(&storage)),
            resolver,
            storage,
            steps,
            state,
            options: ExecutorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> ExecutorOptions {
        self.options
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    pub fn discovery(&self) -> &FileDiscovery {
        &self.discovery
    }

    pub fn state(&self) -> &Arc<ExecutionState> {
        &self.state
    }

    pub fn validate(&self) -> ValidationReport {
        self.resolver.validate()
    }

    /// Processes the next waiting file, entry-point steps first.
    ///
    /// Fails with [`PipelineError::AlreadyProcessing`] before any discovery if
    /// another call is running. Returns a skipped result when there is nothing
    /// to do; execution errors become failed results.
    pub async fn process_next_file(&self) -> Result<ProcessingResult, PipelineError> {
        let _guard = self.state.start_processing()?;

        let exclude = self.state.active_files();
        let Some(next) = self
            .discovery
            .find_next_available_file(self.resolver.pipeline(), &exclude)
            .await?
        else {
            info!("No files waiting in any step input");
            return Ok(ProcessingResult::skipped());
        };

        self.state.add_active_file(&next.file.path);
        Ok(self.run(&next.step_id, next.file).await)
    }

    /// Processes one specific file with the step whose input contains it.
    pub async fn process_file(&self, path: &str) -> Result<ProcessingResult, PipelineError> {
        let _guard = self.state.start_processing()?;

        let path = vpath::normalize(path)?;
        let stat = self.storage.stat(&path).await?;
        if stat.is_dir {
            return Err(StorageError::IsDirectory(path).into());
        }
        let file = FileInfo::from_stat(&path, &stat);

        let step_id = discovery::find_step_for_path(&path, self.resolver.pipeline())
            .ok_or_else(|| PipelineError::NoStepForFile(path.clone()))?
            .to_string();

        self.state.add_active_file(&file.path);
        Ok(self.run(&step_id, file).await)
    }

    /// Lazily processes waiting files one by one. See [`BatchRun`].
    pub fn process_all_files(&self) -> BatchRun<'_> {
        self.process_all_files_with(self.options.max_iterations, self.options.continue_on_error)
    }

    pub fn process_all_files_with(
        &self,
        max_iterations: usize,
        continue_on_error: bool,
    ) -> BatchRun<'_> {
        BatchRun {
            executor: self,
            max_iterations,
            continue_on_error,
            iterations: 0,
            seen: HashSet::new(),
            finished: false,
        }
    }

    async fn run(&self, step_id: &str, file: FileInfo) -> ProcessingResult {
        let started = Utc::now();
        let input = file.path.clone();
        match self.execute(step_id, file).await {
            Ok(result) => result,
            Err(e) => {
                error!(step_id = %step_id, file = %input, error = %e, "Processing failed");
                ProcessingResult::failed(input, Some(step_id.to_string()), &e, started)
            }
        }
    }

    async fn execute(&self, step_id: &str, file: FileInfo) -> Result<ProcessingResult, PipelineError> {
        if self.options.follow_chain {
            self.chain.execute(step_id, file).await
        } else {
            self.steps.execute(step_id, &file).await
        }
    }
}

/// A pull-based batch over all waiting files.
///
/// Each pull discovers one file, skipping every path this batch has already
/// picked, and processes it. The batch ends when nothing is left, after
/// `max_iterations` pulls, or on the first error or failed result when
/// `continue_on_error` is off. Dropping it between pulls stops the batch.
pub struct BatchRun<'a> {
    executor: &'a PipelineExecutor,
    max_iterations: usize,
    continue_on_error: bool,
    iterations: usize,
    seen: HashSet<String>,
    finished: bool,
}

impl<'a> BatchRun<'a> {
    pub async fn next(&mut self) -> Option<Result<ProcessingResult, PipelineError>> {
        if self.finished {
            return None;
        }
        if self.iterations >= self.max_iterations {
            warn!(iterations = self.iterations, "Stopping batch at iteration limit");
            self.finished = true;
            return None;
        }

        let executor = self.executor;
        let _guard = match executor.state.start_processing() {
            Ok(guard) => guard,
            Err(e) => return Some(self.stop(e)),
        };

        let next = match executor
            .discovery
            .find_next_available_file(executor.resolver.pipeline(), &self.seen)
            .await
        {
            Ok(Some(next)) => next,
            Ok(None) => {
                info!(processed = self.iterations, "Batch finished, no files left");
                self.finished = true;
                return None;
            }
            Err(e) => return Some(self.stop(e)),
        };

        self.iterations += 1;
        self.seen.insert(next.file.path.clone());
        executor.state.add_active_file(&next.file.path);

        let started = Utc::now();
        let input = next.file.path.clone();
        match executor.execute(&next.step_id, next.file).await {
            Ok(result) if result.is_failed() => {
                // A chained step that failed leaves its own input in place.
                self.seen.insert(result.input_file().to_string());
                if !self.continue_on_error {
                    error!(
                        step_id = result.step_id().unwrap_or_default(),
                        file = %result.input_file(),
                        "Stopping batch after failed step"
                    );
                    self.finished = true;
                }
                Some(Ok(result))
            }
            Ok(result) => Some(Ok(result)),
            Err(e) if self.continue_on_error => {
                error!(step_id = %next.step_id, file = %input, error = %e, "Processing failed, continuing");
                Some(Ok(ProcessingResult::failed(
                    input,
                    Some(next.step_id),
                    &e,
                    started,
                )))
            }
            Err(e) => Some(self.stop(e)),
        }
    }

    /// Number of files picked so far.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<ProcessingResult, PipelineError>> + 'a {
        stream::unfold(self, |mut batch| async move {
            let item = batch.next().await?;
            Some((item, batch))
        })
    }

    fn stop(&mut self, error: PipelineError) -> Result<ProcessingResult, PipelineError> {
        error!(error = %error, "Stopping batch");
        self.finished = true;
        Err(error)
    }
}
