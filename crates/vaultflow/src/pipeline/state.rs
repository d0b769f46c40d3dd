use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::PipelineError;

/// Processing flag and in-flight file set shared by the callers of one executor.
#[derive(Debug, Default)]
pub struct ExecutionState {
    processing: AtomicBool,
    active_files: Mutex<HashSet<String>>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Claims the processing flag. Fails instead of waiting when it is taken.
    pub fn start_processing(self: &Arc<Self>) -> Result<ProcessingGuard, PipelineError> {
        self.processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| PipelineError::AlreadyProcessing)?;
        Ok(ProcessingGuard {
            state: Arc::clone(self),
        })
    }

    pub fn add_active_file(&self, path: &str) {
        self.files().insert(path.to_string());
    }

    pub fn is_active(&self, path: &str) -> bool {
        self.files().contains(path)
    }

    pub fn active_files(&self) -> HashSet<String> {
        self.files().clone()
    }

    fn end_processing(&self) {
        self.files().clear();
        self.processing.store(false, Ordering::SeqCst);
    }

    fn files(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active_files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the processing flag and clears active files when dropped.
#[derive(Debug)]
pub struct ProcessingGuard {
    state: Arc<ExecutionState>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.state.end_processing();
    }
}
