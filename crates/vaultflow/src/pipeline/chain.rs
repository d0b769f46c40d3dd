use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::discovery::FileInfo;
use crate::error::StorageError;
use crate::storage::Storage;

use super::error::PipelineError;
use super::result::ProcessingResult;
use super::step::StepExecutor;

/// Follows `nextStep` from one step to the next, feeding each step the first
/// output of the previous one.
pub struct ChainExecutor {
    steps: Arc<StepExecutor>,
    storage: Arc<dyn Storage>,
}

impl ChainExecutor {
    pub fn new(steps: Arc<StepExecutor>, storage: Arc<dyn Storage>) -> Self {
        Self { steps, storage }
    }

    /// Runs steps until one fails, chooses no next step or writes nothing.
    ///
    /// Returns the result of the last step run. An error in the first step is
    /// returned as is; an error in a later step becomes a failed result for
    /// that step and its input. If the next input cannot be read back from
    /// storage the chain stops with [`PipelineError::ChainBroken`].
    pub async fn execute(
        &self,
        start_step: &str,
        file: FileInfo,
    ) -> Result<ProcessingResult, PipelineError> {
        let mut step_id = start_step.to_string();
        let mut file = file;
        let mut hop = 1usize;

        loop {
            let started = Utc::now();
            let result = match self.steps.execute(&step_id, &file).await {
                Ok(result) => result,
                Err(e) if hop > 1 => {
                    warn!(step_id = %step_id, hop, error = %e, "Chained step failed");
                    return Ok(ProcessingResult::failed(
                        file.path.clone(),
                        Some(step_id),
                        &e,
                        started,
                    ));
                }
                Err(e) => return Err(e),
            };
            if result.is_failed() {
                return Ok(result);
            }

            let (Some(next_step), Some(next_path)) = (result.next_step(), result.output_files().first())
            else {
                debug!(hops = hop, "Chain finished");
                return Ok(result);
            };

            let next_file = self.load(next_path).await.map_err(|e| {
                warn!(path = %next_path, error = %e, "Cannot continue chain");
                PipelineError::ChainBroken {
                    path: next_path.clone(),
                    reason: e.to_string(),
                }
            })?;

            info!(from = %step_id, to = %next_step, hop, "Continuing chain");
            step_id = next_step.to_string();
            file = next_file;
            hop += 1;
        }
    }

    async fn load(&self, path: &str) -> Result<FileInfo, StorageError> {
        let stat = self.storage.stat(path).await?;
        if stat.is_dir {
            return Err(StorageError::IsDirectory(path.to_string()));
        }
        Ok(FileInfo::from_stat(path, &stat))
    }
}
