//! Test harness for isolated pipeline runs.
//!
//! `TestVault` owns a temporary vault directory and builds executors over it.
//! Model calls go to `ScriptedModelClient`, which never touches the network.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use vaultflow::config::{ConfigResolver, ModelsConfig, PipelineConfiguration, ResolvedModel};
use vaultflow::error::{ModelError, StorageError};
use vaultflow::model::{
    ModelClient, ResponseSection, StructuredRequest, StructuredResponse, TranscriptionRequest,
};
use vaultflow::pipeline::{ExecutionState, ExecutorOptions, PipelineExecutor};
use vaultflow::storage::{FileStat, FileSystemStorage, Storage, StoredFile, WriteOptions};

/// A scratch vault on disk.
pub struct TestVault {
    temp_dir: TempDir,
}

impl TestVault {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    /// Writes a vault file, creating parent directories.
    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write vault file");
        path
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path(relative)).expect("Failed to read vault file")
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    /// Sorted vault-relative paths of the files directly inside `relative`.
    pub fn files_in(&self, relative: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.path(relative)) else {
            return Vec::new();
        };
        let mut files: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| format!("{}/{}", relative, e.file_name().to_string_lossy()))
            .collect();
        files.sort();
        files
    }

    pub fn storage(&self) -> Arc<FileSystemStorage> {
        Arc::new(FileSystemStorage::new(self.root()))
    }

    /// Executor over this vault with default options.
    pub fn executor(
        &self,
        models: ModelsConfig,
        pipeline: PipelineConfiguration,
        client: Arc<dyn ModelClient>,
    ) -> PipelineExecutor {
        self.executor_with(self.storage(), models, pipeline, client)
    }

    pub fn executor_with(
        &self,
        storage: Arc<dyn Storage>,
        models: ModelsConfig,
        pipeline: PipelineConfiguration,
        client: Arc<dyn ModelClient>,
    ) -> PipelineExecutor {
        PipelineExecutor::new(
            Arc::new(ConfigResolver::new(models, pipeline)),
            storage,
            client,
            Arc::new(ExecutionState::new()),
        )
        .with_options(ExecutorOptions::default())
    }
}

/// Model stub returning queued chat responses in order.
///
/// With a gate set, every call signals `called` and then waits for the gate,
/// so a test can observe the executor mid-step.
#[derive(Default)]
pub struct ScriptedModelClient {
    responses: Mutex<VecDeque<Result<StructuredResponse, ModelError>>>,
    transcript: Mutex<Option<String>>,
    requests: Mutex<Vec<StructuredRequest>>,
    transcribed: Mutex<Vec<String>>,
    pub called: Notify,
    gate: Option<Arc<Notify>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(self, transcript: &str) -> Self {
        *self.transcript.lock().unwrap() = Some(transcript.to_string());
        self
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn push_response(&self, response: StructuredResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queues a single-section response.
    pub fn push_section(&self, filename: &str, content: &str, next_step: Option<&str>) {
        let mut section = ResponseSection::new(filename, content);
        if let Some(next) = next_step {
            section = section.with_next_step(next);
        }
        self.push_response(StructuredResponse::single(section));
    }

    pub fn push_error(&self, error: ModelError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// File names sent for transcription.
    pub fn transcribed(&self) -> Vec<String> {
        self.transcribed.lock().unwrap().clone()
    }

    async fn wait_for_gate(&self) {
        self.called.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn process_structured_request(
        &self,
        _model: &ResolvedModel,
        request: &StructuredRequest,
    ) -> Result<StructuredResponse, ModelError> {
        self.wait_for_gate().await;
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Unsupported("no scripted response left".into())))
    }

    async fn transcribe(
        &self,
        _model: &ResolvedModel,
        request: &TranscriptionRequest,
    ) -> Result<String, ModelError> {
        self.wait_for_gate().await;
        self.transcribed.lock().unwrap().push(request.filename.clone());
        self.transcript
            .lock()
            .unwrap()
            .clone()
            .ok_or(ModelError::EmptyResponse)
    }
}

/// Filesystem storage that counts directory listings.
pub struct CountingStorage {
    inner: FileSystemStorage,
    list_calls: AtomicUsize,
    /// Moves fail when set, to exercise the archive fallback.
    fail_moves: bool,
}

impl CountingStorage {
    pub fn new(root: &Path) -> Self {
        Self {
            inner: FileSystemStorage::new(root),
            list_calls: AtomicUsize::new(0),
            fail_moves: false,
        }
    }

    pub fn failing_moves(root: &Path) -> Self {
        Self {
            fail_moves: true,
            ..Self::new(root)
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for CountingStorage {
    async fn list_files(
        &self,
        directory: &str,
        recursive: bool,
    ) -> Result<Vec<StoredFile>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_files(directory, recursive).await
    }

    async fn read_file(&self, path: &str) -> Result<String, StorageError> {
        self.inner.read_file(path).await
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.inner.read_bytes(path).await
    }

    async fn write_file(
        &self,
        path: &str,
        content: &str,
        options: WriteOptions,
    ) -> Result<(), StorageError> {
        self.inner.write_file(path, content, options).await
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        if self.fail_moves {
            return Err(StorageError::MoveFile {
                from: PathBuf::from(from),
                to: PathBuf::from(to),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.inner.move_file(from, to).await
    }

    async fn exists(&self, path: &str) -> bool {
        self.inner.exists(path).await
    }

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError> {
        self.inner.stat(path).await
    }
}
