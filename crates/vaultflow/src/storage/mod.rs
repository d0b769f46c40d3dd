mod filesystem;

pub use filesystem::FileSystemStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::path as vpath;

/// Upper bound for `_N` suffixes tried by [`Storage::unique_path`].
const MAX_UNIQUE_SUFFIX: u32 = 1000;

/// A file found while listing a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Vault-relative path.
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub create_directories: bool,
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            create_directories: true,
            overwrite: false,
        }
    }
}

/// Vault storage. All paths are vault-relative.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Lists regular files below `directory`. A missing directory yields an empty list.
    async fn list_files(
        &self,
        directory: &str,
        recursive: bool,
    ) -> Result<Vec<StoredFile>, StorageError>;

    async fn read_file(&self, path: &str) -> Result<String, StorageError>;

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn write_file(
        &self,
        path: &str,
        content: &str,
        options: WriteOptions,
    ) -> Result<(), StorageError>;

    /// Moves a file, creating the destination directory. Fails if the destination exists.
    async fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError>;

    async fn exists(&self, path: &str) -> bool;

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError>;

    /// Returns `path` if free, otherwise the first free `stem_N.ext` for N >= 2.
    async fn unique_path(&self, path: &str) -> Result<String, StorageError> {
        let path = vpath::normalize(path)?;
        if !self.exists(&path).await {
            return Ok(path);
        }

        let (directory, _) = vpath::split(&path);
        let stem = vpath::file_stem(&path);
        let extension = vpath::extension(&path).unwrap_or("");

        for counter in 2..=MAX_UNIQUE_SUFFIX {
            let candidate = vpath::build_path(directory, &format!("{}_{}", stem, counter), extension);
            if !self.exists(&candidate).await {
                return Ok(candidate);
            }
        }

        Err(StorageError::FileExists(path))
    }
}
