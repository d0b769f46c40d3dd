use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

use super::{FileStat, Storage, StoredFile, WriteOptions};
use crate::error::StorageError;
use crate::path as vpath;

/// Storage backed by a directory on the local filesystem.
pub struct FileSystemStorage {
    root: PathBuf,
}

impl FileSystemStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = vpath::normalize(path)?;
        if relative.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(relative))
        }
    }

    fn to_vault_path(&self, absolute: &Path) -> Option<String> {
        let relative = absolute.strip_prefix(&self.root).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(segments.join("/"))
    }

    async fn ensure_parent(
        &self,
        path: &str,
        target: &Path,
        create: bool,
    ) -> Result<(), StorageError> {
        let Some(parent) = target.parent() else {
            return Ok(());
        };
        if parent.is_dir() {
            return Ok(());
        }
        if !create {
            return Err(StorageError::NotFound(vpath::parent(path).to_string()));
        }
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })
    }
}

fn modified_time(metadata: &Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

fn read_error(path: &str, target: &Path, error: std::io::Error) -> StorageError {
    if error.kind() == ErrorKind::NotFound {
        StorageError::NotFound(path.to_string())
    } else if target.is_dir() {
        StorageError::IsDirectory(path.to_string())
    } else {
        StorageError::ReadFile {
            path: target.to_path_buf(),
            source: error,
        }
    }
}

#[async_trait]
impl Storage for FileSystemStorage {
    async fn list_files(
        &self,
        directory: &str,
        recursive: bool,
    ) -> Result<Vec<StoredFile>, StorageError> {
        let dir = self.resolve(directory)?;
        if !dir.is_dir() {
            debug!("Directory does not exist, nothing to list: {:?}", dir);
            return Ok(Vec::new());
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();

        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                debug!("Skipping unreadable entry: {:?}", entry.path());
                continue;
            };
            let Some(path) = self.to_vault_path(entry.path()) else {
                continue;
            };
            files.push(StoredFile {
                path,
                size: metadata.len(),
                modified: modified_time(&metadata),
            });
        }

        Ok(files)
    }

    async fn read_file(&self, path: &str) -> Result<String, StorageError> {
        let target = self.resolve(path)?;
        tokio::fs::read_to_string(&target)
            .await
            .map_err(|e| read_error(path, &target, e))
    }

    async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve(path)?;
        tokio::fs::read(&target)
            .await
            .map_err(|e| read_error(path, &target, e))
    }

    async fn write_file(
        &self,
        path: &str,
        content: &str,
        options: WriteOptions,
    ) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        if target.is_dir() {
            return Err(StorageError::IsDirectory(path.to_string()));
        }
        self.ensure_parent(path, &target, options.create_directories)
            .await?;

        let write_error = |e: std::io::Error| StorageError::WriteFile {
            path: target.clone(),
            source: e,
        };

        if options.overwrite {
            return tokio::fs::write(&target, content).await.map_err(write_error);
        }

        // create_new makes the existence check and the creation a single step
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    StorageError::FileExists(path.to_string())
                } else {
                    write_error(e)
                }
            })?;
        file.write_all(content.as_bytes())
            .await
            .map_err(write_error)?;
        file.flush().await.map_err(write_error)
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let src = self.resolve(from)?;
        let dst = self.resolve(to)?;

        if !src.is_file() {
            return Err(StorageError::NotFound(from.to_string()));
        }
        if tokio::fs::symlink_metadata(&dst).await.is_ok() {
            return Err(StorageError::FileExists(to.to_string()));
        }
        self.ensure_parent(to, &dst, true).await?;

        let move_error = |e: std::io::Error| StorageError::MoveFile {
            from: src.clone(),
            to: dst.clone(),
            source: e,
        };

        // rename is atomic on one filesystem; cross-device moves need copy + remove
        if tokio::fs::rename(&src, &dst).await.is_ok() {
            return Ok(());
        }
        tokio::fs::copy(&src, &dst).await.map_err(move_error)?;
        tokio::fs::remove_file(&src).await.map_err(move_error)?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(target) => tokio::fs::try_exists(&target).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn stat(&self, path: &str) -> Result<FileStat, StorageError> {
        let target = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&target).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(path.to_string())
            } else {
                StorageError::Metadata {
                    path: target.clone(),
                    source: e,
                }
            }
        })?;

        Ok(FileStat {
            size: metadata.len(),
            modified: modified_time(&metadata),
            is_dir: metadata.is_dir(),
        })
    }
}
