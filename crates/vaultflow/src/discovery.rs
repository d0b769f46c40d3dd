//! Finding work in the vault.
//!
//! Discovery is stateless: every call lists the storage afresh, so a file that
//! was moved or written in between is seen (or not) as it is now.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::config::PipelineConfiguration;
use crate::error::StorageError;
use crate::path as vpath;
use crate::pipeline::PipelineError;
use crate::storage::{FileStat, Storage, StoredFile};

pub const AUDIO_EXTENSIONS: &[&str] = &[
    "flac", "m4a", "mp3", "mp4", "mpeg", "mpga", "oga", "ogg", "wav", "webm",
];
pub const TEXT_EXTENSIONS: &[&str] = &["md", "txt"];

pub const DEFAULT_DISCOVERY_LIMIT: usize = 100;

pub fn is_audio_extension(extension: &str) -> bool {
    let extension = extension.to_lowercase();
    AUDIO_EXTENSIONS.contains(&extension.as_str())
}

pub fn is_processable_extension(extension: &str) -> bool {
    let extension = extension.to_lowercase();
    AUDIO_EXTENSIONS.contains(&extension.as_str()) || TEXT_EXTENSIONS.contains(&extension.as_str())
}

/// A candidate file, built fresh on every discovery call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub name: String,
    /// Vault-relative path; the file's identity.
    pub path: String,
    pub size: u64,
    /// Lowercase, without the dot. Empty when the file has none.
    pub extension: String,
    pub is_processable: bool,
    pub last_modified: DateTime<Utc>,
    pub mime_type: Option<String>,
}

impl FileInfo {
    pub fn new(path: &str, size: u64, last_modified: DateTime<Utc>) -> Self {
        let extension = vpath::extension(path).unwrap_or("").to_lowercase();
        Self {
            name: vpath::file_name(path).to_string(),
            path: path.to_string(),
            size,
            is_processable: is_processable_extension(&extension),
            extension,
            last_modified,
            mime_type: mime_guess::from_path(path).first().map(|m| m.to_string()),
        }
    }

    pub fn from_stored(file: &StoredFile) -> Self {
        Self::new(&file.path, file.size, file.modified)
    }

    pub fn from_stat(path: &str, stat: &FileStat) -> Self {
        Self::new(path, stat.size, stat.modified)
    }

    pub fn is_audio(&self) -> bool {
        is_audio_extension(&self.extension)
    }

    pub fn stem(&self) -> &str {
        vpath::file_stem(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Name,
    Modified,
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Allowed extensions without the dot. Empty allows everything.
    pub extensions: Vec<String>,
    pub recursive: bool,
    pub include_hidden: bool,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub limit: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            extensions: AUDIO_EXTENSIONS
                .iter()
                .chain(TEXT_EXTENSIONS)
                .map(|e| e.to_string())
                .collect(),
            recursive: true,
            include_hidden: false,
            sort_by: SortBy::Name,
            sort_order: SortOrder::Ascending,
            limit: DEFAULT_DISCOVERY_LIMIT,
        }
    }
}

impl DiscoveryOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_sort(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    fn accepts_extension(&self, extension: &str) -> bool {
        self.extensions.is_empty()
            || self
                .extensions
                .iter()
                .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    fn compare(&self, a: &FileInfo, b: &FileInfo) -> Ordering {
        let primary = match self.sort_by {
            SortBy::Name => a.name.cmp(&b.name),
            SortBy::Modified => a.last_modified.cmp(&b.last_modified),
            SortBy::Size => a.size.cmp(&b.size),
        };
        let ordering = primary.then_with(|| a.path.cmp(&b.path));
        match self.sort_order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// The file picked for processing and the step that should process it.
#[derive(Debug, Clone, PartialEq)]
pub struct NextFile {
    pub file: FileInfo,
    pub step_id: String,
}

pub struct FileDiscovery {
    storage: Arc<dyn Storage>,
}

impl FileDiscovery {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Lists candidate files below the directory `pattern`.
    pub async fn discover_files(
        &self,
        pattern: &str,
        options: &DiscoveryOptions,
    ) -> Result<Vec<FileInfo>, StorageError> {
        let directory = vpath::normalize(pattern)?;
        let listed = self.storage.list_files(&directory, options.recursive).await?;

        let mut files: Vec<FileInfo> = listed
            .iter()
            .filter(|f| {
                options.include_hidden || !vpath::is_hidden(vpath::relative_to(&directory, &f.path))
            })
            .map(FileInfo::from_stored)
            .filter(|f| options.accepts_extension(&f.extension))
            .collect();

        files.sort_by(|a, b| options.compare(a, b));
        files.truncate(options.limit);

        debug!("Discovered {} files in '{}'", files.len(), directory);
        Ok(files)
    }

    /// Next file to process across all steps, entry points first.
    ///
    /// Paths in `exclude` are skipped before the per-step limit applies.
    pub async fn find_next_available_file(
        &self,
        config: &PipelineConfiguration,
        exclude: &HashSet<String>,
    ) -> Result<Option<NextFile>, PipelineError> {
        let entry_points = find_entry_points(config)?;
        let ordered = entry_points.iter().map(String::as_str).chain(
            config
                .step_ids()
                .filter(|id| !entry_points.iter().any(|e| e == id)),
        );

        for step_id in ordered {
            let candidate = self
                .waiting_files(config, step_id)
                .await?
                .into_iter()
                .find(|f| !exclude.contains(&f.path));

            if let Some(file) = candidate {
                debug!("Next file for step '{}': {}", step_id, file.path);
                return Ok(Some(NextFile {
                    file,
                    step_id: step_id.to_string(),
                }));
            }
        }

        Ok(None)
    }

    /// Files `step_id` would pick up, in discovery order.
    ///
    /// Leaves out files inside any archive directory and files inside a deeper
    /// input directory of another step. An unknown step or an invalid input
    /// path yields nothing.
    pub async fn waiting_files(
        &self,
        config: &PipelineConfiguration,
        step_id: &str,
    ) -> Result<Vec<FileInfo>, StorageError> {
        let Some(step) = config.get(step_id) else {
            return Ok(Vec::new());
        };
        let input = match vpath::normalize(&step.input) {
            Ok(input) => input,
            Err(e) => {
                warn!("Skipping step '{}' with invalid input: {}", step_id, e);
                return Ok(Vec::new());
            }
        };

        let options = DiscoveryOptions::default().with_limit(usize::MAX);
        Ok(self
            .discover_files(&input, &options)
            .await?
            .into_iter()
            .filter(|f| !claimed_elsewhere(config, step_id, &input, &f.path))
            .collect())
    }

    /// First step whose input directory contains `path`, if the file exists.
    pub async fn find_step_for_file(
        &self,
        path: &str,
        config: &PipelineConfiguration,
    ) -> Result<Option<String>, StorageError> {
        let path = vpath::normalize(path)?;
        if !self.storage.exists(&path).await {
            return Err(StorageError::NotFound(path));
        }
        Ok(step_containing(&path, config).map(str::to_string))
    }
}

/// Steps that no other step names as a routing key.
pub fn find_entry_points(config: &PipelineConfiguration) -> Result<Vec<String>, PipelineError> {
    if config.is_empty() {
        return Err(PipelineError::EmptyConfiguration);
    }

    let referenced: HashSet<&str> = config
        .iter()
        .flat_map(|(id, step)| step.output.next_steps().filter(move |next| *next != id))
        .collect();

    Ok(config
        .step_ids()
        .filter(|id| !referenced.contains(id))
        .map(str::to_string)
        .collect())
}

/// Step that would process `path`, without touching storage.
///
/// Only files with a processable extension match.
pub fn find_step_for_path<'a>(path: &str, config: &'a PipelineConfiguration) -> Option<&'a str> {
    let extension = vpath::extension(path)?;
    if !is_processable_extension(extension) {
        return None;
    }
    let path = vpath::normalize(path).ok()?;
    step_containing(&path, config)
}

fn step_containing<'a>(path: &str, config: &'a PipelineConfiguration) -> Option<&'a str> {
    config
        .iter()
        .find(|(_, step)| {
            vpath::normalize(&step.input)
                .map(|input| vpath::is_strict_ancestor(&input, path))
                .unwrap_or(false)
        })
        .map(|(id, _)| id)
}

/// True when `path`, found under `step_id`'s input, belongs somewhere else:
/// inside any step's archive directory, or inside a deeper input directory of
/// another step.
fn claimed_elsewhere(
    config: &PipelineConfiguration,
    step_id: &str,
    input: &str,
    path: &str,
) -> bool {
    config.iter().any(|(other_id, other)| {
        let in_archive = vpath::normalize(&other.archive)
            .map(|archive| !archive.is_empty() && vpath::is_strict_ancestor(&archive, path))
            .unwrap_or(false);
        if in_archive {
            return true;
        }
        if other_id == step_id {
            return false;
        }
        vpath::normalize(&other.input)
            .map(|other_input| {
                vpath::is_strict_ancestor(input, &other_input)
                    && vpath::is_strict_ancestor(&other_input, path)
            })
            .unwrap_or(false)
    })
}
