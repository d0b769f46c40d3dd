//! Output placement and file format.
//!
//! Every output file starts with a YAML frontmatter block recording where the
//! content came from, followed by a blank line and the section content verbatim.

use serde::{Deserialize, Serialize};

use crate::config::OutputTarget;
use crate::path as vpath;

/// Value of the `pipeline` frontmatter field.
pub const PIPELINE_TAG: &str = "vaultflow";
pub const OUTPUT_EXTENSION: &str = "md";

/// Placeholder names models tend to return instead of a real file name.
const GENERIC_FILENAMES: &[&str] = &["response", "output", "untitled", "result", "document"];

const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFrontmatter {
    pub source: String,
    pub processed: String,
    pub step: String,
    #[serde(rename = "nextStep", default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    pub pipeline: String,
}

impl OutputFrontmatter {
    /// Frontmatter, blank line, content.
    pub fn render(&self, content: &str) -> Result<String, serde_yaml::Error> {
        let yaml = serde_yaml::to_string(self)?;
        Ok(format!("---\n{}---\n\n{}", yaml, content))
    }

    /// Splits a rendered document back into frontmatter and content.
    pub fn parse(document: &str) -> Option<(Self, &str)> {
        let rest = document.strip_prefix("---\n")?;
        let end = rest.find("\n---\n")?;
        let frontmatter: Self = serde_yaml::from_str(&rest[..end + 1]).ok()?;
        let body = &rest[end + "\n---\n".len()..];
        Some((frontmatter, body.strip_prefix('\n').unwrap_or(body)))
    }
}

/// Where one section is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLocation {
    Directory(String),
    File(String),
}

impl OutputLocation {
    /// Multi-section responses always write into a directory.
    pub fn into_directory(self) -> Self {
        match self {
            OutputLocation::File(path) => OutputLocation::Directory(vpath::parent(&path).to_string()),
            dir => dir,
        }
    }

    /// Vault path for a section with the given file name (no extension).
    pub fn path_for(&self, filename: &str) -> String {
        match self {
            OutputLocation::Directory(dir) => vpath::build_path(dir, filename, OUTPUT_EXTENSION),
            OutputLocation::File(path) => path.clone(),
        }
    }
}

/// Resolves where a section goes and which routing key, if any, was honored.
///
/// For routed outputs a `next_step` that is not one of the routing keys falls
/// back to the `default` directory. A simple pattern whose last segment has an
/// extension is a file path; anything else is a directory.
pub fn resolve_location(
    target: &OutputTarget,
    next_step: Option<&str>,
) -> (OutputLocation, Option<String>) {
    match target {
        OutputTarget::Simple(pattern) => {
            let location = if vpath::looks_like_file(pattern) {
                OutputLocation::File(pattern.clone())
            } else {
                OutputLocation::Directory(pattern.clone())
            };
            (location, None)
        }
        OutputTarget::Routed { routes, default } => {
            match next_step.and_then(|key| routes.get_key_value(key)) {
                Some((key, dir)) => (OutputLocation::Directory(dir.clone()), Some(key.clone())),
                None => (OutputLocation::Directory(default.clone()), None),
            }
        }
    }
}

/// True for placeholder names, with or without an extension of any kind.
pub fn is_generic_filename(name: &str) -> bool {
    let stem = vpath::file_stem(name.trim()).trim().to_lowercase();
    stem.is_empty() || GENERIC_FILENAMES.contains(&stem.as_str())
}

/// File name (without extension) for a section.
///
/// Uses the model's suggestion unless it is generic or empty after
/// sanitizing, in which case the input file's stem is used.
pub fn resolve_output_filename(suggested: &str, input_path: &str) -> String {
    let candidate = vpath::sanitize_filename(strip_text_extension(suggested.trim()));
    if !is_generic_filename(&candidate) {
        return candidate;
    }

    let stem = vpath::sanitize_filename(vpath::file_stem(input_path));
    if stem.is_empty() {
        "output".to_string()
    } else {
        stem
    }
}

fn strip_text_extension(name: &str) -> &str {
    match vpath::extension(name) {
        Some(ext) if TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()) => vpath::file_stem(name),
        _ => name,
    }
}
