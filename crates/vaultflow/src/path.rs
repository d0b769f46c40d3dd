//! Vault-relative path helpers.
//!
//! Every path the engine handles is a POSIX-style string relative to the vault
//! root: no leading `/`, no drive prefix, no `..` segments. The empty string is
//! the vault root itself.

use crate::error::StorageError;

/// Characters that are not allowed in generated file names.
const INVALID_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '#', '^', '[', ']'];

/// Normalizes a vault-relative path.
///
/// Backslashes become `/`, empty and `.` segments are dropped and trailing
/// slashes are removed. Absolute paths and `..` segments are rejected.
pub fn normalize(path: &str) -> Result<String, StorageError> {
    let unified = path.trim().replace('\\', "/");

    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(unsafe_path(path, "absolute paths are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(unsafe_path(path, "path traversal is not allowed")),
            s => segments.push(s),
        }
    }

    Ok(segments.join("/"))
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn unsafe_path(path: &str, reason: &str) -> StorageError {
    StorageError::UnsafePath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Joins a directory and a relative name with a single `/`.
pub fn join(directory: &str, name: &str) -> String {
    let directory = directory.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (directory.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => directory.to_string(),
        _ => format!("{}/{}", directory, name),
    }
}

/// Splits a path into `(directory, file name)`.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

pub fn parent(path: &str) -> &str {
    split(path).0
}

pub fn file_name(path: &str) -> &str {
    split(path).1
}

/// File name without its last extension. Dotfiles keep their full name.
pub fn file_stem(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => name,
        Some(pos) => &name[..pos],
    }
}

/// Last extension of the file name, without the dot.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        Some(0) | None => None,
        Some(pos) => Some(&name[pos + 1..]),
    }
}

/// Builds `directory/filename.extension`. An empty extension is omitted.
pub fn build_path(directory: &str, filename: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    let file = if extension.is_empty() {
        filename.to_string()
    } else {
        format!("{}.{}", filename, extension)
    };
    join(directory, &file)
}

/// True when `directory` is a strict ancestor of `path`.
///
/// The vault root (empty string) is an ancestor of every non-empty path.
pub fn is_strict_ancestor(directory: &str, path: &str) -> bool {
    let directory = directory.trim_end_matches('/');
    if directory.is_empty() {
        return !path.is_empty();
    }
    path.starts_with(&format!("{}/", directory))
}

/// Path of `path` relative to `directory`, or `path` unchanged when it is not below it.
pub fn relative_to<'a>(directory: &str, path: &'a str) -> &'a str {
    let directory = directory.trim_end_matches('/');
    if directory.is_empty() {
        return path;
    }
    path.strip_prefix(directory)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

/// True when any segment of the path starts with a dot.
pub fn is_hidden(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with('.'))
}

/// Whether an output pattern names a file rather than a directory.
///
/// A trailing slash always means a directory; otherwise a final segment with an
/// extension is treated as a file path.
pub fn looks_like_file(pattern: &str) -> bool {
    let trimmed = pattern.trim();
    !trimmed.ends_with('/') && !trimmed.ends_with('\\') && extension(trimmed).is_some()
}

/// Replaces characters that are invalid in file names and trims dots and spaces.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_FILENAME_CHARS.contains(&c) {
                '-'
            } else {
                c
            }
        })
        .collect();

    replaced
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}
