// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path confinement for upload-family operations.

use std::path::{Component, Path, PathBuf};

use super::DispatchError;

fn has_dot_segment(path: &str) -> bool {
    path.split('/').any(|seg| seg == ".." || seg == ".")
}

/// `dir` must be `root` itself or lie beneath it.
pub fn confine_dir(root: &str, dir: &str) -> Result<(), DispatchError> {
    let dir = dir.trim();
    let root = root.trim_end_matches('/');
    let trimmed = dir.trim_end_matches('/');
    let inside = trimmed == root || trimmed.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'));
    if !inside || has_dot_segment(dir) {
        return Err(DispatchError::DirNotAllowed(dir.to_owned()));
    }
    Ok(())
}

/// A single path segment: not empty, not `.` or `..`, no separators.
pub fn is_plain_name(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed != "." && trimmed != ".." && !name.contains(['/', '\\'])
}

/// Reject file names that would step out of their directory.
pub fn confine_name(name: &str) -> Result<(), DispatchError> {
    if !is_plain_name(name) {
        return Err(DispatchError::DirNotAllowed(name.to_owned()));
    }
    Ok(())
}

/// `path` names a file strictly beneath `root`.
pub fn confine_file(root: &str, path: &str) -> Result<(), DispatchError> {
    let path = path.trim();
    let Some((parent, name)) = path.rsplit_once('/') else {
        return Err(DispatchError::DirNotAllowed(path.to_owned()));
    };
    if !is_plain_name(name) {
        return Err(DispatchError::DirNotAllowed(path.to_owned()));
    }
    confine_dir(root, parent).map_err(|_| DispatchError::DirNotAllowed(path.to_owned()))
}

/// `dir` is inside `root` and the optional `filename` stays in `dir`. An
/// empty name means the default name is used.
pub fn confine_upload(root: &str, dir: &str, filename: Option<&str>) -> Result<(), DispatchError> {
    confine_dir(root, dir)?;
    match filename.filter(|f| !f.is_empty()) {
        Some(name) => confine_name(name),
        None => Ok(()),
    }
}

/// Resolve a local source path inside `data_dir`. Relative paths are taken
/// relative to `data_dir`; `..` components are refused and existing files
/// are checked again after symlink resolution.
pub fn confine_local(data_dir: &Path, local: &str) -> Result<PathBuf, DispatchError> {
    let requested = Path::new(local.trim());
    if local.trim().is_empty() || requested.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(DispatchError::DirNotAllowed(local.to_owned()));
    }
    let joined = if requested.is_absolute() { requested.to_path_buf() } else { data_dir.join(requested) };
    if !joined.starts_with(data_dir) {
        return Err(DispatchError::DirNotAllowed(local.to_owned()));
    }
    if let (Ok(real), Ok(real_root)) = (std::fs::canonicalize(&joined), std::fs::canonicalize(data_dir)) {
        if !real.starts_with(&real_root) {
            return Err(DispatchError::DirNotAllowed(local.to_owned()));
        }
    }
    Ok(joined)
}
