//! Directory links from packages into the shared models folder.

use crate::archive::copy_dir_recursive;
use crate::{MatrixError, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// What [`link_dir`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    /// The link already pointed at the source.
    AlreadyLinked,
    /// Entries of a real directory were moved into the source before linking.
    Adopted { moved: usize },
}

/// Make `target` a directory symlink to `source`.
///
/// A directory already at `target` has its contents moved into `source`
/// first. Entries whose name is taken in `source` are dropped when they are
/// byte-identical files (placeholders shipped by every copy of a package);
/// any other clash leaves `target` untouched and is reported as
/// [`MatrixError::LinkFailed`], as is a link that points elsewhere.
pub fn link_dir(source: &Path, target: &Path) -> Result<LinkOutcome> {
    let link_error = |reason: String| MatrixError::LinkFailed {
        src: source.to_path_buf(),
        dest: target.to_path_buf(),
        reason,
    };

    fs::create_dir_all(source).map_err(|e| MatrixError::io_with_path(e, source))?;

    if let Ok(meta) = target.symlink_metadata() {
        if meta.file_type().is_symlink() {
            let current = fs::read_link(target).map_err(|e| MatrixError::io_with_path(e, target))?;
            if current == source {
                return Ok(LinkOutcome::AlreadyLinked);
            }
            return Err(link_error(format!("already links to {}", current.display())));
        }
        if !meta.is_dir() {
            return Err(link_error("a file exists at the link location".to_string()));
        }

        let conflicts = conflicting_entries(target, source)?;
        if !conflicts.is_empty() {
            return Err(link_error(format!(
                "{} already exist in the shared folder",
                conflicts.join(", ")
            )));
        }
        let moved = adopt_contents(target, source)?;
        fs::remove_dir(target).map_err(|e| MatrixError::io_with_path(e, target))?;
        create_dir_symlink(source, target).map_err(|e| link_error(e.to_string()))?;
        if moved == 0 {
            return Ok(LinkOutcome::Created);
        }
        info!("Moved {} entries from {} into {}", moved, target.display(), source.display());
        return Ok(LinkOutcome::Adopted { moved });
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| MatrixError::io_with_path(e, parent))?;
    }

    create_dir_symlink(source, target).map_err(|e| link_error(e.to_string()))?;
    debug!("Linked {} -> {}", target.display(), source.display());
    Ok(LinkOutcome::Created)
}

/// Names in `dir` that also exist in `shared` and are not identical files.
fn conflicting_entries(dir: &Path, shared: &Path) -> Result<Vec<String>> {
    let mut conflicts = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| MatrixError::io_with_path(e, dir))? {
        let entry = entry.map_err(|e| MatrixError::io_with_path(e, dir))?;
        let existing = shared.join(entry.file_name());
        if existing.symlink_metadata().is_err() {
            continue;
        }
        if !same_file_contents(&entry.path(), &existing) {
            conflicts.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(conflicts)
}

fn same_file_contents(a: &Path, b: &Path) -> bool {
    if !(a.is_file() && b.is_file()) {
        return false;
    }
    match (fs::read(a), fs::read(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Move every entry of `dir` into `shared`, leaving `dir` empty.
///
/// Callers check [`conflicting_entries`] first; duplicates left at this
/// point are identical files and are simply removed.
fn adopt_contents(dir: &Path, shared: &Path) -> Result<usize> {
    let mut moved = 0;
    for entry in fs::read_dir(dir).map_err(|e| MatrixError::io_with_path(e, dir))? {
        let entry = entry.map_err(|e| MatrixError::io_with_path(e, dir))?;
        let from = entry.path();
        let to = shared.join(entry.file_name());

        if to.symlink_metadata().is_ok() {
            fs::remove_file(&from).map_err(|e| MatrixError::io_with_path(e, &from))?;
            continue;
        }
        if fs::rename(&from, &to).is_err() {
            // Different filesystems: copy, then remove the original.
            if from.is_dir() {
                copy_dir_recursive(&from, &to)?;
                fs::remove_dir_all(&from).map_err(|e| MatrixError::io_with_path(e, &from))?;
            } else {
                fs::copy(&from, &to).map_err(|e| MatrixError::io_with_path(e, &to))?;
                fs::remove_file(&from).map_err(|e| MatrixError::io_with_path(e, &from))?;
            }
        }
        moved += 1;
    }
    Ok(moved)
}

#[cfg(unix)]
fn create_dir_symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn create_dir_symlink(source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(source, target)
}

#[cfg(not(any(unix, windows)))]
fn create_dir_symlink(_source: &Path, _target: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "directory links are not supported on this platform",
    ))
}
