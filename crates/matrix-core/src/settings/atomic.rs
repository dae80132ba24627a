//! Atomic JSON persistence.
//!
//! Writes go to a temp file in the target's directory, are synced to disk and
//! then renamed over the target, so readers never observe a partial file.

use crate::{MatrixError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Parse the JSON file at `path`; a missing file is `Ok(None)`.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MatrixError::io_with_path(e, path)),
    };

    let data: T = serde_json::from_str(&contents).map_err(|e| MatrixError::Json {
        message: format!("{} is not valid JSON: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Write `data` to `path` as pretty JSON, atomically.
///
/// With `keep_backup`, the previous file is copied to `<name>.json.bak` first;
/// a failed backup is logged and does not abort the write.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T, keep_backup: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| MatrixError::io_with_path(e, parent))?;

    let serialized = serde_json::to_string_pretty(data).map_err(|e| MatrixError::Json {
        message: format!("Could not encode {}: {}", path.display(), e),
        source: Some(e),
    })?;

    let mut temp = NamedTempFile::new_in(parent).map_err(|e| MatrixError::io_with_path(e, parent))?;
    temp.write_all(serialized.as_bytes())
        .and_then(|_| temp.flush())
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| MatrixError::io_with_path(e, temp.path()))?;

    if keep_backup && path.is_file() {
        let backup = path.with_extension("json.bak");
        if let Err(e) = fs::copy(path, &backup) {
            warn!("Could not back up {}: {}", path.display(), e);
        }
    }

    temp.persist(path)
        .map_err(|e| MatrixError::io_with_path(e.error, path))?;

    debug!("Wrote {}", path.display());
    Ok(())
}
