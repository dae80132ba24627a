//! Source archive extraction.
//!
//! GitHub source archives wrap their content in a single top-level directory
//! (`owner-repo-sha/`). [`extract_package_archive`] unpacks into a scratch
//! directory beside the target, strips that wrapper and overlays the tree
//! onto the destination. Files from the archive overwrite their old copies;
//! everything else in the destination (virtual environment, user output,
//! shared-folder links) is left where it is.

use crate::{MatrixError, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Archive container formats understood by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect from the file name; `None` for unsupported extensions.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }
}

/// Extract `archive` so that its content ends up directly in `destination`.
///
/// Existing files that the archive does not contain are kept, and directory
/// links inside `destination` are never written through.
///
/// Blocking; run it on a blocking thread from async code.
pub fn extract_package_archive(archive: &Path, destination: &Path) -> Result<()> {
    let format = ArchiveFormat::from_path(archive).ok_or_else(|| MatrixError::Archive {
        path: archive.to_path_buf(),
        message: "Unsupported archive format".to_string(),
    })?;

    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| MatrixError::io_with_path(e, parent))?;

    let scratch = TempDir::new_in(parent).map_err(|e| MatrixError::io_with_path(e, parent))?;
    info!("Extracting {} to {}", archive.display(), destination.display());

    match format {
        ArchiveFormat::Zip => extract_zip(archive, scratch.path())?,
        ArchiveFormat::TarGz => extract_tarball(archive, scratch.path())?,
    }

    let source = single_top_level_dir(scratch.path())?.unwrap_or_else(|| scratch.path().to_path_buf());
    overlay_dir(&source, destination)
}

fn extract_zip(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| MatrixError::io_with_path(e, archive_path))?;
    let archive_error = |message: String| MatrixError::Archive {
        path: archive_path.to_path_buf(),
        message,
    };

    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| archive_error(format!("Invalid zip archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| archive_error(format!("Failed to read zip entry {}: {}", i, e)))?;

        // Entries escaping the target directory are skipped.
        let Some(relative) = entry.enclosed_name() else {
            warn!("Skipping unsafe zip entry {}", entry.name());
            continue;
        };
        let outpath = extract_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath).map_err(|e| MatrixError::io_with_path(e, &outpath))?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MatrixError::io_with_path(e, parent))?;
        }
        let mut outfile = File::create(&outpath).map_err(|e| MatrixError::io_with_path(e, &outpath))?;
        std::io::copy(&mut entry, &mut outfile).map_err(|e| MatrixError::io_with_path(e, &outpath))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
            }
        }
    }

    Ok(())
}

fn extract_tarball(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| MatrixError::io_with_path(e, archive_path))?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    let mut archive = tar::Archive::new(decoder);

    archive.unpack(extract_dir).map_err(|e| MatrixError::Archive {
        path: archive_path.to_path_buf(),
        message: format!("Failed to extract tarball: {}", e),
    })
}

/// The only entry of `dir`, when that entry is a directory.
fn single_top_level_dir(dir: &Path) -> Result<Option<PathBuf>> {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| MatrixError::io_with_path(e, dir))?
        .filter_map(|e| e.ok())
        .collect();

    match entries.as_slice() {
        [only] if only.path().is_dir() => Ok(Some(only.path())),
        _ => Ok(None),
    }
}

/// Move the contents of `source` into `destination`, entry by entry.
fn overlay_dir(source: &Path, destination: &Path) -> Result<()> {
    std::fs::create_dir_all(destination).map_err(|e| MatrixError::io_with_path(e, destination))?;

    for entry in std::fs::read_dir(source).map_err(|e| MatrixError::io_with_path(e, source))? {
        let entry = entry.map_err(|e| MatrixError::io_with_path(e, source))?;
        let from = entry.path();
        let to = destination.join(entry.file_name());
        let existing = to.symlink_metadata().ok();

        if existing.as_ref().is_some_and(|m| m.file_type().is_symlink()) {
            debug!("Keeping link {}", to.display());
            continue;
        }

        let is_dir = entry
            .file_type()
            .map_err(|e| MatrixError::io_with_path(e, &from))?
            .is_dir();
        if is_dir {
            if existing.as_ref().is_some_and(|m| !m.is_dir()) {
                std::fs::remove_file(&to).map_err(|e| MatrixError::io_with_path(e, &to))?;
            }
            overlay_dir(&from, &to)?;
        } else {
            if existing.as_ref().is_some_and(|m| m.is_dir()) {
                std::fs::remove_dir_all(&to).map_err(|e| MatrixError::io_with_path(e, &to))?;
            }
            move_file(&from, &to)?;
        }
    }
    Ok(())
}

/// Rename `from` over `to`, copying when a rename is not possible.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if let Err(e) = std::fs::rename(from, to) {
        debug!("Rename of {} failed ({}), copying instead", from.display(), e);
        std::fs::copy(from, to).map_err(|e| MatrixError::io_with_path(e, to))?;
    }
    Ok(())
}

/// Recursively copy `src` into `dst`.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| MatrixError::Io {
            message: e.to_string(),
            path: e.path().map(Path::to_path_buf),
            source: None,
        })?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| MatrixError::io_with_path(e, &target))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| MatrixError::io_with_path(e, &target))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, contents) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(ArchiveFormat::from_path(Path::new("a/b.zip")), Some(ArchiveFormat::Zip));
        assert_eq!(ArchiveFormat::from_path(Path::new("b.tar.gz")), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::from_path(Path::new("b.7z")), None);
    }

    #[test]
    fn test_zip_strips_wrapper_dir() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pkg.zip");
        write_zip(
            &archive,
            &[
                ("owner-repo-abc/launch.py", "print()"),
                ("owner-repo-abc/requirements.txt", "torch"),
            ],
        );
        let dest = temp.path().join("Packages").join("pkg");

        extract_package_archive(&archive, &dest).unwrap();

        assert!(dest.join("launch.py").is_file());
        assert!(dest.join("requirements.txt").is_file());
        assert!(!dest.join("owner-repo-abc").exists());
    }

    #[test]
    fn test_zip_without_wrapper_overwrites_shipped_files() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("flat.zip");
        write_zip(&archive, &[("a.txt", "new"), ("b/c.txt", "2")]);
        let dest = temp.path().join("out");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("a.txt"), "old").unwrap();

        extract_package_archive(&archive, &dest).unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("a.txt")).unwrap(), "new");
        assert!(dest.join("b").join("c.txt").is_file());
    }

    #[test]
    fn test_reextract_keeps_user_files_and_venv() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("Packages").join("webui");
        std::fs::create_dir_all(dest.join("outputs")).unwrap();
        std::fs::create_dir_all(dest.join("venv").join("bin")).unwrap();
        std::fs::write(dest.join("outputs").join("img.png"), "png").unwrap();
        std::fs::write(dest.join("venv").join("bin").join("python"), "py").unwrap();
        std::fs::write(dest.join("launch.py"), "v1").unwrap();

        let archive = temp.path().join("v2.zip");
        write_zip(&archive, &[("webui-v2/launch.py", "v2"), ("webui-v2/outputs/README", "x")]);
        extract_package_archive(&archive, &dest).unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("launch.py")).unwrap(), "v2");
        assert!(dest.join("outputs").join("img.png").is_file());
        assert!(dest.join("outputs").join("README").is_file());
        assert!(dest.join("venv").join("bin").join("python").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_reextract_does_not_write_through_links() {
        let temp = TempDir::new().unwrap();
        let shared = temp.path().join("Models").join("Lora");
        std::fs::create_dir_all(&shared).unwrap();
        std::fs::write(shared.join("style.safetensors"), "weights").unwrap();

        let dest = temp.path().join("Packages").join("webui");
        std::fs::create_dir_all(dest.join("models")).unwrap();
        std::os::unix::fs::symlink(&shared, dest.join("models").join("Lora")).unwrap();

        let archive = temp.path().join("v2.zip");
        write_zip(&archive, &[("webui-v2/models/Lora/Put LoRA here.txt", "")]);
        extract_package_archive(&archive, &dest).unwrap();

        let link = dest.join("models").join("Lora");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert!(shared.join("style.safetensors").is_file());
        assert!(!shared.join("Put LoRA here.txt").exists());
    }

    #[test]
    fn test_invalid_zip_is_archive_error() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        std::fs::write(&archive, b"not a zip").unwrap();
        let err = extract_package_archive(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, MatrixError::Archive { .. }));
    }

    #[test]
    fn test_copy_dir_recursive() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested").join("f.txt"), "x").unwrap();

        let dst = temp.path().join("dst");
        copy_dir_recursive(&src, &dst).unwrap();
        assert_eq!(std::fs::read_to_string(dst.join("nested").join("f.txt")).unwrap(), "x");
    }
}
