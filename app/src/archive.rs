//! ZIP/RAR extraction into a workspace scratch directory (spec.md §4.2).
//!
//! Grounded on the pack's `MeedyaDL::utils::archive::extract_zip` for the
//! `zip` crate usage and zip-slip guard (`enclosed_name`); this pipeline is
//! synchronous end to end so there is no `spawn_blocking`/tokio wrapper.

use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("unreadable archive {path}: {source}")]
    Zip {
        path: std::path::PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("unreadable archive {path}: {message}")]
    Rar {
        path: std::path::PathBuf,
        message: String,
    },

    #[error("archive entry escapes extraction directory: {0}")]
    UnsafeEntryPath(String),

    #[error("unsupported archive extension: {0}")]
    UnsupportedFormat(String),
}

/// Extract `archive_path` (zip or rar) into `dest`, which must already
/// exist or be creatable.
pub fn extract(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    fs::create_dir_all(dest)?;

    match archive_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("zip") => extract_zip(archive_path, dest),
        Some("rar") => extract_rar(archive_path, dest),
        other => Err(ArchiveError::UnsupportedFormat(
            other.unwrap_or("").to_string(),
        )),
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Zip {
        path: archive_path.to_path_buf(),
        source: e,
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| ArchiveError::Zip {
            path: archive_path.to_path_buf(),
            source: e,
        })?;

        let outpath = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                return Err(ArchiveError::UnsafeEntryPath(entry.name().to_string()));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut outfile = fs::File::create(&outpath)?;
        io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = fs::set_permissions(&outpath, fs::Permissions::from_mode(mode));
            }
        }
    }

    Ok(())
}

fn extract_rar(archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let to_err = |message: String| ArchiveError::Rar {
        path: archive_path.to_path_buf(),
        message,
    };

    let mut archive = unrar::Archive::new(archive_path)
        .open_for_processing()
        .map_err(|e| to_err(e.to_string()))?;

    loop {
        let Some(header) = archive.read_header().map_err(|e| to_err(e.to_string()))? else {
            break;
        };

        let entry_path = header.entry().filename.clone();
        if entry_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(ArchiveError::UnsafeEntryPath(
                entry_path.display().to_string(),
            ));
        }

        archive = if header.entry().is_file() {
            header
                .extract_with_base(dest)
                .map_err(|e| to_err(e.to_string()))?
        } else {
            header.skip().map_err(|e| to_err(e.to_string()))?
        };
    }

    Ok(())
}
