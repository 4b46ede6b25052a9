//! Destination resolution & validation (spec.md §4.6).

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::fs_ops::permissions::log_path_permission_context;
use crate::model::ContentType;

#[derive(Debug, thiserror::Error)]
pub enum DestinationError {
    #[error("destination must be absolute: {0}")]
    NotAbsolute(PathBuf),

    #[error("destination is not a directory: {0}")]
    NotDirectory(PathBuf),

    #[error("destination not writable: {path}: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Book destination = `DESTINATION`; audiobook destination =
/// `DESTINATION_AUDIOBOOK` falling back to `DESTINATION`; content-type
/// routing overrides non-audiobook destinations when enabled and a
/// directory is configured for the task's content type (spec.md §4.6).
pub fn get_final_destination(config: &Config, content_type: &ContentType) -> PathBuf {
    let is_audiobook = content_type.is_audiobook();
    if !is_audiobook {
        if let Some(dir) = config.content_type_routing.directory_for(content_type) {
            return dir.to_path_buf();
        }
    }
    config.destination_for(is_audiobook).to_path_buf()
}

/// Requires `dest` to be absolute, to exist (creating it via `mkdir -p` if
/// not), to be a directory, and to be writable — proved by writing and
/// removing a uniquely-named probe file.
pub fn validate_destination(dest: &Path) -> Result<(), DestinationError> {
    if !dest.is_absolute() {
        return Err(DestinationError::NotAbsolute(dest.to_path_buf()));
    }

    if !dest.exists() {
        if let Err(source) = fs::create_dir_all(dest) {
            log_path_permission_context("validate_destination:mkdir", dest);
            return Err(DestinationError::NotWritable {
                path: dest.to_path_buf(),
                source,
            });
        }
    }

    if !dest.is_dir() {
        return Err(DestinationError::NotDirectory(dest.to_path_buf()));
    }

    let probe_name = format!(".shelfcase-probe-{:016x}", rand::random::<u64>());
    let probe_path = dest.join(probe_name);
    if let Err(source) = fs::write(&probe_path, b"") {
        log_path_permission_context("validate_destination:probe", dest);
        return Err(DestinationError::NotWritable {
            path: dest.to_path_buf(),
            source,
        });
    }
    let _ = fs::remove_file(&probe_path);

    Ok(())
}
