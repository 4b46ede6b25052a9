//! `atomic_write` / `atomic_move` / `atomic_copy` / `atomic_hardlink`.
//!
//! Grounded on the teacher's `fs_op::helpers::{atomic_write, atomic_copy_file,
//! atomic_rename_or_copy}` (temp-file-then-rename, collision via exclusive
//! create) and on the exact collision/fallback semantics of
//! `shelfmark.download.fs` (the Python source this pipeline was distilled
//! from): the counter-suffix retry loop, the cross-device claim-then-replace
//! dance, and the permission-denied fallback ladder (copyfile -> external
//! `mv`/`cp`) are line-for-line translations of that module's behavior.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::permissions::log_transfer_permission_context;

const MAX_ATTEMPTS: u32 = 100;
const VERIFY_IO_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, thiserror::Error)]
pub enum FsOpError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("could not claim a free destination after {attempts} attempts: {desired}")]
    CollisionExhausted { desired: PathBuf, attempts: u32 },

    #[error(
        "transfer incomplete, data loss may have occurred: '{dest}' was {actual} bytes instead of expected {expected}"
    )]
    SizeMismatch {
        dest: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// `P`, `P_1`, `P_2`, ... for `attempt` 0, 1, 2, ...
fn candidate_path(dest: &Path, attempt: u32) -> PathBuf {
    if attempt == 0 {
        return dest.to_path_buf();
    }
    let stem = dest.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = dest.extension().and_then(|s| s.to_str());
    let name = match ext {
        Some(ext) => format!("{stem}_{attempt}.{ext}"),
        None => format!("{stem}_{attempt}"),
    };
    dest.with_file_name(name)
}

fn sibling_tmp(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    dest.with_file_name(format!(".{name}.tmp"))
}

fn is_permission_error(e: &io::Error) -> bool {
    e.kind() == ErrorKind::PermissionDenied || e.raw_os_error() == Some(libc::EPERM)
}

fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

fn is_too_many_links(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EMLINK)
}

/// Stat `dest`; if its size differs from `expected`, wait `wait` to let a
/// slow remote filesystem flush and stat once more before giving up.
fn verify_transfer_size_with_wait(
    dest: &Path,
    expected: u64,
    action: &str,
    wait: Duration,
) -> Result<(), FsOpError> {
    let actual = fs::metadata(dest)?.len();
    if actual == expected {
        return Ok(());
    }

    tracing::debug!(
        path = %dest.display(),
        action,
        expected,
        actual,
        "size mismatch after transfer, waiting for filesystem sync"
    );
    std::thread::sleep(wait);

    let actual = fs::metadata(dest)?.len();
    if actual != expected {
        return Err(FsOpError::SizeMismatch {
            dest: dest.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn verify_transfer_size(dest: &Path, expected: u64, action: &str) -> Result<(), FsOpError> {
    verify_transfer_size_with_wait(dest, expected, action, VERIFY_IO_WAIT)
}

/// Copy content only, truncating/creating `dest` (no metadata preserved) —
/// the `shutil.copyfile` equivalent used by the NFS/CIFS fallback ladder.
fn copyfile_content_only(source: &Path, dest: &Path) -> io::Result<u64> {
    fs::copy(source, dest)
}

/// Copy content and best-effort preserve mtime/atime/permissions — the
/// `shutil.copy2` equivalent used by the happy path.
fn copy2_preserve_metadata(source: &Path, dest: &Path) -> io::Result<u64> {
    let written = fs::copy(source, dest)?;
    if let Ok(src_meta) = fs::metadata(source) {
        if let Ok(mtime) = src_meta.modified() {
            let ft = filetime::FileTime::from_system_time(mtime);
            let _ = filetime::set_file_mtime(dest, ft);
        }
    }
    Ok(written)
}

fn system_fallback_op(op: &str, source: &Path, dest: &Path) -> io::Result<()> {
    tracing::warn!(op, src = %source.display(), dst = %dest.display(), "attempting system command as final fallback");
    let output = Command::new(op).arg("-f").arg(source).arg(dest).output()?;
    if !output.status.success() {
        return Err(io::Error::other(format!(
            "{op} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }
    Ok(())
}

/// Handle a permission-denied copy/move by falling back to content-only
/// copy, then (if that also fails) an external `mv`/`cp` invocation.
fn perform_permission_fallback(source: &Path, dest: &Path, is_move: bool) -> Result<(), FsOpError> {
    let expected_size = fs::metadata(source)?.len();

    match copyfile_content_only(source, dest) {
        Ok(_) => {
            verify_transfer_size(dest, expected_size, "copy")?;
            if is_move {
                fs::remove_file(source)?;
            }
            Ok(())
        }
        Err(copy_error) => {
            let _ = fs::remove_file(dest);
            if is_permission_error(&copy_error) {
                log_transfer_permission_context("nfs_fallback_copyfile", source, dest);
            }
            tracing::error!(error = %copy_error, src = %source.display(), dst = %dest.display(), "fallback copyfile failed");

            let op = if is_move { "mv" } else { "cp" };
            match system_fallback_op(op, source, dest) {
                Ok(()) => {
                    if dest.exists() {
                        verify_transfer_size(dest, expected_size, op)?;
                    }
                    if is_move {
                        let _ = fs::remove_file(source);
                    }
                    Ok(())
                }
                Err(sys_error) => {
                    log_transfer_permission_context("nfs_fallback_system", source, dest);
                    tracing::error!(error = %sys_error, op, "system fallback failed");
                    let _ = fs::remove_file(dest);
                    Err(sys_error.into())
                }
            }
        }
    }
}

/// Write `data` to a collision-free path under `dest`'s desired name.
pub fn atomic_write(dest: &Path, data: &[u8]) -> Result<PathBuf, FsOpError> {
    for attempt in 0..MAX_ATTEMPTS {
        let candidate = candidate_path(dest, attempt);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(mut f) => {
                f.write_all(data)?;
                if attempt > 0 {
                    tracing::info!(path = %candidate.display(), "file collision resolved");
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(FsOpError::CollisionExhausted {
        desired: dest.to_path_buf(),
        attempts: MAX_ATTEMPTS,
    })
}

/// Move `source` into a collision-free path under `dest`'s desired name.
/// Same-filesystem moves use `rename` (atomic, preserves inotify events);
/// cross-device moves claim the destination, copy to a sibling temp file,
/// replace, verify size, then unlink the source.
pub fn atomic_move(source: &Path, dest: &Path) -> Result<PathBuf, FsOpError> {
    for attempt in 0..MAX_ATTEMPTS {
        let candidate = candidate_path(dest, attempt);
        if candidate.exists() {
            continue;
        }

        match fs::rename(source, &candidate) {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(path = %candidate.display(), "file collision resolved");
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) if is_cross_device(&e) => match move_cross_device(source, &candidate, attempt) {
                Ok(path) => return Ok(path),
                Err(FsOpError::Io(io_err)) if io_err.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            },
            Err(e) if is_permission_error(&e) => {
                log_transfer_permission_context("atomic_move", source, &candidate);
                tracing::debug!(error = %e, "permission error during move, falling back to copyfile");
                perform_permission_fallback(source, &candidate, true)?;
                if attempt > 0 {
                    tracing::info!(path = %candidate.display(), "file collision resolved (fallback)");
                }
                return Ok(candidate);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(FsOpError::CollisionExhausted {
        desired: dest.to_path_buf(),
        attempts: MAX_ATTEMPTS,
    })
}

fn move_cross_device(source: &Path, candidate: &Path, attempt: u32) -> Result<PathBuf, FsOpError> {
    let expected_size = fs::metadata(source)?.len();

    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(candidate)
    {
        Ok(_) => {
            let temp = sibling_tmp(candidate);
            let result = (|| -> Result<(), FsOpError> {
                match copy2_preserve_metadata(source, &temp) {
                    Ok(_) => {}
                    Err(e) if is_permission_error(&e) => {
                        tracing::debug!(error = %e, "permission error during move-copy, falling back to copyfile");
                        perform_permission_fallback(source, &temp, false)?;
                    }
                    Err(e) => return Err(e.into()),
                }
                fs::rename(&temp, candidate)?;
                verify_transfer_size(candidate, expected_size, "move")?;
                fs::remove_file(source)?;
                Ok(())
            })();

            match result {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::info!(path = %candidate.display(), "file collision resolved");
                    }
                    Ok(candidate.to_path_buf())
                }
                Err(e) => {
                    let _ = fs::remove_file(candidate);
                    let _ = fs::remove_file(&temp);
                    Err(e)
                }
            }
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // Raced with another writer claiming this candidate; caller retries the next one.
            Err(FsOpError::Io(e))
        }
        Err(e) => Err(e.into()),
    }
}

/// Copy `source` into a collision-free path under `dest`'s desired name.
pub fn atomic_copy(source: &Path, dest: &Path) -> Result<PathBuf, FsOpError> {
    for attempt in 0..MAX_ATTEMPTS {
        let candidate = candidate_path(dest, attempt);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => {
                let temp = sibling_tmp(&candidate);
                let expected_size = fs::metadata(source)?.len();

                let result = (|| -> Result<(), FsOpError> {
                    match copy2_preserve_metadata(source, &temp) {
                        Ok(_) => {}
                        Err(e) if is_permission_error(&e) => {
                            log_transfer_permission_context("atomic_copy", source, &temp);
                            tracing::debug!(error = %e, "permission error during copy, falling back to copyfile");
                            perform_permission_fallback(source, &temp, false)?;
                        }
                        Err(e) => return Err(e.into()),
                    }
                    fs::rename(&temp, &candidate)?;
                    verify_transfer_size(&candidate, expected_size, "copy")?;
                    Ok(())
                })();

                match result {
                    Ok(()) => {
                        if attempt > 0 {
                            tracing::info!(path = %candidate.display(), "file collision resolved");
                        }
                        return Ok(candidate);
                    }
                    Err(e) => {
                        let _ = fs::remove_file(&candidate);
                        let _ = fs::remove_file(&temp);
                        return Err(e);
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(FsOpError::CollisionExhausted {
        desired: dest.to_path_buf(),
        attempts: MAX_ATTEMPTS,
    })
}

/// Hardlink `source` into a collision-free path under `dest`'s desired
/// name. Falls back to `atomic_copy` on permission denied, cross-device, or
/// too-many-links — restarting the collision loop against the original
/// desired `dest`, matching the Python original.
pub fn atomic_hardlink(source: &Path, dest: &Path) -> Result<PathBuf, FsOpError> {
    for attempt in 0..MAX_ATTEMPTS {
        let candidate = candidate_path(dest, attempt);
        match fs::hard_link(source, &candidate) {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(path = %candidate.display(), "file collision resolved");
                }
                return Ok(candidate);
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e)
                if is_permission_error(&e) || is_cross_device(&e) || is_too_many_links(&e) =>
            {
                if is_permission_error(&e) {
                    log_transfer_permission_context("atomic_hardlink", source, &candidate);
                }
                tracing::debug!(error = %e, "hardlink failed, falling back to copy");
                return atomic_copy(source, dest);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(FsOpError::CollisionExhausted {
        desired: dest.to_path_buf(),
        attempts: MAX_ATTEMPTS,
    })
}

#[cfg(test)]
pub(crate) fn verify_transfer_size_for_test(
    dest: &Path,
    expected: u64,
    wait: Duration,
) -> Result<(), FsOpError> {
    verify_transfer_size_with_wait(dest, expected, "test", wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_resolves_collisions() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("book.epub");
        let p1 = atomic_write(&dest, b"one").unwrap();
        let p2 = atomic_write(&dest, b"two").unwrap();
        assert_eq!(p1, dest);
        assert_eq!(p2, dir.path().join("book_1.epub"));
        assert_eq!(fs::read(&p1).unwrap(), b"one");
        assert_eq!(fs::read(&p2).unwrap(), b"two");
    }

    #[test]
    fn copy_preserves_source_and_creates_independent_inode() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, b"hello world").unwrap();
        let dest = dir.path().join("dst.txt");

        let written = atomic_copy(&src, &dest).unwrap();
        assert!(src.exists());
        assert_eq!(fs::read(&written).unwrap(), b"hello world");

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let src_ino = fs::metadata(&src).unwrap().ino();
            let dst_ino = fs::metadata(&written).unwrap().ino();
            assert_ne!(src_ino, dst_ino);
        }

        // no leftover temp files
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");
    }

    #[test]
    fn move_removes_source_and_keeps_same_inode_when_possible() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, b"payload").unwrap();
        let dest = dir.path().join("dst.txt");

        let written = atomic_move(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&written).unwrap(), b"payload");
    }

    #[test]
    fn hardlink_shares_inode_with_source() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.txt");
        fs::write(&src, b"payload").unwrap();
        let dest = dir.path().join("dst.txt");

        let written = atomic_hardlink(&src, &dest).unwrap();
        assert!(src.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let src_meta = fs::metadata(&src).unwrap();
            let dst_meta = fs::metadata(&written).unwrap();
            assert_eq!(src_meta.ino(), dst_meta.ino());
            assert!(src_meta.nlink() >= 2);
        }
    }

    #[test]
    fn concurrent_collisions_produce_distinct_untruncated_files() {
        use rayon::prelude::*;
        let dir = tempdir().unwrap();
        let dest = dir.path().join("book.epub");

        let results: Vec<PathBuf> = (0..8)
            .into_par_iter()
            .map(|i| {
                let data = format!("content-{i}").into_bytes();
                atomic_write(&dest, &data).unwrap()
            })
            .collect();

        let unique: std::collections::HashSet<_> = results.iter().collect();
        assert_eq!(unique.len(), 8, "expected 8 distinct destination paths");
        for path in &results {
            assert!(fs::metadata(path).unwrap().len() > 0);
        }
    }

    #[test]
    fn size_mismatch_is_reported_after_wait() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("short.bin");
        fs::write(&dest, b"abc").unwrap();

        let err = verify_transfer_size_for_test(&dest, 100, Duration::from_millis(1))
            .expect_err("size mismatch should be reported");
        match err {
            FsOpError::SizeMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, 100);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
