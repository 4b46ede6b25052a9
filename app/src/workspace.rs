//! Managed workspace lifecycle and the managed-vs-external cleanup
//! discipline (spec.md §4.5).
//!
//! A `Workspace` is a subtree of the process tmp root owned by exactly one
//! pipeline invocation. It is backed by `tempfile::TempDir` so the subtree
//! is removed on every exit path — success, error, or panic unwind — for
//! free, the same guarantee spec.md asks for without a bespoke `Drop` impl.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace under the OS temp directory.
    pub fn new() -> io::Result<Self> {
        Self::new_in(&std::env::temp_dir())
    }

    /// Create a workspace under an explicit tmp root (tests supply an
    /// isolated root so fixtures never touch the real `/tmp`).
    pub fn new_in(tmp_root: &Path) -> io::Result<Self> {
        fs::create_dir_all(tmp_root)?;
        let dir = tempfile::Builder::new()
            .prefix("shelfcase-")
            .tempdir_in(tmp_root)?;
        Ok(Workspace { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A uniquely-named scratch subdirectory under the workspace root, for
    /// archive extraction targets (spec.md §4.2, §6 "extraction scratch
    /// directories").
    pub fn unique_subdir(&self, prefix: &str) -> io::Result<PathBuf> {
        let suffix: u64 = rand::random();
        let path = self.root().join(format!("{prefix}-{suffix:016x}"));
        fs::create_dir_all(&path)?;
        Ok(path)
    }
}

fn resolve_best_effort(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// True iff `path` resolves to somewhere strictly inside `tmp_root` (not
/// equal to it).
pub fn is_within_tmp_dir(path: &Path, tmp_root: &Path) -> bool {
    let resolved_path = resolve_best_effort(path);
    let resolved_root = resolve_best_effort(tmp_root);
    resolved_path != resolved_root && resolved_path.starts_with(&resolved_root)
}

/// Predicate the transfer phase uses to decide whether archive extraction
/// is permitted for a given source path: only archives already staged
/// inside the managed workspace (or about to be, for managed tasks) may be
/// opened. External inputs outside the workspace are never extracted in
/// place.
pub fn is_managed_workspace_path(path: &Path, tmp_root: &Path) -> bool {
    is_within_tmp_dir(path, tmp_root)
}

/// Remove `path` if and only if it is strictly under `tmp_root`. Refuses
/// (no-ops) for anything else, including `tmp_root` itself. Errors are
/// logged at debug level, never propagated — cleanup must not mask the
/// original pipeline error.
pub fn safe_cleanup_path(path: &Path, tmp_root: &Path) {
    if !is_within_tmp_dir(path, tmp_root) {
        tracing::debug!(
            path = %path.display(),
            tmp_root = %tmp_root.display(),
            "refusing to clean up a path outside the managed workspace"
        );
        return;
    }

    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    if let Err(e) = result {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "workspace cleanup failed");
        }
    }
}

/// Remove every path recorded by the scan phase as workspace scratch
/// (`PreparedFiles::workspace_cleanup`). Called on every exit path of the
/// transfer phase, independent of the `Workspace`'s own `Drop`.
pub fn cleanup_output_staging(cleanup_paths: &[PathBuf], tmp_root: &Path) {
    for path in cleanup_paths {
        safe_cleanup_path(path, tmp_root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn workspace_root_is_removed_on_drop() {
        let tmp_root = tempdir().unwrap();
        let root_path;
        {
            let ws = Workspace::new_in(tmp_root.path()).unwrap();
            root_path = ws.root().to_path_buf();
            assert!(root_path.exists());
            assert!(is_within_tmp_dir(&root_path, tmp_root.path()));
        }
        assert!(!root_path.exists());
    }

    #[test]
    fn unique_subdir_names_do_not_collide() {
        let tmp_root = tempdir().unwrap();
        let ws = Workspace::new_in(tmp_root.path()).unwrap();
        let a = ws.unique_subdir("extract").unwrap();
        let b = ws.unique_subdir("extract").unwrap();
        assert_ne!(a, b);
        assert!(a.exists());
        assert!(b.exists());
    }

    #[test]
    fn safe_cleanup_refuses_paths_outside_tmp_root() {
        let tmp_root = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let victim = outside.path().join("precious.txt");
        fs::write(&victim, b"keep me").unwrap();

        safe_cleanup_path(&victim, tmp_root.path());
        assert!(victim.exists());
    }

    #[test]
    fn safe_cleanup_refuses_tmp_root_itself() {
        let tmp_root = tempdir().unwrap();
        safe_cleanup_path(tmp_root.path(), tmp_root.path());
        assert!(tmp_root.path().exists());
    }

    #[test]
    fn safe_cleanup_removes_files_and_dirs_inside_workspace() {
        let tmp_root = tempdir().unwrap();
        let ws = Workspace::new_in(tmp_root.path()).unwrap();
        let file = ws.root().join("scratch.txt");
        fs::write(&file, b"x").unwrap();
        let subdir = ws.unique_subdir("extract").unwrap();

        cleanup_output_staging(&[file.clone(), subdir.clone()], tmp_root.path());

        assert!(!file.exists());
        assert!(!subdir.exists());
    }
}
