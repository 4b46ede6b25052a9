//! Permission/ownership diagnostics for failed transfers and destination
//! validation (spec.md §4.7). Strictly a debug side channel — collecting
//! this context must never mask or replace the original error.

use std::path::Path;

#[cfg(unix)]
fn format_uid(uid: u32) -> String {
    users::get_user_by_uid(uid)
        .and_then(|u| u.name().to_str().map(str::to_string))
        .unwrap_or_else(|| uid.to_string())
}

#[cfg(unix)]
fn format_gid(gid: u32) -> String {
    users::get_group_by_gid(gid)
        .and_then(|g| g.name().to_str().map(str::to_string))
        .unwrap_or_else(|| gid.to_string())
}

#[cfg(unix)]
fn log_identity(label: &str) {
    // SAFETY: geteuid/getegid/getgroups are pure queries of process state.
    let euid = unsafe { libc::geteuid() };
    let egid = unsafe { libc::getegid() };

    let mut groups: Vec<libc::gid_t> = vec![0; 32];
    let n = unsafe { libc::getgroups(groups.len() as i32, groups.as_mut_ptr()) };
    let group_names: Vec<String> = if n >= 0 {
        groups[..n as usize]
            .iter()
            .map(|g| format!("{}({})", format_gid(*g), g))
            .collect()
    } else {
        Vec::new()
    };

    tracing::debug!(
        label,
        euid = format!("{}({})", format_uid(euid), euid),
        egid = format!("{}({})", format_gid(egid), egid),
        groups = ?group_names,
        "permission context"
    );
}

#[cfg(not(unix))]
fn log_identity(_label: &str) {}

#[cfg(unix)]
fn log_path_mode(label: &str, path: &Path) {
    use std::os::unix::fs::MetadataExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            tracing::debug!(
                label,
                path = %path.display(),
                mode = format!("{:#o}", meta.mode() & 0o777),
                owner = format!("{}({})", format_uid(meta.uid()), meta.uid()),
                group = format!("{}({})", format_gid(meta.gid()), meta.gid()),
                exists = true,
                is_dir = meta.is_dir(),
                is_symlink = meta.file_type().is_symlink(),
                "path permissions"
            );
        }
        Err(e) => {
            tracing::debug!(label, path = %path.display(), error = %e, "stat failed during permission diagnostics");
        }
    }
}

#[cfg(not(unix))]
fn log_path_mode(label: &str, path: &Path) {
    let exists = path.exists();
    tracing::debug!(label, path = %path.display(), exists, "path permissions (non-unix, limited detail)");
}

/// Log effective identity plus mode/owner/group for `path` and its parent.
/// Call only from a failure path (e.g. destination validation failed).
pub fn log_path_permission_context(label: &str, path: &Path) {
    log_identity(label);
    log_path_mode(label, path);
    if let Some(parent) = path.parent() {
        log_path_mode(label, parent);
    }
}

/// Log effective identity plus mode/owner/group for the source/destination/
/// destination-parent triplet of a failed transfer.
pub fn log_transfer_permission_context(label: &str, source: &Path, dest: &Path) {
    log_identity(label);
    log_path_mode(label, source);
    log_path_mode(label, dest);
    if let Some(parent) = dest.parent() {
        log_path_mode(label, parent);
    }
}
