/// Timestamped snapshots of the whole repository
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::error::{Error, Result};
use super::copy::copy_tree;

/// Directory name format of a snapshot (second resolution)
pub const SNAPSHOT_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub path: PathBuf,
    pub files: usize,
}

/// Copy the repository into `backup_root/<timestamp>`.
///
/// The first item that fails to copy aborts the snapshot. Whatever was
/// already copied is left in place so it can be inspected.
pub fn snapshot(repository_root: &Path, backup_root: &Path) -> Result<Snapshot> {
    let name = Local::now().format(SNAPSHOT_FORMAT).to_string();
    snapshot_named(repository_root, backup_root, &name)
}

pub(crate) fn snapshot_named(repository_root: &Path, backup_root: &Path, name: &str) -> Result<Snapshot> {
    if !repository_root.is_dir() {
        return Err(Error::not_found("backup", repository_root));
    }
    fs::create_dir_all(backup_root).map_err(|e| Error::io("backup", backup_root, e))?;

    let target = backup_root.join(name);
    if target.exists() {
        return Err(Error::conflict("backup", target));
    }

    tracing::info!(target = %target.display(), "💾 Creating backup");
    let files = copy_tree(repository_root, &target).inspect_err(|e| {
        tracing::warn!(target = %target.display(), error = %e, "❌ Backup aborted, partial snapshot left on disk");
    })?;

    tracing::info!(target = %target.display(), files, "✅ Backup complete");
    Ok(Snapshot { path: target, files })
}
