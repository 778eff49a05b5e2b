/// Repository statistics
use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

use crate::state::data::is_hidden;

/// Totals over every visible file under a root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    pub total_files: usize,
    pub total_bytes: u64,
    /// File count keyed by the name of the directory holding each file
    pub by_subject: BTreeMap<String, usize>,
}

/// Walk `root` and count files and bytes.
///
/// Nothing is cached; each call reads the tree again. A file's subject is
/// the name of its immediate parent directory, whatever its sidecar says.
pub fn compute(root: &Path) -> RepositoryStats {
    let mut stats = RepositoryStats::default();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if is_hidden(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };

        stats.total_files += 1;
        stats.total_bytes += meta.len();

        let subject = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        *stats.by_subject.entry(subject).or_insert(0) += 1;
    }

    tracing::debug!(files = stats.total_files, bytes = stats.total_bytes, "stats computed");
    stats
}

/// Human-readable size: "512 B", "1.5 KB", "3.2 MB", "1.0 GB"
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < MB {
        format!("{:.1} KB", b / KB)
    } else if b < GB {
        format!("{:.1} MB", b / MB)
    } else {
        format!("{:.1} GB", b / GB)
    }
}
