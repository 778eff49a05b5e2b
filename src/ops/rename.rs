/// Single and batch renaming
use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::state::data::{split_name, Entry};
use crate::state::tree::rename_entry;

/// Naming scheme for a batch rename: `prefix + stem + suffix + "_" + NNN + ext`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPattern {
    pub prefix: String,
    pub suffix: String,
    pub start: u32,
    /// Zero-padded width of the counter
    pub width: usize,
}

impl Default for BatchPattern {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            start: 1,
            width: 3,
        }
    }
}

impl BatchPattern {
    /// Name `file_name` would get with counter value `counter`
    pub fn apply(&self, file_name: &str, counter: u32) -> String {
        let (stem, ext) = split_name(file_name);
        format!(
            "{}{}{}_{:0width$}{}",
            self.prefix,
            stem,
            self.suffix,
            counter,
            ext,
            width = self.width
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchRenameReport {
    /// `(old, new)` for each renamed entry
    pub renamed: Vec<(PathBuf, PathBuf)>,
    /// Entries left alone because their computed name was taken
    pub skipped: Vec<PathBuf>,
    /// `(path, error message)` for renames that failed
    pub failures: Vec<(PathBuf, String)>,
}

impl BatchRenameReport {
    pub fn renamed_count(&self) -> usize {
        self.renamed.len()
    }
}

/// Rename one entry; see [`rename_entry`]
pub fn rename(entry: &Entry, new_name: &str) -> Result<Entry> {
    rename_entry(entry, new_name)
}

/// The names a batch rename would produce, without touching the disk
pub fn preview_batch_rename(entries: &[Entry], pattern: &BatchPattern) -> Vec<(String, String)> {
    entries
        .iter()
        .zip(pattern.start..)
        .map(|(entry, counter)| {
            let name = entry.name();
            let new_name = pattern.apply(&name, counter);
            (name, new_name)
        })
        .collect()
}

/// Rename `entries` in selection order.
///
/// The counter advances once per entry whatever happens to it. An entry
/// whose computed destination already exists keeps its name, so the number
/// of renamed entries can be lower than the selection size.
pub fn batch_rename(entries: &[Entry], pattern: &BatchPattern) -> BatchRenameReport {
    let mut report = BatchRenameReport::default();

    for (entry, counter) in entries.iter().zip(pattern.start..) {
        let new_name = pattern.apply(&entry.name(), counter);
        let target = entry.parent().join(&new_name);

        if target.exists() {
            tracing::debug!(path = %entry.path.display(), target = %target.display(), "skipped, name taken");
            report.skipped.push(entry.path.clone());
            continue;
        }

        match rename_entry(entry, &new_name) {
            Ok(renamed) => report.renamed.push((entry.path.clone(), renamed.path)),
            Err(e) => {
                tracing::warn!(path = %entry.path.display(), error = %e, "⚠️  Rename failed");
                report.failures.push((entry.path.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        renamed = report.renamed.len(),
        skipped = report.skipped.len(),
        "batch rename finished"
    );
    report
}
