/// Recursive name search
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::state::data::{is_hidden, Entry};

/// Lazily walk `root` and yield every visible file whose name contains
/// `term`, ignoring case.
///
/// The walk is depth-first and follows the order in which the OS lists
/// each directory, so results are not globally sorted. Entries that cannot
/// be read are skipped. The iterator is single-use.
pub fn search(root: &Path, term: &str) -> impl Iterator<Item = Entry> {
    let needle = term.to_lowercase();

    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(move |e| e.file_name().to_string_lossy().to_lowercase().contains(&needle))
        .filter_map(|e| to_entry(&e))
}

fn to_entry(dir_entry: &DirEntry) -> Option<Entry> {
    let meta = dir_entry.metadata().ok()?;
    Some(Entry::from_metadata(dir_entry.path().to_path_buf(), &meta))
}
