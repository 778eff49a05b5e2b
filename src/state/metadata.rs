/// Sidecar metadata records
///
/// Every content file may have a `<stem>.meta` JSON file next to it.
/// A missing sidecar reads as an empty record; saving merges onto what is
/// already on disk, and values that were persisted earlier take precedence
/// over the ones being saved.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::{Error, Result};
use super::data::{Entry, MetadataRecord};

/// Extension of sidecar files
pub const SIDECAR_EXTENSION: &str = "meta";

#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataStore;

impl MetadataStore {
    pub fn new() -> Self {
        Self
    }

    /// Where the sidecar of `entry` lives (`Math/q1.jpg` -> `Math/q1.meta`)
    pub fn sidecar_path(&self, entry: &Entry) -> PathBuf {
        sidecar_path_for(&entry.path)
    }

    /// Read the record for `entry`; an absent sidecar is an empty record
    pub fn get(&self, entry: &Entry) -> Result<MetadataRecord> {
        read_record(&self.sidecar_path(entry))
    }

    /// Merge `partial` into the persisted record and write it back.
    ///
    /// Keys already present on disk keep their stored value; only keys the
    /// stored record lacks are taken from `partial`. `modified_time` follows
    /// the same rule, so it records the first save.
    pub fn save(&self, entry: &Entry, partial: MetadataRecord) -> Result<MetadataRecord> {
        let path = self.sidecar_path(entry);

        let mut incoming = partial;
        if incoming.modified_time.is_none() {
            incoming.modified_time = Some(Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string());
        }

        let mut record = read_record(&path)?;
        record.absorb(incoming);

        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| Error::json("save metadata", &path, e))?;
        fs::write(&path, json).map_err(|e| Error::io("save metadata", &path, e))?;

        tracing::debug!(path = %path.display(), "metadata saved");
        Ok(record)
    }

    /// Save only the tags field
    pub fn add_tags(&self, entry: &Entry, tags: &str) -> Result<MetadataRecord> {
        self.save(entry, MetadataRecord::new().with_tags(tags.trim()))
    }

    /// Tags shown next to an entry in listings; empty when unreadable
    pub fn tags_for_display(&self, entry: &Entry) -> String {
        self.get(entry)
            .map(|record| record.tags().to_string())
            .unwrap_or_default()
    }
}

pub fn sidecar_path_for(content: &Path) -> PathBuf {
    content.with_extension(SIDECAR_EXTENSION)
}

fn read_record(path: &Path) -> Result<MetadataRecord> {
    match fs::read_to_string(path) {
        Ok(text) => serde_json::from_str(&text).map_err(|e| Error::json("read metadata", path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MetadataRecord::default()),
        Err(e) => Err(Error::io("read metadata", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry_in(dir: &Path, name: &str) -> Entry {
        let path = dir.join(name);
        fs::write(&path, b"img").unwrap();
        Entry::from_path(path).unwrap()
    }

    #[test]
    fn test_absent_sidecar_is_empty_record() {
        let dir = tempdir().unwrap();
        let entry = entry_in(dir.path(), "q1.jpg");
        let record = MetadataStore::new().get(&entry).unwrap();
        assert!(record.is_empty());
    }

    #[test]
    fn test_sidecar_uses_stem() {
        let dir = tempdir().unwrap();
        let entry = entry_in(dir.path(), "q1.jpg");
        assert_eq!(MetadataStore::new().sidecar_path(&entry), dir.path().join("q1.meta"));
    }

    #[test]
    fn test_existing_values_win_over_new_ones() {
        let dir = tempdir().unwrap();
        let entry = entry_in(dir.path(), "q2.jpg");
        let store = MetadataStore::new();

        store.add_tags(&entry, "hard").unwrap();
        store
            .save(
                &entry,
                MetadataRecord::new()
                    .with_tags("easy")
                    .with_title("Quadratics")
                    .with_notes("check the sign"),
            )
            .unwrap();

        let record = store.get(&entry).unwrap();
        assert_eq!(record.tags(), "hard");
        assert_eq!(record.title(), "Quadratics");
        assert_eq!(record.notes(), "check the sign");
    }

    #[test]
    fn test_modified_time_records_first_save() {
        let dir = tempdir().unwrap();
        let entry = entry_in(dir.path(), "q1.jpg");
        let store = MetadataStore::new();

        let first = store.save(&entry, MetadataRecord::new().with_title("a")).unwrap();
        let mut later = MetadataRecord::new().with_notes("b");
        later.modified_time = Some("2099-01-01T00:00:00".to_string());
        let second = store.save(&entry, later).unwrap();

        assert!(first.modified_time.is_some());
        assert_eq!(first.modified_time, second.modified_time);
    }

    #[test]
    fn test_written_file_has_only_known_fields() {
        let dir = tempdir().unwrap();
        let entry = entry_in(dir.path(), "q1.jpg");
        fs::write(dir.path().join("q1.meta"), r#"{"tags": "old", "rating": 5}"#).unwrap();

        MetadataStore::new()
            .save(&entry, MetadataRecord::new().with_subject("Math"))
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("q1.meta")).unwrap()).unwrap();
        let keys: Vec<&str> = raw.as_object().unwrap().keys().map(String::as_str).collect();
        assert!(keys.iter().all(|k| ["title", "subject", "tags", "notes", "modified_time"].contains(k)));
        assert_eq!(raw["tags"], "old");
        assert_eq!(raw["subject"], "Math");
    }

    #[test]
    fn test_corrupt_sidecar_is_an_error() {
        let dir = tempdir().unwrap();
        let entry = entry_in(dir.path(), "q1.jpg");
        fs::write(dir.path().join("q1.meta"), "{").unwrap();

        let store = MetadataStore::new();
        assert!(matches!(store.get(&entry), Err(Error::Json { .. })));
        assert_eq!(store.tags_for_display(&entry), "");
    }
}
