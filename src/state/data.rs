/// Shared data structures for the repository
///
/// These structs represent the data model that flows between
/// the filesystem services and the calling interface.
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a node in the repository is, decided once from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    Image,
    Text,
    Document,
    Metadata,
    Other,
}

impl EntryKind {
    /// Classify a file name by its extension (case-insensitive)
    pub fn from_file_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());

        match ext.as_deref() {
            Some("jpg" | "jpeg" | "png" | "bmp" | "gif" | "tiff") => EntryKind::Image,
            Some("txt") => EntryKind::Text,
            Some("pdf" | "doc" | "docx") => EntryKind::Document,
            Some("meta") => EntryKind::Metadata,
            _ => EntryKind::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EntryKind::Directory => "folder",
            EntryKind::Image => "image",
            EntryKind::Text => "text",
            EntryKind::Document => "document",
            EntryKind::Metadata => "metadata",
            EntryKind::Other => "unknown",
        }
    }
}

/// Represents a single node (file or directory) in the repository tree
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Full path on disk
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Size in bytes, 0 for directories
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
}

impl Entry {
    /// Stat a path and build its entry
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let meta = fs::metadata(&path).map_err(|e| Error::io("stat", &path, e))?;
        Ok(Self::from_metadata(path, &meta))
    }

    pub(crate) fn from_metadata(path: PathBuf, meta: &fs::Metadata) -> Self {
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::from_file_name(&file_name_of(&path))
        };

        Entry {
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok().map(DateTime::<Local>::from),
            kind,
            path,
        }
    }

    /// Basename including extension (e.g., "q1.jpg")
    pub fn name(&self) -> String {
        file_name_of(&self.path)
    }

    /// Basename without extension (e.g., "q1")
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Directory that holds this entry
    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Dot-prefixed names are never shown, searched or counted
pub(crate) fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Split "q1.final.jpg" into ("q1.final", ".jpg"); a leading dot is not an extension
pub(crate) fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Sidecar annotation for one entry
///
/// Every field is optional on disk: a record written by "add tags" holds only
/// `tags`, and a later save may still fill in the rest.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Opaque delimited string; duplicates are allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// ISO-8601 local timestamp of the first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<String>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Check if no field has ever been written
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn subject(&self) -> &str {
        self.subject.as_deref().unwrap_or_default()
    }

    pub fn tags(&self) -> &str {
        self.tags.as_deref().unwrap_or_default()
    }

    pub fn notes(&self) -> &str {
        self.notes.as_deref().unwrap_or_default()
    }

    /// Fill every field that `self` lacks from `incoming`.
    ///
    /// Values already present in `self` are kept even when `incoming` has a
    /// different value for the same key.
    pub fn absorb(&mut self, incoming: MetadataRecord) {
        fn keep(slot: &mut Option<String>, new: Option<String>) {
            if slot.is_none() {
                *slot = new;
            }
        }
        keep(&mut self.title, incoming.title);
        keep(&mut self.subject, incoming.subject);
        keep(&mut self.tags, incoming.tags);
        keep(&mut self.notes, incoming.notes);
        keep(&mut self.modified_time, incoming.modified_time);
    }
}
