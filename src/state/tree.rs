use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ops::copy::{copy_file, copy_tree, unique_destination};
use super::data::{file_name_of, is_hidden, Entry};

/// The RepositoryTree is the file browser over the repository directory.
/// It lists folders, keeps the navigation history and performs single-item
/// rename/move/copy/delete.
#[derive(Debug)]
pub struct RepositoryTree {
    root: PathBuf,
    /// Navigation history; the last element is the current directory
    history: Vec<PathBuf>,
}

impl RepositoryTree {
    /// Open the repository at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::io("open repository", &root, e))?;

        tracing::info!(root = %root.display(), "📁 Repository opened");

        Ok(Self {
            history: vec![root.clone()],
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory currently being browsed
    pub fn current(&self) -> &Path {
        self.history.last().map(PathBuf::as_path).unwrap_or(&self.root)
    }

    /// List the visible entries of `path`, sorted by name
    pub fn list(&self, path: &Path) -> Result<Vec<Entry>> {
        list_dir(path)
    }

    /// List the current directory
    pub fn list_current(&self) -> Result<Vec<Entry>> {
        list_dir(self.current())
    }

    /// Descend into a child directory of the current one
    pub fn enter(&mut self, name: &str) -> Result<&Path> {
        let target = self.current().join(name);
        if !target.is_dir() {
            return Err(Error::not_found("enter", target));
        }
        self.history.push(target);
        Ok(self.current())
    }

    /// Go back one level; the root is never left
    pub fn up(&mut self) -> &Path {
        if self.history.len() > 1 {
            self.history.pop();
        }
        self.current()
    }

    /// Reset the history to `root -> subject`, used after an import
    pub fn jump_to_subject(&mut self, subject: &str) {
        let dir = self.root.join(subject);
        if dir.is_dir() {
            self.history = vec![self.root.clone(), dir];
        }
    }

    /// Resolve a user-supplied name against the current directory
    pub fn resolve(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.current().join(name)
        }
    }

    /// Rename within the same directory; fails if the new name is taken
    pub fn rename(&self, entry: &Entry, new_name: &str) -> Result<Entry> {
        rename_entry(entry, new_name)
    }

    /// Copy into `target_dir`, appending `_copyN` when the name is taken
    pub fn copy(&self, entry: &Entry, target_dir: &Path) -> Result<Entry> {
        if !target_dir.is_dir() {
            return Err(Error::not_found("copy", target_dir));
        }
        let target = unique_destination(target_dir, &entry.name(), |n| format!("_copy{n}"));

        if entry.is_dir() {
            copy_tree(&entry.path, &target)?;
        } else {
            copy_file(&entry.path, &target)?;
        }

        tracing::info!(from = %entry.path.display(), to = %target.display(), "copied");
        Entry::from_path(target)
    }

    /// Move into `target_dir`, appending `_moveN` when the name is taken
    pub fn move_to(&self, entry: &Entry, target_dir: &Path) -> Result<Entry> {
        if !target_dir.is_dir() {
            return Err(Error::not_found("move", target_dir));
        }
        if entry.is_dir() && is_within(target_dir, &entry.path) {
            return Err(Error::conflict("move", target_dir));
        }
        let target = unique_destination(target_dir, &entry.name(), |n| format!("_move{n}"));

        match fs::rename(&entry.path, &target) {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                // Different filesystem: copy then remove the source
                if entry.is_dir() {
                    copy_tree(&entry.path, &target)?;
                    fs::remove_dir_all(&entry.path).map_err(|e| Error::io("move", &entry.path, e))?;
                } else {
                    copy_file(&entry.path, &target)?;
                    fs::remove_file(&entry.path).map_err(|e| Error::io("move", &entry.path, e))?;
                }
            }
            Err(e) => return Err(Error::io("move", &entry.path, e)),
        }

        tracing::info!(from = %entry.path.display(), to = %target.display(), "moved");
        Entry::from_path(target)
    }

    /// Remove a file, or a directory with everything below it
    pub fn delete(&self, entry: &Entry) -> Result<()> {
        let result = if entry.is_dir() {
            fs::remove_dir_all(&entry.path)
        } else {
            fs::remove_file(&entry.path)
        };
        result.map_err(|e| Error::io("delete", &entry.path, e))?;

        tracing::info!(path = %entry.path.display(), "🗑️  Deleted");
        Ok(())
    }
}

/// Visible entries of a directory, sorted by name
pub fn list_dir(path: &Path) -> Result<Vec<Entry>> {
    if !path.is_dir() {
        return Err(Error::not_found("list", path));
    }

    let mut entries = Vec::new();
    for item in fs::read_dir(path).map_err(|e| Error::io("list", path, e))? {
        let item = item.map_err(|e| Error::io("list", path, e))?;
        let name = item.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            continue;
        }
        let item_path = item.path();
        let meta = fs::metadata(&item_path).map_err(|e| Error::io("list", &item_path, e))?;
        entries.push(Entry::from_metadata(item_path, &meta));
    }

    entries.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    Ok(entries)
}

/// Rename an entry inside its own directory.
///
/// Same name is a no-op; an existing destination is a conflict and leaves
/// the filesystem untouched.
pub fn rename_entry(entry: &Entry, new_name: &str) -> Result<Entry> {
    check_name("rename", new_name)?;
    if new_name == file_name_of(&entry.path) {
        return Ok(entry.clone());
    }

    let target = entry.parent().join(new_name);
    if target.exists() {
        return Err(Error::conflict("rename", target));
    }

    fs::rename(&entry.path, &target).map_err(|e| Error::io("rename", &entry.path, e))?;
    tracing::info!(from = %entry.path.display(), to = %target.display(), "renamed");

    Entry::from_path(target)
}

/// A plain file name: not empty, not `.`/`..`, no separators
fn check_name(operation: &'static str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(|c: char| c == '/' || c == '\\') {
        return Err(Error::invalid_name(operation, name));
    }
    Ok(())
}

/// Whether `path` is `ancestor` or lies below it, symlinks resolved
fn is_within(path: &Path, ancestor: &Path) -> bool {
    let path = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let ancestor = fs::canonicalize(ancestor).unwrap_or_else(|_| ancestor.to_path_buf());
    path.starts_with(ancestor)
}

/// `EXDEV` on Unix, `ERROR_NOT_SAME_DEVICE` on Windows
#[cfg(unix)]
const CROSS_DEVICE: Option<i32> = Some(18);
#[cfg(windows)]
const CROSS_DEVICE: Option<i32> = Some(17);
#[cfg(not(any(unix, windows)))]
const CROSS_DEVICE: Option<i32> = None;

fn is_cross_device(e: &io::Error) -> bool {
    CROSS_DEVICE.is_some() && e.raw_os_error() == CROSS_DEVICE
}
