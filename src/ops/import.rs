/// Copy external files into a subject directory
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::state::data::file_name_of;
use super::copy::{copy_file, unique_destination};

/// Result of an import operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Destination of every file that was copied
    pub imported: Vec<PathBuf>,
    /// `(source, error message)` for files that could not be copied
    pub failures: Vec<(PathBuf, String)>,
}

impl ImportReport {
    pub fn imported_count(&self) -> usize {
        self.imported.len()
    }
}

/// Copy `sources` into `repository_root/subject`.
///
/// A name that already exists gets `_1`, `_2`, ... before its extension;
/// nothing is ever overwritten. A failing file is recorded and the rest are
/// still imported; files copied before a failure stay where they are.
pub fn import_files(repository_root: &Path, subject: &str, sources: &[PathBuf]) -> Result<ImportReport> {
    let subject_dir = repository_root.join(subject);
    fs::create_dir_all(&subject_dir).map_err(|e| Error::io("import", &subject_dir, e))?;

    tracing::info!(subject, count = sources.len(), "🔍 Importing files");

    let mut report = ImportReport::default();
    for source in sources {
        match import_one(&subject_dir, source) {
            Ok(dest) => report.imported.push(dest),
            Err(e) => {
                tracing::warn!(source = %source.display(), error = %e, "⚠️  Import failed");
                report.failures.push((source.clone(), e.to_string()));
            }
        }
    }

    tracing::info!(
        imported = report.imported.len(),
        failed = report.failures.len(),
        "✅ Import complete"
    );
    Ok(report)
}

fn import_one(subject_dir: &Path, source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(Error::not_found("import", source));
    }
    let name = file_name_of(source);
    let dest = unique_destination(subject_dir, &name, |n| format!("_{n}"));
    copy_file(source, &dest)?;
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_same_basename_never_overwrites() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("R");
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        let first = dir.path().join("a/photo.jpg");
        let second = dir.path().join("b/photo.jpg");
        fs::write(&first, b"first").unwrap();
        fs::write(&second, b"second").unwrap();

        let report = import_files(&repo, "Math", &[first, second]).unwrap();

        assert_eq!(report.imported_count(), 2);
        assert_eq!(fs::read(repo.join("Math/photo.jpg")).unwrap(), b"first");
        assert_eq!(fs::read(repo.join("Math/photo_1.jpg")).unwrap(), b"second");
    }

    #[test]
    fn test_failure_does_not_stop_the_batch() {
        let dir = tempdir().unwrap();
        let repo = dir.path().join("R");
        let good = dir.path().join("good.png");
        fs::write(&good, b"ok").unwrap();
        let missing = dir.path().join("missing.png");

        let report = import_files(&repo, "Physics", &[missing.clone(), good]).unwrap();

        assert_eq!(report.imported_count(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, missing);
        assert!(repo.join("Physics/good.png").is_file());
    }
}
