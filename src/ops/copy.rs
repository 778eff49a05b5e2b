/// Low-level copy helpers shared by import, copy/move and backup
use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::state::data::split_name;

/// Copy one file's bytes and carry over its access/modification times
pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    let bytes = fs::copy(src, dst).map_err(|e| Error::io("copy", src, e))?;

    let meta = fs::metadata(src).map_err(|e| Error::io("copy", src, e))?;
    let mut times = FileTimes::new();
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }

    let file = File::options()
        .write(true)
        .open(dst)
        .map_err(|e| Error::io("copy", dst, e))?;
    file.set_times(times).map_err(|e| Error::io("copy", dst, e))?;

    Ok(bytes)
}

/// Deep-copy `src` into `dst` (which must not exist yet).
///
/// Stops at the first item that cannot be copied; whatever was copied
/// before that point stays on disk. Returns the number of files copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut files = 0;

    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(src).to_path_buf();
            Error::io("copy", path, e.into())
        })?;

        let relative = entry
            .path()
            .strip_prefix(src)
            .unwrap_or_else(|_| Path::new(""));
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io("copy", &target, e))?;
        } else {
            copy_file(entry.path(), &target)?;
            files += 1;
        }
    }

    Ok(files)
}

/// Pick a free path in `dir` for `name`.
///
/// When `dir/name` is taken, `decorate(n)` produces the text inserted between
/// stem and extension for n = 1, 2, ... until the result does not exist.
pub fn unique_destination(dir: &Path, name: &str, decorate: impl Fn(u32) -> String) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = split_name(name);
    let mut counter = 1;
    loop {
        let candidate = dir.join(format!("{stem}{}{ext}", decorate(counter)));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}
