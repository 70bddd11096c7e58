use std::path::Path;
use walkdir::WalkDir;

use crate::common::errors::RemovalError;

/// Copy `src` into `dst`, merging with whatever `dst` already holds.
///
/// Existing files are overwritten and nothing is ever deleted, so re-running
/// after a partial failure converges on a full copy. A source that vanishes
/// mid-copy is skipped; any other fault aborts. Returns the number of files
/// copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<u64, RemovalError> {
    std::fs::create_dir_all(dst).map_err(|e| RemovalError::at_path(dst, e))?;

    let mut copied = 0u64;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().unwrap_or(src).to_path_buf();
                match e.into_io_error() {
                    Some(io) if io.kind() == std::io::ErrorKind::NotFound => continue,
                    Some(io) => return Err(RemovalError::at_path(&path, io)),
                    None => continue, // symlink loop
                }
            }
        };

        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| RemovalError::at_path(&target, e))?;
        } else if file_type.is_file() {
            match std::fs::copy(entry.path(), &target) {
                Ok(_) => copied += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && !entry.path().exists() => {
                    tracing::debug!(path = %entry.path().display(), "source vanished during copy");
                }
                Err(e) => return Err(RemovalError::at_path(entry.path(), e)),
            }
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping symlink");
        }
    }

    Ok(copied)
}

/// Count regular files below `path` (0 if it does not exist)
pub fn count_files(path: &Path) -> u64 {
    if path.is_file() {
        return 1;
    }
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count() as u64
}
