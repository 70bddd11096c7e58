use std::path::{Path, PathBuf};

use super::{BulkReport, ItemOutcome};
use crate::backup::copy::count_files;
use crate::common::errors::RemovalError;
use crate::common::progress::Reporter;
use crate::common::{permissions, safety};
use crate::locator::{Environment, Product};

/// Recursively delete each existing path, best-effort.
///
/// Existence is re-checked at deletion time, so paths that vanished since
/// discovery come back as [`ItemOutcome::Absent`]. Protected locations are
/// refused with a warning.
pub fn remove_directories(
    paths: &[PathBuf],
    env: &Environment,
    reporter: &Reporter,
) -> BulkReport<PathBuf> {
    let mut report = BulkReport::default();

    for path in paths {
        let outcome = if std::fs::symlink_metadata(path).is_err() {
            ItemOutcome::Absent
        } else if safety::is_protected(path, env) {
            let reason = "protected location".to_string();
            reporter.warn(&format!("Refusing to remove {}: {}", path.display(), reason));
            ItemOutcome::Refused(reason)
        } else {
            match delete_path(path) {
                Ok(()) => {
                    reporter.info(&format!("Removed: {}", path.display()));
                    ItemOutcome::Done
                }
                Err(e) if e.is_not_found() => ItemOutcome::Absent,
                Err(e) => {
                    reporter.warn(&format!("Could not remove {}: {}", path.display(), e));
                    if matches!(
                        e,
                        RemovalError::PermissionDenied { .. } | RemovalError::ResourceBusy { .. }
                    ) {
                        reporter.info(&permissions::permission_hint(path));
                    }
                    ItemOutcome::Failed(e)
                }
            }
        };
        report.push(path.clone(), outcome);
    }

    report
}

/// Delete a single file or directory permanently
fn delete_path(path: &Path) -> Result<(), RemovalError> {
    let meta = std::fs::symlink_metadata(path).map_err(|e| RemovalError::at_path(path, e))?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
    .map_err(|e| RemovalError::at_path(path, e))
}

/// Result of the temp and prefetch sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    pub entries: BulkReport<PathBuf>,
    /// Regular files deleted, counting the contents of removed directories
    pub files_deleted: u64,
}

/// Glob patterns swept by system cleanup
pub fn sweep_patterns(env: &Environment, product: &Product) -> Vec<String> {
    let mut patterns = Vec::new();
    for temp in &env.temp_dirs {
        let base = glob::Pattern::escape(&temp.to_string_lossy());
        for pattern in &product.temp_patterns {
            patterns.push(format!("{}/{}", base, pattern));
        }
    }
    if let Some(root) = &env.system_root {
        let prefetch = root.join("Prefetch");
        let base = glob::Pattern::escape(&prefetch.to_string_lossy());
        patterns.push(format!("{}/{}", base, product.prefetch_pattern));
    }
    patterns
}

/// Delete product leftovers in the temp roots and the prefetch directory.
///
/// Matches are case-insensitive. Each match is deleted independently; the
/// number of files removed is reported alongside the per-entry outcomes.
/// Matches the environment protects (the run's own backup among them) are
/// refused with a warning.
pub fn system_cleanup(env: &Environment, product: &Product, reporter: &Reporter) -> SweepReport {
    let options = glob::MatchOptions {
        case_sensitive: false,
        ..glob::MatchOptions::new()
    };

    let mut matches: Vec<PathBuf> = Vec::new();
    for pattern in sweep_patterns(env, product) {
        match glob::glob_with(&pattern, options) {
            Ok(entries) => {
                for entry in entries.filter_map(|e| e.ok()) {
                    if !matches.contains(&entry) {
                        matches.push(entry);
                    }
                }
            }
            Err(e) => tracing::debug!(pattern = %pattern, "bad sweep pattern: {}", e),
        }
    }

    let mut report = SweepReport::default();
    for path in matches {
        if safety::is_protected(&path, env) {
            let reason = "protected location".to_string();
            reporter.warn(&format!("Refusing to sweep {}: {}", path.display(), reason));
            report.entries.push(path, ItemOutcome::Refused(reason));
            continue;
        }
        let files = count_files(&path);
        match delete_path(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), files, "swept");
                report.files_deleted += files;
                report.entries.push(path, ItemOutcome::Done);
            }
            Err(e) if e.is_not_found() => report.entries.push(path, ItemOutcome::Absent),
            Err(e) => {
                reporter.warn(&format!("Could not sweep {}: {}", path.display(), e));
                report.entries.push(path, ItemOutcome::Failed(e));
            }
        }
    }

    reporter.info(&format!(
        "System cleanup removed {} files ({} entries)",
        report.files_deleted,
        report.entries.succeeded()
    ));
    report
}
