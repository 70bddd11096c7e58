use serde::Serialize;
use std::path::{Path, PathBuf};

use super::copy::copy_tree;
use super::manifest::BackupManifest;
use crate::common::errors::RemovalError;
use crate::common::progress::Reporter;
use crate::common::session::SessionId;
use crate::platform::registry::RegistryStore;

/// Report from a restore operation
#[derive(Debug, Serialize)]
pub struct RestoreReport {
    pub backup_dir: PathBuf,
    pub session_id: SessionId,
    pub trees_restored: usize,
    pub files_restored: u64,
    pub registry_imported: usize,
    pub original_id: Option<String>,
    pub errors: Vec<String>,
}

/// Put a committed backup back in place.
///
/// Only backups with a manifest are trusted. Trees are merged back into
/// their recorded source locations (existing files are overwritten) and each
/// exported registry file is re-imported. One failed item does not stop the
/// others; failures end up in `errors`.
pub fn restore(
    backup_dir: &Path,
    registry: &dyn RegistryStore,
    reporter: &Reporter,
) -> Result<RestoreReport, RemovalError> {
    let manifest = BackupManifest::load(backup_dir)?;
    reporter.info(&format!(
        "Restoring backup {} (session {})",
        backup_dir.display(),
        manifest.session_id
    ));

    let mut report = RestoreReport {
        backup_dir: backup_dir.to_path_buf(),
        session_id: manifest.session_id.clone(),
        trees_restored: 0,
        files_restored: 0,
        registry_imported: 0,
        original_id: manifest
            .identifier_backup
            .as_ref()
            .and_then(|i| i.original_id.clone()),
        errors: Vec::new(),
    };

    let total = manifest.captured_trees.len() + manifest.registry_keys_backed.len();
    let mut done = 0usize;

    for tree in &manifest.captured_trees {
        let from = backup_dir.join(&tree.backup);
        done += 1;
        if !from.is_dir() {
            let msg = format!("Backup tree missing: {}", from.display());
            reporter.warn(&msg);
            report.errors.push(msg);
            continue;
        }

        match copy_tree(&from, &tree.source) {
            Ok(files) => {
                report.trees_restored += 1;
                report.files_restored += files;
                tracing::debug!(source = %tree.source.display(), files, "restored tree");
            }
            Err(e) => {
                let msg = format!("Failed to restore '{}': {}", tree.source.display(), e);
                reporter.warn(&msg);
                report.errors.push(msg);
            }
        }
        reporter.progress(percent(done, total), "Restoring files");
    }

    for export in &manifest.registry_keys_backed {
        let file = backup_dir.join(&export.file);
        done += 1;
        match registry.import(&file) {
            Ok(()) => {
                report.registry_imported += 1;
                reporter.info(&format!("Imported registry key: {}", export.key));
            }
            Err(e) => {
                let msg = format!("Failed to import {}: {}", export.key, e);
                reporter.warn(&msg);
                report.errors.push(msg);
            }
        }
        reporter.progress(percent(done, total), "Importing registry keys");
    }

    reporter.progress(100, "Restore finished");
    Ok(report)
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done * 100) / total).min(100) as u8
}
