use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::common::errors::RemovalError;
use crate::common::session::{SessionId, BACKUP_DIR_PREFIX};
use crate::platform::registry::RegistryKeyRef;

/// File name of the manifest inside a backup directory
pub const MANIFEST_FILE: &str = "backup_manifest.json";

/// Current manifest format
pub const MANIFEST_VERSION: u32 = 1;

/// What a backup captured, and where it came from.
///
/// Written last: a backup directory without this file is an interrupted
/// snapshot and must not be trusted by restore.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupManifest {
    pub format_version: u32,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub tool_version: String,

    /// Machine and account the backup was taken on
    #[serde(default)]
    pub computer_name: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,

    /// Every source location considered, in discovery order
    pub source_paths: Vec<PathBuf>,

    /// Install directories present at backup time (not copied)
    #[serde(default)]
    pub install_paths: Vec<PathBuf>,

    /// Directory trees copied into the backup
    pub captured_trees: Vec<CapturedTree>,

    /// Extension directory names found at backup time
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Registry keys exported into the backup
    pub registry_keys_backed: Vec<RegistryExport>,

    /// Identifier state before any reset
    pub identifier_backup: Option<IdentifierBackup>,

    /// Non-fatal problems hit while taking the backup
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TreeKind {
    Settings,
    Extensions,
    IdentifierStorage,
}

/// One copied directory: `source` on the machine, `backup` relative to the
/// backup root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapturedTree {
    pub kind: TreeKind,
    pub source: PathBuf,
    pub backup: PathBuf,
    pub file_count: u64,
}

/// One exported registry key; `file` is relative to the backup root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryExport {
    pub key: RegistryKeyRef,
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentifierBackup {
    /// Identifier value before reset, if one was set
    pub original_id: Option<String>,
    /// Info record, relative to the backup root
    pub info_file: PathBuf,
}

impl BackupManifest {
    pub fn new(session_id: &SessionId) -> Self {
        Self {
            format_version: MANIFEST_VERSION,
            session_id: session_id.clone(),
            created_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            computer_name: std::env::var("COMPUTERNAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .ok(),
            user_name: std::env::var("USERNAME")
                .or_else(|_| std::env::var("USER"))
                .ok(),
            source_paths: Vec::new(),
            install_paths: Vec::new(),
            captured_trees: Vec::new(),
            extensions: Vec::new(),
            registry_keys_backed: Vec::new(),
            identifier_backup: None,
            warnings: Vec::new(),
        }
    }

    pub fn add_tree(&mut self, tree: CapturedTree) {
        self.captured_trees.push(tree);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn trees(&self, kind: TreeKind) -> impl Iterator<Item = &CapturedTree> {
        self.captured_trees.iter().filter(move |t| t.kind == kind)
    }

    pub fn manifest_path(backup_dir: &Path) -> PathBuf {
        backup_dir.join(MANIFEST_FILE)
    }

    /// Is this backup directory committed?
    pub fn is_complete(backup_dir: &Path) -> bool {
        Self::manifest_path(backup_dir).is_file()
    }

    /// Write the manifest. The file appears atomically: it is written
    /// under a temporary name and renamed into place.
    pub fn save(&self, backup_dir: &Path) -> Result<PathBuf, RemovalError> {
        let path = Self::manifest_path(backup_dir);
        let tmp = backup_dir.join(format!("{}.partial", MANIFEST_FILE));
        let json = serde_json::to_string_pretty(self).map_err(|e| RemovalError::Manifest {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&tmp, json).map_err(|e| RemovalError::at_path(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| RemovalError::at_path(&path, e))?;
        Ok(path)
    }

    /// Load the manifest of a committed backup
    pub fn load(backup_dir: &Path) -> Result<Self, RemovalError> {
        let path = Self::manifest_path(backup_dir);
        if !path.is_file() {
            return Err(RemovalError::BackupIncomplete {
                path: backup_dir.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| RemovalError::at_path(&path, e))?;
        serde_json::from_str(&contents).map_err(|e| RemovalError::Manifest {
            path,
            message: e.to_string(),
        })
    }
}

/// Summary of one backup directory (for listing)
#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub path: PathBuf,
    pub name: String,
    pub complete: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub original_id: Option<String>,
}

/// List backup directories under `root`, most recent first.
///
/// Directories without a manifest are listed as incomplete.
pub fn list_backups(root: &Path) -> Result<Vec<BackupSummary>, RemovalError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in std::fs::read_dir(root).map_err(|e| RemovalError::at_path(root, e))? {
        let entry = entry.map_err(|e| RemovalError::at_path(root, e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if !path.is_dir() || !name.starts_with(BACKUP_DIR_PREFIX) {
            continue;
        }

        let manifest = BackupManifest::load(&path).ok();
        backups.push(BackupSummary {
            complete: manifest.is_some(),
            created_at: manifest.as_ref().map(|m| m.created_at),
            original_id: manifest
                .as_ref()
                .and_then(|m| m.identifier_backup.as_ref())
                .and_then(|i| i.original_id.clone()),
            path,
            name,
        });
    }

    // Names embed a sortable timestamp
    backups.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(backups)
}

/// Most recent committed backup under `root`
pub fn latest_complete(root: &Path) -> Result<Option<PathBuf>, RemovalError> {
    Ok(list_backups(root)?
        .into_iter()
        .find(|b| b.complete)
        .map(|b| b.path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_manifest_is_backup_incomplete() {
        let tmp = TempDir::new().unwrap();
        let err = BackupManifest::load(tmp.path()).unwrap_err();
        assert!(matches!(err, RemovalError::BackupIncomplete { .. }));
        assert!(!BackupManifest::is_complete(tmp.path()));
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let mut manifest = BackupManifest::new(&SessionId::generate());
        manifest.source_paths.push(PathBuf::from("/U1"));
        manifest.add_warning("registry export failed".into());
        manifest.save(tmp.path()).unwrap();

        assert!(BackupManifest::is_complete(tmp.path()));
        assert!(!tmp.path().join("backup_manifest.json.partial").exists());
        let loaded = BackupManifest::load(tmp.path()).unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_corrupt_manifest_is_reported() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(MANIFEST_FILE), "{ not json").unwrap();
        assert!(matches!(
            BackupManifest::load(tmp.path()),
            Err(RemovalError::Manifest { .. })
        ));
    }

    #[test]
    fn test_list_backups_flags_incomplete_and_sorts() {
        let tmp = TempDir::new().unwrap();
        let older = tmp.path().join("VSCode_Backup_20250101_000000_aaaaaaaa");
        let newer = tmp.path().join("VSCode_Backup_20250202_000000_bbbbbbbb");
        std::fs::create_dir_all(&older).unwrap();
        std::fs::create_dir_all(&newer).unwrap();
        std::fs::create_dir_all(tmp.path().join("unrelated")).unwrap();
        BackupManifest::new(&SessionId::generate()).save(&older).unwrap();

        let backups = list_backups(tmp.path()).unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].path, newer);
        assert!(!backups[0].complete);
        assert!(backups[1].complete);

        assert_eq!(latest_complete(tmp.path()).unwrap(), Some(older));
    }
}
