use chrono::Local;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::copy::copy_tree;
use super::manifest::{BackupManifest, CapturedTree, IdentifierBackup, RegistryExport, TreeKind};
use crate::common::errors::RemovalError;
use crate::common::progress::Reporter;
use crate::common::session::SessionId;
use crate::locator::{Product, ResourceSet};
use crate::platform::registry::RegistryStore;

pub const SETTINGS_DIR: &str = "Settings";
pub const EXTENSIONS_DIR: &str = "Extensions";
pub const REGISTRY_DIR: &str = "Registry";
pub const MACHINE_ID_DIR: &str = "MachineID";
pub const LOGS_DIR: &str = "Logs";
pub const EXTENSIONS_LIST_FILE: &str = "extensions_list.json";
pub const MACHINE_ID_INFO_FILE: &str = "machine_id_info.json";
pub const README_FILE: &str = "README.txt";

/// Contents of `MachineID/machine_id_info.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineIdInfo {
    pub original_machine_id: Option<String>,
    pub backup_date: String,
    pub session_id: SessionId,
    pub computer_name: Option<String>,
    pub user_name: Option<String>,
}

/// Copy everything removal would destroy into `dest_root`.
///
/// Layout: `Settings/<profile>`, `Extensions/<profile>` plus
/// `extensions_list.json`, `Registry/<flattened key>.reg`,
/// `MachineID/` (info record and `globalStorage/<profile>`), `Logs/`.
///
/// Re-running against a partially written `dest_root` merges rather than
/// overwrites. A registry key that fails to export is a warning; a copy
/// fault (other than a vanished source) fails the whole snapshot. The
/// manifest is written last and marks the backup as complete.
pub fn snapshot(
    resources: &ResourceSet,
    dest_root: &Path,
    registry: &dyn RegistryStore,
    product: &Product,
    session: &SessionId,
    reporter: &Reporter,
) -> Result<BackupManifest, RemovalError> {
    for dir in [SETTINGS_DIR, EXTENSIONS_DIR, REGISTRY_DIR, MACHINE_ID_DIR, LOGS_DIR] {
        let path = dest_root.join(dir);
        std::fs::create_dir_all(&path).map_err(|e| RemovalError::at_path(&path, e))?;
    }

    let mut manifest = BackupManifest::new(session);
    manifest.source_paths = resources
        .user_data_paths
        .iter()
        .chain(resources.extension_paths.iter())
        .cloned()
        .collect();
    manifest.install_paths = resources.install_paths.clone();

    backup_settings(resources, dest_root, &mut manifest, reporter)?;
    backup_extensions(resources, dest_root, &mut manifest, reporter)?;
    backup_registry(registry, product, dest_root, &mut manifest, reporter);
    backup_identifier(resources, registry, product, dest_root, session, &mut manifest, reporter)?;

    write_readme(dest_root, &manifest).map_err(|e| RemovalError::at_path(dest_root, e))?;
    manifest.save(dest_root)?;

    reporter.info(&format!("Backup written to {}", dest_root.display()));
    Ok(manifest)
}

/// Directory name for a user-data root inside the backup, unique per run
fn profile_name(path: &Path, used: &mut Vec<String>) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string());
    let mut name = base.clone();
    let mut n = 2;
    while used.contains(&name) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    used.push(name.clone());
    name
}

fn backup_settings(
    resources: &ResourceSet,
    dest_root: &Path,
    manifest: &mut BackupManifest,
    reporter: &Reporter,
) -> Result<(), RemovalError> {
    let mut used = Vec::new();
    for user_path in &resources.user_data_paths {
        let name = profile_name(user_path, &mut used);
        let source = user_path.join("User");
        if !source.is_dir() {
            continue;
        }
        let rel = PathBuf::from(SETTINGS_DIR).join(&name);
        let file_count = copy_tree(&source, &dest_root.join(&rel))?;
        manifest.add_tree(CapturedTree {
            kind: TreeKind::Settings,
            source,
            backup: rel,
            file_count,
        });
        reporter.info(&format!("Backed up settings from {}", user_path.display()));
    }
    Ok(())
}

fn backup_extensions(
    resources: &ResourceSet,
    dest_root: &Path,
    manifest: &mut BackupManifest,
    reporter: &Reporter,
) -> Result<(), RemovalError> {
    let mut used = Vec::new();
    let mut names = Vec::new();

    for ext_path in &resources.extension_paths {
        let owner = ext_path.parent().unwrap_or(ext_path);
        let name = profile_name(owner, &mut used);
        if !ext_path.is_dir() {
            continue;
        }

        if let Ok(entries) = std::fs::read_dir(ext_path) {
            let mut found: Vec<String> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_dir())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect();
            found.sort();
            names.extend(found);
        }

        let rel = PathBuf::from(EXTENSIONS_DIR).join(&name);
        let file_count = copy_tree(ext_path, &dest_root.join(&rel))?;
        manifest.add_tree(CapturedTree {
            kind: TreeKind::Extensions,
            source: ext_path.clone(),
            backup: rel,
            file_count,
        });
        reporter.info(&format!("Backed up extensions from {}", ext_path.display()));
    }

    let list_path = dest_root.join(EXTENSIONS_DIR).join(EXTENSIONS_LIST_FILE);
    let json = serde_json::to_string_pretty(&names).map_err(|e| RemovalError::Manifest {
        path: list_path.clone(),
        message: e.to_string(),
    })?;
    std::fs::write(&list_path, json).map_err(|e| RemovalError::at_path(&list_path, e))?;
    manifest.extensions = names;
    Ok(())
}

fn backup_registry(
    registry: &dyn RegistryStore,
    product: &Product,
    dest_root: &Path,
    manifest: &mut BackupManifest,
    reporter: &Reporter,
) {
    for key in &product.backup_keys {
        let rel = PathBuf::from(REGISTRY_DIR).join(key.export_file_name());
        match registry.export(key, &dest_root.join(&rel)) {
            Ok(()) => {
                manifest.registry_keys_backed.push(RegistryExport {
                    key: key.clone(),
                    file: rel,
                });
                reporter.info(&format!("Backed up registry key: {}", key));
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(key = %key, "registry key absent, nothing to export");
            }
            Err(e) => {
                let msg = format!("Failed to back up registry key {}: {}", key, e);
                reporter.warn(&msg);
                manifest.add_warning(msg);
            }
        }
    }
}

/// Read the current identifier; absence is normal
pub fn current_identifier(registry: &dyn RegistryStore, product: &Product) -> Option<String> {
    match registry.read_string(&product.registry_root, &product.identifier_value) {
        Ok(value) => value,
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            tracing::warn!("could not read {}: {}", product.identifier_value, e);
            None
        }
    }
}

fn backup_identifier(
    resources: &ResourceSet,
    registry: &dyn RegistryStore,
    product: &Product,
    dest_root: &Path,
    session: &SessionId,
    manifest: &mut BackupManifest,
    reporter: &Reporter,
) -> Result<(), RemovalError> {
    let original = current_identifier(registry, product);
    let info = MachineIdInfo {
        original_machine_id: original.clone(),
        backup_date: Local::now().to_rfc3339(),
        session_id: session.clone(),
        computer_name: manifest.computer_name.clone(),
        user_name: manifest.user_name.clone(),
    };

    let info_rel = PathBuf::from(MACHINE_ID_DIR).join(MACHINE_ID_INFO_FILE);
    let info_path = dest_root.join(&info_rel);
    let json = serde_json::to_string_pretty(&info).map_err(|e| RemovalError::Manifest {
        path: info_path.clone(),
        message: e.to_string(),
    })?;
    std::fs::write(&info_path, json).map_err(|e| RemovalError::at_path(&info_path, e))?;

    let mut used = Vec::new();
    for user_path in &resources.user_data_paths {
        let name = profile_name(user_path, &mut used);
        let storage = user_path.join("User").join("globalStorage");
        if !storage.is_dir() {
            continue;
        }
        let rel = PathBuf::from(MACHINE_ID_DIR).join("globalStorage").join(&name);
        let file_count = copy_tree(&storage, &dest_root.join(&rel))?;
        manifest.add_tree(CapturedTree {
            kind: TreeKind::IdentifierStorage,
            source: storage,
            backup: rel,
            file_count,
        });
    }

    manifest.identifier_backup = Some(IdentifierBackup {
        original_id: original.clone(),
        info_file: info_rel,
    });
    match original {
        Some(id) => reporter.info(&format!("Backed up machine identifier {}", id)),
        None => reporter.info("No machine identifier set; recorded its absence"),
    }
    Ok(())
}

fn write_readme(dest_root: &Path, manifest: &BackupManifest) -> std::io::Result<()> {
    let registry_count = manifest.registry_keys_backed.len();
    let text = format!(
        "vscrub backup\n\
         =============\n\
         \n\
         Created:    {}\n\
         Session ID: {}\n\
         Version:    {}\n\
         Computer:   {}\n\
         User:       {}\n\
         \n\
         Contents:\n\
         Settings/    user settings, keybindings, snippets ({} profiles)\n\
         Extensions/  installed extensions and extensions_list.json ({} extensions)\n\
         Registry/    exported registry keys ({} files)\n\
         MachineID/   identifier record and globalStorage copies\n\
         Logs/        operation log of the run\n\
         \n\
         To restore: vscrub restore --path \"{}\"\n\
         Or import the .reg files and copy the folders back by hand.\n\
         A backup without backup_manifest.json is incomplete.\n",
        manifest.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        manifest.session_id,
        manifest.tool_version,
        manifest.computer_name.as_deref().unwrap_or("unknown"),
        manifest.user_name.as_deref().unwrap_or("unknown"),
        manifest.trees(TreeKind::Settings).count(),
        manifest.extensions.len(),
        registry_count,
        dest_root.display(),
    );
    std::fs::write(dest_root.join(README_FILE), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::progress::NullSink;
    use crate::platform::memory::InMemoryRegistry;
    use crate::platform::registry::NoopRegistry;
    use tempfile::TempDir;

    fn populated_user_root(root: &Path, name: &str) -> PathBuf {
        let user = root.join(name);
        std::fs::create_dir_all(user.join("User/globalStorage")).unwrap();
        std::fs::create_dir_all(user.join("extensions/ms-python.python-1.0/dist")).unwrap();
        std::fs::write(user.join("User/settings.json"), "{\"editor.fontSize\": 14}").unwrap();
        std::fs::write(user.join("User/globalStorage/storage.json"), "{}").unwrap();
        std::fs::write(user.join("extensions/ms-python.python-1.0/dist/main.js"), "x").unwrap();
        user
    }

    #[test]
    fn test_snapshot_layout() {
        let tmp = TempDir::new().unwrap();
        let user = populated_user_root(tmp.path(), "Code");
        let resources = ResourceSet {
            user_data_paths: vec![user.clone()],
            extension_paths: vec![user.join("extensions")],
            ..ResourceSet::default()
        };
        let dest = tmp.path().join("backup");
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        let manifest = snapshot(
            &resources,
            &dest,
            &NoopRegistry,
            &Product::default(),
            &SessionId::generate(),
            &reporter,
        )
        .unwrap();

        assert!(dest.join("Settings/Code/settings.json").is_file());
        assert!(dest.join("Extensions/Code/ms-python.python-1.0/dist/main.js").is_file());
        assert!(dest.join("Extensions/extensions_list.json").is_file());
        assert!(dest.join("MachineID/machine_id_info.json").is_file());
        assert!(dest.join("MachineID/globalStorage/Code/storage.json").is_file());
        assert!(dest.join("Logs").is_dir());
        assert!(dest.join("README.txt").is_file());
        assert!(BackupManifest::is_complete(&dest));
        assert_eq!(manifest.extensions, vec!["ms-python.python-1.0".to_string()]);
        assert_eq!(manifest.trees(TreeKind::Settings).count(), 1);
    }

    #[test]
    fn test_registry_exports_and_missing_keys() {
        let tmp = TempDir::new().unwrap();
        let product = Product::default();
        let registry = InMemoryRegistry::new();
        registry.set_value(&product.registry_root, "machineId", "abc-123");

        let sink = NullSink;
        let reporter = Reporter::new(&sink);
        let dest = tmp.path().join("backup");
        let manifest = snapshot(
            &ResourceSet::default(),
            &dest,
            &registry,
            &product,
            &SessionId::generate(),
            &reporter,
        )
        .unwrap();

        assert_eq!(manifest.registry_keys_backed.len(), 1);
        assert!(dest.join(&manifest.registry_keys_backed[0].file).is_file());
        assert!(manifest.warnings.is_empty(), "absent keys are not warnings");
        assert_eq!(
            manifest.identifier_backup.unwrap().original_id.as_deref(),
            Some("abc-123")
        );
    }

    #[test]
    fn test_uncreatable_destination_fails() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "not a dir").unwrap();
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        let result = snapshot(
            &ResourceSet::default(),
            &blocker.join("backup"),
            &NoopRegistry,
            &Product::default(),
            &SessionId::generate(),
            &reporter,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_profile_names_are_unique() {
        let mut used = Vec::new();
        assert_eq!(profile_name(Path::new("/a/Code"), &mut used), "Code");
        assert_eq!(profile_name(Path::new("/b/Code"), &mut used), "Code_2");
    }
}
