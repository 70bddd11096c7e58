//! Machine identifier reset.
//!
//! Clears the identifier wherever the product keeps it and proposes a new
//! one. The proposal is reported only; the product generates and stores its
//! own identifier on next start.

use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::backup::snapshot::current_identifier;
use crate::common::errors::RemovalError;
use crate::common::progress::Reporter;
use crate::locator::{join_relative, Environment, Product, ResourceSet};
use crate::platform::registry::RegistryStore;
use crate::reaper;

/// Outcome of an identifier reset
#[derive(Debug, Clone, Serialize)]
pub struct IdentifierReset {
    /// Identifier value before the reset, if one was set
    pub previous: Option<String>,
    /// Freshly generated replacement (not written anywhere)
    pub proposed: Uuid,
    pub values_cleared: usize,
    pub files_scrubbed: usize,
    pub files_deleted: usize,
    pub directories_removed: usize,
}

/// Clear every trace of the machine identifier.
///
/// Never fails: each step is best-effort and problems become warnings.
pub fn reset_identifier(
    resources: &ResourceSet,
    registry: &dyn RegistryStore,
    product: &Product,
    env: &Environment,
    reporter: &Reporter,
) -> IdentifierReset {
    let previous = current_identifier(registry, product);
    if let Some(id) = &previous {
        tracing::info!(machine_id = %id, "original machine identifier");
    }

    let mut result = IdentifierReset {
        previous,
        proposed: Uuid::new_v4(),
        values_cleared: clear_registry_values(registry, product, reporter),
        files_scrubbed: 0,
        files_deleted: 0,
        directories_removed: 0,
    };

    let mut doomed: Vec<PathBuf> = Vec::new();
    for root in &resources.user_data_paths {
        let user = root.join("User");

        let storage = user.join("globalStorage").join("storage.json");
        if storage.is_file() {
            match scrub_json_file(&storage, &product.identifier_keys) {
                Ok(removed) => {
                    reporter.info(&format!(
                        "Cleaned machine identifier from {} ({} keys)",
                        storage.display(),
                        removed
                    ));
                    result.files_scrubbed += 1;
                }
                Err(e) => reporter.warn(&format!("Failed to clean {}: {}", storage.display(), e)),
            }
        }

        // Binary state store; not editable in place
        let state_db = user.join("state.vscdb");
        if state_db.is_file() {
            match std::fs::remove_file(&state_db) {
                Ok(()) => {
                    reporter.info(&format!("Removed state database: {}", state_db.display()));
                    result.files_deleted += 1;
                }
                Err(e) => reporter.warn(&format!(
                    "Failed to remove {}: {}",
                    state_db.display(),
                    RemovalError::at_path(&state_db, e)
                )),
            }
        }

        doomed.push(user.join("workspaceStorage"));
        doomed.extend(product.telemetry_dirs.iter().map(|d| join_relative(root, d)));
    }

    result.directories_removed = reaper::remove_directories(&doomed, env, reporter).succeeded();

    reporter.info(&format!(
        "Machine identifier reset. Proposed new ID: {} (the product generates its own on next start)",
        result.proposed
    ));
    result
}

/// Delete the identifier values under the product root; absent ones are skipped
fn clear_registry_values(registry: &dyn RegistryStore, product: &Product, reporter: &Reporter) -> usize {
    let mut cleared = 0;
    for name in &product.identifier_keys {
        match registry.delete_value(&product.registry_root, name) {
            Ok(()) => {
                reporter.info(&format!("Cleared registry value: {}", name));
                cleared += 1;
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => reporter.warn(&format!("Could not clear registry value {}: {}", name, e)),
        }
    }
    cleared
}

/// Remove `keys` from the top-level object of a JSON file and rewrite it.
/// Returns how many keys were present.
pub fn scrub_json_file(path: &Path, keys: &[String]) -> Result<usize, RemovalError> {
    let contents = std::fs::read_to_string(path).map_err(|e| RemovalError::at_path(path, e))?;
    let mut value: serde_json::Value =
        serde_json::from_str(&contents).map_err(|e| RemovalError::Io {
            target: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

    let Some(object) = value.as_object_mut() else {
        return Ok(0);
    };
    let removed = keys.iter().filter(|k| object.remove(k.as_str()).is_some()).count();

    let json = serde_json::to_string_pretty(&value).map_err(|e| RemovalError::Io {
        target: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    std::fs::write(path, json).map_err(|e| RemovalError::at_path(path, e))?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::progress::{NullSink, RecordingSink, StatusLevel};
    use crate::platform::memory::InMemoryRegistry;
    use tempfile::TempDir;

    fn user_root(tmp: &Path) -> PathBuf {
        let root = tmp.join("Code");
        let user = root.join("User");
        std::fs::create_dir_all(user.join("globalStorage/vscode.vscode-telemetry")).unwrap();
        std::fs::create_dir_all(user.join("workspaceStorage/abc")).unwrap();
        std::fs::create_dir_all(root.join("CachedData/1234")).unwrap();
        std::fs::write(
            user.join("globalStorage/storage.json"),
            r#"{"machineId":"abc-123","telemetry.machineId":"t","theme":"dark"}"#,
        )
        .unwrap();
        std::fs::write(user.join("state.vscdb"), [0u8, 1, 2]).unwrap();
        root
    }

    #[test]
    fn test_reset_clears_registry_and_proposes_new_uuid() {
        let product = Product::default();
        let registry = InMemoryRegistry::new();
        registry.set_value(&product.registry_root, "machineId", "abc-123");
        registry.set_value(&product.registry_root, "sqmUserId", "s");
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        let reset = reset_identifier(
            &ResourceSet::default(),
            &registry,
            &product,
            &Environment::default(),
            &reporter,
        );

        assert_eq!(reset.previous.as_deref(), Some("abc-123"));
        assert_eq!(reset.values_cleared, 2);
        assert_eq!(registry.read_string(&product.registry_root, "machineId").unwrap(), None);
        assert_ne!(reset.proposed.to_string(), "abc-123");
        assert_eq!(reset.proposed.get_version_num(), 4);
        // The proposal is never written back
        assert_eq!(registry.read_string(&product.registry_root, "machineId").unwrap(), None);
    }

    #[test]
    fn test_reset_scrubs_files_and_removes_storage() {
        let tmp = TempDir::new().unwrap();
        let root = user_root(tmp.path());
        let resources = ResourceSet {
            user_data_paths: vec![root.clone()],
            ..ResourceSet::default()
        };
        let sink = RecordingSink::new();
        let reporter = Reporter::new(&sink);

        let reset = reset_identifier(
            &resources,
            &InMemoryRegistry::new(),
            &Product::default(),
            &Environment::default(),
            &reporter,
        );

        let storage = std::fs::read_to_string(root.join("User/globalStorage/storage.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&storage).unwrap();
        assert!(value.get("machineId").is_none());
        assert!(value.get("telemetry.machineId").is_none());
        assert_eq!(value["theme"], "dark");

        assert!(!root.join("User/state.vscdb").exists());
        assert!(!root.join("User/workspaceStorage").exists());
        assert!(!root.join("User/globalStorage/vscode.vscode-telemetry").exists());
        assert!(!root.join("CachedData").exists());
        assert_eq!(reset.files_scrubbed, 1);
        assert_eq!(reset.files_deleted, 1);
        assert_eq!(reset.directories_removed, 3);
        assert!(sink.messages(StatusLevel::Warning).is_empty());
    }

    #[test]
    fn test_corrupt_storage_is_a_warning() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("Code");
        std::fs::create_dir_all(root.join("User/globalStorage")).unwrap();
        std::fs::write(root.join("User/globalStorage/storage.json"), "{ broken").unwrap();
        let resources = ResourceSet {
            user_data_paths: vec![root],
            ..ResourceSet::default()
        };
        let sink = RecordingSink::new();
        let reporter = Reporter::new(&sink);

        let reset = reset_identifier(
            &resources,
            &InMemoryRegistry::new(),
            &Product::default(),
            &Environment::default(),
            &reporter,
        );
        assert_eq!(reset.files_scrubbed, 0);
        assert_eq!(sink.messages(StatusLevel::Warning).len(), 1);
    }
}
