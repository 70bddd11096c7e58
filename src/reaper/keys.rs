use super::{BulkReport, ItemOutcome};
use crate::common::progress::Reporter;
use crate::locator::Product;
use crate::platform::registry::{RegistryKeyRef, RegistryStore};

/// Delete each key (with its subtree).
///
/// A key that does not exist is not counted and not a warning; any other
/// failure is a warning and the loop moves on.
pub fn remove_registry_keys(
    registry: &dyn RegistryStore,
    keys: &[RegistryKeyRef],
    reporter: &Reporter,
) -> BulkReport<RegistryKeyRef> {
    let mut report = BulkReport::default();
    for key in keys {
        let outcome = ItemOutcome::from_result(registry.delete_key(key));
        match &outcome {
            ItemOutcome::Done => reporter.info(&format!("Removed registry key: {}", key)),
            ItemOutcome::Failed(e) => {
                reporter.warn(&format!("Could not remove registry key {}: {}", key, e))
            }
            _ => tracing::debug!(key = %key, "registry key absent"),
        }
        report.push(key.clone(), outcome);
    }
    report
}

/// Uninstall entries whose `DisplayName` names the product.
///
/// Entries that disappear between enumeration and reading, or that carry no
/// display name, are skipped.
pub fn scan_uninstall_entries(registry: &dyn RegistryStore, product: &Product) -> Vec<RegistryKeyRef> {
    let root = &product.uninstall_root;
    let names = match registry.subkeys(root) {
        Ok(names) => names,
        Err(e) => {
            if !e.is_not_found() {
                tracing::warn!("could not enumerate {}: {}", root, e);
            }
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for name in names {
        let entry = root.child(&name);
        match registry.read_string(&entry, "DisplayName") {
            Ok(Some(name)) if product.matches_display_name(&name) => {
                tracing::info!(key = %entry, display_name = %name, "found uninstall entry");
                found.push(entry);
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(key = %entry, "uninstall entry vanished during scan");
            }
            Err(e) => tracing::debug!(key = %entry, "skipping unreadable uninstall entry: {}", e),
        }
    }
    found
}
