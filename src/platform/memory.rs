use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::registry::{RegistryKeyRef, RegistryStore};
use crate::common::errors::RemovalError;

const EXPORT_HEADER: &str = "Windows Registry Editor Version 5.00";

#[derive(Debug)]
struct Key {
    /// Key path with the caller's casing
    display: RegistryKeyRef,
    values: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by lower-cased full path; registry paths are case-insensitive
    keys: BTreeMap<String, Key>,
    denied: BTreeSet<String>,
    /// Subkeys listed by enumeration that vanish before they can be opened
    phantoms: BTreeMap<String, BTreeSet<String>>,
}

impl State {
    /// A key exists if it was stored or any stored key lives below it
    fn exists(&self, root: &str) -> bool {
        let prefix = format!("{}\\", root);
        self.keys.contains_key(root) || self.keys.keys().any(|path| path.starts_with(&prefix))
    }
}

/// A registry kept in memory.
///
/// Exports and imports real `.reg`-format text, so snapshots and restores
/// behave the same as against the native store. Failures can be injected
/// with [`InMemoryRegistry::deny`] and [`InMemoryRegistry::add_phantom_subkey`].
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
}

fn norm(key: &RegistryKeyRef) -> String {
    key.full_path().to_lowercase()
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a key (without values)
    pub fn create_key(&self, key: &RegistryKeyRef) {
        self.lock().keys.entry(norm(key)).or_insert_with(|| Key {
            display: key.clone(),
            values: BTreeMap::new(),
        });
    }

    /// Set a string value, creating the key if needed
    pub fn set_value(&self, key: &RegistryKeyRef, name: &str, value: &str) {
        let mut state = self.lock();
        let entry = state.keys.entry(norm(key)).or_insert_with(|| Key {
            display: key.clone(),
            values: BTreeMap::new(),
        });
        entry.values.insert(name.to_string(), value.to_string());
    }

    pub fn key_exists(&self, key: &RegistryKeyRef) -> bool {
        self.lock().exists(&norm(key))
    }

    /// Make every mutation of `key` (and its values) fail with `PermissionDenied`
    pub fn deny(&self, key: &RegistryKeyRef) {
        self.lock().denied.insert(norm(key));
    }

    /// List `name` under `parent` during enumeration, but report it as
    /// gone when opened
    pub fn add_phantom_subkey(&self, parent: &RegistryKeyRef, name: &str) {
        self.lock()
            .phantoms
            .entry(norm(parent))
            .or_default()
            .insert(name.to_string());
    }

    /// Number of keys currently stored
    pub fn key_count(&self) -> usize {
        self.lock().keys.len()
    }

    fn render(state: &State, key: &RegistryKeyRef) -> Option<String> {
        let root = norm(key);
        let prefix = format!("{}\\", root);
        let mut out = format!("{}\r\n\r\n", EXPORT_HEADER);
        let mut found = false;
        for (path, entry) in &state.keys {
            if *path != root && !path.starts_with(&prefix) {
                continue;
            }
            found = true;
            out.push_str(&format!("[{}]\r\n", entry.display.full_path()));
            for (name, value) in &entry.values {
                out.push_str(&format!("\"{}\"=\"{}\"\r\n", escape(name), escape(value)));
            }
            out.push_str("\r\n");
        }
        found.then_some(out)
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split `"name"="value"` honouring escaped quotes
fn parse_value_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix('"')?;
    let mut escaped = false;
    let mut end = None;
    for (i, c) in rest.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '"' if !escaped => {
                end = Some(i);
                break;
            }
            _ => escaped = false,
        }
    }
    let end = end?;
    let name = unescape(&rest[..end]);
    let value = rest[end + 1..].strip_prefix("=\"")?.strip_suffix('"')?;
    Some((name, unescape(value)))
}

impl RegistryStore for InMemoryRegistry {
    fn read_string(&self, key: &RegistryKeyRef, name: &str) -> Result<Option<String>, RemovalError> {
        let state = self.lock();
        let root = norm(key);
        match state.keys.get(&root) {
            Some(entry) => Ok(entry.values.get(name).cloned()),
            None if state.exists(&root) => Ok(None),
            None => Err(RemovalError::NotFound {
                target: key.full_path(),
            }),
        }
    }

    fn delete_value(&self, key: &RegistryKeyRef, name: &str) -> Result<(), RemovalError> {
        let mut state = self.lock();
        let target = format!("{}\\{}", key, name);
        if state.denied.contains(&norm(key)) {
            return Err(RemovalError::PermissionDenied { target });
        }
        match state.keys.get_mut(&norm(key)).and_then(|e| e.values.remove(name)) {
            Some(_) => Ok(()),
            None => Err(RemovalError::NotFound { target }),
        }
    }

    fn delete_key(&self, key: &RegistryKeyRef) -> Result<(), RemovalError> {
        let mut state = self.lock();
        let root = norm(key);
        if state.denied.contains(&root) {
            return Err(RemovalError::PermissionDenied {
                target: key.full_path(),
            });
        }
        if !state.exists(&root) {
            return Err(RemovalError::NotFound {
                target: key.full_path(),
            });
        }
        let prefix = format!("{}\\", root);
        state
            .keys
            .retain(|path, _| *path != root && !path.starts_with(&prefix));
        Ok(())
    }

    fn subkeys(&self, key: &RegistryKeyRef) -> Result<Vec<String>, RemovalError> {
        let state = self.lock();
        let root = norm(key);
        if !state.exists(&root) {
            return Err(RemovalError::NotFound {
                target: key.full_path(),
            });
        }
        let prefix_len = key.full_path().len() + 1;
        let prefix = format!("{}\\", root);
        let mut names: Vec<String> = Vec::new();
        for (path, entry) in &state.keys {
            if !path.starts_with(&prefix) {
                continue;
            }
            let display = entry.display.full_path();
            let tail = &display[prefix_len.min(display.len())..];
            let first = tail.split('\\').next().unwrap_or(tail).to_string();
            if !first.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(&first)) {
                names.push(first);
            }
        }
        if let Some(phantoms) = state.phantoms.get(&root) {
            names.extend(phantoms.iter().cloned());
        }
        Ok(names)
    }

    fn export(&self, key: &RegistryKeyRef, dest: &Path) -> Result<(), RemovalError> {
        let text = {
            let state = self.lock();
            Self::render(&state, key).ok_or_else(|| RemovalError::NotFound {
                target: key.full_path(),
            })?
        };
        std::fs::write(dest, text).map_err(|e| RemovalError::at_path(dest, e))
    }

    fn import(&self, file: &Path) -> Result<(), RemovalError> {
        let text = std::fs::read_to_string(file).map_err(|e| RemovalError::at_path(file, e))?;
        let mut current: Option<RegistryKeyRef> = None;
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line == EXPORT_HEADER {
                continue;
            }
            if let Some(path) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let key = RegistryKeyRef::parse(path).ok_or_else(|| RemovalError::Command {
                    command: format!("import {}", file.display()),
                    message: format!("unknown hive in '{}'", path),
                })?;
                self.create_key(&key);
                current = Some(key);
            } else if let (Some(key), Some((name, value))) = (&current, parse_value_line(line)) {
                self.set_value(key, &name, &value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::registry::Hive;
    use tempfile::TempDir;

    fn vscode() -> RegistryKeyRef {
        RegistryKeyRef::new(Hive::CurrentUser, r"SOFTWARE\Microsoft\VSCode")
    }

    #[test]
    fn test_paths_are_case_insensitive() {
        let reg = InMemoryRegistry::new();
        reg.set_value(&vscode(), "machineId", "abc");
        let upper = RegistryKeyRef::new(Hive::CurrentUser, r"software\microsoft\vscode");
        assert_eq!(reg.read_string(&upper, "machineId").unwrap().as_deref(), Some("abc"));
    }

    #[test]
    fn test_delete_key_removes_descendants() {
        let reg = InMemoryRegistry::new();
        reg.create_key(&vscode());
        reg.set_value(&vscode().child("Sub"), "a", "b");
        reg.delete_key(&vscode()).unwrap();
        assert_eq!(reg.key_count(), 0);
        assert!(reg.delete_key(&vscode()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_subkeys_lists_direct_children_and_phantoms() {
        let reg = InMemoryRegistry::new();
        let root = RegistryKeyRef::new(Hive::LocalMachine, r"SOFTWARE\Uninstall");
        reg.create_key(&root);
        reg.create_key(&root.child("A"));
        reg.set_value(&root.child("A").child("Deep"), "x", "y");
        reg.create_key(&root.child("B"));
        reg.add_phantom_subkey(&root, "Gone");
        assert_eq!(reg.subkeys(&root).unwrap(), vec!["A", "B", "Gone"]);
        assert!(reg
            .read_string(&root.child("Gone"), "DisplayName")
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_parent_of_stored_key_exists_implicitly() {
        let reg = InMemoryRegistry::new();
        let root = RegistryKeyRef::new(Hive::LocalMachine, r"SOFTWARE\Uninstall");
        reg.set_value(&root.child("X_is1"), "DisplayName", "X");

        assert!(reg.key_exists(&root));
        assert_eq!(reg.subkeys(&root).unwrap(), vec!["X_is1"]);
        assert_eq!(reg.read_string(&root, "DisplayName").unwrap(), None);
        assert!(!reg.key_exists(&RegistryKeyRef::new(Hive::LocalMachine, r"SOFTWARE\Uninst")));
    }

    #[test]
    fn test_delete_value_reports_missing_value() {
        let reg = InMemoryRegistry::new();
        reg.set_value(&vscode(), "machineId", "abc");
        reg.delete_value(&vscode(), "machineId").unwrap();
        assert!(reg.delete_value(&vscode(), "machineId").unwrap_err().is_not_found());
    }

    #[test]
    fn test_denied_key_cannot_be_deleted() {
        let reg = InMemoryRegistry::new();
        reg.create_key(&vscode());
        reg.deny(&vscode());
        assert!(matches!(
            reg.delete_key(&vscode()),
            Err(RemovalError::PermissionDenied { .. })
        ));
        assert!(reg.key_exists(&vscode()));
    }

    #[test]
    fn test_export_then_import_restores_values() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("vscode.reg");
        let reg = InMemoryRegistry::new();
        reg.set_value(&vscode(), "machineId", r#"id with "quotes" and \slash"#);
        reg.set_value(&vscode().child("Sub"), "k", "v");

        reg.export(&vscode(), &file).unwrap();
        reg.delete_key(&vscode()).unwrap();
        reg.import(&file).unwrap();

        assert_eq!(
            reg.read_string(&vscode(), "machineId").unwrap().as_deref(),
            Some(r#"id with "quotes" and \slash"#)
        );
        assert_eq!(
            reg.read_string(&vscode().child("Sub"), "k").unwrap().as_deref(),
            Some("v")
        );
    }

    #[test]
    fn test_export_of_missing_key_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let reg = InMemoryRegistry::new();
        let err = reg.export(&vscode(), &tmp.path().join("x.reg")).unwrap_err();
        assert!(err.is_not_found());
        assert!(!tmp.path().join("x.reg").exists());
    }
}
