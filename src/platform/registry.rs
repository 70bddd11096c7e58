use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::common::errors::RemovalError;

/// Root hive of a registry location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Hive {
    CurrentUser,
    LocalMachine,
    ClassesRoot,
}

impl Hive {
    pub fn as_str(&self) -> &'static str {
        match self {
            Hive::CurrentUser => "HKEY_CURRENT_USER",
            Hive::LocalMachine => "HKEY_LOCAL_MACHINE",
            Hive::ClassesRoot => "HKEY_CLASSES_ROOT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HKEY_CURRENT_USER" | "HKCU" => Some(Hive::CurrentUser),
            "HKEY_LOCAL_MACHINE" | "HKLM" => Some(Hive::LocalMachine),
            "HKEY_CLASSES_ROOT" | "HKCR" => Some(Hive::ClassesRoot),
            _ => None,
        }
    }
}

impl std::fmt::Display for Hive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(hive, path)` registry location
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryKeyRef {
    pub hive: Hive,
    pub path: String,
}

impl RegistryKeyRef {
    pub fn new(hive: Hive, path: impl Into<String>) -> Self {
        Self {
            hive,
            path: path.into(),
        }
    }

    /// Subkey `name` below this key
    pub fn child(&self, name: &str) -> Self {
        Self::new(self.hive, format!("{}\\{}", self.path, name))
    }

    /// Fully-qualified form, e.g. `HKEY_CURRENT_USER\SOFTWARE\Classes\vscode`
    pub fn full_path(&self) -> String {
        format!("{}\\{}", self.hive.as_str(), self.path)
    }

    /// Parse a fully-qualified key path
    pub fn parse(full: &str) -> Option<Self> {
        let (hive, path) = full.split_once('\\')?;
        Some(Self::new(Hive::parse(hive)?, path.trim_matches('\\')))
    }

    /// Export file name: the full key path flattened into one file-system
    /// safe component. The hive is part of the name so HKCU and HKLM keys
    /// with the same path do not collide.
    pub fn export_file_name(&self) -> String {
        let flat: String = self
            .full_path()
            .chars()
            .map(|c| match c {
                '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c => c,
            })
            .collect();
        format!("{}.reg", flat)
    }
}

impl std::fmt::Display for RegistryKeyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full_path())
    }
}

/// Access to the system configuration store.
///
/// Absence is reported as [`RemovalError::NotFound`] so callers can treat
/// it as a no-op.
pub trait RegistryStore: Send + Sync {
    /// Read a string value. A missing key is `NotFound`; a missing value in
    /// an existing key is `Ok(None)`.
    fn read_string(&self, key: &RegistryKeyRef, name: &str) -> Result<Option<String>, RemovalError>;

    /// Delete one value
    fn delete_value(&self, key: &RegistryKeyRef, name: &str) -> Result<(), RemovalError>;

    /// Delete a key and everything below it
    fn delete_key(&self, key: &RegistryKeyRef) -> Result<(), RemovalError>;

    /// Names of the direct subkeys
    fn subkeys(&self, key: &RegistryKeyRef) -> Result<Vec<String>, RemovalError>;

    /// Export a key tree to `dest` in the native export format
    fn export(&self, key: &RegistryKeyRef, dest: &Path) -> Result<(), RemovalError>;

    /// Import a file previously produced by [`RegistryStore::export`]
    fn import(&self, file: &Path) -> Result<(), RemovalError>;
}

/// Registry for platforms without one: every key is absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRegistry;

impl RegistryStore for NoopRegistry {
    fn read_string(&self, key: &RegistryKeyRef, _name: &str) -> Result<Option<String>, RemovalError> {
        Err(RemovalError::NotFound {
            target: key.full_path(),
        })
    }

    fn delete_value(&self, key: &RegistryKeyRef, name: &str) -> Result<(), RemovalError> {
        Err(RemovalError::NotFound {
            target: format!("{}\\{}", key, name),
        })
    }

    fn delete_key(&self, key: &RegistryKeyRef) -> Result<(), RemovalError> {
        Err(RemovalError::NotFound {
            target: key.full_path(),
        })
    }

    fn subkeys(&self, key: &RegistryKeyRef) -> Result<Vec<String>, RemovalError> {
        Err(RemovalError::NotFound {
            target: key.full_path(),
        })
    }

    fn export(&self, key: &RegistryKeyRef, _dest: &Path) -> Result<(), RemovalError> {
        Err(RemovalError::NotFound {
            target: key.full_path(),
        })
    }

    fn import(&self, file: &Path) -> Result<(), RemovalError> {
        Err(RemovalError::NotFound {
            target: file.display().to_string(),
        })
    }
}

#[cfg(windows)]
pub use windows::WindowsRegistry;

#[cfg(windows)]
mod windows {
    use super::*;
    use std::process::Command;
    use winreg::enums::{HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_SET_VALUE};
    use winreg::RegKey;

    /// The Windows registry via `winreg`, with `reg.exe` for export/import
    #[derive(Debug, Default, Clone, Copy)]
    pub struct WindowsRegistry;

    fn predef(hive: Hive) -> RegKey {
        RegKey::predef(match hive {
            Hive::CurrentUser => HKEY_CURRENT_USER,
            Hive::LocalMachine => HKEY_LOCAL_MACHINE,
            Hive::ClassesRoot => HKEY_CLASSES_ROOT,
        })
    }

    fn open(key: &RegistryKeyRef) -> Result<RegKey, RemovalError> {
        predef(key.hive)
            .open_subkey(&key.path)
            .map_err(|e| RemovalError::from_io(key.full_path(), e))
    }

    fn run_reg(args: &[&str]) -> Result<(), RemovalError> {
        let output = Command::new("reg")
            .args(args)
            .output()
            .map_err(|e| RemovalError::from_io("reg", e))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let target = args.get(1).copied().unwrap_or_default().to_string();
        let lower = stderr.to_lowercase();
        if lower.contains("unable to find") || lower.contains("not find") {
            Err(RemovalError::NotFound { target })
        } else if lower.contains("access is denied") {
            Err(RemovalError::PermissionDenied { target })
        } else {
            Err(RemovalError::Command {
                command: format!("reg {}", args.join(" ")),
                message: stderr,
            })
        }
    }

    impl RegistryStore for WindowsRegistry {
        fn read_string(&self, key: &RegistryKeyRef, name: &str) -> Result<Option<String>, RemovalError> {
            match open(key)?.get_value::<String, _>(name) {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(RemovalError::from_io(format!("{}\\{}", key, name), e)),
            }
        }

        fn delete_value(&self, key: &RegistryKeyRef, name: &str) -> Result<(), RemovalError> {
            predef(key.hive)
                .open_subkey_with_flags(&key.path, KEY_SET_VALUE)
                .and_then(|k| k.delete_value(name))
                .map_err(|e| RemovalError::from_io(format!("{}\\{}", key, name), e))
        }

        fn delete_key(&self, key: &RegistryKeyRef) -> Result<(), RemovalError> {
            predef(key.hive)
                .delete_subkey_all(&key.path)
                .map_err(|e| RemovalError::from_io(key.full_path(), e))
        }

        fn subkeys(&self, key: &RegistryKeyRef) -> Result<Vec<String>, RemovalError> {
            Ok(open(key)?.enum_keys().flatten().collect())
        }

        fn export(&self, key: &RegistryKeyRef, dest: &Path) -> Result<(), RemovalError> {
            let dest = dest.display().to_string();
            run_reg(&["export", &key.full_path(), &dest, "/y"])
        }

        fn import(&self, file: &Path) -> Result<(), RemovalError> {
            let file = file.display().to_string();
            run_reg(&["import", &file])
        }
    }
}
