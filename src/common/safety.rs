use std::path::{Path, PathBuf};

use crate::locator::Environment;

/// Home-relative directories that must never be deleted entirely
const PROTECTED_HOME_DIRS: &[&str] = &[
    "",
    "Desktop",
    "Documents",
    "Downloads",
    "AppData",
    "AppData/Local",
    "AppData/Roaming",
    "AppData/Local/Temp",
    ".config",
    ".ssh",
];

/// Check if a path is protected and should NEVER be deleted.
///
/// Protected: filesystem roots, the home directory and its key children,
/// the temp root, and every base directory of the environment. Removal
/// only ever targets product directories *below* these. Paths the
/// environment preserves are protected along with their ancestors and
/// everything inside them.
pub fn is_protected(path: &Path, env: &Environment) -> bool {
    if path.parent().is_none() || path.as_os_str().is_empty() {
        return true;
    }
    // Drive roots like `C:\` have a parent of None after normalisation,
    // but a relative path is never a legitimate deletion target either.
    if !path.is_absolute() {
        return true;
    }

    if env
        .preserve
        .iter()
        .any(|kept| is_within(kept, path) || is_within(path, kept))
    {
        return true;
    }

    protected_paths(env).iter().any(|p| same_path(p, path))
}

/// True when `path` is `root` or lies below it
pub fn is_within(path: &Path, root: &Path) -> bool {
    let path = normalize(path);
    let root = normalize(root);
    path == root || path.starts_with(&format!("{}/", root))
}

fn protected_paths(env: &Environment) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = env.base_dirs().into_iter().cloned().collect();
    paths.push(std::env::temp_dir());

    if let Some(home) = env.user_profile.clone().or_else(dirs::home_dir) {
        for dir in PROTECTED_HOME_DIRS {
            if dir.is_empty() {
                paths.push(home.clone());
            } else {
                paths.push(home.join(dir));
            }
        }
    }
    paths
}

fn normalize(p: &Path) -> String {
    let s = p.to_string_lossy().replace('\\', "/");
    let s = s.trim_end_matches('/').to_string();
    if cfg!(windows) {
        s.to_lowercase()
    } else {
        s
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    normalize(a) == normalize(b)
}
