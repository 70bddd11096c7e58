//! Discovery of the product's filesystem footprint.
//!
//! Everything here is read-only: candidates are built from the environment's
//! base directories and kept only if they exist right now.

pub mod product;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use product::Product;

/// Base directories the product's locations are derived from.
///
/// Each is optional: an unset or empty variable simply contributes no
/// candidates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// `%LOCALAPPDATA%`
    pub local_app_data: Option<PathBuf>,
    /// `%APPDATA%`
    pub app_data: Option<PathBuf>,
    /// `%USERPROFILE%` / home
    pub user_profile: Option<PathBuf>,
    /// `%PROGRAMFILES%`
    pub program_files: Option<PathBuf>,
    /// `%PROGRAMFILES(X86)%`
    pub program_files_x86: Option<PathBuf>,
    /// `%TEMP%` / `%TMP%`
    pub temp_dirs: Vec<PathBuf>,
    /// `%SystemRoot%`
    pub system_root: Option<PathBuf>,
    /// Paths a run must never delete, nor anything above or below them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preserve: Vec<PathBuf>,
}

impl Environment {
    /// Build from process environment variables, falling back to the
    /// platform's standard directories where a variable is unset.
    pub fn from_env() -> Self {
        let var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };

        let mut temp_dirs = Vec::new();
        for name in ["TEMP", "TMP"] {
            if let Some(dir) = var(name) {
                if !temp_dirs.contains(&dir) {
                    temp_dirs.push(dir);
                }
            }
        }
        if temp_dirs.is_empty() {
            temp_dirs.push(std::env::temp_dir());
        }

        Self {
            local_app_data: var("LOCALAPPDATA").or_else(dirs::data_local_dir),
            app_data: var("APPDATA").or_else(dirs::config_dir),
            user_profile: var("USERPROFILE").or_else(dirs::home_dir),
            program_files: var("PROGRAMFILES"),
            program_files_x86: var("PROGRAMFILES(X86)"),
            temp_dirs,
            system_root: var("SystemRoot"),
            preserve: Vec::new(),
        }
    }

    /// Every base directory that is set
    pub fn base_dirs(&self) -> Vec<&PathBuf> {
        [
            &self.local_app_data,
            &self.app_data,
            &self.user_profile,
            &self.program_files,
            &self.program_files_x86,
            &self.system_root,
        ]
        .into_iter()
        .flatten()
        .chain(self.temp_dirs.iter())
        .collect()
    }

    /// The same environment, additionally preserving `path`
    pub fn preserving(&self, path: &Path) -> Self {
        let mut env = self.clone();
        env.preserve.push(path.to_path_buf());
        env
    }
}

/// Existing product locations at discovery time.
///
/// A snapshot: later operations re-check existence before acting, so paths
/// that vanish (or appear) after discovery are tolerated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub install_paths: Vec<PathBuf>,
    pub user_data_paths: Vec<PathBuf>,
    pub extension_paths: Vec<PathBuf>,
    pub cache_paths: Vec<PathBuf>,
}

impl ResourceSet {
    pub fn is_empty(&self) -> bool {
        self.install_paths.is_empty()
            && self.user_data_paths.is_empty()
            && self.extension_paths.is_empty()
            && self.cache_paths.is_empty()
    }

    /// All paths, in category order
    pub fn all_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.install_paths
            .iter()
            .chain(self.user_data_paths.iter())
            .chain(self.extension_paths.iter())
            .chain(self.cache_paths.iter())
    }
}

/// Discover the product's existing locations.
///
/// Deterministic for identical environment and filesystem state. Never
/// creates or mutates anything; absent candidates are silently dropped.
pub fn locate(env: &Environment, product: &Product) -> ResourceSet {
    let mut install = Vec::new();
    if let Some(local) = &env.local_app_data {
        install.push(local.join("Programs").join(&product.install_dir_name));
    }
    for root in [&env.program_files, &env.program_files_x86].into_iter().flatten() {
        install.push(root.join(&product.install_dir_name));
    }

    let mut user_data = Vec::new();
    if let Some(app_data) = &env.app_data {
        user_data.extend(product.app_data_dirs.iter().map(|d| app_data.join(d)));
    }
    if let Some(profile) = &env.user_profile {
        user_data.extend(product.profile_dirs.iter().map(|d| profile.join(d)));
    }
    let user_data_paths = existing(user_data);

    let extension_paths = existing(user_data_paths.iter().map(|p| p.join("extensions")).collect());

    let mut cache = Vec::new();
    if let Some(local) = &env.local_app_data {
        cache.extend(product.cache_dirs.iter().map(|d| join_relative(local, d)));
    }

    let resources = ResourceSet {
        install_paths: existing(install),
        user_data_paths,
        extension_paths,
        cache_paths: existing(cache),
    };

    tracing::debug!(
        install = resources.install_paths.len(),
        user_data = resources.user_data_paths.len(),
        extensions = resources.extension_paths.len(),
        cache = resources.cache_paths.len(),
        "located product resources"
    );
    resources
}

/// Keep candidates that exist, dropping duplicates while preserving order
fn existing(candidates: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = Vec::new();
    for path in candidates {
        if path.exists() && !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

/// Join a `/`-separated relative path onto `base`
pub(crate) fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split(['/', '\\'])
        .filter(|c| !c.is_empty())
        .fold(base.to_path_buf(), |acc, c| acc.join(c))
}
