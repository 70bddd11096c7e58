use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::locator::{Environment, Product, ResourceSet};
use crate::platform::registry::RegistryKeyRef;

/// Removal scope. Each profile includes everything the previous one does:
/// `Basic < Complete < Ultimate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Basic,
    Complete,
    Ultimate,
}

/// Exact text the ultimate profile must be confirmed with
pub const ULTIMATE_TOKEN: &str = "ULTIMATE";

/// One step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Backup,
    RestorePoint,
    Terminate,
    IdentifierReset,
    DirectoryRemoval,
    RegistryCleanup,
    SystemCleanup,
    Optimize,
    Verification,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Backup => "backup",
            Phase::RestorePoint => "restore_point",
            Phase::Terminate => "terminate",
            Phase::IdentifierReset => "identifier_reset",
            Phase::DirectoryRemoval => "directory_removal",
            Phase::RegistryCleanup => "registry_cleanup",
            Phase::SystemCleanup => "system_cleanup",
            Phase::Optimize => "optimize",
            Phase::Verification => "verification",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase with the progress reported when it starts
#[derive(Debug, Clone, Copy)]
pub struct PhaseStep {
    pub phase: Phase,
    pub percent: u8,
    pub message: &'static str,
}

const fn step(phase: Phase, percent: u8, message: &'static str) -> PhaseStep {
    PhaseStep {
        phase,
        percent,
        message,
    }
}

const BASIC_PLAN: &[PhaseStep] = &[
    step(Phase::Backup, 10, "Creating backup..."),
    step(Phase::Terminate, 30, "Terminating processes..."),
    step(Phase::DirectoryRemoval, 50, "Removing directories..."),
    step(Phase::RegistryCleanup, 70, "Cleaning registry..."),
    step(Phase::SystemCleanup, 90, "Final cleanup..."),
    step(Phase::Verification, 95, "Final verification..."),
];

const COMPLETE_PLAN: &[PhaseStep] = &[
    step(Phase::Backup, 5, "Creating comprehensive backup..."),
    step(Phase::Terminate, 20, "Terminating all processes..."),
    step(Phase::DirectoryRemoval, 40, "Removing all directories..."),
    step(Phase::RegistryCleanup, 60, "Advanced registry cleanup..."),
    step(Phase::SystemCleanup, 80, "Comprehensive system cleanup..."),
    step(Phase::Verification, 95, "Final verification..."),
];

const ULTIMATE_PLAN: &[PhaseStep] = &[
    step(Phase::Backup, 3, "Creating comprehensive backup..."),
    step(Phase::RestorePoint, 8, "Creating system restore point..."),
    step(Phase::Terminate, 15, "Terminating all processes..."),
    step(Phase::IdentifierReset, 25, "Resetting machine identifier..."),
    step(Phase::DirectoryRemoval, 45, "Ultimate directory cleanup..."),
    step(Phase::RegistryCleanup, 65, "Ultimate registry cleanup..."),
    step(Phase::SystemCleanup, 80, "Ultimate system cleanup..."),
    step(Phase::Optimize, 90, "System optimization..."),
    step(Phase::Verification, 98, "Final verification..."),
];

/// Identifier reset on its own: backup first, then clear
pub(crate) const IDENTIFIER_PLAN: &[PhaseStep] = &[
    step(Phase::Backup, 20, "Backing up current machine identifier..."),
    step(Phase::IdentifierReset, 60, "Clearing machine identifier..."),
    step(Phase::Verification, 95, "Final verification..."),
];

/// What a profile would touch, for a given environment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scope {
    pub directories: Vec<PathBuf>,
    pub registry_keys: Vec<RegistryKeyRef>,
    pub identifier_reset: bool,
    pub uninstall_scan: bool,
}

impl Profile {
    pub const ALL: [Profile; 3] = [Profile::Basic, Profile::Complete, Profile::Ultimate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Basic => "basic",
            Profile::Complete => "complete",
            Profile::Ultimate => "ultimate",
        }
    }

    /// Does this profile cover everything `other` does?
    pub fn includes(&self, other: Profile) -> bool {
        *self >= other
    }

    /// Phases in their fixed execution order
    pub fn plan(&self) -> &'static [PhaseStep] {
        match self {
            Profile::Basic => BASIC_PLAN,
            Profile::Complete => COMPLETE_PLAN,
            Profile::Ultimate => ULTIMATE_PLAN,
        }
    }

    /// Token the user must type, beyond a plain yes
    pub fn confirmation_token(&self) -> Option<&'static str> {
        match self {
            Profile::Ultimate => Some(ULTIMATE_TOKEN),
            _ => None,
        }
    }

    /// Directories and registry keys in scope for this profile
    pub fn scope(&self, resources: &ResourceSet, env: &Environment, product: &Product) -> Scope {
        let mut scope = Scope::default();

        scope.directories.extend(resources.install_paths.iter().cloned());
        scope.directories.extend(resources.user_data_paths.iter().cloned());
        scope.registry_keys.extend(product.registry_keys.iter().cloned());

        if self.includes(Profile::Complete) {
            scope.directories.extend(resources.extension_paths.iter().cloned());
            scope.directories.extend(resources.cache_paths.iter().cloned());
            scope.registry_keys.extend(product.shell_integration_keys());
        }

        if self.includes(Profile::Ultimate) {
            for temp in &env.temp_dirs {
                scope
                    .directories
                    .extend(product.temp_dirs.iter().map(|d| temp.join(d)));
            }
            scope.identifier_reset = true;
            scope.uninstall_scan = true;
        }

        scope
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" | "quick" => Ok(Profile::Basic),
            "complete" => Ok(Profile::Complete),
            "ultimate" => Ok(Profile::Ultimate),
            other => Err(format!("Unknown profile: {}", other)),
        }
    }
}
