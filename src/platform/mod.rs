//! OS capabilities the removal core depends on.
//!
//! Each capability is a trait; a platform that lacks one plugs in a no-op
//! implementation instead of the core checking availability flags.

pub mod maintenance;
pub mod memory;
pub mod process;
pub mod registry;

use std::sync::Arc;

pub use maintenance::{NoopMaintenance, SystemMaintenance, WindowsMaintenance};
pub use memory::InMemoryRegistry;
pub use process::{NoopProcesses, ProcessControl, ProcessInfo, SystemProcesses};
pub use registry::{Hive, NoopRegistry, RegistryKeyRef, RegistryStore};

/// "Are we running elevated?"
pub trait PrivilegeProbe: Send + Sync {
    fn is_elevated(&self) -> bool;
}

/// Asks the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPrivilege;

impl PrivilegeProbe for SystemPrivilege {
    fn is_elevated(&self) -> bool {
        crate::common::permissions::is_elevated()
    }
}

/// A fixed answer, for embedding and tests
#[derive(Debug, Clone, Copy)]
pub struct FixedPrivilege(pub bool);

impl PrivilegeProbe for FixedPrivilege {
    fn is_elevated(&self) -> bool {
        self.0
    }
}

/// The set of capabilities one run uses
#[derive(Clone)]
pub struct Platform {
    pub registry: Arc<dyn RegistryStore>,
    pub processes: Arc<dyn ProcessControl>,
    pub maintenance: Arc<dyn SystemMaintenance>,
    pub privilege: Arc<dyn PrivilegeProbe>,
}

impl Platform {
    /// Native implementations for the current OS
    pub fn native() -> Self {
        #[cfg(windows)]
        let (registry, maintenance): (Arc<dyn RegistryStore>, Arc<dyn SystemMaintenance>) =
            (Arc::new(registry::WindowsRegistry), Arc::new(WindowsMaintenance));
        #[cfg(not(windows))]
        let (registry, maintenance): (Arc<dyn RegistryStore>, Arc<dyn SystemMaintenance>) =
            (Arc::new(NoopRegistry), Arc::new(NoopMaintenance));

        Self {
            registry,
            processes: Arc::new(SystemProcesses),
            maintenance,
            privilege: Arc::new(SystemPrivilege),
        }
    }

    /// Nothing outside the filesystem is touched
    pub fn inert(elevated: bool) -> Self {
        Self {
            registry: Arc::new(NoopRegistry),
            processes: Arc::new(NoopProcesses),
            maintenance: Arc::new(NoopMaintenance),
            privilege: Arc::new(FixedPrivilege(elevated)),
        }
    }
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform").finish_non_exhaustive()
    }
}
