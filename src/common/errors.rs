use std::path::PathBuf;

use thiserror::Error;

/// Typed failures for removal, backup and restore operations.
///
/// The binary uses `anyhow` at the top level; library modules return
/// `RemovalError` so callers can tell a harmless "already gone" apart
/// from a fault worth surfacing.
#[derive(Debug, Error)]
pub enum RemovalError {
    /// The path, key, value or process does not exist. Never a real fault.
    #[error("not found: {target}")]
    NotFound { target: String },

    /// Access to the target was refused
    #[error("permission denied: {target}")]
    PermissionDenied { target: String },

    /// The target is locked by a live process
    #[error("resource busy: {target}")]
    ResourceBusy { target: String },

    /// Unexpected read/write failure
    #[error("I/O error at '{target}': {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },

    /// An external tool exited unsuccessfully
    #[error("command '{command}' failed: {message}")]
    Command { command: String, message: String },

    /// The backup directory has no manifest (interrupted snapshot)
    #[error("backup at '{}' is incomplete: no manifest was written", path.display())]
    BackupIncomplete { path: PathBuf },

    /// The backup would land somewhere the run itself deletes
    #[error("refusing to back up into '{}': {reason}", path.display())]
    UnsafeBackupLocation { path: PathBuf, reason: String },

    /// The manifest exists but cannot be read or parsed
    #[error("manifest at '{}' is unreadable: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    /// The user declined, or typed the wrong confirmation token
    #[error("confirmation rejected for the {profile} profile")]
    ConfirmationRejected { profile: String },

    /// The process is not running elevated
    #[error("administrator privileges are required")]
    PrivilegeRequired,
}

impl RemovalError {
    /// Classify an `std::io::Error` raised while acting on `target`.
    pub fn from_io(target: impl Into<String>, err: std::io::Error) -> Self {
        let target = target.into();
        match err.kind() {
            std::io::ErrorKind::NotFound => RemovalError::NotFound { target },
            std::io::ErrorKind::PermissionDenied => RemovalError::PermissionDenied { target },
            _ if is_sharing_violation(&err) => RemovalError::ResourceBusy { target },
            _ => RemovalError::Io {
                target,
                source: err,
            },
        }
    }

    /// Shorthand for a path-based I/O failure
    pub fn at_path(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::from_io(path.display().to_string(), err)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemovalError::NotFound { .. })
    }

    /// Short classification label used in summaries and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            RemovalError::NotFound { .. } => "discovery_noop",
            RemovalError::PermissionDenied { .. } => "permission_denied",
            RemovalError::ResourceBusy { .. } => "resource_busy",
            RemovalError::Io { .. } => "io_fault",
            RemovalError::Command { .. } => "io_fault",
            RemovalError::BackupIncomplete { .. } => "backup_incomplete",
            RemovalError::Manifest { .. } => "backup_incomplete",
            RemovalError::UnsafeBackupLocation { .. } => "unsafe_backup_location",
            RemovalError::ConfirmationRejected { .. } => "confirmation_rejected",
            RemovalError::PrivilegeRequired => "privilege_required",
        }
    }
}

/// ERROR_SHARING_VIOLATION (32) and ERROR_LOCK_VIOLATION (33) on Windows,
/// EBUSY (16) and ETXTBSY (26) elsewhere.
fn is_sharing_violation(err: &std::io::Error) -> bool {
    match err.raw_os_error() {
        Some(code) if cfg!(windows) => code == 32 || code == 33,
        Some(code) => code == 16 || code == 26,
        None => false,
    }
}
