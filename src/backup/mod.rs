//! Recoverable snapshots taken before anything is destroyed, and the path
//! back from them.

pub mod copy;
pub mod manifest;
pub mod restore;
pub mod snapshot;

pub use manifest::{latest_complete, list_backups, BackupManifest, BackupSummary};
pub use restore::{restore, RestoreReport};
pub use snapshot::{current_identifier, snapshot};
