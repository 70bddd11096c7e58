use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Prefix of every backup directory created by a run
pub const BACKUP_DIR_PREFIX: &str = "VSCode_Backup_";

/// Identifier scoping one run's log and backup artifacts.
///
/// Timestamp plus a random suffix, so two runs started in the same second
/// still get distinct directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self::at(Local::now())
    }

    pub fn at(now: DateTime<Local>) -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        SessionId(format!("{}_{}", now.format("%Y%m%d_%H%M%S"), &random[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the backup directory for this session
    pub fn backup_dir_name(&self) -> String {
        format!("{}{}", BACKUP_DIR_PREFIX, self.0)
    }

    /// Name of the session log file
    pub fn log_file_name(&self) -> String {
        format!("removal_{}.log", self.0)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_id_shape() {
        let id = SessionId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 8);
        assert!(id.backup_dir_name().starts_with(BACKUP_DIR_PREFIX));
    }
}
