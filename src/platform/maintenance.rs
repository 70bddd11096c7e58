use std::process::Command;

use crate::common::errors::RemovalError;

/// Machine-wide housekeeping around an ultimate removal
pub trait SystemMaintenance: Send + Sync {
    /// Create an OS restore point before anything is modified
    fn create_restore_point(&self, description: &str) -> Result<(), RemovalError>;

    /// Post-removal optimisation. Returns the steps that succeeded.
    fn optimize(&self) -> Vec<String>;
}

/// No restore points, no optimisation
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMaintenance;

impl SystemMaintenance for NoopMaintenance {
    fn create_restore_point(&self, _description: &str) -> Result<(), RemovalError> {
        Err(RemovalError::NotFound {
            target: "system restore".to_string(),
        })
    }

    fn optimize(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Windows restore points via PowerShell, DNS flush and search-index restart
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsMaintenance;

fn succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

impl SystemMaintenance for WindowsMaintenance {
    fn create_restore_point(&self, description: &str) -> Result<(), RemovalError> {
        let script = format!(
            "Checkpoint-Computer -Description '{}' -RestorePointType 'MODIFY_SETTINGS'",
            description.replace('\'', "''")
        );
        let output = Command::new("powershell")
            .args(["-NoProfile", "-Command", &script])
            .output()
            .map_err(|e| RemovalError::from_io("powershell", e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RemovalError::Command {
                command: "Checkpoint-Computer".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    fn optimize(&self) -> Vec<String> {
        let mut done = Vec::new();
        if succeeds("ipconfig", &["/flushdns"]) {
            done.push("DNS cache flushed".to_string());
        }
        if succeeds("sc", &["start", "WSearch"]) {
            done.push("Windows Search service restarted".to_string());
        }
        done
    }
}
