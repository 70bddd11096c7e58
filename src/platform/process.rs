use serde::Serialize;
use std::process::Command;

use crate::common::errors::RemovalError;

/// A live process as seen by enumeration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    /// Full executable path when the platform exposes it
    pub exe: Option<String>,
}

impl std::fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (PID {})", self.name, self.pid)
    }
}

/// Enumerate and stop processes
pub trait ProcessControl: Send + Sync {
    fn list(&self) -> Result<Vec<ProcessInfo>, RemovalError>;

    /// Ask the process to exit
    fn terminate(&self, pid: u32) -> Result<(), RemovalError>;

    /// Force the process to exit
    fn kill(&self, pid: u32) -> Result<(), RemovalError>;

    fn is_running(&self, pid: u32) -> bool;
}

/// Process control for environments where nothing should be touched
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProcesses;

impl ProcessControl for NoopProcesses {
    fn list(&self) -> Result<Vec<ProcessInfo>, RemovalError> {
        Ok(Vec::new())
    }

    fn terminate(&self, pid: u32) -> Result<(), RemovalError> {
        Err(RemovalError::NotFound {
            target: format!("pid {}", pid),
        })
    }

    fn kill(&self, pid: u32) -> Result<(), RemovalError> {
        self.terminate(pid)
    }

    fn is_running(&self, _pid: u32) -> bool {
        false
    }
}

/// Process control through the platform's own tools
/// (`tasklist`/`taskkill` on Windows, `ps`/`kill` elsewhere)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcesses;

fn run(program: &str, args: &[&str], target: String) -> Result<String, RemovalError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| RemovalError::from_io(program, e))?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
    if stderr.contains("not found") || stderr.contains("no such process") {
        Err(RemovalError::NotFound { target })
    } else if stderr.contains("access is denied") || stderr.contains("not permitted") {
        Err(RemovalError::PermissionDenied { target })
    } else {
        Err(RemovalError::Command {
            command: format!("{} {}", program, args.join(" ")),
            message: stderr.trim().to_string(),
        })
    }
}

/// Parse `tasklist /FO CSV /NH` output: `"name","pid","session",...`
pub(crate) fn parse_tasklist(output: &str) -> Vec<ProcessInfo> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split("\",\"").map(|f| f.trim_matches('"')).collect();
            let name = fields.first()?.trim();
            let pid = fields.get(1)?.trim().parse().ok()?;
            Some(ProcessInfo {
                pid,
                name: name.to_string(),
                exe: None,
            })
        })
        .collect()
}

/// Parse `ps -axo pid=,comm=` output
pub(crate) fn parse_ps(output: &str) -> Vec<ProcessInfo> {
    output
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            let (pid, comm) = line.split_once(char::is_whitespace)?;
            let comm = comm.trim();
            let pid = pid.parse().ok()?;
            let name = std::path::Path::new(comm)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| comm.to_string());
            let exe = comm.starts_with('/').then(|| comm.to_string());
            Some(ProcessInfo { pid, name, exe })
        })
        .collect()
}

impl ProcessControl for SystemProcesses {
    fn list(&self) -> Result<Vec<ProcessInfo>, RemovalError> {
        if cfg!(windows) {
            let out = run("tasklist", &["/FO", "CSV", "/NH"], "process list".into())?;
            Ok(parse_tasklist(&out))
        } else {
            let out = run("ps", &["-axo", "pid=,comm="], "process list".into())?;
            Ok(parse_ps(&out))
        }
    }

    fn terminate(&self, pid: u32) -> Result<(), RemovalError> {
        let pid_s = pid.to_string();
        let target = format!("pid {}", pid);
        if cfg!(windows) {
            run("taskkill", &["/PID", &pid_s], target).map(|_| ())
        } else {
            run("kill", &["-TERM", &pid_s], target).map(|_| ())
        }
    }

    fn kill(&self, pid: u32) -> Result<(), RemovalError> {
        let pid_s = pid.to_string();
        let target = format!("pid {}", pid);
        if cfg!(windows) {
            run("taskkill", &["/F", "/T", "/PID", &pid_s], target).map(|_| ())
        } else {
            run("kill", &["-KILL", &pid_s], target).map(|_| ())
        }
    }

    fn is_running(&self, pid: u32) -> bool {
        if cfg!(windows) {
            let filter = format!("PID eq {}", pid);
            run("tasklist", &["/FI", &filter, "/FO", "CSV", "/NH"], String::new())
                .map(|out| parse_tasklist(&out).iter().any(|p| p.pid == pid))
                .unwrap_or(false)
        } else {
            Command::new("kill")
                .args(["-0", &pid.to_string()])
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tasklist_csv() {
        let out = "\"Code.exe\",\"4242\",\"Console\",\"1\",\"120,000 K\"\r\n\
                   \"explorer.exe\",\"17\",\"Console\",\"1\",\"80,000 K\"\r\n";
        let procs = parse_tasklist(out);
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[0].name, "Code.exe");
        assert_eq!(procs[0].pid, 4242);
        assert_eq!(procs[1].pid, 17);
    }

    #[test]
    fn test_parse_tasklist_skips_info_lines() {
        let out = "INFO: No tasks are running which match the specified criteria.\r\n";
        assert!(parse_tasklist(out).is_empty());
    }

    #[test]
    fn test_parse_ps_with_full_paths() {
        let out = "  1 /sbin/launchd\n 812 /usr/share/code/code\n 900 bash\n";
        let procs = parse_ps(out);
        assert_eq!(procs.len(), 3);
        assert_eq!(procs[1].name, "code");
        assert_eq!(procs[1].exe.as_deref(), Some("/usr/share/code/code"));
        assert_eq!(procs[2].exe, None);
    }

    #[test]
    fn test_noop_lists_nothing() {
        assert!(NoopProcesses.list().unwrap().is_empty());
        assert!(!NoopProcesses.is_running(1));
    }
}
