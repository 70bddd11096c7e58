use std::time::{Duration, Instant};

use super::{BulkReport, ItemOutcome};
use crate::common::progress::Reporter;
use crate::locator::Product;
use crate::platform::process::{ProcessControl, ProcessInfo};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Stop every running product process.
///
/// Each match is asked to exit; whatever is still alive once `wait` has
/// elapsed is force-killed. Processes that are gone or inaccessible are
/// skipped. A process counts as done once it was successfully signaled.
pub fn terminate_processes(
    control: &dyn ProcessControl,
    product: &Product,
    wait: Duration,
    reporter: &Reporter,
) -> BulkReport<ProcessInfo> {
    let mut report = BulkReport::default();

    let targets: Vec<ProcessInfo> = match control.list() {
        Ok(procs) => procs
            .into_iter()
            .filter(|p| product.matches_process(&p.name, p.exe.as_deref()))
            .filter(|p| p.pid != std::process::id())
            .collect(),
        Err(e) => {
            reporter.warn(&format!("Could not enumerate processes: {}", e));
            return report;
        }
    };

    if targets.is_empty() {
        tracing::debug!("no product processes running");
        return report;
    }

    let mut signaled = Vec::new();
    for proc in targets {
        match control.terminate(proc.pid) {
            Ok(()) => {
                tracing::info!(pid = proc.pid, name = %proc.name, "asked process to exit");
                signaled.push(proc);
            }
            Err(e) if e.is_not_found() => report.push(proc, ItemOutcome::Absent),
            Err(e) => {
                // Graceful exit refused; try forcing it before giving up
                tracing::debug!(pid = proc.pid, "terminate failed: {}", e);
                match control.kill(proc.pid) {
                    Ok(()) => {
                        reporter.info(&format!("Force-killed {}", proc));
                        report.push(proc, ItemOutcome::Done);
                    }
                    Err(kill_err) if kill_err.is_not_found() => {
                        report.push(proc, ItemOutcome::Absent)
                    }
                    Err(kill_err) => {
                        reporter.warn(&format!("Could not stop {}: {}", proc, kill_err));
                        report.push(proc, ItemOutcome::Failed(kill_err));
                    }
                }
            }
        }
    }

    let deadline = Instant::now() + wait;
    while signaled.iter().any(|p| control.is_running(p.pid)) && Instant::now() < deadline {
        std::thread::sleep(POLL_INTERVAL);
    }

    for proc in signaled {
        if control.is_running(proc.pid) {
            match control.kill(proc.pid) {
                Ok(()) => reporter.info(&format!("Force-killed {} after {:?}", proc, wait)),
                Err(e) if e.is_not_found() => {}
                Err(e) => reporter.warn(&format!("{} ignored the exit request: {}", proc, e)),
            }
        } else {
            reporter.info(&format!("Stopped {}", proc));
        }
        report.push(proc, ItemOutcome::Done);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::errors::RemovalError;
    use crate::common::progress::NullSink;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Processes that ignore `terminate` when listed in `stubborn`
    struct FakeProcesses {
        procs: Vec<ProcessInfo>,
        alive: Mutex<HashSet<u32>>,
        stubborn: HashSet<u32>,
        killed: Mutex<Vec<u32>>,
    }

    impl FakeProcesses {
        fn new(procs: Vec<ProcessInfo>, stubborn: &[u32]) -> Self {
            Self {
                alive: Mutex::new(procs.iter().map(|p| p.pid).collect()),
                procs,
                stubborn: stubborn.iter().copied().collect(),
                killed: Mutex::new(Vec::new()),
            }
        }
    }

    impl ProcessControl for FakeProcesses {
        fn list(&self) -> Result<Vec<ProcessInfo>, RemovalError> {
            Ok(self.procs.clone())
        }

        fn terminate(&self, pid: u32) -> Result<(), RemovalError> {
            if !self.stubborn.contains(&pid) {
                self.alive.lock().unwrap().remove(&pid);
            }
            Ok(())
        }

        fn kill(&self, pid: u32) -> Result<(), RemovalError> {
            self.killed.lock().unwrap().push(pid);
            self.alive.lock().unwrap().remove(&pid);
            Ok(())
        }

        fn is_running(&self, pid: u32) -> bool {
            self.alive.lock().unwrap().contains(&pid)
        }
    }

    fn proc(pid: u32, name: &str) -> ProcessInfo {
        ProcessInfo {
            pid,
            name: name.to_string(),
            exe: None,
        }
    }

    #[test]
    fn test_only_product_processes_are_signaled() {
        let control = FakeProcesses::new(vec![proc(10, "Code.exe"), proc(11, "explorer.exe")], &[]);
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        let report = terminate_processes(&control, &Product::default(), Duration::ZERO, &reporter);
        assert_eq!(report.succeeded(), 1);
        assert!(control.is_running(11));
        assert!(control.killed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_stubborn_process_is_force_killed_after_wait() {
        let control = FakeProcesses::new(vec![proc(20, "Code.exe")], &[20]);
        let sink = NullSink;
        let reporter = Reporter::new(&sink);

        let report = terminate_processes(
            &control,
            &Product::default(),
            Duration::from_millis(50),
            &reporter,
        );
        assert_eq!(report.succeeded(), 1);
        assert_eq!(*control.killed.lock().unwrap(), vec![20]);
        assert!(!control.is_running(20));
    }
}
