//! Removal runs: profile selection, the pre-run gates, the fixed phase
//! sequence, and the statistics a run hands back.

pub mod profile;

use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::backup::{self, BackupManifest};
use crate::common::config::Config;
use crate::common::errors::RemovalError;
use crate::common::progress::{ProgressSink, Reporter};
use crate::common::safety;
use crate::common::session::SessionId;
use crate::identity;
use crate::locator::{self, Environment, Product, ResourceSet};
use crate::platform::process::ProcessInfo;
use crate::platform::Platform;
use crate::reaper::{self, OutcomeLine};

pub use profile::{Phase, PhaseStep, Profile, Scope, ULTIMATE_TOKEN};

/// Where a run is in its life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Confirming,
    Running(Phase),
    Completed,
    Failed,
}

/// Counters for one run. Starts at zero, only grows while the run is
/// active, and is read-only once the report is handed back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalStats {
    pub processes_terminated: usize,
    pub directories_removed: usize,
    pub registry_keys_removed: usize,
    pub files_deleted: u64,
    pub identifier_reset: bool,
}

/// The user's answer to the pre-run prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Confirmation {
    pub accepted: bool,
    /// Typed confirmation text, required by some profiles
    pub token: Option<String>,
}

impl Confirmation {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            token: None,
        }
    }

    pub fn declined() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            accepted: true,
            token: Some(token.into()),
        }
    }

    /// Does this answer satisfy `profile`? The token must match exactly.
    pub fn permits(&self, profile: Profile) -> bool {
        self.accepted
            && match profile.confirmation_token() {
                Some(required) => self.token.as_deref() == Some(required),
                None => true,
            }
    }
}

/// Everything a run hands back, whether it finished or not
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub session_id: SessionId,
    pub profile: Option<Profile>,
    pub final_state: RunState,
    pub stats: RemovalStats,
    pub backup_dir: Option<PathBuf>,
    pub new_identifier: Option<Uuid>,
    pub phases_completed: Vec<Phase>,
    /// Every process, directory, key and swept entry acted on (absent ones omitted)
    pub outcomes: Vec<OutcomeLine>,
    pub warnings: Vec<String>,
    pub elapsed_secs: f64,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<RemovalError>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.final_state == RunState::Completed
    }
}

fn serialize_error<S: Serializer>(error: &Option<RemovalError>, s: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Failure<'a> {
        kind: &'a str,
        message: String,
    }
    error
        .as_ref()
        .map(|e| Failure {
            kind: e.kind(),
            message: e.to_string(),
        })
        .serialize(s)
}

/// A backup taken outside a removal run
#[derive(Debug, Serialize)]
pub struct BackupOutcome {
    pub session_id: SessionId,
    pub backup_dir: PathBuf,
    pub manifest: BackupManifest,
}

/// Read-only survey of the product's footprint
#[derive(Debug, Serialize)]
pub struct Analysis {
    pub resources: ResourceSet,
    pub processes: Vec<ProcessInfo>,
    pub machine_id: Option<String>,
    pub elevated: bool,
    pub scopes: Vec<(Profile, Scope)>,
}

/// Knobs for a run, usually taken from [`Config`]
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub product: Product,
    pub backup_root: PathBuf,
    pub process_wait: Duration,
    pub verification_pause: Duration,
    /// Directory holding session logs; the run's log is copied into its backup
    pub logs_dir: Option<PathBuf>,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            product: config.product.clone(),
            backup_root: config.backup_root(),
            process_wait: config.process_wait(),
            verification_pause: config.verification_pause(),
            logs_dir: Some(Config::logs_dir()),
        }
    }
}

/// Sequences backup, termination, identifier reset and removal.
///
/// Runs one operation at a time. All run state lives here or in the report
/// being built; sinks only observe.
pub struct Orchestrator {
    platform: Platform,
    env: Environment,
    settings: RunSettings,
    state: RunState,
    next_session: Option<SessionId>,
}

/// Mutable state of one run, threaded through every phase
struct RunContext<'a> {
    session: SessionId,
    /// Grows to preserve the backup directory once it is chosen
    env: Environment,
    resources: ResourceSet,
    reporter: Reporter<'a>,
    stats: RemovalStats,
    backup_dir: Option<PathBuf>,
    new_identifier: Option<Uuid>,
    outcomes: Vec<OutcomeLine>,
}

impl Orchestrator {
    pub fn new(platform: Platform, env: Environment, settings: RunSettings) -> Self {
        Self {
            platform,
            env,
            settings,
            state: RunState::Idle,
            next_session: None,
        }
    }

    /// Use `session` for the next run instead of generating one (so the run
    /// shares the id its log file was opened under)
    pub fn with_session(mut self, session: SessionId) -> Self {
        self.next_session = Some(session);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    fn take_session(&mut self) -> SessionId {
        self.next_session.take().unwrap_or_else(SessionId::generate)
    }

    /// Execute a removal profile.
    ///
    /// Privilege and confirmation are checked before anything runs; failing
    /// either leaves the orchestrator `Idle` with nothing touched. Once
    /// running, phases execute in their fixed order until one fails
    /// (`Failed`, earlier phases stay applied) or all finish (`Completed`).
    pub fn run(&mut self, profile: Profile, confirmation: &Confirmation, sink: &dyn ProgressSink) -> RunReport {
        tracing::info!(profile = %profile, "removal requested");
        self.execute(Some(profile), profile.plan(), confirmation, sink)
    }

    /// Reset the machine identifier without removing anything else.
    /// Same gates as a removal; a backup is always taken first.
    pub fn reset_identifier_only(&mut self, confirmation: &Confirmation, sink: &dyn ProgressSink) -> RunReport {
        tracing::info!("identifier reset requested");
        self.execute(None, profile::IDENTIFIER_PLAN, confirmation, sink)
    }

    /// Take a backup and nothing else. Needs neither privilege nor confirmation.
    pub fn backup_only(&mut self, sink: &dyn ProgressSink) -> Result<BackupOutcome, RemovalError> {
        let session = self.take_session();
        let reporter = Reporter::new(sink);
        let resources = locator::locate(&self.env, &self.settings.product);
        let backup_dir = self.settings.backup_root.join(session.backup_dir_name());

        self.state = RunState::Running(Phase::Backup);
        reporter.progress(10, "Creating backup...");
        let result = backup::snapshot(
            &resources,
            &backup_dir,
            self.platform.registry.as_ref(),
            &self.settings.product,
            &session,
            &reporter,
        );

        match result {
            Ok(manifest) => {
                self.copy_session_log(&session, &backup_dir);
                self.state = RunState::Completed;
                reporter.progress(100, "Backup completed");
                Ok(BackupOutcome {
                    session_id: session,
                    backup_dir,
                    manifest,
                })
            }
            Err(e) => {
                self.state = RunState::Failed;
                reporter.error(&format!("Backup failed: {}", e));
                Err(e)
            }
        }
    }

    /// Survey installs, user data, running processes and the identifier
    pub fn analyze(&self) -> Analysis {
        let product = &self.settings.product;
        let resources = locator::locate(&self.env, product);
        let processes = match self.platform.processes.list() {
            Ok(procs) => procs
                .into_iter()
                .filter(|p| product.matches_process(&p.name, p.exe.as_deref()))
                .collect(),
            Err(e) => {
                tracing::warn!("could not enumerate processes: {}", e);
                Vec::new()
            }
        };
        let scopes = Profile::ALL
            .iter()
            .map(|p| (*p, p.scope(&resources, &self.env, product)))
            .collect();

        Analysis {
            machine_id: backup::current_identifier(self.platform.registry.as_ref(), product),
            elevated: self.platform.privilege.is_elevated(),
            resources,
            processes,
            scopes,
        }
    }

    /// Run on a worker thread; the caller keeps the thread that drives the
    /// display. The orchestrator is handed back with the report.
    pub fn spawn(
        mut self,
        profile: Profile,
        confirmation: Confirmation,
        sink: Arc<dyn ProgressSink>,
    ) -> JoinHandle<(Self, RunReport)> {
        std::thread::spawn(move || {
            let report = self.run(profile, &confirmation, sink.as_ref());
            (self, report)
        })
    }

    fn execute(
        &mut self,
        profile: Option<Profile>,
        plan: &[PhaseStep],
        confirmation: &Confirmation,
        sink: &dyn ProgressSink,
    ) -> RunReport {
        let started = Instant::now();
        let session = self.take_session();
        let reporter = Reporter::new(sink);

        self.state = RunState::Confirming;
        if let Err(e) = self.check_gates(profile, confirmation) {
            self.state = RunState::Idle;
            reporter.error(&e.to_string());
            return RunReport {
                session_id: session,
                profile,
                final_state: RunState::Idle,
                stats: RemovalStats::default(),
                backup_dir: None,
                new_identifier: None,
                phases_completed: Vec::new(),
                outcomes: Vec::new(),
                warnings: Vec::new(),
                elapsed_secs: started.elapsed().as_secs_f64(),
                error: Some(e),
            };
        }

        let resources = locator::locate(&self.env, &self.settings.product);
        let mut ctx = RunContext {
            session,
            env: self.env.clone(),
            resources,
            reporter,
            stats: RemovalStats::default(),
            backup_dir: None,
            new_identifier: None,
            outcomes: Vec::new(),
        };
        ctx.reporter.progress(0, "Starting...");

        let mut phases_completed = Vec::new();
        let mut error = None;
        for step in plan {
            self.state = RunState::Running(step.phase);
            ctx.reporter.progress(step.percent, step.message);
            tracing::debug!(phase = %step.phase, "phase started");

            match self.run_phase(step.phase, profile, &mut ctx) {
                Ok(()) => phases_completed.push(step.phase),
                Err(e) => {
                    ctx.reporter.error(&format!("Phase {} failed: {}", step.phase, e));
                    error = Some(e);
                    break;
                }
            }
        }

        let final_state = if error.is_some() {
            RunState::Failed
        } else {
            ctx.reporter.progress(100, "Completed");
            RunState::Completed
        };
        self.state = final_state;

        tracing::info!(
            state = ?final_state,
            processes = ctx.stats.processes_terminated,
            directories = ctx.stats.directories_removed,
            registry_keys = ctx.stats.registry_keys_removed,
            files = ctx.stats.files_deleted,
            identifier_reset = ctx.stats.identifier_reset,
            "run finished"
        );

        if let Some(dir) = &ctx.backup_dir {
            self.copy_session_log(&ctx.session, dir);
        }

        RunReport {
            warnings: ctx.reporter.warnings(),
            session_id: ctx.session,
            profile,
            final_state,
            stats: ctx.stats,
            backup_dir: ctx.backup_dir,
            new_identifier: ctx.new_identifier,
            phases_completed,
            outcomes: ctx.outcomes,
            elapsed_secs: started.elapsed().as_secs_f64(),
            error,
        }
    }

    /// Privilege first, then confirmation. Both are checked exactly once.
    fn check_gates(&self, profile: Option<Profile>, confirmation: &Confirmation) -> Result<(), RemovalError> {
        if !self.platform.privilege.is_elevated() {
            return Err(RemovalError::PrivilegeRequired);
        }
        let permitted = match profile {
            Some(p) => confirmation.permits(p),
            None => confirmation.accepted,
        };
        if !permitted {
            return Err(RemovalError::ConfirmationRejected {
                profile: profile.map_or("identifier-reset", |p| p.as_str()).to_string(),
            });
        }
        Ok(())
    }

    fn run_phase(&self, phase: Phase, profile: Option<Profile>, ctx: &mut RunContext) -> Result<(), RemovalError> {
        let product = &self.settings.product;
        let platform = &self.platform;

        match phase {
            Phase::Backup => {
                let dir = self.settings.backup_root.join(ctx.session.backup_dir_name());
                check_backup_location(&dir, profile, ctx, product)?;
                ctx.env = ctx.env.preserving(&dir);
                // Recorded before the snapshot so a partial backup is still reported
                ctx.backup_dir = Some(dir.clone());
                backup::snapshot(
                    &ctx.resources,
                    &dir,
                    platform.registry.as_ref(),
                    product,
                    &ctx.session,
                    &ctx.reporter,
                )?;
            }
            Phase::RestorePoint => {
                match platform.maintenance.create_restore_point("Before VSCode Ultimate Removal") {
                    Ok(()) => ctx.reporter.info("System restore point created"),
                    Err(e) if e.is_not_found() => {
                        ctx.reporter.info("System restore points are not available here")
                    }
                    Err(e) => ctx
                        .reporter
                        .warn(&format!("Could not create system restore point: {}", e)),
                }
            }
            Phase::Terminate => {
                let report = reaper::terminate_processes(
                    platform.processes.as_ref(),
                    product,
                    self.settings.process_wait,
                    &ctx.reporter,
                );
                ctx.stats.processes_terminated += report.succeeded();
                ctx.outcomes.extend(report.lines());
                ctx.reporter.info(&format!(
                    "Terminated {} processes",
                    ctx.stats.processes_terminated
                ));
            }
            Phase::IdentifierReset => {
                let reset = identity::reset_identifier(
                    &ctx.resources,
                    platform.registry.as_ref(),
                    product,
                    &ctx.env,
                    &ctx.reporter,
                );
                ctx.stats.identifier_reset = true;
                ctx.new_identifier = Some(reset.proposed);
            }
            Phase::DirectoryRemoval => {
                let scope = scope_for(profile, &ctx.resources, &ctx.env, product);
                let report = reaper::remove_directories(&scope.directories, &ctx.env, &ctx.reporter);
                ctx.stats.directories_removed += report.succeeded();
                ctx.outcomes.extend(report.lines_by(|p| p.display().to_string()));
                ctx.reporter.info(&format!("Removed {} directories", report.succeeded()));
            }
            Phase::RegistryCleanup => {
                let scope = scope_for(profile, &ctx.resources, &ctx.env, product);
                let mut keys = scope.registry_keys;
                if scope.uninstall_scan {
                    keys.extend(reaper::scan_uninstall_entries(platform.registry.as_ref(), product));
                }
                let report = reaper::remove_registry_keys(platform.registry.as_ref(), &keys, &ctx.reporter);
                ctx.stats.registry_keys_removed += report.succeeded();
                ctx.outcomes.extend(report.lines());
                ctx.reporter.info(&format!("Cleaned {} registry keys", report.succeeded()));
            }
            Phase::SystemCleanup => {
                let sweep = reaper::system_cleanup(&ctx.env, product, &ctx.reporter);
                ctx.stats.files_deleted += sweep.files_deleted;
                ctx.outcomes
                    .extend(sweep.entries.lines_by(|p| p.display().to_string()));
            }
            Phase::Optimize => {
                for done in platform.maintenance.optimize() {
                    ctx.reporter.info(&done);
                }
            }
            Phase::Verification => {
                std::thread::sleep(self.settings.verification_pause);
                let scope = scope_for(profile, &ctx.resources, &ctx.env, product);
                let leftovers: Vec<&PathBuf> =
                    scope.directories.iter().filter(|p| p.exists()).collect();
                for path in &leftovers {
                    ctx.reporter
                        .warn(&format!("Still present after removal: {}", path.display()));
                }
                if leftovers.is_empty() {
                    ctx.reporter.info(&format!(
                        "Verified: none of the {} targeted directories remain",
                        scope.directories.len()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Best-effort copy of the session log into the backup's `Logs/`
    fn copy_session_log(&self, session: &SessionId, backup_dir: &Path) {
        let Some(logs_dir) = &self.settings.logs_dir else {
            return;
        };
        let log = crate::common::logging::session_log_path(logs_dir, session);
        if !log.is_file() {
            return;
        }
        let dest = backup_dir.join(backup::snapshot::LOGS_DIR).join(session.log_file_name());
        if let Err(e) = std::fs::copy(&log, &dest) {
            tracing::debug!("could not copy session log into backup: {}", e);
        }
    }
}

/// Refuse a backup directory that the run's own cleanup would delete
fn check_backup_location(
    dir: &Path,
    profile: Option<Profile>,
    ctx: &RunContext,
    product: &Product,
) -> Result<(), RemovalError> {
    let unsafe_location = |reason: String| RemovalError::UnsafeBackupLocation {
        path: dir.to_path_buf(),
        reason,
    };
    if let Some(temp) = ctx.env.temp_dirs.iter().find(|t| safety::is_within(dir, t)) {
        return Err(unsafe_location(format!(
            "it lies inside the temp directory {}",
            temp.display()
        )));
    }
    let scope = scope_for(profile, &ctx.resources, &ctx.env, product);
    let doomed = scope
        .directories
        .iter()
        .chain(ctx.resources.user_data_paths.iter())
        .find(|d| safety::is_within(dir, d));
    match doomed {
        Some(d) => Err(unsafe_location(format!(
            "it lies inside {}, which this run removes",
            d.display()
        ))),
        None => Ok(()),
    }
}

/// Identifier-only runs remove nothing beyond the reset itself
fn scope_for(profile: Option<Profile>, resources: &ResourceSet, env: &Environment, product: &Product) -> Scope {
    match profile {
        Some(p) => p.scope(resources, env, product),
        None => Scope::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::progress::RecordingSink;

    fn settings(root: &Path) -> RunSettings {
        RunSettings {
            product: Product::default(),
            backup_root: root.join("backups"),
            process_wait: Duration::ZERO,
            verification_pause: Duration::ZERO,
            logs_dir: None,
        }
    }

    #[test]
    fn test_confirmation_token_must_match_exactly() {
        assert!(Confirmation::accepted().permits(Profile::Complete));
        assert!(!Confirmation::accepted().permits(Profile::Ultimate));
        assert!(!Confirmation::with_token("ultimate").permits(Profile::Ultimate));
        assert!(Confirmation::with_token("ULTIMATE").permits(Profile::Ultimate));
        assert!(!Confirmation::declined().permits(Profile::Basic));
    }

    #[test]
    fn test_privilege_gate_stops_before_any_phase() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut orch = Orchestrator::new(Platform::inert(false), Environment::default(), settings(tmp.path()));
        let sink = RecordingSink::new();

        let report = orch.run(Profile::Basic, &Confirmation::accepted(), &sink);
        assert_eq!(report.final_state, RunState::Idle);
        assert!(matches!(report.error, Some(RemovalError::PrivilegeRequired)));
        assert!(report.phases_completed.is_empty());
        assert!(sink.progress_events().is_empty());
        assert!(!tmp.path().join("backups").exists());
    }

    #[test]
    fn test_empty_environment_completes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut orch = Orchestrator::new(Platform::inert(true), Environment::default(), settings(tmp.path()));
        let sink = RecordingSink::new();

        let report = orch.run(Profile::Complete, &Confirmation::accepted(), &sink);
        assert!(report.succeeded(), "{:?}", report.error);
        assert_eq!(orch.state(), RunState::Completed);
        assert_eq!(report.stats, RemovalStats::default());
        assert_eq!(report.phases_completed.len(), Profile::Complete.plan().len());
        assert!(BackupManifest::is_complete(report.backup_dir.as_ref().unwrap()));
        assert_eq!(sink.progress_events().last().map(|(p, _)| *p), Some(100));
    }

    #[test]
    fn test_report_serializes_error_kind() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut orch = Orchestrator::new(Platform::inert(true), Environment::default(), settings(tmp.path()));
        let report = orch.run(Profile::Ultimate, &Confirmation::accepted(), &RecordingSink::new());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["final_state"], "idle");
        assert_eq!(json["error"]["kind"], "confirmation_rejected");
    }
}
