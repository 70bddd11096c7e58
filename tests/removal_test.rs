use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use vscrub::backup::{self, BackupManifest};
use vscrub::common::errors::RemovalError;
use vscrub::common::progress::{RecordingSink, Reporter, StatusLevel};
use vscrub::locator::{Environment, Product};
use vscrub::orchestrator::{Confirmation, Orchestrator, Phase, Profile, RemovalStats, RunSettings, RunState};
use vscrub::platform::registry::{Hive, RegistryKeyRef};
use vscrub::platform::{FixedPrivilege, InMemoryRegistry, NoopMaintenance, NoopProcesses, Platform};

const SETTINGS_JSON: &str = "{\n  \"editor.fontSize\": 14\n}\n";

/// A fake user profile under a temp dir with one VS Code user-data root
struct Fixture {
    tmp: TempDir,
    env: Environment,
    registry: Arc<InMemoryRegistry>,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let env = Environment {
            local_app_data: Some(root.join("local")),
            app_data: Some(root.join("roaming")),
            user_profile: Some(root.join("home")),
            temp_dirs: vec![root.join("temp")],
            ..Environment::default()
        };
        for dir in ["local", "roaming", "home", "temp"] {
            std::fs::create_dir_all(root.join(dir)).unwrap();
        }

        let user = root.join("roaming").join("Code").join("User");
        std::fs::create_dir_all(&user).unwrap();
        std::fs::write(user.join("settings.json"), SETTINGS_JSON).unwrap();

        Self {
            tmp,
            env,
            registry: Arc::new(InMemoryRegistry::new()),
        }
    }

    fn user_data(&self) -> PathBuf {
        self.tmp.path().join("roaming").join("Code")
    }

    fn backup_root(&self) -> PathBuf {
        self.tmp.path().join("backups")
    }

    fn platform(&self, elevated: bool) -> Platform {
        Platform {
            registry: self.registry.clone(),
            processes: Arc::new(NoopProcesses),
            maintenance: Arc::new(NoopMaintenance),
            privilege: Arc::new(FixedPrivilege(elevated)),
        }
    }

    fn orchestrator(&self, elevated: bool) -> Orchestrator {
        self.orchestrator_backing_up_to(elevated, self.backup_root())
    }

    fn orchestrator_backing_up_to(&self, elevated: bool, backup_root: PathBuf) -> Orchestrator {
        let settings = RunSettings {
            product: Product::default(),
            backup_root,
            process_wait: Duration::ZERO,
            verification_pause: Duration::ZERO,
            logs_dir: None,
        };
        Orchestrator::new(self.platform(elevated), self.env.clone(), settings)
    }

    fn set_machine_id(&self, id: &str) {
        let product = Product::default();
        self.registry
            .set_value(&product.registry_root, &product.identifier_value, id);
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

/// Every file below `root`, keyed by relative path, with its bytes
fn tree_contents(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

#[test]
fn test_complete_removes_user_data_after_backup() {
    let fx = Fixture::new();
    let mut orch = fx.orchestrator(true);
    let sink = RecordingSink::new();

    let report = orch.run(Profile::Complete, &Confirmation::accepted(), &sink);

    assert_eq!(report.final_state, RunState::Completed, "{:?}", report.error);
    assert_eq!(report.stats.directories_removed, 1);
    assert!(!fx.user_data().exists());

    assert!(sink
        .messages(StatusLevel::Info)
        .iter()
        .any(|m| m.starts_with("Verified")));

    let backup_dir = report.backup_dir.expect("backup dir");
    assert!(BackupManifest::is_complete(&backup_dir));
    assert_eq!(
        read(&backup_dir.join("Settings").join("Code").join("settings.json")),
        SETTINGS_JSON
    );
}

#[test]
fn test_backup_then_restore_brings_settings_and_keys_back() {
    let fx = Fixture::new();
    fx.set_machine_id("abc-123");
    let mut orch = fx.orchestrator(true);

    let outcome = orch.backup_only(&RecordingSink::new()).unwrap();
    assert_eq!(outcome.manifest.source_paths, vec![fx.user_data()]);

    std::fs::remove_dir_all(fx.user_data()).unwrap();
    let fresh = InMemoryRegistry::new();
    let sink = RecordingSink::new();
    let report = backup::restore(&outcome.backup_dir, &fresh, &Reporter::new(&sink)).unwrap();

    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(report.original_id.as_deref(), Some("abc-123"));
    assert_eq!(
        read(&fx.user_data().join("User").join("settings.json")),
        SETTINGS_JSON
    );
    assert_eq!(
        backup::current_identifier(&fresh, &Product::default()).as_deref(),
        Some("abc-123")
    );
}

#[test]
fn test_repeated_backups_record_same_sources() {
    let fx = Fixture::new();
    let mut orch = fx.orchestrator(false);

    let first = orch.backup_only(&RecordingSink::new()).unwrap();
    let second = orch.backup_only(&RecordingSink::new()).unwrap();

    assert_ne!(first.backup_dir, second.backup_dir);
    assert_eq!(first.manifest.source_paths, second.manifest.source_paths);
    assert_eq!(backup::list_backups(&fx.backup_root()).unwrap().len(), 2);
}

#[test]
fn test_ultimate_denied_key_is_a_warning() {
    let fx = Fixture::new();
    let product = Product::default();
    let denied = RegistryKeyRef::new(Hive::CurrentUser, r"SOFTWARE\Classes\vscode");
    let removable = RegistryKeyRef::new(Hive::CurrentUser, r"SOFTWARE\Classes\Applications\Code.exe");
    fx.registry.create_key(&denied);
    fx.registry.create_key(&removable);
    fx.registry.deny(&denied);
    fx.set_machine_id("abc-123");

    let mut orch = fx.orchestrator(true);
    let sink = RecordingSink::new();
    let report = orch.run(Profile::Ultimate, &Confirmation::with_token("ULTIMATE"), &sink);

    assert_eq!(report.final_state, RunState::Completed, "{:?}", report.error);
    assert_eq!(report.stats.registry_keys_removed, 1);
    assert!(report.stats.identifier_reset);
    assert!(report.new_identifier.is_some());
    assert!(fx.registry.key_exists(&denied));
    assert!(!fx.registry.key_exists(&removable));
    assert!(report.warnings.iter().any(|w| w.contains(r"SOFTWARE\Classes\vscode")));
    assert!(!sink.messages(StatusLevel::Warning).is_empty());
    assert!(backup::current_identifier(fx.registry.as_ref(), &product).is_none());

    let manifest = BackupManifest::load(report.backup_dir.as_ref().unwrap()).unwrap();
    let saved = manifest.identifier_backup.and_then(|i| i.original_id);
    assert_eq!(saved.as_deref(), Some("abc-123"));
}

#[test]
fn test_wrong_token_touches_nothing() {
    let fx = Fixture::new();
    let mut orch = fx.orchestrator(true);
    let sink = RecordingSink::new();

    let report = orch.run(Profile::Ultimate, &Confirmation::with_token("ultimate"), &sink);

    assert_eq!(report.final_state, RunState::Idle);
    assert_eq!(orch.state(), RunState::Idle);
    assert_eq!(report.stats, RemovalStats::default());
    assert!(matches!(report.error, Some(RemovalError::ConfirmationRejected { .. })));
    assert!(report.backup_dir.is_none());
    assert!(fx.user_data().exists());
    assert!(!fx.backup_root().exists());
}

#[test]
fn test_unelevated_run_touches_nothing() {
    let fx = Fixture::new();
    let mut orch = fx.orchestrator(false);

    let report = orch.run(Profile::Basic, &Confirmation::accepted(), &RecordingSink::new());

    assert_eq!(report.final_state, RunState::Idle);
    assert!(matches!(report.error, Some(RemovalError::PrivilegeRequired)));
    assert!(fx.user_data().exists());
    assert!(!fx.backup_root().exists());
}

#[test]
fn test_progress_is_monotonic_and_phases_ordered() {
    let fx = Fixture::new();
    let mut orch = fx.orchestrator(true);
    let sink = RecordingSink::new();

    let report = orch.run(Profile::Ultimate, &Confirmation::with_token("ULTIMATE"), &sink);
    assert!(report.succeeded(), "{:?}", report.error);

    let percents: Vec<u8> = sink.progress_events().iter().map(|(p, _)| *p).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{:?}", percents);
    assert_eq!(percents.last(), Some(&100));

    let expected: Vec<Phase> = Profile::Ultimate.plan().iter().map(|s| s.phase).collect();
    assert_eq!(report.phases_completed, expected);
    assert_eq!(report.phases_completed.first(), Some(&Phase::Backup));
}

#[test]
fn test_identifier_reset_only_keeps_user_data() {
    let fx = Fixture::new();
    fx.set_machine_id("abc-123");
    let storage_dir = fx.user_data().join("User").join("globalStorage");
    std::fs::create_dir_all(&storage_dir).unwrap();
    std::fs::write(
        storage_dir.join("storage.json"),
        r#"{"telemetry.machineId": "abc-123", "theme": "dark"}"#,
    )
    .unwrap();

    let mut orch = fx.orchestrator(true);
    let report = orch.reset_identifier_only(&Confirmation::accepted(), &RecordingSink::new());

    assert!(report.succeeded(), "{:?}", report.error);
    assert!(report.profile.is_none());
    assert!(report.stats.identifier_reset);
    assert_eq!(report.stats.directories_removed, 0);
    assert!(fx.user_data().join("User").join("settings.json").exists());

    let storage: serde_json::Value =
        serde_json::from_str(&read(&storage_dir.join("storage.json"))).unwrap();
    assert!(storage.get("telemetry.machineId").is_none());
    assert_eq!(storage["theme"], "dark");

    let info = read(
        &report
            .backup_dir
            .unwrap()
            .join("MachineID")
            .join("machine_id_info.json"),
    );
    assert!(info.contains("abc-123"));
}

#[test]
fn test_spawned_run_reports_through_shared_sink() {
    let fx = Fixture::new();
    let orch = fx.orchestrator(true);
    let sink = Arc::new(RecordingSink::new());

    let handle = orch.spawn(Profile::Basic, Confirmation::accepted(), sink.clone());
    let (orch, report) = handle.join().unwrap();

    assert!(report.succeeded(), "{:?}", report.error);
    assert_eq!(orch.state(), RunState::Completed);
    assert!(!sink.progress_events().is_empty());
    assert!(!fx.user_data().exists());
}

#[test]
fn test_complete_removal_then_restore_is_byte_identical() {
    let fx = Fixture::new();
    let ext = fx.user_data().join("extensions").join("ms-python.python-2024.2.1");
    std::fs::create_dir_all(ext.join("out").join("client")).unwrap();
    std::fs::write(ext.join("package.json"), r#"{"name": "python"}"#).unwrap();
    std::fs::write(ext.join("out").join("client").join("extension.js.map"), [0u8, 159, 146, 150, 255]).unwrap();
    std::fs::write(fx.user_data().join("extensions").join("extensions.json"), "[]").unwrap();
    let snippets = fx.user_data().join("User").join("snippets");
    std::fs::create_dir_all(&snippets).unwrap();
    std::fs::write(snippets.join("rust.json"), "{ \"fn\": {} }\n").unwrap();

    let settings_before = tree_contents(&fx.user_data().join("User"));
    let extensions_before = tree_contents(&fx.user_data().join("extensions"));
    assert_eq!(extensions_before.len(), 3);

    let mut orch = fx.orchestrator(true);
    let report = orch.run(Profile::Complete, &Confirmation::accepted(), &RecordingSink::new());
    assert!(report.succeeded(), "{:?}", report.error);
    assert!(!fx.user_data().exists());

    let sink = RecordingSink::new();
    let restored = backup::restore(
        report.backup_dir.as_ref().unwrap(),
        fx.registry.as_ref(),
        &Reporter::new(&sink),
    )
    .unwrap();

    assert!(restored.errors.is_empty(), "{:?}", restored.errors);
    assert_eq!(tree_contents(&fx.user_data().join("User")), settings_before);
    assert_eq!(tree_contents(&fx.user_data().join("extensions")), extensions_before);
}

#[test]
fn test_ultimate_removes_matching_uninstall_entry() {
    let fx = Fixture::new();
    let product = Product::default();
    let entry = product.uninstall_root.child("{EA457B21-F73E-494C-ACAB-524FDE069978}_is1");
    let other = product.uninstall_root.child("7-Zip");
    fx.registry.set_value(&entry, "DisplayName", "Microsoft Visual Studio Code");
    fx.registry.set_value(&other, "DisplayName", "7-Zip 23.01 (x64)");

    let mut orch = fx.orchestrator(true);
    let report = orch.run(Profile::Ultimate, &Confirmation::with_token("ULTIMATE"), &RecordingSink::new());

    assert!(report.succeeded(), "{:?}", report.error);
    assert!(!fx.registry.key_exists(&entry));
    assert!(fx.registry.key_exists(&other));
    assert_eq!(report.stats.registry_keys_removed, 1);
    assert!(report
        .outcomes
        .iter()
        .any(|line| line.item.ends_with("_is1") && line.outcome == "done"));
}

#[test]
fn test_backup_inside_temp_is_refused_before_anything_is_removed() {
    let fx = Fixture::new();
    let temp = fx.tmp.path().join("temp");
    let mut orch = fx.orchestrator_backing_up_to(true, temp.clone());

    let report = orch.run(Profile::Basic, &Confirmation::accepted(), &RecordingSink::new());

    assert_eq!(report.final_state, RunState::Failed);
    assert!(matches!(report.error, Some(RemovalError::UnsafeBackupLocation { .. })));
    assert!(report.phases_completed.is_empty());
    assert!(fx.user_data().exists());
    assert_eq!(std::fs::read_dir(&temp).unwrap().count(), 0);
}

#[test]
fn test_backup_inside_removed_user_data_is_refused() {
    let fx = Fixture::new();
    let mut orch = fx.orchestrator_backing_up_to(true, fx.user_data().join("backups"));

    let report = orch.run(Profile::Complete, &Confirmation::accepted(), &RecordingSink::new());

    assert_eq!(report.final_state, RunState::Failed);
    assert!(matches!(report.error, Some(RemovalError::UnsafeBackupLocation { .. })));
    assert_eq!(read(&fx.user_data().join("User").join("settings.json")), SETTINGS_JSON);
    assert!(!fx.user_data().join("backups").exists());
}

#[test]
fn test_verification_warns_about_directories_left_behind() {
    let fx = Fixture::new();
    let settings = RunSettings {
        product: Product::default(),
        backup_root: fx.backup_root(),
        process_wait: Duration::ZERO,
        verification_pause: Duration::ZERO,
        logs_dir: None,
    };
    let env = fx.env.preserving(&fx.user_data());
    let mut orch = Orchestrator::new(fx.platform(true), env, settings);
    let sink = RecordingSink::new();

    let report = orch.run(Profile::Basic, &Confirmation::accepted(), &sink);

    assert!(report.succeeded(), "{:?}", report.error);
    assert!(fx.user_data().exists());
    assert!(report
        .warnings
        .iter()
        .any(|w| w.starts_with("Still present after removal") && w.contains("Code")));
}
