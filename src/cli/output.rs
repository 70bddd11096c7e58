use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::backup::{BackupSummary, RestoreReport};
use crate::common::format::{self, format_count, format_path, status_icon};
use crate::common::progress::{ProgressSink, StatusLevel};
use crate::orchestrator::{Analysis, BackupOutcome, Profile, RunReport, RunState};

/// Console presenter: a progress bar plus colored status lines
pub struct ConsoleSink {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl ConsoleSink {
    pub fn new(show_progress: bool, quiet: bool) -> Self {
        let bar = show_progress.then(|| {
            let pb = ProgressBar::new(100);
            pb.set_style(
                ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("━━░"),
            );
            pb
        });
        Self { bar, quiet }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
    }
}

impl ProgressSink for ConsoleSink {
    fn progress(&self, percent: u8, message: &str) {
        if let Some(pb) = &self.bar {
            pb.set_position(percent as u64);
            pb.set_message(message.to_string());
        }
    }

    fn status(&self, message: &str, level: StatusLevel) {
        if self.quiet && level != StatusLevel::Error {
            return;
        }
        let line = match level {
            StatusLevel::Info => format!("  {} {}", status_icon(level), message),
            StatusLevel::Warning => format!("  {} {}", status_icon(level), message.yellow()),
            StatusLevel::Error => format!("  {} {}", status_icon(level), message.red()),
        };
        match &self.bar {
            Some(pb) => pb.println(line),
            None if level == StatusLevel::Error => eprintln!("{}", line),
            None => println!("{}", line),
        }
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results: {}", e),
    }
}

/// Explain what a profile will do before asking for confirmation
pub fn print_profile_warning(profile: Profile) {
    println!();
    match profile {
        Profile::Basic => {
            println!("  {} This will remove VS Code from your system.", "⚠".yellow());
        }
        Profile::Complete => {
            println!(
                "  {} This will completely remove VS Code and all related data.",
                "⚠".yellow()
            );
        }
        Profile::Ultimate => {
            println!("  {}", "⚠️  ULTIMATE REMOVAL WARNING  ⚠️".red().bold());
            println!("    • Completely eradicate every VS Code trace");
            println!("    • Reset the machine identifier");
            println!("    • Remove uninstall entries and temp leftovers");
            println!("    • Remove all telemetry data");
            println!("  {}", "This operation is irreversible outside of the backup.".red());
        }
    }
    println!("  A backup will be created first.");
    println!();
}

/// Print the summary of a removal or identifier-reset run
pub fn print_run_report(report: &RunReport) {
    let title = match report.profile {
        Some(p) => format!("vscrub {} removal", p),
        None => "vscrub identifier reset".to_string(),
    };
    println!();
    println!("  {}", title.bold());
    println!("{}", "─".repeat(60).dimmed());
    format::print_kv("Result", &format::format_state(&report.final_state).to_string());
    format::print_kv("Session", report.session_id.as_str());
    format::print_kv("Duration", &format::format_duration(report.elapsed_secs));

    let stats = &report.stats;
    println!();
    println!(
        "  {} {}",
        "⚙️",
        format_count(stats.processes_terminated, "process terminated", "processes terminated")
    );
    println!(
        "  {} {}",
        "📁",
        format_count(stats.directories_removed, "directory removed", "directories removed")
    );
    println!(
        "  {} {}",
        "🔑",
        format_count(stats.registry_keys_removed, "registry key removed", "registry keys removed")
    );
    println!(
        "  {} {}",
        "🗑️",
        format_count(stats.files_deleted as usize, "file deleted", "files deleted")
    );
    println!(
        "  {} Machine identifier reset: {}",
        "🆔",
        if stats.identifier_reset { "yes".green() } else { "no".dimmed() }
    );
    if let Some(id) = &report.new_identifier {
        println!(
            "     {} {} {}",
            "↳".dimmed(),
            id.to_string().cyan(),
            "(VS Code generates its own on next start)".dimmed()
        );
    }

    if let Some(dir) = &report.backup_dir {
        println!();
        println!("  {} Backup: {}", "💾", format_path(dir).cyan());
    }

    if !report.warnings.is_empty() {
        println!();
        println!(
            "  {} {}",
            "⚠".yellow(),
            format_count(report.warnings.len(), "warning:", "warnings:").yellow()
        );
        for warning in &report.warnings {
            println!("    {} {}", "→".dimmed(), warning.dimmed());
        }
    }

    if let Some(error) = &report.error {
        println!();
        println!("  {} {}", "✗".red(), error.to_string().red());
        if report.backup_dir.is_some() {
            println!(
                "  {} Run {} to undo what was changed",
                "💡",
                "vscrub restore --latest".cyan()
            );
        }
    }
    println!();
}

/// One-line summary: state, then the five counters
pub fn print_run_quiet(report: &RunReport) {
    let state = match report.final_state {
        RunState::Completed => "completed",
        RunState::Failed => "failed",
        _ => "idle",
    };
    println!(
        "{}  {}  {}  {}  {}  {}",
        state,
        report.stats.processes_terminated,
        report.stats.directories_removed,
        report.stats.registry_keys_removed,
        report.stats.files_deleted,
        report.stats.identifier_reset,
    );
}

pub fn print_backup_outcome(outcome: &BackupOutcome) {
    let manifest = &outcome.manifest;
    println!();
    println!("  {} Backup created", "✓".green());
    format::print_kv("Location", &format_path(&outcome.backup_dir));
    format::print_kv("Session", outcome.session_id.as_str());
    format::print_kv(
        "Trees",
        &format_count(manifest.captured_trees.len(), "directory tree", "directory trees"),
    );
    format::print_kv(
        "Extensions",
        &format_count(manifest.extensions.len(), "extension", "extensions"),
    );
    format::print_kv(
        "Registry",
        &format_count(manifest.registry_keys_backed.len(), "key exported", "keys exported"),
    );
    let id = manifest
        .identifier_backup
        .as_ref()
        .and_then(|i| i.original_id.as_deref())
        .unwrap_or("not set");
    format::print_kv("Machine ID", id);
    for warning in &manifest.warnings {
        println!("    {} {}", "⚠".yellow(), warning.dimmed());
    }
    println!();
}

pub fn print_backup_list(backups: &[BackupSummary]) {
    if backups.is_empty() {
        println!("  No backups found.");
        return;
    }

    format::print_header("Available backups");
    for (i, backup) in backups.iter().enumerate() {
        let status = if backup.complete {
            "complete".green()
        } else {
            "incomplete".red()
        };
        let created = backup
            .created_at
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  [{}] {:<48} {:<16} {}",
            i + 1,
            format::truncate(&backup.name, 48),
            created.dimmed(),
            status
        );
    }
    println!();
}

pub fn print_restore_report(report: &RestoreReport) {
    println!();
    println!(
        "  {} Restored {} from {}",
        "✓".green(),
        format_count(report.files_restored as usize, "file", "files"),
        format_path(&report.backup_dir).cyan()
    );
    format::print_kv(
        "Registry",
        &format_count(report.registry_imported, "key imported", "keys imported"),
    );
    if let Some(id) = &report.original_id {
        format::print_kv("Original machine ID", id);
    }
    if !report.errors.is_empty() {
        println!();
        for error in &report.errors {
            println!("    {} {}", "✗".red(), error.dimmed());
        }
    }
    println!();
}

pub fn print_analysis(analysis: &Analysis) {
    format::print_header("VS Code system analysis");

    let sections = [
        ("📦 Installations", &analysis.resources.install_paths),
        ("👤 User data", &analysis.resources.user_data_paths),
        ("🧩 Extensions", &analysis.resources.extension_paths),
        ("🗄️ Caches", &analysis.resources.cache_paths),
    ];
    for (label, paths) in sections {
        println!("  {} ({})", label.bold(), paths.len());
        for (i, path) in paths.iter().enumerate() {
            println!("    {}. {}", i + 1, format_path(path));
        }
        println!();
    }

    println!("  {} ({})", "⚙️ Running processes".bold(), analysis.processes.len());
    for proc in &analysis.processes {
        println!("    PID {}: {}", proc.pid, proc.name);
    }
    println!();

    println!(
        "  {} {}",
        "🆔 Machine ID:".bold(),
        analysis.machine_id.as_deref().unwrap_or("not found")
    );
    println!(
        "  {} {}",
        "🔒 Elevated:".bold(),
        if analysis.elevated { "yes".green() } else { "no".yellow() }
    );
    println!();

    for (profile, scope) in &analysis.scopes {
        println!(
            "  {} {} would touch {} and {}",
            "→".dimmed(),
            profile.to_string().cyan(),
            format_count(scope.directories.len(), "directory", "directories"),
            format_count(scope.registry_keys.len(), "registry key", "registry keys"),
        );
    }
    println!();
}
