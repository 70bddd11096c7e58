use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use vscrub::backup;
use vscrub::cli::args::{Cli, Commands, CompletionShell, ConfigAction, OutputFormat};
use vscrub::cli::output::{self, ConsoleSink};
use vscrub::common::config::Config;
use vscrub::common::logging;
use vscrub::common::progress::Reporter;
use vscrub::common::session::SessionId;
use vscrub::locator::Environment;
use vscrub::orchestrator::{Confirmation, Orchestrator, Profile, RunReport, RunSettings, RunState};
use vscrub::platform::Platform;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Completions { ref shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                CompletionShell::Bash => clap_complete::Shell::Bash,
                CompletionShell::Zsh => clap_complete::Shell::Zsh,
                CompletionShell::Fish => clap_complete::Shell::Fish,
                CompletionShell::Powershell => clap_complete::Shell::PowerShell,
            };
            clap_complete::generate(shell, &mut cmd, "vscrub", &mut std::io::stdout());
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Config { ref action } => {
            cmd_config(action)?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let config = Config::load()?;
    let session = SessionId::generate();
    let _guard = match logging::init(&Config::logs_dir(), &session, cli.verbose) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("  {} Logging disabled: {:#}", "⚠".yellow(), e);
            None
        }
    };

    let orchestrator = Orchestrator::new(
        Platform::native(),
        Environment::from_env(),
        RunSettings::from_config(&config),
    )
    .with_session(session);

    match cli.command {
        Commands::Remove {
            profile,
            yes,
            ref confirm,
        } => cmd_remove(&cli, orchestrator, profile.into(), yes, confirm.clone()),
        Commands::Backup => cmd_backup(&cli, orchestrator),
        Commands::Restore {
            latest,
            ref path,
            list,
        } => cmd_restore(&cli, &config, latest, path.clone(), list),
        Commands::ResetId { yes } => cmd_reset_id(&cli, orchestrator, yes),
        Commands::Analyze => cmd_analyze(&cli, &orchestrator),
        Commands::Completions { .. } | Commands::Config { .. } => Ok(ExitCode::SUCCESS),
    }
}

fn show_progress(cli: &Cli) -> bool {
    !cli.quiet && matches!(cli.format, OutputFormat::Human)
}

/// Ask a yes/no question on stdin
fn prompt_yes(question: &str) -> Result<bool> {
    print!("  {} {} [y/N] ", "❓", question);
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Ask for a line of text on stdin
fn prompt_line(question: &str) -> Result<String> {
    print!("  {} {} ", "❓", question);
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

fn exit_code(report: &RunReport) -> ExitCode {
    match report.final_state {
        RunState::Completed => ExitCode::SUCCESS,
        RunState::Idle => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

fn print_report(cli: &Cli, report: &RunReport) {
    match cli.format {
        OutputFormat::Human => output::print_run_report(report),
        OutputFormat::Json => output::print_json(report),
        OutputFormat::Quiet => output::print_run_quiet(report),
    }
}

// ─── Remove ───────────────────────────────────────────────────────────────────

fn cmd_remove(
    cli: &Cli,
    orchestrator: Orchestrator,
    profile: Profile,
    yes: bool,
    confirm: Option<String>,
) -> Result<ExitCode> {
    if matches!(cli.format, OutputFormat::Human) {
        output::print_profile_warning(profile);
    }

    let accepted = yes || prompt_yes("Continue?")?;
    let token = match profile.confirmation_token() {
        Some(required) if accepted && confirm.is_none() && !yes => {
            Some(prompt_line(&format!("Type '{}' to confirm:", required))?)
        }
        _ => confirm,
    };
    let confirmation = Confirmation { accepted, token };

    let sink = Arc::new(ConsoleSink::new(show_progress(cli), cli.quiet));
    let handle = orchestrator.spawn(profile, confirmation, sink.clone());
    let (_, report) = handle
        .join()
        .map_err(|_| anyhow::anyhow!("Removal worker panicked"))?;
    sink.finish();

    print_report(cli, &report);
    Ok(exit_code(&report))
}

// ─── Reset identifier ─────────────────────────────────────────────────────────

fn cmd_reset_id(cli: &Cli, mut orchestrator: Orchestrator, yes: bool) -> Result<ExitCode> {
    let accepted = yes
        || prompt_yes("Reset the VS Code machine identifier? The current one is backed up first.")?;
    let confirmation = if accepted {
        Confirmation::accepted()
    } else {
        Confirmation::declined()
    };

    let sink = ConsoleSink::new(show_progress(cli), cli.quiet);
    let report = orchestrator.reset_identifier_only(&confirmation, &sink);
    sink.finish();

    print_report(cli, &report);
    Ok(exit_code(&report))
}

// ─── Backup ───────────────────────────────────────────────────────────────────

fn cmd_backup(cli: &Cli, mut orchestrator: Orchestrator) -> Result<ExitCode> {
    let sink = ConsoleSink::new(show_progress(cli), cli.quiet);
    let result = orchestrator.backup_only(&sink);
    sink.finish();
    let outcome = result.context("Backup failed")?;

    match cli.format {
        OutputFormat::Human => output::print_backup_outcome(&outcome),
        OutputFormat::Json => output::print_json(&outcome),
        OutputFormat::Quiet => println!("{}", outcome.backup_dir.display()),
    }
    Ok(ExitCode::SUCCESS)
}

// ─── Restore ──────────────────────────────────────────────────────────────────

fn cmd_restore(
    cli: &Cli,
    config: &Config,
    latest: bool,
    path: Option<PathBuf>,
    list: bool,
) -> Result<ExitCode> {
    let root = config.backup_root();

    if list || (!latest && path.is_none()) {
        let backups = backup::list_backups(&root)?;
        match cli.format {
            OutputFormat::Human => {
                output::print_backup_list(&backups);
                if !list {
                    println!(
                        "  {} Use {} or {}",
                        "💡",
                        "vscrub restore --latest".cyan(),
                        "vscrub restore --path <DIR>".cyan()
                    );
                }
            }
            OutputFormat::Json => output::print_json(&backups),
            OutputFormat::Quiet => {
                for b in &backups {
                    println!("{}  {}", b.name, if b.complete { "complete" } else { "incomplete" });
                }
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let backup_dir = match path {
        Some(p) => p,
        None => backup::latest_complete(&root)?.ok_or_else(|| {
            anyhow::anyhow!("No complete backups found in {}", root.display())
        })?,
    };

    let platform = Platform::native();
    let sink = ConsoleSink::new(show_progress(cli), cli.quiet);
    let reporter = Reporter::new(&sink);
    let result = backup::restore(&backup_dir, platform.registry.as_ref(), &reporter);
    sink.finish();
    let report = result.with_context(|| format!("Cannot restore {}", backup_dir.display()))?;

    match cli.format {
        OutputFormat::Human => output::print_restore_report(&report),
        OutputFormat::Json => output::print_json(&report),
        OutputFormat::Quiet => println!("{}  {}", report.files_restored, report.errors.len()),
    }

    Ok(if report.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

// ─── Analyze ──────────────────────────────────────────────────────────────────

fn cmd_analyze(cli: &Cli, orchestrator: &Orchestrator) -> Result<ExitCode> {
    let analysis = orchestrator.analyze();
    match cli.format {
        OutputFormat::Human => output::print_analysis(&analysis),
        OutputFormat::Json => output::print_json(&analysis),
        OutputFormat::Quiet => println!(
            "{}  {}  {}  {}",
            analysis.resources.install_paths.len(),
            analysis.resources.user_data_paths.len(),
            analysis.processes.len(),
            analysis.machine_id.as_deref().unwrap_or("-"),
        ),
    }
    Ok(ExitCode::SUCCESS)
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            Config::init_dirs()?;
            let config = Config::default();
            config.save()?;
            println!("  {} vscrub initialized at {}", "✓".green(), Config::data_dir().display());
            println!("  Created: config.toml, logs/");
            Ok(())
        }
        ConfigAction::Show => {
            let config = Config::load()?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!("  {} Configuration reset to defaults", "✓".green());
            Ok(())
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(key, value)?;
            config.save()?;
            println!("  {} Set {} = {}", "✓".green(), key, value);
            Ok(())
        }
    }
}
