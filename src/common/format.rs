use colored::*;

use crate::common::progress::StatusLevel;
use crate::orchestrator::RunState;

/// Format a count with the matching noun form
pub fn format_count(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {}", singular)
    } else {
        format!("{} {}", count, plural)
    }
}

/// Format a path for display, replacing home directory with ~
pub fn format_path(path: &std::path::Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            return format!("~/{}", stripped.display());
        }
    }
    path.display().to_string()
}

/// Format duration in human-readable form
pub fn format_duration(secs: f64) -> String {
    if secs < 1.0 {
        format!("{:.0}ms", secs * 1000.0)
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = (secs / 60.0).floor() as u64;
        let remaining = secs - (mins as f64 * 60.0);
        format!("{}m {:.0}s", mins, remaining)
    }
}

/// Colorize a run's final state
pub fn format_state(state: &RunState) -> ColoredString {
    match state {
        RunState::Completed => "Completed".green().bold(),
        RunState::Failed => "Failed".red().bold(),
        RunState::Idle => "Not started".yellow(),
        RunState::Confirming => "Awaiting confirmation".yellow(),
        RunState::Running(phase) => format!("Running ({})", phase).cyan(),
    }
}

/// Icon for a status line
pub fn status_icon(level: StatusLevel) -> ColoredString {
    match level {
        StatusLevel::Info => "✓".green(),
        StatusLevel::Warning => "⚠".yellow(),
        StatusLevel::Error => "✗".red(),
    }
}

/// Print a section header
pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Truncate a string to max length with ellipsis
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        ".".repeat(max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
