use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::orchestrator::Profile;

/// vscrub — Remove Visual Studio Code completely, with a backup first
#[derive(Parser, Debug)]
#[command(
    name = "vscrub",
    version,
    about = "Remove Visual Studio Code completely, with a backup first",
    long_about = "vscrub removes VS Code's installs, user data, extensions, caches, registry\n\
                   entries and machine identifier. Every removal takes a restorable backup\n\
                   before anything is deleted.",
    after_help = "EXAMPLES:\n  \
        vscrub analyze                          Show what is installed and running\n  \
        vscrub backup                           Back up settings and extensions only\n  \
        vscrub remove --profile basic           Remove installs, user data and core keys\n  \
        vscrub remove --profile complete -y     Also extensions, caches, file associations\n  \
        vscrub remove --profile ultimate        Everything, plus identifier reset\n  \
        vscrub reset-id                         Reset the machine identifier only\n  \
        vscrub restore --list                   List backups\n  \
        vscrub restore --latest                 Restore the most recent backup\n  \
        vscrub config set backup_root D:\\Backups"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output (debug log lines on stderr)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode — minimal output
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Back up, then remove VS Code
    Remove {
        /// How much to remove
        #[arg(long, short, default_value = "basic")]
        profile: ProfileArg,

        /// Skip the yes/no prompt
        #[arg(long, short = 'y')]
        yes: bool,

        /// Confirmation text for the ultimate profile (must be ULTIMATE)
        #[arg(long, value_name = "TOKEN")]
        confirm: Option<String>,
    },

    /// Back up settings, extensions, registry keys and identifier only
    Backup,

    /// Restore a backup
    Restore {
        /// Restore the most recent complete backup
        #[arg(long)]
        latest: bool,

        /// Backup directory to restore
        #[arg(long, value_name = "DIR")]
        path: Option<PathBuf>,

        /// List available backups
        #[arg(long)]
        list: bool,
    },

    /// Reset the machine identifier without removing anything else
    ResetId {
        /// Skip confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Show installs, user data, running processes and the identifier
    Analyze,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset to default configuration
    Reset,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Initialize vscrub directories and default config
    Init,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Quiet,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProfileArg {
    /// Installs, user data and core registry keys
    Basic,
    /// Also extensions, caches, file associations and context menus
    Complete,
    /// Also temp leftovers, uninstall entries and the machine identifier
    Ultimate,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Basic => Profile::Basic,
            ProfileArg::Complete => Profile::Complete,
            ProfileArg::Ultimate => Profile::Ultimate,
        }
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    Powershell,
}
