use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::locator::product::Product;

/// Global vscrub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory that receives `VSCode_Backup_<session>` folders.
    /// Defaults to the Desktop, falling back to the home directory.
    #[serde(default)]
    pub backup_root: Option<PathBuf>,

    /// Seconds to wait for a gracefully terminated process before killing it
    #[serde(default = "default_process_wait_secs")]
    pub process_wait_secs: u64,

    /// Pause before the final verification step of a profile
    #[serde(default = "default_verification_pause_ms")]
    pub verification_pause_ms: u64,

    /// Description of the product being removed
    #[serde(default)]
    pub product: Product,
}

fn default_process_wait_secs() -> u64 {
    5
}
fn default_verification_pause_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backup_root: None,
            process_wait_secs: default_process_wait_secs(),
            verification_pause_ms: default_verification_pause_ms(),
            product: Product::default(),
        }
    }
}

impl Config {
    /// Get the vscrub data directory (~/.vscrub)
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".vscrub")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Get the logs directory
    pub fn logs_dir() -> PathBuf {
        Self::data_dir().join("logs")
    }

    /// Load config from file, or fall back to defaults if not present
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        let dir = Self::data_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Initialize all vscrub directories
    pub fn init_dirs() -> Result<()> {
        for dir in &[Self::data_dir(), Self::logs_dir()] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }

    /// Resolved backup root
    pub fn backup_root(&self) -> PathBuf {
        self.backup_root
            .clone()
            .or_else(dirs::desktop_dir)
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| Self::data_dir().join("backups"))
    }

    pub fn process_wait(&self) -> Duration {
        Duration::from_secs(self.process_wait_secs)
    }

    pub fn verification_pause(&self) -> Duration {
        Duration::from_millis(self.verification_pause_ms)
    }

    /// Apply a `config set <key> <value>` assignment
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "backup_root" => self.backup_root = Some(PathBuf::from(value)),
            "process_wait_secs" => {
                self.process_wait_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number of seconds: {}", value))?
            }
            "verification_pause_ms" => {
                self.verification_pause_ms = value
                    .parse()
                    .with_context(|| format!("Invalid number of milliseconds: {}", value))?
            }
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        Ok(())
    }
}
