use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestration::SerialFailurePolicy;
use crate::{clog_debug, Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub runs: RunsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SchedulerConfig {
    /// Cap on tasks executing at once. Unlimited when unset.
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InterpreterConfig {
    #[serde(default)]
    pub serial_failure: SerialFailurePolicy,
    pub action_timeout_secs: Option<u64>,
}

impl InterpreterConfig {
    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunsConfig {
    /// Drop a run's blackboard keys once it finishes.
    #[serde(default)]
    pub clear_on_finish: bool,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_history_capacity() -> usize {
    50
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            clear_on_finish: false,
            history_capacity: default_history_capacity(),
        }
    }
}

impl Config {
    pub fn commander_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".commander"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::commander_dir()?.join("commander.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        clog_debug!(
            "Config loaded: max_concurrent={:?}, serial_failure={:?}, action_timeout_secs={:?}",
            config.scheduler.max_concurrent,
            config.interpreter.serial_failure,
            config.interpreter.action_timeout_secs
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent == Some(0) {
            return Err(Error::Validation(
                "scheduler.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.interpreter.action_timeout_secs == Some(0) {
            return Err(Error::Validation(
                "interpreter.action_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.runs.history_capacity == 0 {
            return Err(Error::Validation(
                "runs.history_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                clog_debug!("Creating config directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        clog_debug!("Config saved to {}", path.display());
        Ok(())
    }
}
