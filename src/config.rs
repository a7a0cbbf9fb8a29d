// Configuration management

use crate::error::Result;
use crate::systemd::{JobMode, ServiceScope};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "SYSGUARD_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scope: ServiceScope,
    pub job_mode: JobMode,
    pub connect_timeout_secs: u64,
    /// Sleep between liveness probes while connected
    pub health_check_secs: u64,
    pub backoff_initial_secs: u64,
    pub backoff_max_secs: u64,
    /// Upper bound on start confirmation
    pub unit_check_timeout_secs: u64,
    /// Sleep after re-issuing a start for a unit that isn't active yet
    pub unit_retry_secs: u64,
    pub restart_settle_secs: u64,
    /// Capacity of the internal job-result channel
    pub channel_capacity: usize,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scope: ServiceScope::System,
            job_mode: JobMode::Replace,
            connect_timeout_secs: 5,
            health_check_secs: 10,
            backoff_initial_secs: 1,
            backoff_max_secs: 60,
            unit_check_timeout_secs: 300,
            unit_retry_secs: 5,
            restart_settle_secs: 3,
            channel_capacity: 100,
            log_file: None,
        }
    }
}

impl Config {
    /// Get default config path: ~/.config/sysguard/config.yaml
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("sysguard").join("config.yaml"))
    }

    /// Pick the config path: explicit path, then $SYSGUARD_CONFIG, then the default
    pub fn resolve_path(path: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = path {
            return Ok(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Self::default_path(),
        }
    }

    /// Load config from path, falling back to defaults if not found
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = Self::resolve_path(path).unwrap_or_default();

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_yaml::from_str(&contents)?;
            config.validate()?;
            tracing::debug!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            // Return defaults if no config file exists
            Ok(Self::default())
        }
    }

    /// Save config to path
    pub fn save(&self, path: PathBuf) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Reject settings the controller can't run with
    pub fn validate(&self) -> Result<()> {
        use crate::error::SysguardError;

        let intervals = [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("health_check_secs", self.health_check_secs),
            ("backoff_initial_secs", self.backoff_initial_secs),
            ("unit_check_timeout_secs", self.unit_check_timeout_secs),
            ("unit_retry_secs", self.unit_retry_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(SysguardError::Config(format!("{} must be at least 1", name)).into());
        }
        if self.backoff_max_secs < self.backoff_initial_secs {
            return Err(SysguardError::Config(
                "backoff_max_secs must not be below backoff_initial_secs".into(),
            )
            .into());
        }
        if self.channel_capacity == 0 {
            return Err(SysguardError::Config("channel_capacity must be at least 1".into()).into());
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_secs)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_secs(self.backoff_initial_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    pub fn unit_check_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_check_timeout_secs)
    }

    pub fn unit_retry_interval(&self) -> Duration {
        Duration::from_secs(self.unit_retry_secs)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_secs(self.restart_settle_secs)
    }
}
