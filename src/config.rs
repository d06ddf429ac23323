// Installer settings

use crate::agent::ScalarValue;
use crate::error::{Result, SetupError};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const PROCESS_CPU_AGENT_PORT: u16 = 31416;
pub const EXPORTER_PORT: u16 = 31415;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parent directory of every agent's install directory
    pub install_root: PathBuf,
    /// Skip host detection and use this machine identifier instead
    pub arch_override: Option<String>,
    pub exporter: ExporterSettings,
    pub process_agent: ProcessAgentSettings,
    pub download: DownloadSettings,
    pub service_start: PollSettings,
    pub health: HealthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterSettings {
    /// Release version; the platform default is used when unset
    pub version: Option<String>,
    /// Release tarball to install offline; defaults to the one bundled in
    /// `lib/` for the default version
    pub local_source: Option<PathBuf>,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessAgentSettings {
    pub source_url: Option<String>,
    /// Bundled binary; defaults to `lib/<binary>` next to the installer
    pub local_source: Option<PathBuf>,
    pub port: u16,
    pub service_user: Option<String>,
    pub extra_config: BTreeMap<String, ScalarValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub attempts: usize,
    pub backoff_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub attempts: usize,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub attempts: usize,
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let install_root = if cfg!(windows) {
            PathBuf::from(r"C:\ProgramData\prometheus")
        } else {
            PathBuf::from("/opt/prometheus")
        };

        Self {
            install_root,
            arch_override: None,
            exporter: ExporterSettings::default(),
            process_agent: ProcessAgentSettings::default(),
            download: DownloadSettings::default(),
            service_start: PollSettings::default(),
            health: HealthSettings::default(),
        }
    }
}

impl Default for ExporterSettings {
    fn default() -> Self {
        Self {
            version: None,
            local_source: None,
            port: EXPORTER_PORT,
        }
    }
}

impl Default for ProcessAgentSettings {
    fn default() -> Self {
        // Windows services run as LocalSystem unless told otherwise
        let service_user = if cfg!(windows) {
            None
        } else {
            Some("prometheus".to_string())
        };

        Self {
            source_url: None,
            local_source: None,
            port: PROCESS_CPU_AGENT_PORT,
            service_user,
            extra_config: BTreeMap::new(),
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_secs: 5,
            timeout_secs: 120,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval_secs: 2,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_secs: 2,
            timeout_secs: 3,
        }
    }
}

impl DownloadSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.backoff_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PollSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.interval_secs))
    }
}

impl HealthSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.interval_secs))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Get default config path: ~/.config/prometheus-agents-setup/config.yaml
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SetupError::Config("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("prometheus-agents-setup").join("config.yaml"))
    }

    /// Load config from `path`. Without one, the default location is read
    /// when present and defaults are used otherwise. A path given explicitly
    /// must exist.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(SetupError::Config(format!(
                        "settings file {} not found",
                        path.display()
                    ))
                    .into());
                }
                path
            }
            None => match Self::default_path() {
                Ok(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };

        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| SetupError::Config(format!("{}: {}", config_path.display(), e)))?;
        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| SetupError::Config(format!("{}: {}", config_path.display(), e)))?;
        tracing::debug!("Loaded settings from {}", config_path.display());
        Ok(config)
    }
}
