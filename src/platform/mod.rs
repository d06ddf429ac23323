// Host platform detection and capability selection

pub mod arch;
pub mod privilege;

pub use arch::ArchTag;
pub use privilege::ensure_elevated;

use crate::config::Config;
use crate::error::{Result, SetupError};
use crate::service::ServiceManager;
use std::fmt;

/// Operating system family of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Windows,
    Other(&'static str),
}

impl OsFamily {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => OsFamily::Linux,
            "windows" => OsFamily::Windows,
            other => OsFamily::Other(other),
        }
    }

    /// Name used in release asset file names
    pub fn label(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Windows => "windows",
            OsFamily::Other(name) => name,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Platform facts resolved once at startup
#[derive(Debug, Clone)]
pub struct HostPlatform {
    pub os: OsFamily,
    pub machine: String,
    pub arch: ArchTag,
}

impl HostPlatform {
    /// Detect the running host. Only OS families with a service manager
    /// backend are accepted.
    pub fn detect(config: &Config) -> Result<Self> {
        let os = OsFamily::current();
        if let OsFamily::Other(name) = os {
            return Err(SetupError::UnsupportedPlatform(format!(
                "{} has no supported service manager (systemd or Windows SCM required)",
                name
            ))
            .into());
        }

        let machine = config
            .arch_override
            .clone()
            .unwrap_or_else(arch::host_machine);
        Ok(Self::new(os, machine))
    }

    pub fn new(os: OsFamily, machine: String) -> Self {
        let arch = arch::resolve(&machine, os);
        Self { os, machine, arch }
    }

    /// Connect to the platform's service manager
    pub async fn service_manager(&self) -> Result<Box<dyn ServiceManager>> {
        match self.os {
            #[cfg(target_os = "linux")]
            OsFamily::Linux => Ok(Box::new(crate::service::SystemdManager::connect().await?)),
            OsFamily::Windows => Ok(Box::new(crate::service::ScmManager::new())),
            other => Err(SetupError::UnsupportedPlatform(format!(
                "no service manager backend for {} in this build",
                other
            ))
            .into()),
        }
    }
}
