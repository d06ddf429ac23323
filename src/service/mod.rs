// Service manager integration module

pub mod command;
pub mod models;
pub mod reconcile;
#[cfg(target_os = "linux")]
pub mod systemd;
pub mod unit;
pub mod windows;

#[cfg(test)]
pub(crate) mod fake;

pub use command::{CommandRunner, TokioCommandRunner};
pub use models::{Dependency, HostView, InstallationState, ServiceDefinition, ServiceState};
pub use reconcile::ServiceReconciler;
#[cfg(target_os = "linux")]
pub use systemd::SystemdManager;
pub use windows::ScmManager;

use crate::agent::AgentDescriptor;
use crate::error::Result;
use async_trait::async_trait;

/// Operations every platform service manager provides
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Short name for log lines
    fn name(&self) -> &'static str;

    async fn query(&self, unit: &str) -> Result<ServiceState>;

    /// Request a graceful stop. Returns once the request is accepted.
    async fn stop(&self, unit: &str) -> Result<()>;

    /// Register the definition, replacing any existing one in full
    async fn install_definition(&self, definition: &ServiceDefinition) -> Result<()>;

    /// Make the manager re-read definitions
    async fn reload(&self) -> Result<()>;

    /// Start automatically at boot
    async fn enable(&self, unit: &str) -> Result<()>;

    async fn start(&self, unit: &str) -> Result<()>;

    /// Command the operator can run to read the service's logs
    fn log_hint(&self, unit: &str) -> String;

    /// Whether a running service prevents replacing its executable
    fn locks_running_binaries(&self) -> bool;
}

/// Gather what is currently on the host for one agent
pub async fn observe(agent: &AgentDescriptor, manager: &dyn ServiceManager) -> Result<HostView> {
    let config_path = agent.config_path();
    Ok(HostView {
        binary_present: agent.binary_path().is_file(),
        config_required: config_path.is_some(),
        config_present: config_path.map(|p| p.is_file()).unwrap_or(false),
        service: manager.query(&agent.unit_name).await?,
    })
}
