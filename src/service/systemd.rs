// systemd backend over D-Bus

use super::models::{ServiceDefinition, ServiceState};
use super::unit::{render_unit, validate_unit_name};
use super::ServiceManager;
use crate::error::{Result, SetupError};
use crate::fsutil::{self, MODE_READABLE};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use zbus::Connection;

pub const SYSTEM_UNIT_DIR: &str = "/etc/systemd/system";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// systemd manager reached over the system bus
pub struct SystemdManager {
    connection: Connection,
    unit_dir: PathBuf,
}

impl SystemdManager {
    /// Connect to the system bus with retry
    pub async fn connect() -> Result<Self> {
        let policy = RetryPolicy::new(3, Duration::from_millis(500));
        let connection = policy
            .run("systemd connection", |_| async {
                let conn = tokio::time::timeout(CONNECT_TIMEOUT, Connection::system())
                    .await
                    .map_err(|_| anyhow::anyhow!("D-Bus connection timeout"))?
                    .map_err(|e| anyhow::anyhow!("Failed to connect to system bus: {}", e))?;
                Ok::<_, anyhow::Error>(conn)
            })
            .await?;

        Ok(Self {
            connection,
            unit_dir: PathBuf::from(SYSTEM_UNIT_DIR),
        })
    }

    pub fn unit_path(&self, unit: &str) -> PathBuf {
        self.unit_dir.join(unit)
    }

    async fn manager_proxy(&self) -> Result<zbus::Proxy<'_>> {
        let proxy = zbus::Proxy::new(
            &self.connection,
            "org.freedesktop.systemd1",
            "/org/freedesktop/systemd1",
            "org.freedesktop.systemd1.Manager",
        )
        .await?;
        Ok(proxy)
    }

    /// Queue a unit job (StartUnit, StopUnit) in "replace" mode
    async fn unit_job(&self, method: &'static str, unit: &str) -> Result<()> {
        validate_unit_name(unit).map_err(anyhow::Error::msg)?;
        let proxy = self.manager_proxy().await?;

        let job: zbus::zvariant::OwnedObjectPath = proxy
            .call(method, &(unit, "replace"))
            .await
            .map_err(|e| job_error(unit, method, e))?;

        tracing::debug!("{} {} queued job {}", method, unit, job.as_str());
        Ok(())
    }
}

fn job_error(unit: &str, method: &str, e: zbus::Error) -> anyhow::Error {
    let error_msg = e.to_string();
    let message = if error_msg.contains("Access denied") || error_msg.contains("Authentication") {
        "Access denied. Run the installer as root.".to_string()
    } else {
        format!("{} failed: {}", method, error_msg)
    };
    anyhow::anyhow!("{}: {}", unit, message)
}

#[async_trait]
impl ServiceManager for SystemdManager {
    fn name(&self) -> &'static str {
        "systemd"
    }

    async fn query(&self, unit: &str) -> Result<ServiceState> {
        validate_unit_name(unit).map_err(anyhow::Error::msg)?;
        let proxy = self.manager_proxy().await?;

        // LoadUnit works for units that are not loaded yet, unlike GetUnit
        let unit_path: zbus::zvariant::OwnedObjectPath = proxy
            .call("LoadUnit", &(unit,))
            .await
            .map_err(|e| anyhow::anyhow!("LoadUnit {}: {}", unit, e))?;

        let unit_proxy = zbus::Proxy::new(
            &self.connection,
            "org.freedesktop.systemd1",
            unit_path.as_str(),
            "org.freedesktop.systemd1.Unit",
        )
        .await?;

        let load_state: String = unit_proxy.get_property("LoadState").await?;
        let active_state: String = unit_proxy.get_property("ActiveState").await?;
        tracing::debug!("{}: load={} active={}", unit, load_state, active_state);

        Ok(ServiceState::from_systemd(&load_state, &active_state))
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        self.unit_job("StopUnit", unit).await
    }

    async fn install_definition(&self, definition: &ServiceDefinition) -> Result<()> {
        validate_unit_name(&definition.unit_name).map_err(anyhow::Error::msg)?;
        if !self.unit_dir.is_dir() {
            return Err(SetupError::UnsupportedPlatform(format!(
                "{} not found; is systemd running?",
                self.unit_dir.display()
            ))
            .into());
        }

        let path = self.unit_path(&definition.unit_name);
        fsutil::write_atomic(&path, render_unit(definition).as_bytes(), MODE_READABLE)?;
        tracing::info!("Unit file written to {}", path.display());
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let proxy = self.manager_proxy().await?;
        proxy
            .call::<_, _, ()>("Reload", &())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to reload systemd: {}", e))?;
        Ok(())
    }

    async fn enable(&self, unit: &str) -> Result<()> {
        validate_unit_name(unit).map_err(anyhow::Error::msg)?;
        let proxy = self.manager_proxy().await?;

        // EnableUnitFiles(files, runtime, force) -> (carries_install_info, changes)
        let (_carries_install_info, changes): (bool, Vec<(String, String, String)>) = proxy
            .call("EnableUnitFiles", &(&[unit][..], false, true))
            .await
            .map_err(|e| job_error(unit, "EnableUnitFiles", e))?;

        for (kind, link, target) in changes {
            tracing::debug!("enable {}: {} {} -> {}", unit, kind, link, target);
        }
        Ok(())
    }

    async fn start(&self, unit: &str) -> Result<()> {
        self.unit_job("StartUnit", unit).await
    }

    fn log_hint(&self, unit: &str) -> String {
        format!("journalctl -u {} -n 50 --no-pager", unit)
    }

    fn locks_running_binaries(&self) -> bool {
        false
    }
}
