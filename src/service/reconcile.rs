// Drive a service to installed, enabled and running from any starting state

use super::models::{ServiceDefinition, ServiceState};
use super::ServiceManager;
use crate::agent::Registration;
use crate::error::{Result, SetupError};
use crate::retry::RetryPolicy;
use std::time::Duration;

pub struct ServiceReconciler<'a> {
    manager: &'a dyn ServiceManager,
    stop_wait: RetryPolicy,
    start_wait: RetryPolicy,
}

impl<'a> ServiceReconciler<'a> {
    pub fn new(manager: &'a dyn ServiceManager, start_wait: RetryPolicy) -> Self {
        Self {
            manager,
            stop_wait: RetryPolicy::new(15, Duration::from_secs(1)),
            start_wait,
        }
    }

    pub fn with_stop_wait(mut self, stop_wait: RetryPolicy) -> Self {
        self.stop_wait = stop_wait;
        self
    }

    /// Stop the service if anything may be running and wait until it is not.
    /// Returns the state observed before stopping.
    pub async fn quiesce(&self, unit: &str) -> Result<ServiceState> {
        let state = self
            .manager
            .query(unit)
            .await
            .map_err(|e| self.failure(unit, format!("querying state: {:#}", e)))?;

        if !state.needs_stop() {
            return Ok(state);
        }

        tracing::info!("Stopping {} before replacing it", unit);
        println!("  Stopping running service {}", unit);
        self.manager
            .stop(unit)
            .await
            .map_err(|e| self.failure(unit, format!("stopping: {:#}", e)))?;

        let stopped = self
            .stop_wait
            .poll_until(&format!("{} stop", unit), || async move {
                let current = self.manager.query(unit).await?;
                Ok::<_, anyhow::Error>(!current.needs_stop())
            })
            .await;
        if !stopped {
            return Err(self.failure(unit, "service did not stop in time").into());
        }

        Ok(state)
    }

    /// Stop, replace, reload, enable, start, then wait for active
    pub async fn reconcile(
        &self,
        definition: &ServiceDefinition,
        registration: Registration,
    ) -> Result<()> {
        let unit = definition.unit_name.as_str();
        let before = self.quiesce(unit).await?;
        tracing::debug!("{} was {} before reconciliation", unit, before);

        match registration {
            Registration::Generated => {
                self.manager
                    .install_definition(definition)
                    .await
                    .map_err(|e| self.failure(unit, format!("writing definition: {:#}", e)))?;
            }
            Registration::Packaged => {
                let state = self
                    .manager
                    .query(unit)
                    .await
                    .map_err(|e| self.failure(unit, format!("querying state: {:#}", e)))?;
                if state == ServiceState::Absent {
                    return Err(self
                        .failure(unit, "package installer did not register the service")
                        .into());
                }
            }
        }

        self.manager
            .reload()
            .await
            .map_err(|e| self.failure(unit, format!("reloading {}: {:#}", self.manager.name(), e)))?;
        self.manager
            .enable(unit)
            .await
            .map_err(|e| self.failure(unit, format!("enabling: {:#}", e)))?;
        self.manager
            .start(unit)
            .await
            .map_err(|e| self.failure(unit, format!("starting: {:#}", e)))?;

        let running = self
            .start_wait
            .poll_until(&format!("{} start", unit), || async move {
                let current = self.manager.query(unit).await?;
                Ok::<_, anyhow::Error>(current == ServiceState::Running)
            })
            .await;
        if !running {
            return Err(self
                .failure(
                    unit,
                    format!(
                        "service did not reach running state after {} checks",
                        self.start_wait.max_attempts
                    ),
                )
                .into());
        }

        tracing::info!("{} is running", unit);
        println!("  Service {} is running", unit);
        Ok(())
    }

    fn failure(&self, unit: &str, message: impl Into<String>) -> SetupError {
        SetupError::registration(unit, message, self.manager.log_hint(unit))
    }
}
