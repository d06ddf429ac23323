// Service data models

use crate::agent::AgentDescriptor;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Fixed delay before the service manager restarts a dead agent
pub const RESTART_DELAY: Duration = Duration::from_secs(10);

/// Live state of a service as reported by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    /// No definition registered under this name
    Absent,
    Stopped,
    /// Starting, stopping or otherwise between stable states
    Transitioning,
    Running,
}

impl ServiceState {
    /// Map systemd's LoadState/ActiveState pair
    pub fn from_systemd(load_state: &str, active_state: &str) -> Self {
        if load_state == "not-found" {
            return ServiceState::Absent;
        }
        match active_state {
            "active" | "reloading" => ServiceState::Running,
            "activating" | "deactivating" => ServiceState::Transitioning,
            _ => ServiceState::Stopped,
        }
    }

    /// Map a numeric SCM state from `sc query`
    pub fn from_scm_code(code: u32) -> Self {
        match code {
            1 => ServiceState::Stopped,
            4 => ServiceState::Running,
            _ => ServiceState::Transitioning,
        }
    }

    /// True when a process may be running under the old definition
    pub fn needs_stop(&self) -> bool {
        matches!(self, ServiceState::Running | ServiceState::Transitioning)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServiceState::Absent => "absent",
            ServiceState::Stopped => "stopped",
            ServiceState::Transitioning => "transitioning",
            ServiceState::Running => "running",
        };
        f.write_str(text)
    }
}

/// Something the service must start after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Network,
}

/// Everything a service manager needs to register one agent. Rebuilt from
/// the descriptor on every run and written over whatever was there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub unit_name: String,
    pub description: String,
    /// Absolute binary path followed by its arguments
    pub exec_command: Vec<String>,
    pub working_directory: PathBuf,
    pub restart_delay: Duration,
    pub run_as_user: Option<String>,
    pub dependencies: Vec<Dependency>,
}

impl ServiceDefinition {
    pub fn from_descriptor(agent: &AgentDescriptor) -> Self {
        let mut exec_command = vec![agent.binary_path().display().to_string()];
        exec_command.extend(agent.exec_args.iter().cloned());

        Self {
            unit_name: agent.unit_name.clone(),
            description: agent.display_name.clone(),
            exec_command,
            working_directory: agent.install_dir.clone(),
            restart_delay: RESTART_DELAY,
            run_as_user: agent.service_user.clone(),
            dependencies: vec![Dependency::Network],
        }
    }

    pub fn binary(&self) -> &str {
        self.exec_command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.exec_command.get(1..).unwrap_or_default()
    }
}

/// Coarse installation progress of one agent, re-derived on every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstallationState {
    Absent,
    Downloaded,
    Configured,
    Registered,
    Running,
}

impl fmt::Display for InstallationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            InstallationState::Absent => "absent",
            InstallationState::Downloaded => "downloaded",
            InstallationState::Configured => "configured",
            InstallationState::Registered => "registered",
            InstallationState::Running => "running",
        };
        f.write_str(text)
    }
}

/// Observed facts about one agent on the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostView {
    pub binary_present: bool,
    pub config_required: bool,
    pub config_present: bool,
    pub service: ServiceState,
}

impl InstallationState {
    /// Pure classification of an observation
    pub fn probe(view: &HostView) -> Self {
        if !view.binary_present {
            return InstallationState::Absent;
        }
        match view.service {
            ServiceState::Running => InstallationState::Running,
            ServiceState::Stopped | ServiceState::Transitioning => InstallationState::Registered,
            ServiceState::Absent => {
                if view.config_present || !view.config_required {
                    InstallationState::Configured
                } else {
                    InstallationState::Downloaded
                }
            }
        }
    }
}
