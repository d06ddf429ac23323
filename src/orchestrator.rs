// Installation sequencing across agents

use crate::acquire::{BinaryAcquirer, Source};
use crate::agent::{catalog, AgentDescriptor, InstallOptions};
use crate::config::Config;
use crate::error::Result;
use crate::health::HealthValidator;
use crate::platform::{ensure_elevated, HostPlatform, OsFamily};
use crate::render;
use crate::retry::RetryPolicy;
use crate::service::command::describe_output;
use crate::service::{
    observe, CommandRunner, InstallationState, ServiceDefinition, ServiceManager,
    ServiceReconciler, TokioCommandRunner,
};
use std::path::PathBuf;
use std::time::Duration;

/// Outcome for one installed agent
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReport {
    pub name: String,
    pub unit_name: String,
    pub binary_path: PathBuf,
    pub metrics_url: String,
    /// Observed before this run touched anything
    pub state_before: InstallationState,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallReport {
    pub agents: Vec<AgentReport>,
}

impl InstallReport {
    /// Fixed summary printed after a successful run
    pub fn next_steps(&self, os: OsFamily) -> String {
        let mut text = String::new();
        text.push_str("\n✓ Setup complete\n\nNext steps:\n");

        let mut step = 1;
        for agent in &self.agents {
            let status = match os {
                OsFamily::Windows => format!("sc query {}", agent.unit_name),
                _ => format!("systemctl status {}", agent.unit_name),
            };
            text.push_str(&format!("{}. Check {}: {}\n", step, agent.name, status));
            step += 1;
        }
        for agent in &self.agents {
            text.push_str(&format!(
                "{}. Browse {} metrics: {}\n",
                step, agent.name, agent.metrics_url
            ));
            step += 1;
        }

        let targets = self
            .agents
            .iter()
            .filter_map(|agent| agent.metrics_url.split('/').nth(2))
            .map(|host_port| format!("'{}'", host_port.replace("127.0.0.1", "<this-host>")))
            .collect::<Vec<_>>()
            .join(", ");
        text.push_str(&format!(
            "{}. Add to your Prometheus scrape_configs: targets: [{}]\n",
            step, targets
        ));
        text
    }
}

/// Entry point used by the binary: check privileges, detect the host,
/// install every catalogued agent
pub async fn run_installation(options: InstallOptions, config: Config) -> Result<InstallReport> {
    ensure_elevated().await?;

    let host = HostPlatform::detect(&config)?;
    tracing::info!("Host: {} {} (artifacts: {})", host.os, host.machine, host.arch);
    println!("Installing Prometheus agents for {}-{}", host.os, host.arch);

    let manager = host.service_manager().await?;
    let agents = catalog(&host, &config, &options);

    let orchestrator = InstallOrchestrator::new(host.os, manager.as_ref(), &config)?;
    let report = orchestrator.run(&agents).await?;

    println!("{}", report.next_steps(host.os));
    Ok(report)
}

pub struct InstallOrchestrator<'a> {
    os: OsFamily,
    manager: &'a dyn ServiceManager,
    acquirer: BinaryAcquirer,
    health: HealthValidator,
    start_wait: RetryPolicy,
    stop_wait: RetryPolicy,
    accounts: Option<Box<dyn CommandRunner>>,
}

impl<'a> InstallOrchestrator<'a> {
    pub fn new(os: OsFamily, manager: &'a dyn ServiceManager, config: &Config) -> Result<Self> {
        let accounts: Option<Box<dyn CommandRunner>> = match os {
            OsFamily::Linux => Some(Box::new(TokioCommandRunner::default())),
            _ => None,
        };

        Ok(Self {
            os,
            manager,
            acquirer: BinaryAcquirer::new(
                config.download.retry_policy(),
                config.download.timeout(),
            )?,
            health: HealthValidator::new(config.health.timeout(), config.health.retry_policy())?,
            start_wait: config.service_start.retry_policy(),
            stop_wait: RetryPolicy::new(15, Duration::from_secs(1)),
            accounts,
        })
    }

    /// Runner used to create service accounts; `None` skips the step
    pub fn with_account_runner(mut self, runner: Option<Box<dyn CommandRunner>>) -> Self {
        self.accounts = runner;
        self
    }

    pub fn with_stop_wait(mut self, stop_wait: RetryPolicy) -> Self {
        self.stop_wait = stop_wait;
        self
    }

    /// Install agents in order. The first failure aborts the whole run.
    pub async fn run(&self, agents: &[AgentDescriptor]) -> Result<InstallReport> {
        let mut report = InstallReport::default();
        for agent in agents {
            report.agents.push(self.install_agent(agent).await?);
        }
        Ok(report)
    }

    async fn install_agent(&self, agent: &AgentDescriptor) -> Result<AgentReport> {
        println!("\n==> {}", agent.display_name);

        // Nothing on the host changes when there is nothing to install
        let source = Source::resolve(agent)?;

        let view = observe(agent, self.manager).await?;
        let state_before = InstallationState::probe(&view);
        tracing::info!(
            "{}: {} before install (service {})",
            agent.name,
            state_before,
            view.service
        );

        let reconciler =
            ServiceReconciler::new(self.manager, self.start_wait).with_stop_wait(self.stop_wait);

        // The executable cannot be replaced while SCM still runs it
        if self.manager.locks_running_binaries() && view.service.needs_stop() {
            reconciler.quiesce(&agent.unit_name).await?;
        }

        if let (Some(runner), Some(user), OsFamily::Linux) =
            (self.accounts.as_deref(), agent.service_user.as_deref(), self.os)
        {
            ensure_service_user(runner, user).await;
        }

        let binary_path = self.acquirer.acquire_from(agent, &source).await?;
        render::write_config(agent)?;

        let definition = ServiceDefinition::from_descriptor(agent);
        reconciler.reconcile(&definition, agent.registration).await?;

        let metrics_url = agent.metrics_url();
        self.health.validate(&metrics_url).await?;

        Ok(AgentReport {
            name: agent.name.clone(),
            unit_name: agent.unit_name.clone(),
            binary_path,
            metrics_url,
            state_before,
        })
    }
}

/// Create a system account for the service if it does not exist yet.
/// Failures are reported as warnings only.
pub async fn ensure_service_user(runner: &dyn CommandRunner, user: &str) {
    match runner.run("id", &["-u".to_string(), user.to_string()]).await {
        Ok(output) if output.status.success() => {
            tracing::debug!("Service user {} already exists", user);
            return;
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!("Could not check for user {}: {:#}", user, e);
            return;
        }
    }

    let args: Vec<String> = [
        "--system",
        "--no-create-home",
        "--shell",
        "/usr/sbin/nologin",
        user,
    ]
    .iter()
    .map(|a| a.to_string())
    .collect();

    match runner.run("useradd", &args).await {
        Ok(output) if output.status.success() => {
            tracing::info!("Created service user {}", user);
            println!("  Created system user {}", user);
        }
        Ok(output) => tracing::warn!(
            "useradd {} failed ({}): {}",
            user,
            output.status,
            describe_output(&output)
        ),
        Err(e) => tracing::warn!("Could not create user {}: {:#}", user, e),
    }
}
