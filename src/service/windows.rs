// Windows Service Control Manager backend driven through sc.exe

use super::command::{describe_output, CommandRunner, TokioCommandRunner};
use super::models::{Dependency, ServiceDefinition, ServiceState};
use super::ServiceManager;
use crate::error::Result;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use std::process::Output;
use std::time::Duration;

const SC: &str = "sc.exe";

// Win32 error codes reported by sc.exe
const ERROR_SERVICE_ALREADY_RUNNING: i32 = 1056;
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;
const ERROR_SERVICE_MARKED_FOR_DELETE: i32 = 1072;

/// Seconds after which SCM resets the failure counter
const FAILURE_RESET_SECS: u64 = 86_400;

pub struct ScmManager<R: CommandRunner = TokioCommandRunner> {
    runner: R,
    /// Budget for waiting on stop and delete to settle
    poll: RetryPolicy,
}

impl ScmManager<TokioCommandRunner> {
    pub fn new() -> Self {
        Self::with_runner(
            TokioCommandRunner::default(),
            RetryPolicy::new(30, Duration::from_secs(1)),
        )
    }
}

impl Default for ScmManager<TokioCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> ScmManager<R> {
    pub fn with_runner(runner: R, poll: RetryPolicy) -> Self {
        Self { runner, poll }
    }

    async fn sc(&self, args: &[&str]) -> Result<Output> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(SC, &args).await
    }

    /// Run sc and require success, tolerating the listed error codes
    async fn sc_checked(&self, args: &[&str], tolerated: &[i32]) -> Result<()> {
        let output = self.sc(args).await?;
        if output.status.success() {
            return Ok(());
        }
        if let Some(code) = sc_error_code(&output) {
            if tolerated.contains(&code) {
                tracing::debug!("sc {} returned tolerated code {}", args.join(" "), code);
                return Ok(());
            }
        }
        anyhow::bail!(
            "sc {} failed ({}): {}",
            args.first().copied().unwrap_or_default(),
            output.status,
            describe_output(&output)
        )
    }

    async fn wait_for(&self, unit: &str, target: ServiceState) -> Result<()> {
        let reached = self
            .poll
            .poll_until(&format!("{} to become {}", unit, target), || async move {
                let state = self.query(unit).await?;
                Ok::<_, anyhow::Error>(state == target)
            })
            .await;
        if !reached {
            anyhow::bail!("{} did not become {} in time", unit, target);
        }
        Ok(())
    }

    /// Stop and delete an existing registration, waiting until SCM forgets it
    async fn remove_existing(&self, unit: &str) -> Result<()> {
        let state = self.query(unit).await?;
        if state == ServiceState::Absent {
            return Ok(());
        }

        tracing::info!("Service {} already exists ({}), recreating it", unit, state);
        if state.needs_stop() {
            self.stop(unit).await?;
        }
        self.wait_for(unit, ServiceState::Stopped).await?;

        self.sc_checked(&["delete", unit], &[ERROR_SERVICE_MARKED_FOR_DELETE])
            .await?;
        self.wait_for(unit, ServiceState::Absent).await
    }
}

#[async_trait]
impl<R: CommandRunner> ServiceManager for ScmManager<R> {
    fn name(&self) -> &'static str {
        "scm"
    }

    async fn query(&self, unit: &str) -> Result<ServiceState> {
        let output = self.sc(&["query", unit]).await?;
        if sc_error_code(&output) == Some(ERROR_SERVICE_DOES_NOT_EXIST) {
            return Ok(ServiceState::Absent);
        }
        if !output.status.success() {
            anyhow::bail!("sc query {} failed: {}", unit, describe_output(&output));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_state(&stdout)
            .map(ServiceState::from_scm_code)
            .ok_or_else(|| anyhow::anyhow!("no STATE in sc query output for {}", unit))
    }

    async fn stop(&self, unit: &str) -> Result<()> {
        self.sc_checked(&["stop", unit], &[ERROR_SERVICE_NOT_ACTIVE])
            .await
    }

    async fn install_definition(&self, definition: &ServiceDefinition) -> Result<()> {
        let unit = definition.unit_name.as_str();
        self.remove_existing(unit).await?;

        let bin_path = command_line(definition);
        let mut args = vec![
            "create",
            unit,
            "binPath=",
            bin_path.as_str(),
            "start=",
            "auto",
            "DisplayName=",
            definition.description.as_str(),
        ];
        if definition.dependencies.contains(&Dependency::Network) {
            args.extend(["depend=", "Tcpip"]);
        }
        if let Some(user) = &definition.run_as_user {
            args.extend(["obj=", user.as_str()]);
        }
        self.sc_checked(&args, &[]).await?;

        self.sc_checked(&["description", unit, definition.description.as_str()], &[])
            .await?;

        let delay_ms = definition.restart_delay.as_millis().to_string();
        let actions = format!("restart/{0}/restart/{0}/restart/{0}", delay_ms);
        let reset = FAILURE_RESET_SECS.to_string();
        self.sc_checked(
            &["failure", unit, "reset=", reset.as_str(), "actions=", actions.as_str()],
            &[],
        )
        .await?;

        tracing::info!("Service {} registered with SCM", unit);
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        // SCM reads registrations directly
        Ok(())
    }

    async fn enable(&self, unit: &str) -> Result<()> {
        self.sc_checked(&["config", unit, "start=", "auto"], &[]).await
    }

    async fn start(&self, unit: &str) -> Result<()> {
        self.sc_checked(&["start", unit], &[ERROR_SERVICE_ALREADY_RUNNING])
            .await
    }

    fn log_hint(&self, _unit: &str) -> String {
        "Get-WinEvent -FilterHashtable @{LogName='System'; ProviderName='Service Control Manager'} -MaxEvents 20"
            .to_string()
    }

    fn locks_running_binaries(&self) -> bool {
        true
    }
}

/// Quoted executable followed by its arguments, as SCM expects in binPath
fn command_line(definition: &ServiceDefinition) -> String {
    let mut line = format!("\"{}\"", definition.binary());
    for arg in definition.args() {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// Win32 error code from a "FAILED nnnn:" line, else the exit status
fn sc_error_code(output: &Output) -> Option<i32> {
    let text = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let reported = text.split("FAILED").nth(1).and_then(|after| {
        after
            .trim_start()
            .split(|c: char| !c.is_ascii_digit())
            .next()
            .and_then(|digits| digits.parse().ok())
    });

    reported.or_else(|| output.status.code().filter(|code| *code > 1))
}

/// Numeric state from the `STATE : 4  RUNNING` line
fn parse_state(stdout: &str) -> Option<u32> {
    stdout
        .lines()
        .find(|line| line.trim_start().starts_with("STATE"))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|code| code.parse().ok())
}
