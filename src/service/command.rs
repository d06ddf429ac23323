// External command execution for service-manager CLIs

use crate::error::Result;
use anyhow::Context;
use async_trait::async_trait;
use std::process::{Output, Stdio};
use std::time::Duration;

/// Default timeout for a single service-manager command
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(60);

/// Abstracts process execution so service backends can be exercised without
/// touching the host
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a program to completion and capture its output
    async fn run(&self, program: &str, args: &[String]) -> Result<Output>;
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        (**self).run(program, args).await
    }
}

/// Production runner backed by `tokio::process`
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<Output> {
        tracing::debug!("Running {} {}", program, args.join(" "));

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| anyhow::anyhow!("{} timed out after {}s", program, self.timeout.as_secs()))?
            .with_context(|| format!("failed to run {}", program))?;

        tracing::debug!(
            "{} exited with {}: {}",
            program,
            output.status,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(output)
    }
}

/// Trimmed stdout and stderr, for error messages
pub fn describe_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    [stdout.trim(), stderr.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("\n")
}
