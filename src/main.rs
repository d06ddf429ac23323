// prometheus-agents-setup - Prometheus agent installer
// Main entry point

use agents_setup::agent::InstallOptions;
use agents_setup::config::Config;
use agents_setup::orchestrator::run_installation;
use agents_setup::version::build_info;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "prometheus-agents-setup")]
#[command(author, about, long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Download the process CPU agent from this URL instead of the bundled binary
    #[arg(long, env = "PROCESS_CPU_AGENT_URL", value_name = "URL")]
    source_url: Option<String>,

    /// System exporter release to install
    #[arg(long, value_name = "VERSION")]
    exporter_version: Option<String>,

    /// Installer settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Show version information
    #[arg(short = 'V', long)]
    version: bool,

    /// Show detailed build information
    #[arg(long)]
    build_info: bool,
}

impl Cli {
    fn install_options(&self) -> InstallOptions {
        InstallOptions {
            source_url: self.source_url.clone(),
            exporter_version: self.exporter_version.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", build_info().format_detailed());
        return ExitCode::SUCCESS;
    }

    if cli.build_info {
        println!("{}", build_info().format_detailed());
        println!("\n{}", build_info().format_build_info());
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_max_level(if cli.debug {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    tracing::info!("{} starting", build_info().format_display());

    // Dropping the run on a signal removes its temp files and staging dirs
    let outcome = tokio::select! {
        result = run(&cli) => result,
        _ = shutdown_signal() => Err(anyhow::anyhow!("interrupted, re-run to finish the installation")),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ Setup failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, stopping"),
        _ = terminate => tracing::info!("Received SIGTERM, stopping"),
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.clone())?;
    run_installation(cli.install_options(), config).await?;
    Ok(())
}
