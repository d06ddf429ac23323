// Binary acquisition: download or copy into the install directory

use crate::agent::{AgentDescriptor, Packaging};
use crate::error::{Result, SetupError};
use crate::fsutil::{self, MODE_EXECUTABLE, MODE_READABLE};
use crate::retry::RetryPolicy;
use crate::service::command::{describe_output, CommandRunner, TokioCommandRunner};
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for one msiexec run
pub const MSI_TIMEOUT: Duration = Duration::from_secs(600);

/// Where an agent's artifact comes from for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(String),
    Local(PathBuf),
}

impl Source {
    /// URL first, then an existing local file. Nothing is touched when
    /// neither resolves.
    pub fn resolve(agent: &AgentDescriptor) -> Result<Self> {
        if let Some(url) = &agent.source_url {
            return Ok(Source::Remote(url.clone()));
        }

        match &agent.local_source_path {
            Some(path) if path.is_file() => Ok(Source::Local(path.clone())),
            other => Err(SetupError::SourceMissing {
                agent: agent.name.clone(),
                local: other
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "a local binary".to_string()),
            }
            .into()),
        }
    }
}

pub struct BinaryAcquirer {
    client: reqwest::Client,
    retry: RetryPolicy,
    installer: Box<dyn CommandRunner>,
}

impl BinaryAcquirer {
    pub fn new(retry: RetryPolicy, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("prometheus-agents-setup/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            retry,
            installer: Box::new(TokioCommandRunner::new(MSI_TIMEOUT)),
        })
    }

    /// Runner used for package installers such as msiexec
    pub fn with_installer_runner(mut self, runner: Box<dyn CommandRunner>) -> Self {
        self.installer = runner;
        self
    }

    /// Make the agent's binary present and executable. Returns its path.
    pub async fn acquire(&self, agent: &AgentDescriptor) -> Result<PathBuf> {
        let source = Source::resolve(agent)?;
        self.acquire_from(agent, &source).await
    }

    /// Same as [`acquire`](Self::acquire) for a source resolved by the caller
    pub async fn acquire_from(&self, agent: &AgentDescriptor, source: &Source) -> Result<PathBuf> {
        tracing::info!("Acquiring {} from {:?}", agent.name, source);

        match &agent.packaging {
            Packaging::Executable => {
                let dest = agent.binary_path();
                self.fetch(source, &dest, MODE_EXECUTABLE).await?;
                println!("  {} binary installed at {}", agent.name, dest.display());
                Ok(dest)
            }
            Packaging::TarGz { root } => self.install_tarball(agent, source, root).await,
            Packaging::Msi { properties } => self.install_msi(agent, source, properties).await,
        }
    }

    /// Write the source's bytes to `dest` atomically with the given mode
    pub async fn fetch(&self, source: &Source, dest: &Path, mode: u32) -> Result<()> {
        match source {
            Source::Remote(url) => self.download(url, dest, mode).await,
            Source::Local(path) => copy_file(path, dest, mode),
        }
    }

    /// Download with the retry budget; exhaustion is a `Download` error
    pub async fn download(&self, url: &str, dest: &Path, mode: u32) -> Result<()> {
        let result = self
            .retry
            .run(&format!("download {}", url), |attempt| async move {
                tracing::debug!("GET {} (attempt {})", url, attempt);
                self.download_once(url, dest, mode).await
            })
            .await;

        result.map_err(|e| {
            SetupError::Download {
                url: url.to_string(),
                attempts: self.retry.max_attempts,
                message: format!("{:#}", e),
            }
            .into()
        })
    }

    async fn download_once(&self, url: &str, dest: &Path, mode: u32) -> Result<()> {
        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP {}", response.status());
        }

        // A failed attempt drops the temp file; the destination is untouched
        let mut staged = fsutil::staged_file(dest)?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            staged.write_all(&chunk)?;
            written += chunk.len() as u64;
        }
        fsutil::commit(staged, dest, mode)?;

        tracing::debug!("Downloaded {} bytes to {}", written, dest.display());
        Ok(())
    }

    /// Unpack a tarball into a fresh install directory. The previous
    /// directory is removed only once the new payload is complete.
    async fn install_tarball(
        &self,
        agent: &AgentDescriptor,
        source: &Source,
        root: &str,
    ) -> Result<PathBuf> {
        let install_dir = &agent.install_dir;
        let parent = install_dir
            .parent()
            .ok_or_else(|| anyhow::anyhow!("install directory {} has no parent", install_dir.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;

        // Removed on drop; a killed run leaves it for the next sweep
        let prefix = format!(".{}-staging-", agent.name);
        fsutil::sweep_stale(parent, &prefix);
        let staging = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(parent)
            .with_context(|| format!("creating staging directory in {}", parent.display()))?;

        let archive = staging.path().join("archive.tar.gz");
        self.fetch(source, &archive, MODE_READABLE).await?;

        let payload = staging.path().join("payload");
        unpack_tar_gz(&archive, &payload).map_err(|e| SetupError::Package {
            agent: agent.name.clone(),
            message: format!("{:#}", e),
        })?;

        let staged_binary = payload.join(root).join(&agent.binary_name);
        if !staged_binary.is_file() {
            return Err(SetupError::Package {
                agent: agent.name.clone(),
                message: format!("archive does not contain {}/{}", root, agent.binary_name),
            }
            .into());
        }
        fsutil::set_mode(&staged_binary, MODE_EXECUTABLE)?;

        if install_dir.exists() {
            tracing::info!("Removing previous installation at {}", install_dir.display());
            std::fs::remove_dir_all(install_dir)
                .with_context(|| format!("removing {}", install_dir.display()))?;
        }
        std::fs::rename(&payload, install_dir)
            .with_context(|| format!("moving payload into {}", install_dir.display()))?;

        let binary = agent.binary_path();
        println!("  {} extracted to {}", agent.name, install_dir.display());
        Ok(binary)
    }

    async fn install_msi(
        &self,
        agent: &AgentDescriptor,
        source: &Source,
        properties: &[(String, String)],
    ) -> Result<PathBuf> {
        let staging = tempfile::Builder::new()
            .prefix(&format!("{}-", agent.name))
            .tempdir()?;
        let package = staging.path().join(format!("{}.msi", agent.name));
        self.fetch(source, &package, MODE_READABLE).await?;

        let mut args = vec![
            "/i".to_string(),
            package.display().to_string(),
            "/quiet".to_string(),
            "/norestart".to_string(),
        ];
        args.extend(properties.iter().map(|(key, value)| format!("{}={}", key, value)));

        tracing::info!("Running msiexec for {}", agent.name);
        let output = self
            .installer
            .run("msiexec", &args)
            .await
            .map_err(|e| SetupError::Package {
                agent: agent.name.clone(),
                message: format!("{:#}", e),
            })?;

        if !output.status.success() {
            return Err(SetupError::Package {
                agent: agent.name.clone(),
                message: format!(
                    "msiexec exited with {}: {}",
                    output.status,
                    describe_output(&output)
                ),
            }
            .into());
        }

        println!("  {} installed from MSI", agent.name);
        Ok(agent.binary_path())
    }
}

fn copy_file(src: &Path, dest: &Path, mode: u32) -> Result<()> {
    let mut input = std::fs::File::open(src)
        .with_context(|| format!("opening {}", src.display()))?;
    let mut staged = fsutil::staged_file(dest)?;
    std::io::copy(&mut input, &mut staged)
        .with_context(|| format!("copying {} to {}", src.display(), dest.display()))?;
    fsutil::commit(staged, dest, mode)
}

pub fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let file = std::fs::File::open(archive)
        .with_context(|| format!("opening {}", archive.display()))?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    tar.unpack(dest)
        .with_context(|| format!("unpacking {}", archive.display()))?;
    Ok(())
}
