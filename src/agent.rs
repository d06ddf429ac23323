// Agent descriptors: the immutable input for one agent's installation

use crate::config::Config;
use crate::platform::{ArchTag, HostPlatform, OsFamily};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const NODE_EXPORTER_VERSION: &str = "1.7.0";
pub const WINDOWS_EXPORTER_VERSION: &str = "0.25.1";

const WINDOWS_EXPORTER_COLLECTORS: &str =
    "cpu,cs,logical_disk,net,os,service,system,textfile,process,memory,thermalzone";

/// Scalar value accepted in an agent's extra configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Bool(v) => write!(f, "{}", v),
            ScalarValue::Integer(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::String(v) => f.write_str(v),
        }
    }
}

/// How the upstream artifact is distributed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packaging {
    /// A single executable written to `install_dir/binary_name`
    Executable,
    /// A gzip tarball whose top-level directory is `root`
    TarGz { root: String },
    /// A Windows installer package invoked with `properties`
    Msi { properties: Vec<(String, String)> },
}

/// Who owns the service definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Rendered and (re)written by this tool on every run
    Generated,
    /// Registered by the package installer; only enabled and started here
    Packaged,
}

/// Options given on the command line
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub source_url: Option<String>,
    pub exporter_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentDescriptor {
    pub name: String,
    pub display_name: String,
    pub binary_name: String,
    pub source_url: Option<String>,
    pub local_source_path: Option<PathBuf>,
    pub install_dir: PathBuf,
    pub service_port: u16,
    pub service_user: Option<String>,
    pub extra_config: BTreeMap<String, ScalarValue>,
    pub unit_name: String,
    pub exec_args: Vec<String>,
    pub packaging: Packaging,
    pub registration: Registration,
    pub config_file: Option<String>,
}

impl AgentDescriptor {
    /// Absolute path of the executable once installed
    pub fn binary_path(&self) -> PathBuf {
        match &self.packaging {
            Packaging::TarGz { root } => self.install_dir.join(root).join(&self.binary_name),
            _ => self.install_dir.join(&self.binary_name),
        }
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.config_file.as_ref().map(|file| self.install_dir.join(file))
    }

    pub fn metrics_url(&self) -> String {
        format!("http://127.0.0.1:{}/metrics", self.service_port)
    }

    /// Process CPU agent, installed from an override URL or the bundled binary
    pub fn process_cpu_agent(os: OsFamily, config: &Config, source_url: Option<String>) -> Self {
        let settings = &config.process_agent;
        let (binary_name, unit_name) = match os {
            OsFamily::Windows => ("process-cpu-agent.exe", "ProcessCpuAgent"),
            _ => ("process-cpu-agent", "process-cpu-agent.service"),
        };

        let source_url = non_blank(source_url).or_else(|| non_blank(settings.source_url.clone()));
        let local_source_path = settings
            .local_source
            .clone()
            .or_else(|| bundled_source(binary_name));

        Self {
            name: "process-cpu-agent".to_string(),
            display_name: "Process CPU Agent for Prometheus".to_string(),
            binary_name: binary_name.to_string(),
            source_url,
            local_source_path,
            install_dir: config.install_root.join("process-cpu-agent"),
            service_port: settings.port,
            service_user: settings.service_user.clone(),
            extra_config: settings.extra_config.clone(),
            unit_name: unit_name.to_string(),
            exec_args: vec!["--port".to_string(), settings.port.to_string()],
            packaging: Packaging::Executable,
            registration: Registration::Generated,
            config_file: Some("config.toml".to_string()),
        }
    }

    /// Linux node_exporter from the release tarball. A bundled tarball is
    /// used offline; the upstream download is the fallback.
    pub fn node_exporter(config: &Config, version: &str, arch: ArchTag) -> Self {
        let port = config.exporter.port;
        let archive = format!("node_exporter-{}.linux-{}.tar.gz", version, arch);
        let local_source_path = config.exporter.local_source.clone().or_else(|| {
            if version == NODE_EXPORTER_VERSION {
                bundled_source(&archive)
            } else {
                None
            }
        });
        let source_url = match &local_source_path {
            Some(path) if path.is_file() => None,
            _ => Some(node_exporter_url(version, arch)),
        };

        Self {
            name: "node_exporter".to_string(),
            display_name: "Prometheus Node Exporter".to_string(),
            binary_name: "node_exporter".to_string(),
            source_url,
            local_source_path,
            install_dir: config.install_root.join("node_exporter"),
            service_port: port,
            service_user: None,
            extra_config: BTreeMap::new(),
            unit_name: "node_exporter.service".to_string(),
            exec_args: vec![format!("--web.listen-address=:{}", port)],
            packaging: Packaging::TarGz {
                root: format!("node_exporter-{}.linux-{}", version, arch),
            },
            registration: Registration::Generated,
            config_file: None,
        }
    }

    /// windows_exporter from the upstream MSI, which registers its own service
    pub fn windows_exporter(version: &str, arch: ArchTag, port: u16) -> Self {
        Self {
            name: "windows_exporter".to_string(),
            display_name: "windows_exporter".to_string(),
            binary_name: "windows_exporter.exe".to_string(),
            source_url: Some(windows_exporter_url(version, arch)),
            local_source_path: None,
            install_dir: PathBuf::from(r"C:\Program Files\windows_exporter"),
            service_port: port,
            service_user: None,
            extra_config: BTreeMap::new(),
            unit_name: "windows_exporter".to_string(),
            exec_args: Vec::new(),
            packaging: Packaging::Msi {
                properties: vec![
                    ("LISTEN_PORT".to_string(), port.to_string()),
                    (
                        "ENABLED_COLLECTORS".to_string(),
                        WINDOWS_EXPORTER_COLLECTORS.to_string(),
                    ),
                ],
            },
            registration: Registration::Packaged,
            config_file: None,
        }
    }
}

/// Agents to install on this host, system exporter first
pub fn catalog(host: &HostPlatform, config: &Config, options: &InstallOptions) -> Vec<AgentDescriptor> {
    let exporter_version = non_blank(options.exporter_version.clone())
        .or_else(|| non_blank(config.exporter.version.clone()));

    let exporter = match host.os {
        OsFamily::Windows => {
            let version = exporter_version.unwrap_or_else(|| WINDOWS_EXPORTER_VERSION.to_string());
            AgentDescriptor::windows_exporter(&version, host.arch, config.exporter.port)
        }
        _ => {
            let version = exporter_version.unwrap_or_else(|| NODE_EXPORTER_VERSION.to_string());
            AgentDescriptor::node_exporter(config, &version, host.arch)
        }
    };

    vec![
        exporter,
        AgentDescriptor::process_cpu_agent(host.os, config, options.source_url.clone()),
    ]
}

pub fn node_exporter_url(version: &str, arch: ArchTag) -> String {
    format!(
        "https://github.com/prometheus/node_exporter/releases/download/v{version}/node_exporter-{version}.linux-{arch}.tar.gz"
    )
}

pub fn windows_exporter_url(version: &str, arch: ArchTag) -> String {
    format!(
        "https://github.com/prometheus-community/windows_exporter/releases/download/v{version}/windows_exporter-{version}-{arch}.msi"
    )
}

/// `lib/<binary>` next to the running installer
fn bundled_source(binary_name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|dir: &Path| dir.join("lib").join(binary_name))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_exporter_descriptor() {
        let config = Config::default();
        let agent = AgentDescriptor::node_exporter(&config, "1.7.0", ArchTag::Amd64);

        assert_eq!(
            agent.source_url.as_deref(),
            Some("https://github.com/prometheus/node_exporter/releases/download/v1.7.0/node_exporter-1.7.0.linux-amd64.tar.gz")
        );
        assert_eq!(
            agent.binary_path(),
            config
                .install_root
                .join("node_exporter")
                .join("node_exporter-1.7.0.linux-amd64")
                .join("node_exporter")
        );
        assert_eq!(agent.exec_args, vec!["--web.listen-address=:31415".to_string()]);
        assert_eq!(agent.metrics_url(), "http://127.0.0.1:31415/metrics");
        assert!(agent.config_path().is_none());
    }

    #[test]
    fn test_node_exporter_prefers_bundled_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("node_exporter-1.7.0.linux-arm64.tar.gz");
        std::fs::write(&archive, b"gz").unwrap();

        let mut config = Config::default();
        config.exporter.local_source = Some(archive.clone());
        let agent = AgentDescriptor::node_exporter(&config, "1.7.0", ArchTag::Arm64);
        assert!(agent.source_url.is_none());
        assert_eq!(agent.local_source_path, Some(archive));

        // A configured bundle that is not there falls back to the download
        config.exporter.local_source = Some(dir.path().join("absent.tar.gz"));
        let agent = AgentDescriptor::node_exporter(&config, "1.7.0", ArchTag::Arm64);
        assert!(agent.source_url.as_deref().unwrap().ends_with("linux-arm64.tar.gz"));
    }

    #[test]
    fn test_node_exporter_bundle_only_for_default_version() {
        let config = Config::default();
        let other = AgentDescriptor::node_exporter(&config, "1.8.2", ArchTag::Amd64);
        assert!(other.local_source_path.is_none());

        let default = AgentDescriptor::node_exporter(&config, NODE_EXPORTER_VERSION, ArchTag::Amd64);
        assert!(default
            .local_source_path
            .as_ref()
            .is_some_and(|p| p.ends_with("lib/node_exporter-1.7.0.linux-amd64.tar.gz")));
    }

    #[test]
    fn test_windows_exporter_descriptor() {
        let agent = AgentDescriptor::windows_exporter("0.25.1", ArchTag::I386, 31415);
        assert!(agent
            .source_url
            .as_deref()
            .unwrap()
            .ends_with("/v0.25.1/windows_exporter-0.25.1-386.msi"));
        assert_eq!(agent.registration, Registration::Packaged);
        match &agent.packaging {
            Packaging::Msi { properties } => {
                assert!(properties.contains(&("LISTEN_PORT".to_string(), "31415".to_string())));
            }
            other => panic!("unexpected packaging {:?}", other),
        }
    }

    #[test]
    fn test_process_agent_prefers_cli_url_over_config() {
        let mut config = Config::default();
        config.process_agent.source_url = Some("https://config.example/agent".to_string());

        let from_cli = AgentDescriptor::process_cpu_agent(
            OsFamily::Linux,
            &config,
            Some("https://cli.example/agent".to_string()),
        );
        assert_eq!(from_cli.source_url.as_deref(), Some("https://cli.example/agent"));

        let from_config =
            AgentDescriptor::process_cpu_agent(OsFamily::Linux, &config, Some("   ".to_string()));
        assert_eq!(from_config.source_url.as_deref(), Some("https://config.example/agent"));
    }

    #[test]
    fn test_process_agent_linux_defaults() {
        let config = Config::default();
        let agent = AgentDescriptor::process_cpu_agent(OsFamily::Linux, &config, None);

        assert!(agent.source_url.is_none());
        assert!(agent
            .local_source_path
            .as_ref()
            .is_some_and(|p| p.ends_with("lib/process-cpu-agent")));
        assert_eq!(agent.unit_name, "process-cpu-agent.service");
        assert_eq!(agent.exec_args, vec!["--port".to_string(), "31416".to_string()]);
        assert_eq!(
            agent.config_path(),
            Some(config.install_root.join("process-cpu-agent").join("config.toml"))
        );
    }

    #[test]
    fn test_process_agent_windows_names() {
        let config = Config::default();
        let agent = AgentDescriptor::process_cpu_agent(OsFamily::Windows, &config, None);
        assert_eq!(agent.unit_name, "ProcessCpuAgent");
        assert_eq!(agent.binary_name, "process-cpu-agent.exe");
    }

    #[test]
    fn test_catalog_orders_exporter_first() {
        let config = Config::default();
        let host = HostPlatform::new(OsFamily::Linux, "aarch64".to_string());
        let options = InstallOptions {
            source_url: None,
            exporter_version: Some("1.8.2".to_string()),
        };

        let agents = catalog(&host, &config, &options);
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].name, "node_exporter");
        assert!(agents[0]
            .source_url
            .as_deref()
            .unwrap()
            .contains("node_exporter-1.8.2.linux-arm64"));
        assert_eq!(agents[1].name, "process-cpu-agent");

        let windows = HostPlatform::new(OsFamily::Windows, "AMD64".to_string());
        let agents = catalog(&windows, &config, &InstallOptions::default());
        assert_eq!(agents[0].name, "windows_exporter");
        assert!(agents[0].source_url.as_deref().unwrap().contains("0.25.1-amd64"));
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(ScalarValue::Integer(5).to_string(), "5");
        assert_eq!(ScalarValue::Bool(false).to_string(), "false");
        assert_eq!(ScalarValue::String("x".to_string()).to_string(), "x");
    }
}
