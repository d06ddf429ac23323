// Error types for prometheus-agents-setup

use thiserror::Error;

/// Result type alias using anyhow::Error
pub type Result<T> = anyhow::Result<T>;

/// Fatal setup failures. Non-fatal conditions (architecture fallback,
/// service account creation) are logged as warnings instead.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Elevated privileges required: {0}")]
    Privilege(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to download {url} after {attempts} attempts: {message}")]
    Download {
        url: String,
        attempts: usize,
        message: String,
    },

    #[error("No source available for '{agent}': set a source URL or provide {local}")]
    SourceMissing { agent: String, local: String },

    #[error("Failed to install package for '{agent}': {message}")]
    Package { agent: String, message: String },

    #[error("Failed to register service '{service}': {message}\nSee service logs: {log_hint}")]
    ServiceRegistration {
        service: String,
        message: String,
        log_hint: String,
    },

    #[error("Metrics endpoint {url} did not answer after {attempts} attempts")]
    ValidationTimeout { url: String, attempts: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SetupError {
    /// Build a registration error for a service, attaching the manager's log query
    pub fn registration(service: &str, message: impl Into<String>, log_hint: String) -> Self {
        Self::ServiceRegistration {
            service: service.to_string(),
            message: message.into(),
            log_hint,
        }
    }
}
