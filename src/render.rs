// Agent configuration rendering

use crate::agent::{AgentDescriptor, ScalarValue};
use crate::error::{Result, SetupError};
use crate::fsutil::{self, MODE_READABLE};
use std::path::PathBuf;

/// Seconds between process samples
pub const POLL_INTERVAL_SECS: u64 = 15;
/// Upper bound on processes the agent tracks
pub const MAX_TRACKED_PROCESSES: u32 = 100;

const FIXED_KEYS: [&str; 3] = ["port", "interval", "max_processes"];

/// Render the flat TOML configuration for an agent. Output depends only on
/// the descriptor, so re-rendering is always safe.
pub fn render_config(agent: &AgentDescriptor) -> Result<String> {
    let mut content = String::new();
    content.push_str(&format!("port = {}\n", agent.service_port));
    content.push_str(&format!("interval = {}\n", POLL_INTERVAL_SECS));
    content.push_str(&format!("max_processes = {}\n", MAX_TRACKED_PROCESSES));

    // BTreeMap iteration keeps extras in key order
    for (key, value) in &agent.extra_config {
        if FIXED_KEYS.contains(&key.as_str()) {
            return Err(SetupError::Config(format!(
                "extra_config for '{}' may not override '{}'",
                agent.name, key
            ))
            .into());
        }
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(SetupError::Config(format!(
                "extra_config key '{}' for '{}' must be a bare TOML key",
                key, agent.name
            ))
            .into());
        }
        content.push_str(&format!("{} = {}\n", key, toml_literal(value)));
    }

    Ok(content)
}

/// Overwrite the agent's config file, if it has one
pub fn write_config(agent: &AgentDescriptor) -> Result<Option<PathBuf>> {
    let Some(path) = agent.config_path() else {
        return Ok(None);
    };

    let content = render_config(agent)?;
    fsutil::write_atomic(&path, content.as_bytes(), MODE_READABLE)?;
    tracing::info!("Configuration written to {}", path.display());
    println!("  Configuration file created at {}", path.display());
    Ok(Some(path))
}

fn toml_literal(value: &ScalarValue) -> String {
    let value = match value {
        ScalarValue::Bool(v) => toml::Value::Boolean(*v),
        ScalarValue::Integer(v) => toml::Value::Integer(*v),
        ScalarValue::Float(v) => toml::Value::Float(*v),
        ScalarValue::String(v) => toml::Value::String(v.clone()),
    };
    value.to_string()
}
