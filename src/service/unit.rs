// systemd unit file generation

use super::models::{Dependency, ServiceDefinition};

/// Render a unit file for the definition
pub fn render_unit(definition: &ServiceDefinition) -> String {
    let mut content = String::new();

    content.push_str("[Unit]\n");
    content.push_str(&format!("Description={}\n", definition.description));
    for dependency in &definition.dependencies {
        let target = systemd_target(*dependency);
        content.push_str(&format!("Wants={}\n", target));
        content.push_str(&format!("After={}\n", target));
    }
    content.push('\n');

    content.push_str("[Service]\n");
    content.push_str("Type=simple\n");
    content.push_str(&format!("ExecStart={}\n", exec_start(definition)));
    content.push_str("Restart=always\n");
    content.push_str(&format!("RestartSec={}\n", definition.restart_delay.as_secs()));

    if let Some(user) = &definition.run_as_user {
        content.push_str(&format!("User={}\n", user));
    }

    content.push_str(&format!(
        "WorkingDirectory={}\n",
        escape_specifiers(&definition.working_directory.display().to_string())
    ));

    content.push('\n');
    content.push_str("[Install]\n");
    content.push_str("WantedBy=multi-user.target\n");

    content
}

fn systemd_target(dependency: Dependency) -> &'static str {
    match dependency {
        Dependency::Network => "network-online.target",
    }
}

/// Quote words that systemd would otherwise split
fn exec_start(definition: &ServiceDefinition) -> String {
    definition
        .exec_command
        .iter()
        .map(|word| {
            let word = escape_specifiers(word);
            if word.is_empty() || word.contains(char::is_whitespace) {
                format!("\"{}\"", word.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                word
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `%` starts a systemd specifier
fn escape_specifiers(value: &str) -> String {
    value.replace('%', "%%")
}

/// Validate unit name format and prevent path injection
pub fn validate_unit_name(unit_name: &str) -> Result<(), String> {
    if unit_name.is_empty() {
        return Err("Unit name cannot be empty".to_string());
    }

    if unit_name.contains("..")
        || unit_name.contains('/')
        || unit_name.contains('\0')
        || unit_name.len() > 256
    {
        return Err(format!("Invalid unit name format: {:?}", unit_name));
    }

    if !unit_name.ends_with(".service") {
        return Err(format!("Unit name must end with .service: {}", unit_name));
    }

    Ok(())
}
