// Elevated privilege precondition

use crate::error::{Result, SetupError};

/// Fail unless the process can modify system services
pub async fn ensure_elevated() -> Result<()> {
    check(is_elevated().await)
}

fn check(elevated: bool) -> Result<()> {
    if elevated {
        return Ok(());
    }

    let hint = if cfg!(windows) {
        "run from an Administrator PowerShell or command prompt"
    } else {
        "run with sudo or as root"
    };
    Err(SetupError::Privilege(hint.to_string()).into())
}

#[cfg(unix)]
async fn is_elevated() -> bool {
    nix::unistd::Uid::effective().is_root()
}

#[cfg(windows)]
async fn is_elevated() -> bool {
    // `net session` is refused for non-administrators
    match tokio::process::Command::new("net")
        .arg("session")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(e) => {
            tracing::debug!("Privilege probe failed: {}", e);
            false
        }
    }
}

#[cfg(not(any(unix, windows)))]
async fn is_elevated() -> bool {
    false
}
