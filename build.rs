use std::env;

fn main() {
    // Set build-time environment variables
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=BUILD_TARGET={}", target);

    // Add git info if available
    match std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
    {
        Ok(git_hash) if git_hash.status.success() => {
            let git_hash_str = String::from_utf8_lossy(&git_hash.stdout).trim().to_string();
            println!("cargo:rustc-env=GIT_HASH={}", git_hash_str);
            
            // Check if working directory is clean
            if let Ok(git_status) = std::process::Command::new("git")
                .args(["status", "--porcelain"])
                .output()
            {
                let is_clean = git_status.stdout.is_empty();
                println!("cargo:rustc-env=GIT_CLEAN={}", if is_clean { "true" } else { "false" });
            }
        }
        _ => {
            // Not a git checkout, or git is not installed
            println!("cargo:rustc-env=GIT_HASH=unknown");
            println!("cargo:rustc-env=GIT_CLEAN=unknown");
        }
    }
    
    // Build timestamp; `date` is missing on Windows hosts
    let now = std::process::Command::new("date")
        .arg("-u")
        .arg("+%Y-%m-%dT%H:%M:%SZ")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=BUILD_DATE={}", now);
}
