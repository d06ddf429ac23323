// Version and build information

/// Build information structure
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub build_date: String,
    pub build_hash: String,
    pub git_clean: String,
    pub target_triple: String,
    pub optimized: bool,
}

pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Get current build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: version(),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown").to_string(),
        build_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        git_clean: option_env!("GIT_CLEAN").unwrap_or("unknown").to_string(),
        target_triple: option_env!("BUILD_TARGET").unwrap_or("unknown").to_string(),
        optimized: cfg!(not(debug_assertions)),
    }
}

impl BuildInfo {
    pub fn format_display(&self) -> String {
        format!("prometheus-agents-setup v{}", self.version)
    }

    /// Version line with commit and dirty marker when known
    pub fn format_detailed(&self) -> String {
        let mut result = self.format_display();

        if !self.build_hash.is_empty() && self.build_hash != "unknown" {
            result.push_str(&format!(" (commit {})", self.build_hash));
        }
        if self.git_clean == "false" {
            result.push_str(" [dirty]");
        }

        result
    }

    pub fn format_build_info(&self) -> String {
        format!(
            "Build: {}\nTarget: {}\nProfile: {}\nGit: {}\nClean: {}",
            self.build_date,
            self.target_triple,
            if self.optimized { "release" } else { "debug" },
            self.build_hash,
            self.git_clean
        )
    }
}
