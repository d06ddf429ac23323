// Host architecture to release asset tag mapping

use super::OsFamily;
use std::fmt;

/// Architecture tag as it appears in upstream release asset names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchTag {
    Amd64,
    Arm64,
    Armv7,
    I386,
}

impl ArchTag {
    pub const DEFAULT: ArchTag = ArchTag::Amd64;

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchTag::Amd64 => "amd64",
            ArchTag::Arm64 => "arm64",
            ArchTag::Armv7 => "armv7",
            ArchTag::I386 => "386",
        }
    }
}

impl fmt::Display for ArchTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ARCH_TABLE: &[(&str, ArchTag)] = &[
    ("x86_64", ArchTag::Amd64),
    ("amd64", ArchTag::Amd64),
    ("aarch64", ArchTag::Arm64),
    ("arm64", ArchTag::Arm64),
    ("armv7l", ArchTag::Armv7),
    ("armv7", ArchTag::Armv7),
    ("arm", ArchTag::Armv7),
    ("i386", ArchTag::I386),
    ("i586", ArchTag::I386),
    ("i686", ArchTag::I386),
    ("x86", ArchTag::I386),
];

/// Exact-match lookup, `None` when the identifier is unknown or has no
/// published asset for the OS family.
pub fn lookup(machine: &str, os: OsFamily) -> Option<ArchTag> {
    let machine = machine.trim().to_ascii_lowercase();
    let tag = ARCH_TABLE
        .iter()
        .find(|(name, _)| *name == machine)
        .map(|(_, tag)| *tag)?;

    match (os, tag) {
        (OsFamily::Windows, ArchTag::Armv7) => None,
        _ => Some(tag),
    }
}

/// Resolve the asset tag, falling back to amd64 with a warning
pub fn resolve(machine: &str, os: OsFamily) -> ArchTag {
    match lookup(machine, os) {
        Some(tag) => tag,
        None => {
            tracing::warn!(
                "Unsupported architecture '{}' on {}, defaulting to {}",
                machine,
                os,
                ArchTag::DEFAULT
            );
            ArchTag::DEFAULT
        }
    }
}

/// Machine identifier of the running host
pub fn host_machine() -> String {
    if cfg!(windows) {
        // A 32-bit process on 64-bit Windows sees x86 in PROCESSOR_ARCHITECTURE
        for var in ["PROCESSOR_ARCHITEW6432", "PROCESSOR_ARCHITECTURE"] {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    return value;
                }
            }
        }
    }
    std::env::consts::ARCH.to_string()
}
