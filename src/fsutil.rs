// Atomic file replacement: write a sibling temp file, then rename over the target

use crate::error::Result;
use anyhow::Context;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const MODE_EXECUTABLE: u32 = 0o755;
pub const MODE_READABLE: u32 = 0o644;

/// Prefix of the temp files created by [`staged_file`]
pub const PARTIAL_PREFIX: &str = ".partial-";

/// Create a temp file in the destination's directory so the final rename
/// never crosses filesystems. It starts owner-only and non-executable.
pub fn staged_file(dest: &Path) -> Result<NamedTempFile> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)
        .with_context(|| format!("creating directory {}", parent.display()))?;
    sweep_stale(parent, PARTIAL_PREFIX);

    tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(parent)
        .with_context(|| format!("creating temp file in {}", parent.display()))
}

/// Flush, apply the final mode, then rename into place
pub fn commit(mut staged: NamedTempFile, dest: &Path, mode: u32) -> Result<()> {
    staged.flush()?;
    staged.as_file().sync_all()?;
    set_mode(staged.path(), mode)?;
    staged
        .persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("moving file into place at {}", dest.display()))?;
    Ok(())
}

pub fn write_atomic(dest: &Path, contents: &[u8], mode: u32) -> Result<()> {
    let mut staged = staged_file(dest)?;
    staged
        .write_all(contents)
        .with_context(|| format!("writing {}", dest.display()))?;
    commit(staged, dest, mode)
}

/// Remove entries in `dir` whose name starts with `prefix`. These are
/// leftovers of a run that was killed before its temp files were dropped.
/// Failures are logged and otherwise ignored.
pub fn sweep_stale(dir: &Path, prefix: &str) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.filter_map(|e| e.ok()) {
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        let path = entry.path();
        let removed = match entry.file_type() {
            Ok(kind) if kind.is_dir() => std::fs::remove_dir_all(&path),
            _ => std::fs::remove_file(&path),
        };
        match removed {
            Ok(()) => tracing::debug!("Removed stale {}", path.display()),
            Err(e) => tracing::warn!("Could not remove stale {}: {}", path.display(), e),
        }
    }
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("file.txt");

        write_atomic(&dest, b"first", MODE_READABLE).unwrap();
        write_atomic(&dest, b"second", MODE_READABLE).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"second");
        let leftovers: Vec<_> = std::fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(PARTIAL_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_interrupted_leftovers_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(".partial-Ab12Cd");
        std::fs::write(&stale, b"half a download").unwrap();
        let neighbour = dir.path().join("config.toml");
        std::fs::write(&neighbour, b"port = 1\n").unwrap();

        write_atomic(&dir.path().join("agent"), b"full", MODE_EXECUTABLE).unwrap();

        assert!(!stale.exists());
        assert_eq!(std::fs::read(&neighbour).unwrap(), b"port = 1\n");
        assert_eq!(std::fs::read(dir.path().join("agent")).unwrap(), b"full");
    }

    #[test]
    fn test_sweep_removes_directories_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(".node_exporter-staging-x1y2");
        std::fs::create_dir_all(stale.join("payload")).unwrap();
        std::fs::write(stale.join("archive.tar.gz"), b"gz").unwrap();
        std::fs::create_dir_all(dir.path().join("node_exporter")).unwrap();

        sweep_stale(dir.path(), ".node_exporter-staging-");

        assert!(!stale.exists());
        assert!(dir.path().join("node_exporter").is_dir());
    }

    #[test]
    fn test_sweep_of_missing_dir_is_noop() {
        sweep_stale(Path::new("/nonexistent/prometheus"), PARTIAL_PREFIX);
    }

    #[cfg(unix)]
    #[test]
    fn test_staged_file_is_not_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("agent");
        let mut staged = staged_file(&dest).unwrap();
        staged.write_all(b"partial").unwrap();

        let mode = std::fs::metadata(staged.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
        assert!(!dest.exists());

        commit(staged, &dest, MODE_EXECUTABLE).unwrap();
        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
