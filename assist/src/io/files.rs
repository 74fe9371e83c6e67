//! Filesystem writes for materialized artifacts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::types::FileStatus;

/// Suffixes that get the executable bit on Unix.
const EXECUTABLE_SUFFIXES: &[&str] = &[".sh", ".bash", ".zsh", ".command"];

/// Write `content` (plus a trailing newline) to `path`, creating parent directories.
///
/// Returns `Created` when the path did not exist before, `Updated` otherwise.
#[instrument(skip_all, fields(path = %path.display(), bytes = content.len()))]
pub fn write_file(path: &Path, content: &str) -> Result<FileStatus> {
    let existed = path.exists();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = content.to_string();
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))?;
    if is_executable_name(path) {
        mark_executable(path)?;
    }
    let status = if existed {
        FileStatus::Updated
    } else {
        FileStatus::Created
    };
    debug!(?status, "file written");
    Ok(status)
}

fn is_executable_name(path: &Path) -> bool {
    let name = path.to_string_lossy();
    EXECUTABLE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {}", path.display()))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

/// Create `path` as a directory, or as an empty file when it has an extension.
///
/// Existing paths are left alone. Returns whether anything was created.
pub fn create_missing_path(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if path.extension().is_some() {
        write_empty(path)?;
    } else {
        fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))?;
    }
    Ok(true)
}

fn write_empty(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, "").with_context(|| format!("create {}", path.display()))
}

/// Remove a file or directory tree if present.
pub fn remove_path(path: &Path) -> Result<()> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}
