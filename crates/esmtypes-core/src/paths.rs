use crate::version::SCHEMA_VERSION;
use std::path::{Path, PathBuf};

/// Environment variable to override the cache root (for testing and CI).
pub const CACHE_DIR_ENV: &str = "ESMTYPES_CACHE_DIR";

/// Files that mark a project root, checked in order.
const ROOT_MARKERS: &[&str] = &["esmtypes.json", "package.json", "deno.json", ".git"];

/// Find the project root by walking up from `cwd` looking for a root marker.
///
/// Returns the first directory containing `esmtypes.json`, `package.json`,
/// `deno.json` or `.git`, or `None` if none is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if ROOT_MARKERS.iter().any(|m| current.join(m).exists()) {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Get the cache directory for esmtypes.
///
/// Respects `ESMTYPES_CACHE_DIR`. Otherwise uses platform-appropriate locations
/// with versioning:
/// - Linux: `$XDG_CACHE_HOME/esmtypes/v{N}` or `~/.cache/esmtypes/v{N}`
/// - macOS: `~/Library/Caches/esmtypes/v{N}`
/// - Windows: `%LOCALAPPDATA%\esmtypes\v{N}`
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    let base = dirs_next::cache_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".esmtypes-cache"),
                |p| p.join(".cache").join("esmtypes"),
            )
        },
        |p| p.join("esmtypes"),
    );

    base.join(format!("v{SCHEMA_VERSION}"))
}
