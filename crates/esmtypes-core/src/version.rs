use std::fmt::Write;

/// The current version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Schema version for the on-disk cache layout.
/// Bump this when changing the metadata or store path format.
pub const SCHEMA_VERSION: u32 = 1;

/// Returns a formatted version string including build metadata if available.
#[must_use]
pub fn version_string() -> String {
    let mut s = format!("esmtypes {VERSION}");

    if let Some(hash) = option_env!("ESMTYPES_BUILD_GIT_HASH") {
        let _ = write!(s, " ({hash})");
    }

    let _ = write!(s, " [cache schema v{SCHEMA_VERSION}]");
    s
}
