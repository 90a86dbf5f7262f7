//! The host project that consumes resolutions.

use std::fmt;
use tracing::{debug, warn};

/// Fast-path invalidation of cached module resolutions.
///
/// Only some hosts can do this; it may also fail at runtime, in which case
/// the project is reloaded instead.
pub trait IncrementalInvalidation: Send + Sync {
    /// Drop cached resolutions and recompute the dependency graph.
    ///
    /// Returns `false` if the host could not do it.
    fn invalidate_resolutions(&self) -> bool;
}

/// The analysis project a resolver serves.
pub trait HostProject: Send + Sync {
    /// Incremental invalidation, when the host supports it.
    fn incremental(&self) -> Option<&dyn IncrementalInvalidation> {
        None
    }

    /// Rebuild the whole project.
    fn reload_project(&self);
}

/// How a refresh reached the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshStrategy {
    Incremental,
    Reload,
}

impl fmt::Display for RefreshStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => write!(f, "incremental"),
            Self::Reload => write!(f, "reload"),
        }
    }
}

/// Ask `host` to recompute, preferring incremental invalidation.
pub fn refresh_host(host: &dyn HostProject) -> RefreshStrategy {
    if let Some(incremental) = host.incremental() {
        if incremental.invalidate_resolutions() {
            debug!("Host invalidated resolutions incrementally");
            return RefreshStrategy::Incremental;
        }
        warn!("Incremental invalidation failed, reloading project");
    }
    host.reload_project();
    RefreshStrategy::Reload
}
