#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::return_self_not_must_use)]

pub mod cache;
pub mod config;
pub mod error;
pub mod extension;
pub mod import_map;
pub mod paths;
pub mod resolution;
pub mod version;

#[cfg(test)]
mod test_support;

pub use cache::{CacheError, CachedResponse, Clock, Fetch, FetchCache, ReqwestFetcher, SystemClock};
pub use config::ResolverConfig;
pub use error::Error;
pub use extension::Extension;
pub use import_map::ImportMap;
pub use resolution::{
    CompletionEntry, HostProject, IncrementalInvalidation, ModuleResolver, ModuleState,
    RefreshStrategy, ResolvedModule, ResolverStats,
};
pub use version::VERSION;
