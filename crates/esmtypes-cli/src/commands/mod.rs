pub mod cache;
pub mod fetch;
pub mod importmap;
pub mod resolve;
pub mod version;
pub mod watch;

use esmtypes_core::{FetchCache, HostProject, ModuleResolver, ResolverConfig};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use url::Url;

/// Shared command inputs.
#[derive(Debug)]
pub struct Context {
    pub cwd: PathBuf,
    /// Project root: nearest ancestor with a project marker, else `cwd`.
    pub root: PathBuf,
    pub config: ResolverConfig,
    pub json: bool,
}

impl Context {
    pub fn cache(&self) -> Result<FetchCache> {
        FetchCache::from_config(&self.config).into_diagnostic()
    }

    /// A resolver over the project with its import maps loaded.
    ///
    /// Must be called inside a tokio runtime.
    pub fn resolver(&self, host: Arc<dyn HostProject>) -> Result<ModuleResolver> {
        let resolver = ModuleResolver::builder(self.config.clone(), host)
            .project_root(&self.root)
            .build()
            .into_diagnostic()?;
        resolver.load_documents().into_diagnostic()?;
        Ok(resolver)
    }
}

/// Host that has nothing to recompute; it only counts refreshes.
#[derive(Debug, Default)]
pub struct CliHost {
    refreshes: AtomicUsize,
    announce: bool,
}

impl CliHost {
    /// Print a line to stdout on every refresh.
    pub fn announcing() -> Self {
        Self {
            refreshes: AtomicUsize::new(0),
            announce: true,
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl HostProject for CliHost {
    fn reload_project(&self) {
        let count = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.announce {
            println!("refresh #{count}");
        }
    }
}

pub fn parse_url(input: &str) -> Result<Url> {
    esmtypes_core::Error::parse_url(input).into_diagnostic()
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
