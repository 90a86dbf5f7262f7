#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

mod commands;
mod logging;

use clap::Parser;
use commands::cache::CacheAction;
use commands::Context;
use esmtypes_core::paths;
use esmtypes_core::ResolverConfig;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "esmtypes")]
#[command(author, version, about = "Resolve CDN imports to local type declarations", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Resolve a module specifier as the editor would
    Resolve {
        /// Specifier as written in the import statement
        specifier: String,

        /// File containing the import (path or remote URL)
        #[arg(long, value_name = "FILE")]
        from: String,

        /// Wait for background fetches and resolve again
        #[arg(long)]
        wait: bool,
    },

    /// Fetch a URL through the cache
    Fetch {
        /// Absolute URL
        url: String,
    },

    /// Inspect or clear the fetch cache
    Cache {
        #[command(subcommand)]
        cache_cmd: CacheCommands,
    },

    /// Print the validated import map of a document
    Importmap {
        /// HTML or JSON import-map document
        document: PathBuf,
    },

    /// Watch import-map documents and report refreshes
    Watch,
}

#[derive(clap::Subcommand, Debug)]
enum CacheCommands {
    /// Look up a URL, evicting stale entries
    Query { url: String },

    /// Look up metadata only, never evicting
    Head { url: String },

    /// Print where the body of a URL is stored
    Path { url: String },

    /// Print the URL a store path belongs to
    Restore { path: PathBuf },

    /// Delete all cached metadata and declaration files
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let current = std::env::current_dir().into_diagnostic()?;
    let cwd = match cli.cwd {
        Some(dir) => current.join(dir),
        None => current,
    };
    let root = paths::project_root(&cwd).unwrap_or_else(|| cwd.clone());

    logging::init(cli.verbose, cli.json);

    let config = ResolverConfig::load(&root).into_diagnostic()?;
    let ctx = Context {
        cwd,
        root,
        config,
        json: cli.json,
    };

    let span = tracing::info_span!("esmtypes", root = %ctx.root.display());
    let _guard = span.enter();

    match cli.command {
        Some(Commands::Version) | None => commands::version::run(),
        Some(Commands::Resolve {
            specifier,
            from,
            wait,
        }) => commands::resolve::run(&ctx, &specifier, &from, wait),
        Some(Commands::Fetch { url }) => commands::fetch::run(&ctx, &url),
        Some(Commands::Cache { cache_cmd }) => {
            let action = match cache_cmd {
                CacheCommands::Query { url } => CacheAction::Query { url },
                CacheCommands::Head { url } => CacheAction::Head { url },
                CacheCommands::Path { url } => CacheAction::Path { url },
                CacheCommands::Restore { path } => CacheAction::Restore {
                    path: ctx.cwd.join(path),
                },
                CacheCommands::Clear => CacheAction::Clear,
            };
            commands::cache::run(&ctx, action)
        }
        Some(Commands::Importmap { document }) => {
            commands::importmap::run(&ctx, &ctx.cwd.join(document))
        }
        Some(Commands::Watch) => commands::watch::run(&ctx),
    }
}
