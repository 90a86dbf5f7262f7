//! `esmtypes cache` command implementation.

use super::fetch::{print_human, ResponseView};
use super::{parse_url, print_json, Context};
use miette::{miette, IntoDiagnostic, Result};
use serde_json::json;
use std::path::PathBuf;

/// Cache subcommand.
#[derive(Debug, Clone)]
pub enum CacheAction {
    Query { url: String },
    Head { url: String },
    Path { url: String },
    Restore { path: PathBuf },
    Clear,
}

/// Run a cache subcommand.
pub fn run(ctx: &Context, action: CacheAction) -> Result<()> {
    let cache = ctx.cache()?;

    match action {
        CacheAction::Query { url } => {
            let url = parse_url(&url)?;
            lookup(ctx, cache.query(&url).as_ref())
        }
        CacheAction::Head { url } => {
            let url = parse_url(&url)?;
            lookup(ctx, cache.head(&url).as_ref())
        }
        CacheAction::Path { url } => {
            let url = parse_url(&url)?;
            let path = cache.store_path(&url);
            if ctx.json {
                print_json(&json!({ "url": url.as_str(), "path": path.display().to_string() }))
            } else {
                println!("{}", path.display());
                Ok(())
            }
        }
        CacheAction::Restore { path } => {
            let url = cache
                .restore_url(&path)
                .ok_or_else(|| miette!("{} is not a cache store path", path.display()))?;
            if ctx.json {
                print_json(&json!({ "path": path.display().to_string(), "url": url.as_str() }))
            } else {
                println!("{url}");
                Ok(())
            }
        }
        CacheAction::Clear => {
            cache.clear().into_diagnostic()?;
            if ctx.json {
                print_json(&json!({ "ok": true, "root": cache.root().display().to_string() }))
            } else {
                println!("Cleared {}", cache.root().display());
                Ok(())
            }
        }
    }
}

fn lookup(ctx: &Context, hit: Option<&esmtypes_core::CachedResponse>) -> Result<()> {
    if ctx.json {
        return print_json(&json!({ "hit": hit.map(ResponseView::from) }));
    }
    match hit {
        Some(response) => print_human(response),
        None => println!("miss"),
    }
    Ok(())
}
