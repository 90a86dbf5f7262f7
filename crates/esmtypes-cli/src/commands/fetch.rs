//! `esmtypes fetch` command implementation.

use super::{parse_url, print_json, Context};
use esmtypes_core::CachedResponse;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// JSON view of a cached response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    pub redirected: bool,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_path: Option<String>,
}

impl From<&CachedResponse> for ResponseView {
    fn from(response: &CachedResponse) -> Self {
        Self {
            url: response.url.to_string(),
            status: response.status,
            headers: response.headers.clone(),
            created_at: response.created_at,
            redirected: response.redirected,
            from_cache: response.from_cache,
            body_path: response.body_path.as_ref().map(|p| p.display().to_string()),
        }
    }
}

/// Print a response for humans.
pub fn print_human(response: &CachedResponse) {
    let source = if response.from_cache { "cache" } else { "network" };
    println!("{} {} ({source})", response.status, response.url);
    if response.redirected {
        println!("  redirected");
    }
    for (name, value) in &response.headers {
        println!("  {name}: {value}");
    }
    if let Some(path) = &response.body_path {
        println!("  body: {}", path.display());
    }
}

/// Run the fetch command.
pub fn run(ctx: &Context, url: &str) -> Result<()> {
    let url = parse_url(url)?;
    let cache = ctx.cache()?;

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let response = runtime.block_on(cache.fetch(&url)).into_diagnostic()?;

    if ctx.json {
        print_json(&ResponseView::from(&response))
    } else {
        print_human(&response);
        Ok(())
    }
}
