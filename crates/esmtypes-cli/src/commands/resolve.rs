//! `esmtypes resolve` command implementation.

use super::{print_json, CliHost, Context};
use esmtypes_core::{ResolvedModule, ResolverStats};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResolveOutput<'a> {
    specifier: &'a str,
    from: &'a str,
    resolved: Option<ResolvedModule>,
    /// Answer given before background work settled, when `--wait` was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    provisional: Option<Option<ResolvedModule>>,
    stats: ResolverStats,
}

/// Run the resolve command.
pub fn run(ctx: &Context, specifier: &str, from: &str, wait: bool) -> Result<()> {
    let containing = if from.contains("://") {
        from.to_string()
    } else {
        ctx.cwd.join(from).display().to_string()
    };

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let output = runtime.block_on(async {
        let resolver = ctx.resolver(Arc::new(CliHost::default()))?;
        let first = resolver.resolve_module_name(specifier, &containing);

        let (resolved, provisional) = if wait {
            resolver.settled().await;
            (resolver.resolve_module_name(specifier, &containing), Some(first))
        } else {
            (first, None)
        };

        Ok::<_, miette::Report>(ResolveOutput {
            specifier,
            from,
            resolved,
            provisional,
            stats: resolver.stats(),
        })
    })?;

    if ctx.json {
        return print_json(&output);
    }

    match &output.resolved {
        Some(module) => {
            let kind = if module.uses_non_standard_extension {
                "runtime"
            } else {
                "types"
            };
            println!("{} -> {} ({kind}, {})", specifier, module.resolved_path, module.extension.as_str());
        }
        None => println!("{specifier} -> (unresolved)"),
    }
    if output.stats.in_flight > 0 {
        println!("hint: {} fetch(es) still running, use --wait for the final answer", output.stats.in_flight);
    }
    Ok(())
}
