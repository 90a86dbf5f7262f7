//! `esmtypes importmap` command implementation.

use super::Context;
use esmtypes_core::ImportMap;
use esmtypes_util::fs::read_to_string_lossy;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::Path;

/// Print the validated import map found in `document`.
pub fn run(ctx: &Context, document: &Path) -> Result<()> {
    let text = read_to_string_lossy(document)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read {}", document.display()))?;
    let map = ImportMap::from_document(document, &text).into_diagnostic()?;

    if ctx.json || !map.is_blank() {
        let json = serde_json::to_string_pretty(&map.to_json()).into_diagnostic()?;
        println!("{json}");
    } else {
        println!("{}: no import map", document.display());
    }
    Ok(())
}
