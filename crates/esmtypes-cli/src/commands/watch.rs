//! `esmtypes watch` command implementation.
//!
//! Watches the directories holding the project's import-map documents,
//! feeds changed documents to the resolver and prints each host refresh.

use super::{CliHost, Context};
use esmtypes_core::config::DEFAULT_IMPORT_MAP_DOCUMENTS;
use esmtypes_core::ModuleResolver;
use esmtypes_util::fs::read_to_string_lossy;
use miette::{miette, IntoDiagnostic, Result};
use notify::{
    event::{CreateKind, ModifyKind, RemoveKind, RenameMode},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Event coalescing window.
const COALESCE_WINDOW_MS: u64 = 50;

/// Run the watch command until Ctrl+C.
pub fn run(ctx: &Context) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    runtime.block_on(watch(ctx))
}

async fn watch(ctx: &Context) -> Result<()> {
    let host = Arc::new(CliHost::announcing());
    let resolver = ctx.resolver(host.clone())?;
    let documents = tracked_documents(ctx);

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<PathBuf>>();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                if should_process_event(&event) {
                    if let Err(e) = tx.send(event.paths) {
                        warn!(error = %e, "Failed to send watch event");
                    }
                }
            }
            Err(e) => error!(error = %e, "Watch error"),
        },
        Config::default().with_poll_interval(Duration::from_secs(2)),
    )
    .map_err(|e| miette!("Failed to create watcher: {e}"))?;

    let dirs = watch_dirs(&documents);
    if dirs.is_empty() {
        return Err(miette!("No import map document directory to watch"));
    }
    for dir in &dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| miette!("Failed to watch {}: {e}", dir.display()))?;
        info!(dir = %dir.display(), "Watching directory");
    }

    if !ctx.json {
        println!(
            "Watching {} import map document(s), {} loaded. Press Ctrl+C to stop.",
            documents.len(),
            resolver.document_count()
        );
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut pending: HashSet<PathBuf> = HashSet::new();
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                if !ctx.json {
                    println!("\nStopping watch ({} refresh(es)).", host.refreshes());
                }
                break;
            }
            event = tokio::time::timeout(Duration::from_millis(COALESCE_WINDOW_MS), rx.recv()) => {
                match event {
                    Ok(Some(paths)) => pending.extend(paths),
                    Ok(None) => {
                        debug!("Watch event channel closed");
                        break;
                    }
                    Err(_) if !pending.is_empty() => {
                        debug!(count = pending.len(), "Processing coalesced file events");
                        let changed = apply_changes(&resolver, &documents, pending.drain());
                        if changed > 0 {
                            debug!(count = changed, "Import map documents changed");
                        }
                    }
                    Err(_) => {}
                }
            }
        }
    }

    drop(watcher);
    resolver.settled().await;
    Ok(())
}

/// Documents whose changes are observed.
///
/// Defaults are tracked even when absent so that creating one is noticed.
fn tracked_documents(ctx: &Context) -> BTreeSet<PathBuf> {
    match &ctx.config.import_maps {
        Some(docs) => docs.iter().map(|d| ctx.root.join(d)).collect(),
        None => DEFAULT_IMPORT_MAP_DOCUMENTS
            .iter()
            .map(|d| ctx.root.join(d))
            .collect(),
    }
}

/// Existing parent directories of `documents`, deduplicated.
fn watch_dirs(documents: &BTreeSet<PathBuf>) -> BTreeSet<PathBuf> {
    documents
        .iter()
        .filter_map(|doc| doc.parent())
        .filter(|dir| dir.is_dir())
        .map(Path::to_path_buf)
        .collect()
}

/// Feed changed documents to the resolver. Returns how many changed a map.
fn apply_changes(
    resolver: &ModuleResolver,
    documents: &BTreeSet<PathBuf>,
    paths: impl IntoIterator<Item = PathBuf>,
) -> usize {
    let mut changed = 0;
    for path in paths {
        if !documents.contains(&path) {
            continue;
        }
        debug!(path = %path.display(), "Document event");

        let updated = match read_to_string_lossy(&path) {
            Ok(text) => resolver.on_document_changed(&path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                resolver.on_document_removed(&path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read import map document");
                false
            }
        };
        if updated {
            changed += 1;
        }
    }
    changed
}

/// Check if we should process this event.
fn should_process_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::From | RenameMode::Both
            ))
            | EventKind::Remove(RemoveKind::File)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use esmtypes_core::ResolverConfig;
    use notify::event::{AccessKind, DataChange, MetadataKind};
    use tempfile::TempDir;

    fn event(kind: EventKind) -> Event {
        Event::new(kind).add_path(PathBuf::from("/project/index.html"))
    }

    fn context(dir: &TempDir) -> Context {
        let config = ResolverConfig::default()
            .with_cache_dir(dir.path().join("cache"))
            .with_refresh_debounce_ms(10);
        Context {
            cwd: dir.path().to_path_buf(),
            root: dir.path().to_path_buf(),
            config,
            json: true,
        }
    }

    #[test]
    fn test_should_process_event() {
        assert!(should_process_event(&event(EventKind::Create(CreateKind::File))));
        assert!(should_process_event(&event(EventKind::Modify(ModifyKind::Data(
            DataChange::Content
        )))));
        assert!(should_process_event(&event(EventKind::Modify(ModifyKind::Name(
            RenameMode::To
        )))));
        assert!(should_process_event(&event(EventKind::Remove(RemoveKind::File))));

        assert!(!should_process_event(&event(EventKind::Create(CreateKind::Folder))));
        assert!(!should_process_event(&event(EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions
        )))));
        assert!(!should_process_event(&event(EventKind::Access(AccessKind::Any))));
    }

    #[test]
    fn test_tracked_documents_defaults_include_missing() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let docs = tracked_documents(&ctx);
        assert_eq!(docs.len(), DEFAULT_IMPORT_MAP_DOCUMENTS.len());
        assert!(docs.contains(&dir.path().join("index.html")));

        let dirs = watch_dirs(&docs);
        assert_eq!(dirs.len(), 1);
        assert!(dirs.contains(dir.path()));
    }

    #[test]
    fn test_watch_dirs_skip_missing_directories() {
        let dir = TempDir::new().unwrap();
        let docs: BTreeSet<PathBuf> = [
            dir.path().join("web/index.html"),
            dir.path().join("importmap.json"),
        ]
        .into_iter()
        .collect();

        let dirs = watch_dirs(&docs);
        assert_eq!(dirs.len(), 1);
        assert!(!dirs.contains(&dir.path().join("web")));
    }

    #[tokio::test]
    async fn test_apply_changes_tracks_edits_and_removal() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let resolver = ctx.resolver(Arc::new(CliHost::default())).unwrap();
        let docs = tracked_documents(&ctx);
        let map = dir.path().join("importmap.json");

        std::fs::write(&map, r#"{"imports":{"react":"https://esm.sh/react@18"}}"#).unwrap();
        assert_eq!(apply_changes(&resolver, &docs, [map.clone()]), 1);
        assert_eq!(resolver.document_count(), 1);

        // Same content is not a change.
        assert_eq!(apply_changes(&resolver, &docs, [map.clone()]), 0);

        // Untracked files are ignored.
        let other = dir.path().join("notes.json");
        std::fs::write(&other, "{}").unwrap();
        assert_eq!(apply_changes(&resolver, &docs, [other]), 0);

        std::fs::remove_file(&map).unwrap();
        assert_eq!(apply_changes(&resolver, &docs, [map]), 1);
        assert_eq!(resolver.document_count(), 0);
    }
}
