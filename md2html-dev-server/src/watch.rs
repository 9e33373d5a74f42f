use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use md2html_core::{RebuildOutcome, SiteBuilder};
use notify::RecommendedWatcher;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches the source tree and rebuilds on a single worker thread, so at most
/// one rebuild runs at a time.
pub struct SourceWatcher {
    debouncer: Debouncer<RecommendedWatcher>,
    worker: JoinHandle<()>,
}

impl SourceWatcher {
    /// Start watching `builder`'s source directory. `on_rebuild` runs on the
    /// worker thread after every successful rebuild.
    pub fn start<F>(builder: SiteBuilder, on_rebuild: F) -> Result<Self>
    where
        F: Fn(&Path) + Send + 'static,
    {
        let source_dir = builder.config().source_dir.clone();
        let (tx, rx) = mpsc::channel::<PathBuf>();

        let mut debouncer = new_debouncer(DEBOUNCE, move |res: DebounceEventResult| match res {
            Ok(events) => {
                for event in events {
                    let _ = tx.send(event.path);
                }
            }
            Err(err) => tracing::warn!("File watcher error: {err}"),
        })?;

        debouncer
            .watcher()
            .watch(&source_dir, notify::RecursiveMode::Recursive)?;
        tracing::info!("Watching {} for changes", source_dir.display());

        let worker = thread::Builder::new()
            .name("md2html-rebuild".to_string())
            .spawn(move || rebuild_loop(&builder, &rx, &on_rebuild))?;

        Ok(Self { debouncer, worker })
    }

    /// Stop watching and wait for the in-flight rebuild to finish.
    pub fn stop(self) {
        // Dropping the debouncer drops the channel sender; the worker drains
        // what is left and exits.
        drop(self.debouncer);
        if self.worker.join().is_err() {
            tracing::error!("Rebuild worker panicked");
        }
        tracing::info!("Stopped watching");
    }
}

pub(crate) fn rebuild_loop(builder: &SiteBuilder, rx: &Receiver<PathBuf>, on_rebuild: &dyn Fn(&Path)) {
    while let Ok(first) = rx.recv() {
        let mut batch = vec![first];
        batch.extend(rx.try_iter());
        process_batch(builder, dedupe(batch), on_rebuild);
    }
    tracing::debug!("Rebuild worker exiting");
}

fn dedupe(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

/// Handle one batch of changed paths: a single full rebuild if any path
/// needs one, otherwise a copy per changed asset.
pub(crate) fn process_batch(builder: &SiteBuilder, paths: Vec<PathBuf>, on_rebuild: &dyn Fn(&Path)) {
    if let Some(trigger) = paths.iter().find(|p| builder.requires_full_rebuild(p)) {
        if paths.len() > 1 {
            tracing::debug!("Coalescing {} changes into one rebuild", paths.len());
        }
        rebuild(builder, trigger, on_rebuild);
        return;
    }
    for path in &paths {
        rebuild(builder, path, on_rebuild);
    }
}

fn rebuild(builder: &SiteBuilder, path: &Path, on_rebuild: &dyn Fn(&Path)) {
    match builder.rebuild_path(path) {
        Ok(RebuildOutcome::Skipped) => {}
        Ok(_) => on_rebuild(path),
        Err(err) => tracing::error!("Rebuild failed for {}: {err}", path.display()),
    }
}
