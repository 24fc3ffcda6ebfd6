//! Manifest directory lister and watcher.
//!
//! Stands in for the control-plane list/watch client: every `.yaml`/`.yml`
//! file under the manifest directory is read as a stream of documents, the
//! `ConfigMap` documents are collected into a full listing, and that listing
//! is handed to the informer. Any debounced change under the directory
//! triggers a fresh relist.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use serde::Deserialize;
use walkdir::WalkDir;

use super::informer::Informer;
use crate::error::WatchError;
use crate::resource::{ManifestHeader, RuleObject, CONFIG_MAP_KIND};

const DEBOUNCE: Duration = Duration::from_millis(500);
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Returns true for files that may hold manifests.
fn is_manifest(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Dot-prefixed entries are skipped. This also hides the `..data` and
/// timestamped directories of a mounted ConfigMap volume, which would
/// otherwise list every object twice.
fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

/// Parses every `ConfigMap` document in a YAML stream.
///
/// Empty documents and other kinds are skipped.
pub fn parse_manifests(content: &str, path: &Path) -> Result<Vec<RuleObject>, WatchError> {
    let parse_err = |e: serde_yaml::Error| WatchError::ParseManifest {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).map_err(parse_err)?;
        if value.is_null() {
            continue;
        }

        let header: ManifestHeader = serde_yaml::from_value(value.clone()).map_err(parse_err)?;
        if header.kind != CONFIG_MAP_KIND {
            log::debug!(
                "Skipping {} document in {}",
                if header.kind.is_empty() { "untyped" } else { header.kind.as_str() },
                path.display()
            );
            continue;
        }

        objects.push(serde_yaml::from_value(value).map_err(parse_err)?);
    }

    Ok(objects)
}

/// Lists ConfigMap manifests under a directory.
#[derive(Debug, Clone)]
pub struct ManifestLister {
    manifest_dir: PathBuf,
}

impl ManifestLister {
    /// Creates a lister for `manifest_dir`.
    pub fn new(manifest_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest_dir: manifest_dir.into(),
        }
    }

    /// Returns the listed directory.
    pub fn manifest_dir(&self) -> &Path {
        &self.manifest_dir
    }

    /// Reads every manifest file and returns all ConfigMaps found.
    ///
    /// Fails as a whole if any file cannot be read or parsed, so callers
    /// never act on a partial listing.
    pub fn list(&self) -> Result<Vec<RuleObject>, WatchError> {
        let mut objects = Vec::new();

        let walker = WalkDir::new(&self.manifest_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.manifest_dir.clone());
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                WatchError::ReadDirectory { path, source }
            })?;

            let path = entry.path();
            if !entry.file_type().is_file() || !is_manifest(path) {
                continue;
            }

            let content =
                std::fs::read_to_string(path).map_err(|e| WatchError::ReadManifest {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            objects.extend(parse_manifests(&content, path)?);
        }

        Ok(objects)
    }
}

/// Feeds the informer from a manifest directory.
pub struct ManifestWatcher {
    lister: ManifestLister,
    informer: Arc<Informer>,
    /// Serializes relists so a newer listing is never overwritten by an
    /// older one.
    relist_lock: Mutex<()>,
    /// Shutdown flag.
    shutdown: Arc<AtomicBool>,
}

impl ManifestWatcher {
    /// Creates a watcher feeding `informer` from `manifest_dir`.
    pub fn new(manifest_dir: impl Into<PathBuf>, informer: Arc<Informer>) -> Self {
        Self {
            lister: ManifestLister::new(manifest_dir),
            informer,
            relist_lock: Mutex::new(()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the watched directory.
    pub fn manifest_dir(&self) -> &Path {
        self.lister.manifest_dir()
    }

    /// Lists the directory and hands the result to the informer.
    ///
    /// Returns the number of ConfigMaps listed. On error the informer is
    /// left untouched.
    pub fn relist(&self) -> Result<usize, WatchError> {
        let _guard = self
            .relist_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let objects = self.lister.list()?;
        let count = objects.len();
        self.informer.replace(objects);
        Ok(count)
    }

    /// Starts watching the manifest directory.
    ///
    /// This function blocks until the shutdown flag is set.
    pub fn watch(&self) -> Result<(), WatchError> {
        self.run(None)
    }

    fn run(
        &self,
        ready: Option<std::sync::mpsc::SyncSender<Result<(), String>>>,
    ) -> Result<(), WatchError> {
        let (tx, rx) = std::sync::mpsc::channel();

        let setup = new_debouncer(DEBOUNCE, tx).and_then(|mut debouncer| {
            debouncer
                .watcher()
                .watch(self.manifest_dir(), RecursiveMode::Recursive)
                .map(|_| debouncer)
        });

        let _debouncer: Debouncer<RecommendedWatcher> = match setup {
            Ok(debouncer) => {
                if let Some(ready) = &ready {
                    let _ = ready.send(Ok(()));
                }
                debouncer
            }
            Err(e) => {
                if let Some(ready) = &ready {
                    let _ = ready.send(Err(e.to_string()));
                }
                return Err(WatchError::Watch(e.to_string()));
            }
        };

        log::info!(
            "Started watching manifest directory: {}",
            self.manifest_dir().display()
        );

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match rx.recv_timeout(SHUTDOWN_POLL) {
                Ok(Ok(events)) => {
                    if self.is_relevant(&events) {
                        match self.relist() {
                            Ok(count) => log::debug!("Relisted {} ConfigMaps", count),
                            Err(e) => {
                                log::warn!("Relist skipped, keeping last known state: {}", e)
                            }
                        }
                    }
                }
                Ok(Err(e)) => {
                    log::error!("Watch error: {}", e);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }

        log::info!("Stopped watching manifest directory");
        Ok(())
    }

    /// A batch matters if it touches a manifest file or a directory.
    fn is_relevant(&self, events: &[DebouncedEvent]) -> bool {
        events.iter().any(|event| {
            let path = &event.path;
            let hidden = path
                .strip_prefix(self.manifest_dir())
                .map(|rel| rel.iter().any(is_hidden))
                .unwrap_or(false);
            !hidden && (is_manifest(path) || path.is_dir() || path.extension().is_none())
        })
    }

    /// Signals the watcher to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Returns whether the watcher has been signaled to stop.
    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// Runs a [`ManifestWatcher`] on a background thread.
pub struct AsyncManifestWatcher {
    watcher: Arc<ManifestWatcher>,
    watch_handle: Option<std::thread::JoinHandle<Result<(), WatchError>>>,
}

impl AsyncManifestWatcher {
    /// Creates a watcher that is not started yet.
    pub fn new(manifest_dir: impl Into<PathBuf>, informer: Arc<Informer>) -> Self {
        Self {
            watcher: Arc::new(ManifestWatcher::new(manifest_dir, informer)),
            watch_handle: None,
        }
    }

    /// Returns the wrapped watcher.
    pub fn watcher(&self) -> &ManifestWatcher {
        &self.watcher
    }

    /// Starts watching in a background thread.
    ///
    /// Returns once the filesystem watch is registered, or with the error
    /// that prevented it.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.watch_handle.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);
        let watcher = Arc::clone(&self.watcher);
        self.watch_handle = Some(std::thread::spawn(move || watcher.run(Some(ready_tx))));

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => {
                self.join();
                Err(WatchError::Watch(message))
            }
            Err(_) => {
                self.join();
                Err(WatchError::Closed)
            }
        }
    }

    /// Starts watching, then performs the initial listing.
    ///
    /// The watch is registered before the directory is listed, so a change
    /// made in between triggers a later relist instead of being lost. If
    /// the listing fails the watcher is stopped again.
    pub fn start_with_listing(&mut self) -> Result<usize, WatchError> {
        self.start()?;
        match self.watcher.relist() {
            Ok(count) => Ok(count),
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    /// Stops the watcher.
    pub fn stop(&mut self) {
        self.watcher.stop();
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.watch_handle.take() {
            match handle.join() {
                Ok(Err(e)) => log::debug!("Manifest watcher exited with error: {}", e),
                Err(_) => log::error!("Manifest watcher thread panicked"),
                Ok(Ok(())) => {}
            }
        }
    }
}

impl Drop for AsyncManifestWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
