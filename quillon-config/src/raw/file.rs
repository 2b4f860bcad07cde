//! File-backed raw configuration source with watch-driven reloads.
//!
//! Wraps an in-memory [`RawConfigSource`] around a configuration file:
//! the file is loaded once at construction, re-loaded (and re-emitted) on
//! demand via [`reload`](FileConfigSource::reload), and optionally watched
//! for changes so edits re-emit without a restart. A reload that fails to
//! read or parse keeps the last good snapshot.

use crate::error::{Error, Result};
use crate::raw::loader::ConfigLoader;
use crate::raw::provider::{RawConfigProvider, RawConfigSource, RawObserver, RawSubscription};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Watch behavior settings.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    /// Debounce delay between accepted file events.
    pub debounce_delay: Duration,
    /// Consecutive reload failures after which watching gives up.
    pub max_consecutive_failures: u32,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self { debounce_delay: Duration::from_millis(500), max_consecutive_failures: 5 }
    }
}

/// Raw configuration source backed by a watched file.
pub struct FileConfigSource {
    source: RawConfigSource,
    config_path: PathBuf,
    loader: ConfigLoader,
    watcher: Option<RecommendedWatcher>,
    fs_event_tx: Option<Sender<notify::Result<Event>>>,
    fs_event_rx: Option<Receiver<notify::Result<Event>>>,
    settings: WatchSettings,
}

impl FileConfigSource {
    /// Create a source for `config_path`, loading the initial tree.
    pub fn new<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        Self::with_loader(config_path, ConfigLoader::new())
    }

    /// Create a source using a customized loader (search paths, env prefix,
    /// overrides).
    pub fn with_loader<P: AsRef<Path>>(config_path: P, loader: ConfigLoader) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let initial = loader.load_from_file(&config_path)?;

        let (fs_event_tx, fs_event_rx) = crossbeam_channel::unbounded();

        Ok(Self {
            source: RawConfigSource::new(initial),
            config_path,
            loader,
            watcher: None,
            fs_event_tx: Some(fs_event_tx),
            fs_event_rx: Some(fs_event_rx),
            settings: WatchSettings::default(),
        })
    }

    /// Override the watch settings.
    #[must_use]
    pub fn with_settings(mut self, settings: WatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The file this source reads from.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Re-read the file and emit the new tree to observers.
    ///
    /// This is also the resynchronization hook: after deprecation-driven
    /// path renames the service can ask the source to re-emit so downstream
    /// state converges on the rewritten layout.
    pub fn reload(&self) -> Result<()> {
        reload_file(&self.config_path, &self.loader, &self.source)
    }

    /// Start watching the file for changes.
    ///
    /// Spawns a background task that debounces file events and re-loads the
    /// file on each accepted change. Requires a running tokio runtime.
    pub fn start_watching(&mut self) -> Result<()> {
        info!("Starting configuration file watching: {}", self.config_path.display());

        let fs_event_tx = self
            .fs_event_tx
            .take()
            .ok_or_else(|| Error::Source { message: "File watcher already started".to_string() })?;

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = fs_event_tx.send(res) {
                    error!("Failed to send file system event: {}", e);
                }
            },
            Config::default()
                .with_poll_interval(Duration::from_millis(500))
                .with_compare_contents(true),
        )
        .map_err(|e| Error::Source { message: format!("Failed to create file watcher: {e}") })?;

        // Watch the parent directory so replace-by-rename edits are seen.
        if let Some(parent_dir) = self.config_path.parent() {
            watcher.watch(parent_dir, RecursiveMode::NonRecursive).map_err(|e| Error::Source {
                message: format!("Failed to watch directory: {e}"),
            })?;
        }

        self.watcher = Some(watcher);

        let fs_event_rx = self
            .fs_event_rx
            .take()
            .ok_or_else(|| Error::Source { message: "Event receiver already taken".to_string() })?;

        self.spawn_reload_task(fs_event_rx);

        info!("Configuration file watching started");
        Ok(())
    }

    /// Stop watching for file changes.
    pub fn stop_watching(&mut self) {
        info!("Stopping configuration file watching");
        self.watcher = None;
        self.fs_event_tx = None;
        self.fs_event_rx = None;
    }

    fn spawn_reload_task(&self, fs_event_rx: Receiver<notify::Result<Event>>) {
        let config_path = self.config_path.clone();
        let loader = self.loader.clone();
        let source = self.source.clone();
        let settings = self.settings.clone();

        tokio::spawn(async move {
            let mut last_event_time = Instant::now();
            let mut consecutive_failures = 0;

            loop {
                match fs_event_rx.try_recv() {
                    Ok(Ok(event)) => {
                        let matches_file = event.paths.iter().any(|path| {
                            path == &config_path
                                || (path.file_name() == config_path.file_name()
                                    && path.parent() == config_path.parent())
                        });
                        if !matches_file {
                            continue;
                        }

                        if matches!(event.kind, EventKind::Remove(_)) {
                            warn!("Configuration file deleted: {}", config_path.display());
                            continue;
                        }

                        let now = Instant::now();
                        if now.duration_since(last_event_time) < settings.debounce_delay {
                            debug!("Debouncing configuration reload");
                            continue;
                        }
                        last_event_time = now;

                        if consecutive_failures >= settings.max_consecutive_failures {
                            error!(
                                "File watching disabled after {consecutive_failures} consecutive \
                                 reload failures"
                            );
                            continue;
                        }

                        match reload_file(&config_path, &loader, &source) {
                            Ok(()) => {
                                consecutive_failures = 0;
                            },
                            Err(e) => {
                                consecutive_failures += 1;
                                error!("Configuration reload failed: {}", e);
                            },
                        }
                    },
                    Ok(Err(e)) => {
                        error!("File watcher error: {}", e);
                    },
                    Err(TryRecvError::Empty) => {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    },
                    Err(TryRecvError::Disconnected) => {
                        info!("File watcher disconnected, stopping reload task");
                        break;
                    },
                }
            }
        });
    }
}

/// Load the file and push the new tree; a failure keeps the last snapshot.
fn reload_file(config_path: &Path, loader: &ConfigLoader, source: &RawConfigSource) -> Result<()> {
    let tree = loader.load_from_file(config_path)?;
    source.push(tree);
    debug!("Configuration reloaded from {}", config_path.display());
    Ok(())
}

impl RawConfigProvider for FileConfigSource {
    fn current(&self) -> Arc<Value> {
        self.source.current()
    }

    fn subscribe(&self, observer: RawObserver) -> RawSubscription {
        self.source.subscribe(observer)
    }
}

impl std::fmt::Debug for FileConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileConfigSource")
            .field("config_path", &self.config_path)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}
