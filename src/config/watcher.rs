//! Configuration file watcher for hot reload.
//!
//! Only the `handler` section takes effect on reload; listeners, timeouts
//! and observability are fixed for the lifetime of the process. Edits to
//! those sections are reported and otherwise ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::{DecoyConfig, HandlerConfig};

/// What a freshly loaded file means for the running decoy.
#[derive(Debug, PartialEq)]
pub enum Reload {
    /// Handler settings differ from the ones in force.
    Apply(DecoyConfig),
    /// Nothing reloadable changed.
    Unchanged,
}

/// Compare a loaded config with the handler settings in force.
///
/// Returns the sections whose edits need a restart alongside the decision.
pub fn classify(
    running: &DecoyConfig,
    current_handler: &HandlerConfig,
    loaded: DecoyConfig,
) -> (Reload, Vec<&'static str>) {
    let mut fixed = Vec::new();
    if loaded.listener != running.listener {
        fixed.push("listener");
    }
    if loaded.timeouts != running.timeouts {
        fixed.push("timeouts");
    }
    if loaded.observability != running.observability {
        fixed.push("observability");
    }

    let reload = if &loaded.handler == current_handler {
        Reload::Unchanged
    } else {
        Reload::Apply(loaded)
    };
    (reload, fixed)
}

/// Watches the configuration file and forwards handler changes.
pub struct ConfigWatcher {
    path: PathBuf,
    running: DecoyConfig,
    update_tx: mpsc::UnboundedSender<DecoyConfig>,
}

impl ConfigWatcher {
    /// Create a watcher for `path`; `running` is the file's contents at
    /// startup, before command-line overrides.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path, running: DecoyConfig) -> (Self, mpsc::UnboundedReceiver<DecoyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                running,
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for updates to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            running,
            update_tx,
        } = self;
        let watched = path.clone();
        let mut current_handler = running.handler.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let loaded = match load_config(&path) {
                        Ok(loaded) => loaded,
                        Err(e) => {
                            tracing::error!(
                                error = %e,
                                "Failed to reload config, keeping current configuration"
                            );
                            return;
                        }
                    };

                    let (reload, fixed) = classify(&running, &current_handler, loaded);
                    if !fixed.is_empty() {
                        tracing::warn!(sections = ?fixed, "Config sections changed that need a restart");
                    }
                    if let Reload::Apply(config) = reload {
                        tracing::info!(path = ?path, "Handler configuration changed, applying");
                        current_handler = config.handler.clone();
                        let _ = update_tx.send(config);
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}
