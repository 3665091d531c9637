//! Hot reload of the settings file and the rule file(s).
//!
//! Changes are debounced, the whole sync configuration is reloaded and
//! validated, and a valid candidate is offered to the [`ConfigSlot`]. An
//! invalid candidate is logged and dropped; the live configuration stays.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::SyncError;
use crate::settings::{Settings, SyncConfig};
use crate::sync::ConfigSlot;

const DEBOUNCE: Duration = Duration::from_millis(500);

/// Keeps the file watcher and its reload task alive.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Paths a reload reacts to.
#[derive(Debug, Clone)]
struct Targets {
    config_file: PathBuf,
    rules: PathBuf,
}

impl Targets {
    fn matches(&self, path: &Path) -> bool {
        path == self.config_file || path.starts_with(&self.rules)
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Directory to register with the OS watcher: the path itself when it is a
/// directory, its parent otherwise. Editors replace files by rename, so the
/// file itself is never watched.
fn watch_root(path: &Path) -> Option<&Path> {
    if path.is_dir() {
        Some(path)
    } else {
        path.parent()
    }
}

/// Start watching `config_path` and the rules path it points to.
pub fn watch_config(
    config_path: &str,
    rules_path: &Path,
    slot: Arc<ConfigSlot>,
) -> Result<ConfigWatcher, SyncError> {
    let targets = Targets {
        config_file: absolute(Path::new(config_path)),
        rules: absolute(rules_path),
    };

    let (tx, rx) = mpsc::unbounded_channel::<PathBuf>();
    let filter = targets.clone();
    let mut watcher = notify::recommended_watcher(move |event: Result<Event, notify::Error>| {
        let event = match event {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!("File watcher error: {err}");
                return;
            }
        };
        if !matches!(
            event.kind,
            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
        ) {
            return;
        }
        for path in event.paths {
            if filter.matches(&path) {
                let _ = tx.send(path);
            }
        }
    })?;

    let mut roots: Vec<&Path> = Vec::new();
    for root in [watch_root(&targets.config_file), watch_root(&targets.rules)]
        .into_iter()
        .flatten()
    {
        if !roots.contains(&root) {
            roots.push(root);
        }
    }
    for root in roots {
        watcher.watch(root, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %root.display(), "Watching for configuration changes");
    }

    let task = tokio::spawn(reload_loop(config_path.to_string(), rx, slot));
    Ok(ConfigWatcher {
        _watcher: watcher,
        task,
    })
}

/// Like [`watch_config`], but a watcher that cannot start is logged and the
/// process carries on with the configuration it loaded at startup.
pub fn start(config_path: &str, rules_path: &Path, slot: Arc<ConfigSlot>) -> Option<ConfigWatcher> {
    match watch_config(config_path, rules_path, slot) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            tracing::error!("Failed to watch configuration, config hot-reloading will be disabled: {err:?}");
            None
        }
    }
}

async fn reload_loop(config_path: String, mut rx: mpsc::UnboundedReceiver<PathBuf>, slot: Arc<ConfigSlot>) {
    while let Some(first) = rx.recv().await {
        tokio::time::sleep(DEBOUNCE).await;
        let mut coalesced = 1;
        while rx.try_recv().is_ok() {
            coalesced += 1;
        }
        tracing::info!(path = %first.display(), events = coalesced, "Configuration changed, reloading");

        match load_candidate(&config_path) {
            Ok(config) => {
                tracing::info!(rules = config.rules.len(), "New configuration validated");
                slot.offer(Arc::new(config));
            }
            Err(err) => {
                tracing::error!("Ignoring invalid configuration, keeping the current one: {err:?}");
            }
        }
    }
}

fn load_candidate(config_path: &str) -> miette::Result<SyncConfig> {
    let settings = Settings::load(config_path)?;
    Ok(SyncConfig::from_settings(&settings)?)
}
