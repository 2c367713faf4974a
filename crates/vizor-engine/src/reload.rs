//! Filesystem watching for asset hot reload.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Watches files or directories and reports when any of them changed.
///
/// Directories are watched recursively. A file is watched through its parent
/// directory so that replace-on-save edits and a file appearing or
/// disappearing all count as a change.
pub struct HotReloadWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    roots: Vec<PathBuf>,
    interval: Duration,
    last_poll: Option<Instant>,
    pending: bool,
}

impl HotReloadWatcher {
    /// Starts watching `paths`.
    ///
    /// A path whose directory does not exist is skipped with a warning; only
    /// failing to create the OS watcher is an error.
    pub fn new(paths: impl IntoIterator<Item = PathBuf>, interval: Duration) -> notify::Result<Self> {
        let (tx, events) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            // The receiver is gone only once the engine dropped the watcher.
            let _ = tx.send(res);
        })?;

        let mut roots = Vec::new();
        let mut watched = HashSet::new();
        for path in paths {
            let (root, target, mode) = watch_target(&path);
            if watched.contains(&target) {
                roots.push(root);
                continue;
            }
            match watcher.watch(&target, mode) {
                Ok(()) => {
                    log::debug!("hot reload: watching {} ({mode:?})", target.display());
                    watched.insert(target);
                    roots.push(root);
                }
                Err(e) => log::warn!("hot reload: cannot watch {}: {e}", path.display()),
            }
        }

        Ok(Self {
            _watcher: watcher,
            events,
            roots,
            interval,
            last_poll: None,
            pending: false,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    /// Reports a change if at least one interval has passed since the previous
    /// report window. Changes seen earlier are held until then.
    pub fn poll(&mut self, now: Instant) -> bool {
        self.drain();
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_poll = Some(now);
        std::mem::take(&mut self.pending)
    }

    /// Takes every queued filesystem event. Returns `true` while a change
    /// is waiting to be reported by [`poll`](Self::poll).
    pub fn drain(&mut self) -> bool {
        for res in self.events.try_iter() {
            match res {
                Ok(event) if is_change(&self.roots, &event) => {
                    if !self.pending {
                        if let Some(path) = event.paths.first() {
                            log::info!("hot reload: {} changed", path.display());
                        }
                    }
                    self.pending = true;
                }
                Ok(_) => {}
                Err(e) => log::warn!("hot reload: watcher error: {e}"),
            }
        }
        self.pending
    }
}

impl fmt::Debug for HotReloadWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotReloadWatcher")
            .field("roots", &self.roots)
            .field("interval", &self.interval)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

/// Returns the root events are matched against, the path handed to the OS
/// watcher, and its mode.
fn watch_target(path: &Path) -> (PathBuf, PathBuf, RecursiveMode) {
    if path.is_dir() {
        let root = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        return (root.clone(), root, RecursiveMode::Recursive);
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let parent = std::fs::canonicalize(&parent).unwrap_or(parent);
    let root = match path.file_name() {
        Some(name) => parent.join(name),
        None => parent.clone(),
    };
    (root, parent, RecursiveMode::NonRecursive)
}

fn is_change(roots: &[PathBuf], event: &Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| roots.iter().any(|root| p.starts_with(root)))
}
