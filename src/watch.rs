use crate::snapshot::{SnapshotReader, StatsSnapshot};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::{
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch {path}: {source}")]
    Notify {
        path: String,
        #[source]
        source: notify::Error,
    },
}

/// Keeps an OS-level watch alive; dropping it releases the watch.
pub trait WatchGuard: Send {}

impl<T: Send> WatchGuard for T {}

pub type ChangeCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// File change notification capability.
pub trait ChangeSource: Send + Sync {
    fn watch_file(
        &self,
        path: &Path,
        on_change: ChangeCallback,
    ) -> Result<Box<dyn WatchGuard>, WatchError>;
}

/// [`ChangeSource`] backed by the platform watcher from `notify`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyChangeSource;

impl ChangeSource for NotifyChangeSource {
    fn watch_file(
        &self,
        path: &Path,
        on_change: ChangeCallback,
    ) -> Result<Box<dyn WatchGuard>, WatchError> {
        let to_error = |source: notify::Error| WatchError::Notify {
            path: path.display().to_string(),
            source,
        };

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) if matches!(event.kind, EventKind::Modify(_)) => on_change(),
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "snapshot watch error"),
            })
            .map_err(to_error)?;
        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(to_error)?;
        Ok(Box::new(watcher))
    }
}

/// Pushes a freshly read snapshot to subscribers whenever the file changes.
#[derive(Clone)]
pub struct SnapshotNotifier {
    reader: SnapshotReader,
    source: Arc<dyn ChangeSource>,
}

impl SnapshotNotifier {
    pub fn new(reader: SnapshotReader, source: Arc<dyn ChangeSource>) -> Self {
        Self { reader, source }
    }

    /// Starts delivering `callback(snapshot)` on every change of the snapshot
    /// file. A missing file or a failed registration gives back an inert
    /// subscription.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<StatsSnapshot>) + Send + Sync + 'static,
    {
        if !self.reader.exists() {
            tracing::warn!(path = %self.reader.path().display(), "cannot watch missing stats snapshot");
            return Subscription::inert();
        }

        let active = Arc::new(AtomicBool::new(true));
        let delivering = active.clone();
        let reader = self.reader.clone();
        let on_change: ChangeCallback = Box::new(move || {
            if !delivering.load(Ordering::Acquire) {
                return;
            }
            callback(reader.read());
        });

        match self.source.watch_file(self.reader.path(), on_change) {
            Ok(guard) => {
                tracing::debug!(path = %self.reader.path().display(), "watching stats snapshot");
                Subscription {
                    active,
                    guard: Mutex::new(Some(guard)),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to watch stats snapshot");
                Subscription::inert()
            }
        }
    }
}

/// Handle returned by [`SnapshotNotifier::subscribe`].
pub struct Subscription {
    active: Arc<AtomicBool>,
    guard: Mutex<Option<Box<dyn WatchGuard>>>,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            guard: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stops delivery and releases the watch. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);
        let guard = self
            .guard
            .lock()
            .expect("subscription lock poisoned")
            .take();
        drop(guard);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
