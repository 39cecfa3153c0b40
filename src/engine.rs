//! Operations the HTTP layer and the CLI call into.

use crate::{
    config::EnginePaths,
    metrics::{self, DashboardMetrics},
    snapshot::{DailyActivity, DailyModelTokens, SnapshotFileInfo, SnapshotReader, StatsSnapshot},
    usage::{self, LiveUsage, ScanCancel, ScanCancelled},
    watch::{ChangeSource, NotifyChangeSource, SnapshotNotifier, Subscription},
};
use chrono::{Local, NaiveDate};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::task;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("stats snapshot not found at {}", path.display())]
    SnapshotUnavailable { path: PathBuf },
    #[error(transparent)]
    Cancelled(#[from] ScanCancelled),
    #[error("background task failed: {0}")]
    Task(#[from] task::JoinError),
}

#[derive(Clone)]
pub struct UsageEngine {
    paths: Arc<EnginePaths>,
    snapshots: SnapshotReader,
    notifier: SnapshotNotifier,
}

impl UsageEngine {
    pub fn new(paths: EnginePaths) -> Self {
        Self::with_change_source(paths, Arc::new(NotifyChangeSource))
    }

    pub fn with_change_source(paths: EnginePaths, source: Arc<dyn ChangeSource>) -> Self {
        let snapshots = SnapshotReader::new(&paths);
        let notifier = SnapshotNotifier::new(snapshots.clone(), source);
        Self {
            paths: Arc::new(paths),
            snapshots,
            notifier,
        }
    }

    /// Merged dashboard view: snapshot history plus today's live usage.
    ///
    /// The snapshot read and the live scan run side by side. Dropping the
    /// returned future stops the live scan at the next file boundary.
    pub async fn dashboard_metrics(&self) -> Result<DashboardMetrics, EngineError> {
        let today = Local::now().date_naive();
        let reader = self.snapshots.clone();
        let (snapshot, live) = tokio::join!(
            task::spawn_blocking(move || reader.read()),
            self.live_usage_on(today)
        );
        let snapshot = snapshot?;
        let live = live?;

        metrics::merge(snapshot.as_ref(), &live, today).ok_or_else(|| {
            EngineError::SnapshotUnavailable {
                path: self.snapshots.path().to_path_buf(),
            }
        })
    }

    /// Today's usage from the session logs alone.
    pub async fn live_usage(&self) -> Result<LiveUsage, EngineError> {
        self.live_usage_on(Local::now().date_naive()).await
    }

    async fn live_usage_on(&self, today: NaiveDate) -> Result<LiveUsage, EngineError> {
        let cancel = ScanCancel::new();
        let _abandon = cancel.drop_guard();
        let paths = self.paths.clone();
        let usage =
            task::spawn_blocking(move || usage::scan_today(&paths.projects_dir, today, &cancel))
                .await??;
        Ok(usage)
    }

    pub async fn file_info(&self) -> Result<SnapshotFileInfo, EngineError> {
        let reader = self.snapshots.clone();
        Ok(task::spawn_blocking(move || reader.file_info()).await?)
    }

    /// Snapshot activity for the newest `days` dates, oldest first.
    pub async fn daily_activity(&self, days: usize) -> Result<Vec<DailyActivity>, EngineError> {
        let reader = self.snapshots.clone();
        Ok(task::spawn_blocking(move || reader.daily_activity(days)).await?)
    }

    pub async fn daily_model_tokens(
        &self,
        days: usize,
    ) -> Result<Vec<DailyModelTokens>, EngineError> {
        let reader = self.snapshots.clone();
        Ok(task::spawn_blocking(move || reader.daily_model_tokens(days)).await?)
    }

    pub async fn raw_stats(&self) -> Result<Option<StatsSnapshot>, EngineError> {
        let reader = self.snapshots.clone();
        Ok(task::spawn_blocking(move || reader.read()).await?)
    }

    /// Calls `callback` with a reloaded snapshot whenever the file changes.
    pub fn watch<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Option<StatsSnapshot>) + Send + Sync + 'static,
    {
        self.notifier.subscribe(callback)
    }
}
