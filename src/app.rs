use crate::{
    config::{AppConfig, EnginePaths},
    engine::{EngineError, UsageEngine},
    server,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;

const SNAPSHOT_UPDATE_CAPACITY: usize = 16;

/// High-level application orchestrator.
pub struct App {
    config: Arc<AppConfig>,
    engine: UsageEngine,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let paths = EnginePaths::resolve(&config.claude)?;
        tracing::info!(
            projects = %paths.projects_dir.display(),
            stats = %paths.stats_file.display(),
            "resolved claude code data paths"
        );
        Ok(Self {
            config: Arc::new(config),
            engine: UsageEngine::new(paths),
        })
    }

    pub async fn run(self, print_only: bool) -> Result<()> {
        if print_only {
            return self.print_metrics().await;
        }

        let (updates, _) = broadcast::channel(SNAPSHOT_UPDATE_CAPACITY);
        let sender = updates.clone();
        let subscription = self.engine.watch(move |snapshot| {
            tracing::info!(available = snapshot.is_some(), "stats snapshot changed");
            // No receivers just means nobody is listening on /events right now.
            let _ = sender.send(snapshot.map(Arc::new));
        });
        if !subscription.is_active() {
            tracing::warn!("stats snapshot push updates disabled");
        }

        let server_handle = server::spawn(self.config.clone(), self.engine.clone(), updates).await?;

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        tracing::info!("shutting down");

        subscription.unsubscribe();
        server_handle.shutdown().await
    }

    async fn print_metrics(&self) -> Result<()> {
        match self.engine.dashboard_metrics().await {
            Ok(metrics) => {
                let json = serde_json::to_string_pretty(&metrics)
                    .context("failed to serialize dashboard metrics")?;
                println!("{json}");
                Ok(())
            }
            Err(EngineError::SnapshotUnavailable { path }) => {
                let live = self.engine.live_usage().await?;
                let json = serde_json::to_string_pretty(&live)
                    .context("failed to serialize live usage")?;
                tracing::warn!(path = %path.display(), "stats snapshot not found, printing live usage only");
                println!("{json}");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}
