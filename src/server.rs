use crate::{
    config::AppConfig,
    engine::{EngineError, UsageEngine},
    snapshot::{SnapshotFileInfo, StatsSnapshot},
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{broadcast, oneshot},
    task::JoinHandle,
};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

const DEFAULT_DAYS: i64 = 7;
const MAX_DAYS: i64 = 365;

/// Snapshot reloads fanned out to `/events` subscribers.
pub type SnapshotUpdates = broadcast::Sender<Option<Arc<StatsSnapshot>>>;

#[derive(Clone)]
struct ServerState {
    engine: UsageEngine,
    updates: SnapshotUpdates,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_info: Option<SnapshotFileInfo>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            file_info: None,
        })
        .into_response()
    }
}

fn failure(
    status: StatusCode,
    error: &str,
    message: Option<String>,
    file_info: Option<SnapshotFileInfo>,
) -> Response {
    let body = ApiResponse::<()> {
        success: false,
        data: None,
        error: Some(error.to_string()),
        message,
        file_info,
    };
    (status, Json(body)).into_response()
}

fn internal_error(error: &str, err: &EngineError) -> Response {
    tracing::error!(error = %err, "{error}");
    failure(
        StatusCode::INTERNAL_SERVER_ERROR,
        error,
        Some(err.to_string()),
        None,
    )
}

pub struct ServerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(anyhow!(err)),
        }
    }
}

pub async fn spawn(
    config: Arc<AppConfig>,
    engine: UsageEngine,
    updates: SnapshotUpdates,
) -> Result<ServerHandle> {
    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| "failed to parse listen_addr")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| "failed to bind dashboard listener")?;
    let router = router(engine, updates);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let join = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .map_err(|err| anyhow!(err))
    });

    tracing::info!(listen = %addr, "dashboard api listening");

    Ok(ServerHandle {
        shutdown: Some(shutdown_tx),
        join,
    })
}

pub fn router(engine: UsageEngine, updates: SnapshotUpdates) -> Router {
    let state = Arc::new(ServerState { engine, updates });
    let api = Router::new()
        .route("/stats", get(get_stats))
        .route("/daily", get(get_daily_activity))
        .route("/daily-tokens", get(get_daily_tokens))
        .route("/raw", get(get_raw_stats))
        .route("/file-info", get(get_file_info))
        .route("/events", get(snapshot_events));

    Router::new()
        .nest("/api/claude-code", api)
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DaysQuery {
    days: Option<String>,
}

impl DaysQuery {
    /// Unparseable or zero falls back to the default; anything else must be
    /// within 1..=365.
    fn resolve(&self) -> Option<usize> {
        let days = self
            .days
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|days| *days != 0)
            .unwrap_or(DEFAULT_DAYS);
        if (1..=MAX_DAYS).contains(&days) {
            usize::try_from(days).ok()
        } else {
            None
        }
    }
}

fn invalid_days() -> Response {
    failure(
        StatusCode::BAD_REQUEST,
        "Invalid days parameter",
        Some(format!("Days must be between 1 and {MAX_DAYS}")),
        None,
    )
}

async fn snapshot_not_found(state: &ServerState, message: Option<String>) -> Response {
    let file_info = state.engine.file_info().await.ok();
    failure(
        StatusCode::NOT_FOUND,
        "Claude Code stats file not found",
        message,
        file_info,
    )
}

async fn get_stats(State(state): State<Arc<ServerState>>) -> Response {
    match state.engine.dashboard_metrics().await {
        Ok(metrics) => ApiResponse::ok(metrics),
        Err(EngineError::SnapshotUnavailable { .. }) => {
            snapshot_not_found(
                &state,
                Some(
                    "Make sure Claude Code is installed and has been used at least once"
                        .to_string(),
                ),
            )
            .await
        }
        Err(err) => internal_error("Failed to fetch Claude Code stats", &err),
    }
}

async fn get_daily_activity(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<DaysQuery>,
) -> Response {
    let Some(days) = query.resolve() else {
        return invalid_days();
    };
    match state.engine.daily_activity(days).await {
        Ok(activity) => ApiResponse::ok(activity),
        Err(err) => internal_error("Failed to fetch daily activity", &err),
    }
}

async fn get_daily_tokens(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<DaysQuery>,
) -> Response {
    let Some(days) = query.resolve() else {
        return invalid_days();
    };
    match state.engine.daily_model_tokens(days).await {
        Ok(tokens) => ApiResponse::ok(tokens),
        Err(err) => internal_error("Failed to fetch daily tokens", &err),
    }
}

async fn get_raw_stats(State(state): State<Arc<ServerState>>) -> Response {
    match state.engine.raw_stats().await {
        Ok(Some(stats)) => ApiResponse::ok(stats),
        Ok(None) => snapshot_not_found(&state, None).await,
        Err(err) => internal_error("Failed to fetch raw stats", &err),
    }
}

async fn get_file_info(State(state): State<Arc<ServerState>>) -> Response {
    match state.engine.file_info().await {
        Ok(info) => ApiResponse::ok(info),
        Err(err) => internal_error("Failed to fetch file info", &err),
    }
}

async fn snapshot_events(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let stream = BroadcastStream::new(state.updates.subscribe())
        .filter_map(|update| update.ok())
        .map(|snapshot| Event::default().event("snapshot").json_data(snapshot.as_deref()));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
