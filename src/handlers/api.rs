use crate::controller::{StartOutcome, StopOutcome};
use crate::error::ApiError;
use crate::metadata::ItemMetadata;
use crate::state::AppState;
use crate::status::FleetStatus;
use axum::{
    Json,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, info, warn};

pub async fn server_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let settings = &state.settings;
    Json(serde_json::json!({
        "port": settings.server_port,
        "state": state.controller.state(),
        "download_dir": settings.download_dir,
        "metadata_dir": settings.metadata_dir,
        "worker_binary": settings.worker_binary,
        "poll_interval_ms": settings.poll_interval_ms,
        "observers": state.broadcaster.observer_count(),
    }))
}

/// Latest published snapshot. While idle this is the last snapshot taken
/// before the job stopped, reported as inactive.
pub async fn get_status(State(state): State<AppState>) -> Json<FleetStatus> {
    let mut status = (*state.status.current()).clone();
    status.active = state.controller.is_active();
    Json(status)
}

pub async fn start_job(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    match state.controller.start().await? {
        StartOutcome::Started { pid } => info!("Download job start requested (pid {:?})", pid),
        StartOutcome::AlreadyActive => info!("Download job already active"),
    }
    Ok(Json(serde_json::json!({ "status": "started" })))
}

pub async fn stop_job(State(state): State<AppState>) -> Json<serde_json::Value> {
    match state.controller.stop().await {
        StopOutcome::Stopped { signalled } => {
            info!("Download job stop requested, {} workers signalled", signalled)
        }
        StopOutcome::AlreadyIdle => info!("Download job already idle"),
    }
    Json(serde_json::json!({ "status": "stopped" }))
}

pub async fn get_item(
    Path(item_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ItemMetadata>, ApiError> {
    let meta = state
        .controller
        .item_metadata(&item_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Item '{}' not found", item_id)))?;

    debug!(
        "Serving metadata for item {} (title {:?}, author {:?}, size {:?})",
        item_id,
        meta.title(),
        meta.author(),
        meta.size()
    );
    Ok(Json(meta))
}

pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(msg) => Some(Ok::<_, axum::Error>(
                Event::default().event("status_update").data(msg),
            )),
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                warn!("SSE observer lagged behind by {} status updates", n);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
