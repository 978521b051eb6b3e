use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;

use crate::{
    api::AppState,
    handler::{ApiError, ApiResult},
    workspace,
};

pub fn cleanup_router() -> Router<AppState> {
    Router::new().route("/", get(cleanup))
}

#[derive(Deserialize)]
struct CleanupQuery {
    key: Option<String>,
}

/// Removes job directories older than the configured TTL.
async fn cleanup(
    State(state): State<AppState>,
    Query(query): Query<CleanupQuery>,
) -> ApiResult<String> {
    let Some(expected) = state.config.cleanup_key() else {
        log::warn!("cleanup requested but no cleanup key is configured");
        return Err(ApiError::Unauthorized);
    };
    if query.key.as_deref() != Some(expected) {
        log::warn!("cleanup requested with a wrong key");
        return Err(ApiError::Unauthorized);
    }

    let work_dir = state.config.work_dir().to_path_buf();
    let ttl = state.config.file_ttl();
    let removed =
        tokio::task::spawn_blocking(move || workspace::sweep_stale_jobs(&work_dir, ttl)).await??;
    log::info!("cleanup removed {} stale jobs", removed);
    Ok(format!("Cleaned up: {} stale jobs", removed))
}
