use axum::{Json, Router, extract::State, routing::get};
use deck_media::{CompressOptions, Preset, format_size};
use serde::Serialize;

use crate::{api::AppState, handler::ApiJsonResult};

pub fn system_router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

#[derive(Serialize)]
struct SystemInfo {
    version: &'static str,
    ffmpeg_available: bool,
    max_file_size: u64,
    max_file_size_display: String,
    defaults: CompressOptions,
    presets: Vec<&'static str>,
}

async fn index(State(state): State<AppState>) -> ApiJsonResult<SystemInfo> {
    let transcoder = state.transcoder.clone();
    // Probing spawns ffmpeg.
    let ffmpeg_available = tokio::task::spawn_blocking(move || transcoder.is_available()).await?;
    let max_file_size = state.config.max_file_size();
    Ok(Json(SystemInfo {
        version: env!("CARGO_PKG_VERSION"),
        ffmpeg_available,
        max_file_size,
        max_file_size_display: format_size(max_file_size),
        defaults: CompressOptions::default(),
        presets: Preset::ALL.iter().map(|p| p.as_str()).collect(),
    }))
}
