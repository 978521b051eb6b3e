use std::sync::Arc;

use anyhow::Context;
use axum::{Router, extract::DefaultBodyLimit};
use deck_media::Transcoder;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::SqueezeConfig;

/// Room for the form fields and multipart framing around the file itself.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(Clone)]
pub(crate) struct AppState {
    pub config: Arc<SqueezeConfig>,
    pub transcoder: Transcoder,
}

impl AppState {
    pub fn new(config: SqueezeConfig) -> Self {
        let transcoder = Transcoder::new(config.ffmpeg());
        Self {
            config: Arc::new(config),
            transcoder,
        }
    }
}

pub(crate) fn app_router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_file_size()
        .saturating_add(MULTIPART_OVERHEAD)
        .try_into()
        .unwrap_or(usize::MAX);

    Router::new()
        .merge(crate::handler::compress::compress_router())
        .nest("/cleanup", crate::handler::cleanup::cleanup_router())
        .nest("/system", crate::handler::system::system_router())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub(crate) fn start_api_server(
    state: AppState,
    cancel: CancellationToken,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let addr = state.config.bind_addr().to_string();
        let app = app_router(state);

        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                // Stops the sweeper and the main loop as well.
                cancel.cancel();
                return Err(e).with_context(|| format!("bind {}", addr));
            }
        };
        log::info!("API server listening on http://{}", addr);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
            .context("run API server")
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Shutting down API server...");
}
