pub mod api;
pub mod app_state;
pub mod config;
pub mod sampler;

use anyhow::Context as _;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::routing::{get, post};
use ffmpeg_next::{self as ffmpeg};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

//
// Re-export
//
pub use api::{
    ApiError, create_message, extract_frames, log_request_errors, serve_frame, serve_upload,
};
pub use app_state::AppState;
pub use config::Config;
pub use sampler::{FrameSampler, SampleError, choose_frame_indices, extract_random_frames};

/// Builds the HTTP router around an already initialised state.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/message", post(create_message))
        .route("/extract-frames", post(extract_frames))
        .route("/uploads/{filename}", get(serve_upload))
        .route("/temp/{filename}", get(serve_frame))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(axum::middleware::from_fn(log_request_errors))
        .layer(cors)
        .layer(Extension(state))
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    ffmpeg::init().context("Failed to initialize ffmpeg")?;
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);

    let state = AppState::new(&config).context("Failed to create app state")?;
    let app = router(state, config.max_upload_bytes());

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");

    axum::serve(listener, app).await.context("HTTP server error")
}
