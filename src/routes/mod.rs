pub mod assets;
pub mod auth;
pub mod board;
pub mod comments;
pub mod profile;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let uploads = ServeDir::new(state.config.uploads_path());
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/assets/{*path}", get(assets::serve))
        .merge(auth::router())
        .merge(board::router())
        .merge(comments::router())
        .merge(profile::router())
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
