use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .route("/send-code", post(handlers::send_code))
        .route(
            "/forgot-password",
            get(handlers::forgot_password_page).post(handlers::forgot_password),
        )
        .route("/reset-password", post(handlers::reset_password))
        .route(
            "/find-id",
            get(handlers::find_id_page).post(handlers::find_id),
        )
        .route("/find-id/confirm", post(handlers::find_id_confirm))
}
