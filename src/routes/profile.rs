use askama::Template;
use axum::extract::{Multipart, State};
use axum::http::header;
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use serde_json::json;

use crate::activity;
use crate::auth::handlers::{clear_session_cookie, normalize_email};
use crate::auth::password;
use crate::db::models::User;
use crate::db::users::{self, ProfileUpdate};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::uploads::{self, UploadForm};
use crate::views::Html;

#[derive(Template)]
#[template(path = "pages/confirm_password.html")]
struct ConfirmPasswordTemplate;

#[derive(Template)]
#[template(path = "pages/profile.html")]
struct ProfileTemplate {
    user: User,
}

#[derive(Deserialize)]
struct PasswordForm {
    password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/profile",
            get(confirm_page)
                .post(confirm)
                .put(update)
                .delete(destroy),
        )
        .route("/profile/edit", post(update))
        .route("/profile/delete", post(destroy))
}

/// Load the account behind the session and check `password` against it.
fn verified_account(state: &AppState, user: &CurrentUser, password: &str) -> AppResult<User> {
    let account = users::find_by_id(&state.db, user.id)?.ok_or(AppError::Unauthorized)?;
    if !password::verify(password, &account.password_hash) {
        tracing::warn!("Password confirmation failed for user {}", user.id);
        return Err(AppError::InvalidCredentials);
    }
    Ok(account)
}

/// GET /profile — ask for the password before showing account details
async fn confirm_page(_user: CurrentUser) -> AppResult<Response> {
    Ok(Html(ConfirmPasswordTemplate).into_response())
}

/// POST /profile — password confirmed, show the edit form
async fn confirm(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<PasswordForm>,
) -> AppResult<Response> {
    let account = verified_account(&state, &user, &form.password)?;
    Ok(Html(ProfileTemplate { user: account }).into_response())
}

/// PUT /profile, POST /profile/edit — multipart: current_password,
/// display_name, email, new_password, profile_image
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let dir = state.config.uploads_path();
    let form = UploadForm::read(multipart, "profile_image", &dir).await?;

    if let Err(e) = apply_update(&state, &user, &form) {
        if let Some(file) = &form.file {
            uploads::discard(&dir, file).await;
        }
        return Err(e);
    }

    tracing::info!("User {} updated their profile", user.id);
    activity::record(&state.db, Some(user.id), "profile_update", json!({}));
    Ok(Redirect::to("/").into_response())
}

fn apply_update(state: &AppState, user: &CurrentUser, form: &UploadForm) -> AppResult<()> {
    verified_account(state, user, form.text("current_password"))?;

    let email = form.optional("email").map(normalize_email).transpose()?;

    // Taken exactly as typed; empty keeps the current password.
    let password_hash = match form.text("new_password") {
        "" => None,
        new_password => {
            password::validate(new_password).map_err(|m| AppError::BadRequest(m.into()))?;
            Some(password::hash(new_password, state.config.auth.bcrypt_cost)?)
        }
    };

    users::update_profile(
        &state.db,
        user.id,
        &ProfileUpdate {
            display_name: form.optional("display_name"),
            email: email.as_deref(),
            password_hash: password_hash.as_deref(),
            profile_image: form.file.as_deref(),
        },
    )
}

/// DELETE /profile, POST /profile/delete — remove the account and its content
async fn destroy(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<PasswordForm>,
) -> AppResult<Response> {
    verified_account(&state, &user, &form.password)?;
    users::delete(&state.db, user.id)?;
    state.sessions.delete(&user.token).await?;

    tracing::info!("User {} deleted their account", user.id);
    activity::record(&state.db, Some(user.id), "account_delete", json!({}));
    Ok((
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(&state.config))]),
        Redirect::to("/register"),
    )
        .into_response())
}
