use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use serde_json::json;

use crate::activity;
use crate::auth::guard::ensure_owner;
use crate::db::comments;
use crate::db::models::Comment;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::views::Html;

#[derive(Template)]
#[template(path = "pages/edit_comment.html")]
struct EditCommentTemplate {
    comment: Comment,
}

#[derive(Deserialize)]
struct CommentForm {
    content: String,
}

impl CommentForm {
    fn content(&self) -> AppResult<&str> {
        let content = self.content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("Comment cannot be empty".into()));
        }
        Ok(content)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/post/{id}/comments", post(create))
        .route("/post/{id}/comment", post(create))
        .route("/comments/{id}/edit", get(edit_page))
        .route(
            "/comments/{id}",
            axum::routing::put(update).post(update).delete(destroy),
        )
        .route("/comments/{id}/delete", post(destroy))
}

/// POST /post/{id}/comments
async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let comment_id = comments::create(&state.db, post_id, user.id, form.content()?)?;

    activity::record(
        &state.db,
        Some(user.id),
        "comment_create",
        json!({ "post_id": post_id, "comment_id": comment_id }),
    );
    Ok(Redirect::to(&format!("/post/{post_id}")).into_response())
}

async fn edit_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let comment = comments::get(&state.db, id)?.ok_or(AppError::NotFound)?;
    ensure_owner(&user, &comment)?;
    Ok(Html(EditCommentTemplate { comment }).into_response())
}

/// PUT|POST /comments/{id} — owner-only
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let comment = comments::get(&state.db, id)?.ok_or(AppError::NotFound)?;
    ensure_owner(&user, &comment)?;
    comments::update(&state.db, id, form.content()?)?;

    activity::record(
        &state.db,
        Some(user.id),
        "comment_update",
        json!({ "comment_id": id }),
    );
    Ok(Redirect::to(&format!("/post/{}", comment.post_id)).into_response())
}

/// DELETE /comments/{id}, POST /comments/{id}/delete — owner-only
async fn destroy(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let comment = comments::get(&state.db, id)?.ok_or(AppError::NotFound)?;
    ensure_owner(&user, &comment)?;
    comments::delete(&state.db, id)?;

    activity::record(
        &state.db,
        Some(user.id),
        "comment_delete",
        json!({ "comment_id": id }),
    );
    Ok(Redirect::to(&format!("/post/{}", comment.post_id)).into_response())
}
