use askama::Template;
use axum::extract::{Multipart, Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{delete, get};
use axum::Router;
use serde_json::json;

use crate::activity;
use crate::auth::guard::ensure_owner;
use crate::db::comments;
use crate::db::models::{Comment, Post};
use crate::db::posts::{self, ListParams, ListQuery, PostInput};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;
use crate::uploads::{self, UploadForm};
use crate::views::Html;

const MAX_RATING: i64 = 5;

#[derive(Template)]
#[template(path = "pages/index.html")]
struct IndexTemplate {
    display_name: String,
    posts: Vec<Post>,
    query: String,
    sort: &'static str,
    order: &'static str,
}

#[derive(Template)]
#[template(path = "pages/write.html")]
struct WriteTemplate;

#[derive(Template)]
#[template(path = "pages/post.html")]
struct PostTemplate {
    post: Post,
    comments: Vec<Comment>,
    viewer_id: i64,
}

#[derive(Template)]
#[template(path = "pages/edit.html")]
struct EditTemplate {
    post: Post,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/board", get(index))
        .route("/write", get(write_page).post(write))
        .route("/post/{id}", get(show))
        .route("/edit/{id}", get(edit_page).put(update).post(update))
        .route("/delete/{id}", delete(destroy).post(destroy))
}

/// GET / — post list with optional search and sort
async fn index(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let query = ListQuery::from(&params);
    let posts = posts::list(&state.db, &query)?;

    Ok(Html(IndexTemplate {
        display_name: user.display_name,
        posts,
        query: query.search.unwrap_or_default(),
        sort: query.sort.as_str(),
        order: query.order.as_str(),
    })
    .into_response())
}

async fn write_page(_user: CurrentUser) -> AppResult<Response> {
    Ok(Html(WriteTemplate).into_response())
}

/// POST /write — multipart: title, content, rating, lat, lng, image
async fn write(
    State(state): State<AppState>,
    user: CurrentUser,
    multipart: Multipart,
) -> AppResult<Response> {
    let dir = state.config.uploads_path();
    let form = UploadForm::read(multipart, "image", &dir).await?;

    let created = post_input(&form)
        .and_then(|input| posts::create(&state.db, user.id, &input, form.file.as_deref()));
    let post_id = match created {
        Ok(id) => id,
        Err(e) => {
            if let Some(file) = &form.file {
                uploads::discard(&dir, file).await;
            }
            return Err(e);
        }
    };

    tracing::info!("User {} created post {}", user.id, post_id);
    activity::record(
        &state.db,
        Some(user.id),
        "post_create",
        json!({ "post_id": post_id }),
    );
    Ok(Redirect::to("/").into_response())
}

/// GET /post/{id} — a post and its comments, newest first
async fn show(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let post = posts::get(&state.db, id)?.ok_or(AppError::NotFound)?;
    let comments = comments::list_for_post(&state.db, id)?;

    Ok(Html(PostTemplate {
        post,
        comments,
        viewer_id: user.id,
    })
    .into_response())
}

async fn edit_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let post = posts::get(&state.db, id)?.ok_or(AppError::NotFound)?;
    ensure_owner(&user, &post)?;
    Ok(Html(EditTemplate { post }).into_response())
}

/// PUT|POST /edit/{id} — owner-only; keeps the old image when none is uploaded
async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> AppResult<Response> {
    let dir = state.config.uploads_path();
    let form = UploadForm::read(multipart, "image", &dir).await?;

    let result = post_input(&form).and_then(|input| {
        let post = posts::get(&state.db, id)?.ok_or(AppError::NotFound)?;
        ensure_owner(&user, &post)?;
        posts::update(&state.db, id, &input, form.file.as_deref())
    });
    if let Err(e) = result {
        if let Some(file) = &form.file {
            uploads::discard(&dir, file).await;
        }
        return Err(e);
    }

    activity::record(&state.db, Some(user.id), "post_update", json!({ "post_id": id }));
    Ok(Redirect::to(&format!("/post/{id}")).into_response())
}

/// DELETE|POST /delete/{id} — owner-only; removes the post's comments too
async fn destroy(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    let post = posts::get(&state.db, id)?.ok_or(AppError::NotFound)?;
    ensure_owner(&user, &post)?;
    posts::delete(&state.db, id)?;

    tracing::info!("User {} deleted post {}", user.id, id);
    activity::record(&state.db, Some(user.id), "post_delete", json!({ "post_id": id }));
    Ok(Redirect::to("/").into_response())
}

fn post_input(form: &UploadForm) -> AppResult<PostInput> {
    let title = form
        .optional("title")
        .ok_or_else(|| AppError::BadRequest("Title is required".into()))?
        .to_string();

    let rating = match form.optional("rating") {
        Some(raw) => raw
            .parse::<i64>()
            .ok()
            .filter(|r| (0..=MAX_RATING).contains(r))
            .ok_or_else(|| {
                AppError::BadRequest(format!("Rating must be a number from 0 to {MAX_RATING}"))
            })?,
        None => 0,
    };

    Ok(PostInput {
        title,
        content: form.text("content").to_string(),
        rating,
        lat: coordinate(form.optional("lat"), 90.0, "Latitude")?,
        lng: coordinate(form.optional("lng"), 180.0, "Longitude")?,
    })
}

fn coordinate(raw: Option<&str>, limit: f64, label: &str) -> AppResult<Option<f64>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && v.abs() <= limit)
        .map(Some)
        .ok_or_else(|| AppError::BadRequest(format!("{label} must be between -{limit} and {limit}")))
}
