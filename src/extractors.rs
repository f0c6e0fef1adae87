use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::auth::session::SessionData;
use crate::db::users;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub profile_image: Option<String>,
    /// Session token the identity was resolved from.
    pub token: String,
}

/// Extractor that requires authentication.
/// Rejects with `Unauthorized` (a redirect to the login page) when the cookie
/// is missing, the session expired, or the user no longer exists.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(parts, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let user_id = state
            .sessions
            .load(&token)
            .await?
            .and_then(|data| data.user_id)
            .ok_or(AppError::Unauthorized)?;

        let user = users::find_by_id(&state.db, user_id)?.ok_or(AppError::Unauthorized)?;

        Ok(CurrentUser {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            profile_image: user.profile_image,
            token,
        })
    }
}

/// Optional user extractor — returns None instead of redirecting when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// The session behind the request cookie, logged in or not. Used by the
/// verification flows, which run before a user exists.
pub struct AnySession {
    pub token: Option<String>,
    pub data: SessionData,
}

impl FromRequestParts<AppState> for AnySession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(parts, &state.config.auth.cookie_name) else {
            return Ok(AnySession {
                token: None,
                data: SessionData::default(),
            });
        };

        match state.sessions.load(token).await? {
            Some(data) => Ok(AnySession {
                token: Some(token.to_string()),
                data,
            }),
            None => Ok(AnySession {
                token: None,
                data: SessionData::default(),
            }),
        }
    }
}

fn session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}
