use askama::Template;
use axum::extract::State;
use axum::http::header;
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;
use serde_json::json;

use crate::activity;
use crate::auth::session::{self, SessionData};
use crate::auth::verification::{self, CodePurpose};
use crate::auth::password;
use crate::config::Config;
use crate::db::users::{self, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::{AnySession, MaybeUser};
use crate::mailer;
use crate::state::AppState;
use crate::views::{Html, MessageTemplate};

// -- Templates --

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub verify_email: bool,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate;

#[derive(Template)]
#[template(path = "pages/forgot_password.html")]
pub struct ForgotPasswordTemplate;

#[derive(Template)]
#[template(path = "pages/reset_password.html")]
pub struct ResetPasswordTemplate {
    pub email: String,
}

#[derive(Template)]
#[template(path = "pages/find_id.html")]
pub struct FindIdTemplate;

#[derive(Template)]
#[template(path = "pages/find_id_confirm.html")]
pub struct FindIdConfirmTemplate {
    pub email: String,
}

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterForm {
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct EmailForm {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordForm {
    pub username: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordForm {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct CodeForm {
    pub email: String,
    pub code: String,
}

// -- Cookie helpers --

pub fn session_cookie(config: &Config, token: &str) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        config.auth.cookie_name,
        token,
        config.session_ttl_secs()
    )
}

pub fn clear_session_cookie(config: &Config) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0",
        config.auth.cookie_name
    )
}

/// Persist `data` under the request's session, starting an anonymous session
/// when there is none. Returns the cookie to set for a new session.
async fn store_session(
    state: &AppState,
    token: Option<&str>,
    data: &SessionData,
) -> AppResult<Option<String>> {
    match token {
        Some(token) => {
            state.sessions.save(token, data).await?;
            Ok(None)
        }
        None => {
            let token = session::create_session(state.sessions.as_ref(), data).await?;
            Ok(Some(session_cookie(&state.config, &token)))
        }
    }
}

fn with_cookie(cookie: Option<String>, response: impl IntoResponse) -> Response {
    (
        AppendHeaders(cookie.map(|c| (header::SET_COOKIE, c))),
        response,
    )
        .into_response()
}

pub(crate) fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
            Ok(email.to_string())
        }
        _ => Err(AppError::BadRequest("Enter a valid email address".into())),
    }
}

fn required<'a>(value: &'a str, label: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{label} is required")));
    }
    Ok(value)
}

// -- Registration --

/// GET /register
pub async fn register_page(State(state): State<AppState>) -> AppResult<Response> {
    Ok(Html(RegisterTemplate {
        verify_email: state.config.auth.verify_email,
    })
    .into_response())
}

/// POST /send-code — email a registration code
pub async fn send_code(
    State(state): State<AppState>,
    session: AnySession,
    Form(form): Form<EmailForm>,
) -> AppResult<Response> {
    let email = normalize_email(&form.email)?;

    let mut data = session.data;
    let code = verification::issue(&mut data, CodePurpose::Register, &email, None);
    state
        .mailer
        .send(mailer::verification_mail(&email, &code))
        .await?;
    let cookie = store_session(&state, session.token.as_deref(), &data).await?;

    tracing::info!("Issued registration code to {}", email);
    Ok(with_cookie(
        cookie,
        Html(
            MessageTemplate::new(format!("A verification code was sent to {email}."))
                .with_link("/register", "Continue registration"),
        ),
    ))
}

/// POST /register — create an account; duplicates are a conflict
pub async fn register(
    State(state): State<AppState>,
    session: AnySession,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let username = required(&form.username, "Username")?;
    let display_name = match form.display_name.trim() {
        "" => username,
        name => name,
    };
    let email = normalize_email(&form.email)?;
    password::validate(&form.password).map_err(|m| AppError::BadRequest(m.into()))?;

    let mut data = session.data;
    if state.config.auth.verify_email {
        verification::consume(&mut data, CodePurpose::Register, &email, form.code.trim())?;
    }

    let password_hash = password::hash(&form.password, state.config.auth.bcrypt_cost)?;
    let user_id = users::create(
        &state.db,
        &NewUser {
            username,
            display_name,
            password_hash: &password_hash,
            email: &email,
        },
    )?;

    // Only commit the consumed code once the account exists.
    if let Some(token) = session.token.as_deref() {
        state.sessions.save(token, &data).await?;
    }

    tracing::info!("Registered user {} ({})", username, user_id);
    activity::record(
        &state.db,
        Some(user_id),
        "register",
        json!({ "username": username }),
    );
    Ok(Html(MessageTemplate::new("Registration complete.").with_link("/login", "Log in"))
        .into_response())
}

// -- Login / logout --

/// GET /login
pub async fn login_page() -> AppResult<Response> {
    Ok(Html(LoginTemplate).into_response())
}

/// POST /login — verify credentials and start a session
pub async fn login(
    State(state): State<AppState>,
    session: AnySession,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    let user = users::find_by_username(&state.db, form.username.trim())?
        .filter(|user| password::verify(&form.password, &user.password_hash))
        .ok_or_else(|| {
            tracing::warn!("Failed login for {}", form.username.trim());
            AppError::InvalidCredentials
        })?;

    // Never reuse a pre-login token for the authenticated session.
    if let Some(old) = session.token.as_deref() {
        state.sessions.delete(old).await?;
    }
    let token =
        session::create_session(state.sessions.as_ref(), &SessionData::for_user(user.id)).await?;

    tracing::info!("User {} logged in", user.id);
    activity::record(&state.db, Some(user.id), "login", json!({}));
    Ok(with_cookie(
        Some(session_cookie(&state.config, &token)),
        Redirect::to("/"),
    ))
}

/// GET /logout
pub async fn logout(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    session: AnySession,
) -> AppResult<Response> {
    if let Some(token) = session.token.as_deref() {
        state.sessions.delete(token).await?;
    }
    if let Some(user) = maybe_user.0 {
        activity::record(&state.db, Some(user.id), "logout", json!({}));
    }

    Ok(with_cookie(
        Some(clear_session_cookie(&state.config)),
        Redirect::to("/login"),
    ))
}

// -- Password reset --

/// GET /forgot-password
pub async fn forgot_password_page() -> AppResult<Response> {
    Ok(Html(ForgotPasswordTemplate).into_response())
}

/// POST /forgot-password — email a reset code for a username + email pair
pub async fn forgot_password(
    State(state): State<AppState>,
    session: AnySession,
    Form(form): Form<ForgotPasswordForm>,
) -> AppResult<Response> {
    let username = required(&form.username, "Username")?;
    let email = normalize_email(&form.email)?;
    let user = users::find_by_username_and_email(&state.db, username, &email)?
        .ok_or(AppError::NotFound)?;

    let mut data = session.data;
    let code = verification::issue(
        &mut data,
        CodePurpose::ResetPassword,
        &email,
        Some(&user.username),
    );
    state
        .mailer
        .send(mailer::verification_mail(&email, &code))
        .await?;
    let cookie = store_session(&state, session.token.as_deref(), &data).await?;

    Ok(with_cookie(cookie, Html(ResetPasswordTemplate { email })))
}

/// POST /reset-password — consume the code and set a new password
pub async fn reset_password(
    State(state): State<AppState>,
    session: AnySession,
    Form(form): Form<ResetPasswordForm>,
) -> AppResult<Response> {
    password::validate(&form.new_password).map_err(|m| AppError::BadRequest(m.into()))?;
    let email = form.email.trim();

    let mut data = session.data;
    let pending =
        verification::consume(&mut data, CodePurpose::ResetPassword, email, form.code.trim())?;
    let username = pending.username.as_deref().unwrap_or_default();
    let user =
        users::find_by_username_and_email(&state.db, username, email)?.ok_or(AppError::NotFound)?;

    let password_hash = password::hash(&form.new_password, state.config.auth.bcrypt_cost)?;
    users::update_password(&state.db, user.id, &password_hash)?;
    if let Some(token) = session.token.as_deref() {
        state.sessions.save(token, &data).await?;
    }

    tracing::info!("Password reset for user {}", user.id);
    activity::record(&state.db, Some(user.id), "password_reset", json!({}));
    Ok(
        Html(MessageTemplate::new("Your password has been changed.").with_link("/login", "Log in"))
            .into_response(),
    )
}

// -- Login handle recovery --

/// GET /find-id
pub async fn find_id_page() -> AppResult<Response> {
    Ok(Html(FindIdTemplate).into_response())
}

/// POST /find-id — email a code to an address that has accounts
pub async fn find_id(
    State(state): State<AppState>,
    session: AnySession,
    Form(form): Form<EmailForm>,
) -> AppResult<Response> {
    let email = normalize_email(&form.email)?;
    if users::find_by_email(&state.db, &email)?.is_empty() {
        return Err(AppError::NotFound);
    }

    let mut data = session.data;
    let code = verification::issue(&mut data, CodePurpose::FindId, &email, None);
    state
        .mailer
        .send(mailer::verification_mail(&email, &code))
        .await?;
    let cookie = store_session(&state, session.token.as_deref(), &data).await?;

    Ok(with_cookie(cookie, Html(FindIdConfirmTemplate { email })))
}

/// POST /find-id/confirm — consume the code and email the login IDs
pub async fn find_id_confirm(
    State(state): State<AppState>,
    session: AnySession,
    Form(form): Form<CodeForm>,
) -> AppResult<Response> {
    let email = form.email.trim();

    let mut data = session.data;
    verification::consume(&mut data, CodePurpose::FindId, email, form.code.trim())?;
    let usernames: Vec<String> = users::find_by_email(&state.db, email)?
        .into_iter()
        .map(|u| u.username)
        .collect();
    if usernames.is_empty() {
        return Err(AppError::NotFound);
    }

    state
        .mailer
        .send(mailer::username_reminder_mail(email, &usernames))
        .await?;
    if let Some(token) = session.token.as_deref() {
        state.sessions.save(token, &data).await?;
    }

    Ok(Html(
        MessageTemplate::new(format!("Your login ID was sent to {email}."))
            .with_link("/login", "Log in"),
    )
    .into_response())
}
