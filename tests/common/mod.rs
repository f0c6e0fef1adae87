//! Shared harness: a router over a temp-dir database with in-memory sessions
//! and a mailer that keeps everything it sends.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

use board::auth::session::MemorySessionStore;
use board::config::{Config, SessionBackend};
use board::db;
use board::mailer::MemoryMailer;
use board::routes;
use board::state::{AppState, DbPool};

pub const PASSWORD: &str = "hunter2hunter2";
const BOUNDARY: &str = "board-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub mailer: Arc<MemoryMailer>,
    pub config: Config,
    pub tmp: TempDir,
}

pub struct Upload<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub bytes: &'a [u8],
}

impl TestApp {
    pub fn new(verify_email: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.resolve_paths(tmp.path());
        config.auth.verify_email = verify_email;
        config.auth.bcrypt_cost = 4;
        config.auth.session_backend = SessionBackend::Memory;
        std::fs::create_dir_all(config.uploads_path()).unwrap();

        let pool = db::create_pool(&config.db_path()).unwrap();
        db::run_migrations(&pool).unwrap();

        let mailer = Arc::new(MemoryMailer::new());
        let ttl = std::time::Duration::from_secs(config.session_ttl_secs());
        let state = AppState {
            db: pool.clone(),
            config: config.clone(),
            sessions: Arc::new(MemorySessionStore::new(ttl)),
            mailer: mailer.clone(),
        };

        Self {
            router: routes::app(state),
            pool,
            mailer,
            config,
            tmp,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn form(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> Response<Body> {
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    pub async fn post_form(
        &self,
        uri: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> Response<Body> {
        self.form(Method::POST, uri, cookie, fields).await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        cookie: &str,
        fields: &[(&str, &str)],
        upload: Option<Upload<'_>>,
    ) -> Response<Body> {
        let uploads: Vec<Upload<'_>> = upload.into_iter().collect();
        self.multipart_files(method, uri, cookie, fields, &uploads).await
    }

    /// Multipart request with text fields first, then every file part in order.
    pub async fn multipart_files(
        &self,
        method: Method,
        uri: &str,
        cookie: &str,
        fields: &[(&str, &str)],
        uploads: &[Upload<'_>],
    ) -> Response<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for upload in uploads {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    upload.field, upload.filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(upload.bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Register (without email verification) and log in. Returns the cookie.
    pub async fn signup(&self, username: &str) -> String {
        let email = format!("{username}@example.com");
        let response = self
            .post_form(
                "/register",
                None,
                &[
                    ("username", username),
                    ("display_name", username),
                    ("password", PASSWORD),
                    ("email", &email),
                ],
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "register {username}");
        self.login(username, PASSWORD).await.expect("login")
    }

    /// Log in, returning the session cookie on success.
    pub async fn login(&self, username: &str, password: &str) -> Option<String> {
        let response = self
            .post_form(
                "/login",
                None,
                &[("username", username), ("password", password)],
            )
            .await;
        session_cookie(&response)
    }

    pub async fn write_post(&self, cookie: &str, title: &str, rating: &str) -> i64 {
        let response = self
            .multipart(
                Method::POST,
                "/write",
                cookie,
                &[("title", title), ("content", "body text"), ("rating", rating)],
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        self.query_i64("SELECT MAX(id) FROM posts")
    }

    pub fn query_i64(&self, sql: &str) -> i64 {
        let conn = self.pool.get().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    pub fn query_string(&self, sql: &str) -> Option<String> {
        let conn = self.pool.get().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }
}

/// `name=value` of a non-empty session cookie set by the response.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with("board_session=") && pair.len() > "board_session=".len())
        .map(str::to_string)
}

pub fn location(response: &Response<Body>) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Six-digit code from the most recent mail to `to`.
pub async fn last_code(mailer: &MemoryMailer, to: &str) -> String {
    let mail = mailer.last_to(to).await.expect("mail sent");
    mail.body
        .split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 6)
        .expect("code in body")
        .to_string()
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
