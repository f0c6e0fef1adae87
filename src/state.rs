use std::sync::Arc;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::session::{MemorySessionStore, SessionStore, SqliteSessionStore};
use crate::config::{Config, SessionBackend};
use crate::error::AppResult;
use crate::mailer::{LogMailer, Mailer, SmtpMailer};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub sessions: Arc<dyn SessionStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Wire up the session store and mailer the config asks for.
    pub fn new(db: DbPool, config: Config) -> AppResult<Self> {
        let ttl = Duration::from_secs(config.session_ttl_secs());
        let sessions: Arc<dyn SessionStore> = match config.auth.session_backend {
            SessionBackend::Sqlite => Arc::new(SqliteSessionStore::new(db.clone(), ttl)),
            SessionBackend::Memory => Arc::new(MemorySessionStore::new(ttl)),
        };

        let mailer: Arc<dyn Mailer> = match &config.mail {
            Some(mail) => Arc::new(SmtpMailer::new(mail)?),
            None => {
                tracing::warn!("No [mail] section configured; emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        Ok(Self {
            db,
            config,
            sessions,
            mailer,
        })
    }
}
