use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::verification::PendingCode;
use crate::error::AppResult;
use crate::state::DbPool;

/// Server-side state behind a session cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    /// Set once the session has logged in.
    pub user_id: Option<i64>,
    /// Outstanding verification codes, at most one per purpose.
    #[serde(default)]
    pub pending_codes: Vec<PendingCode>,
}

impl SessionData {
    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            pending_codes: Vec::new(),
        }
    }
}

/// Storage for sessions keyed by opaque token.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live (unexpired) session.
    async fn load(&self, token: &str) -> AppResult<Option<SessionData>>;

    /// Insert or replace a session. New sessions expire one TTL after creation;
    /// updates keep the original expiry.
    async fn save(&self, token: &str, data: &SessionData) -> AppResult<()>;

    async fn delete(&self, token: &str) -> AppResult<()>;

    /// Drop expired sessions, returning how many were removed.
    async fn purge_expired(&self) -> AppResult<usize>;
}

/// SQLite-backed sessions; survive restarts.
pub struct SqliteSessionStore {
    pool: DbPool,
    ttl: Duration,
}

impl SqliteSessionStore {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, token: &str) -> AppResult<Option<SessionData>> {
        let conn = self.pool.get()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT data FROM sessions WHERE token = ?1 AND expires_at > datetime('now')",
                params![token],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, token: &str, data: &SessionData) -> AppResult<()> {
        let conn = self.pool.get()?;
        let json = serde_json::to_string(data)?;

        conn.execute(
            "INSERT INTO sessions (token, data, expires_at)
             VALUES (?1, ?2, datetime('now', ?3))
             ON CONFLICT(token) DO UPDATE SET data = excluded.data",
            params![token, json, format!("+{} seconds", self.ttl.as_secs())],
        )?;

        Ok(())
    }

    async fn delete(&self, token: &str) -> AppResult<()> {
        let conn = self.pool.get()?;
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE expires_at <= datetime('now')",
            [],
        )?;
        Ok(rows)
    }
}

struct MemoryEntry {
    data: SessionData,
    expires_at: Instant,
}

/// Process-local sessions, lost on restart.
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, token: &str) -> AppResult<Option<SessionData>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(token)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.data.clone()))
    }

    async fn save(&self, token: &str, data: &SessionData) -> AppResult<()> {
        let mut sessions = self.sessions.lock().await;
        let expires_at = Instant::now() + self.ttl;
        sessions
            .entry(token.to_string())
            .and_modify(|entry| entry.data = data.clone())
            .or_insert_with(|| MemoryEntry {
                data: data.clone(),
                expires_at,
            });
        Ok(())
    }

    async fn delete(&self, token: &str) -> AppResult<()> {
        self.sessions.lock().await.remove(token);
        Ok(())
    }

    async fn purge_expired(&self) -> AppResult<usize> {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let now = Instant::now();
        sessions.retain(|_, entry| now < entry.expires_at);
        Ok(before - sessions.len())
    }
}

/// Start a session holding `data`. Returns the new token.
pub async fn create_session(store: &dyn SessionStore, data: &SessionData) -> AppResult<String> {
    let token = generate_token();
    store.save(&token, data).await?;
    Ok(token)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verification::{self, CodePurpose};
    use crate::db::test_pool;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    async fn exercise_store(store: &dyn SessionStore) {
        let token = create_session(store, &SessionData::for_user(7)).await.unwrap();
        let loaded = store.load(&token).await.unwrap().unwrap();
        assert_eq!(loaded.user_id, Some(7));

        let mut updated = loaded.clone();
        verification::issue(&mut updated, CodePurpose::Register, "a@example.com", None);
        store.save(&token, &updated).await.unwrap();
        assert_eq!(store.load(&token).await.unwrap().unwrap(), updated);

        store.delete(&token).await.unwrap();
        assert!(store.load(&token).await.unwrap().is_none());
        assert!(store.load("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        exercise_store(&MemorySessionStore::new(HOUR)).await;
    }

    #[tokio::test]
    async fn sqlite_store_round_trip() {
        exercise_store(&SqliteSessionStore::new(test_pool(), HOUR)).await;
    }

    #[tokio::test]
    async fn memory_store_expires_sessions() {
        let store = MemorySessionStore::new(Duration::ZERO);
        let token = create_session(&store, &SessionData::for_user(1)).await.unwrap();
        assert!(store.load(&token).await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sqlite_store_expires_sessions() {
        let store = SqliteSessionStore::new(test_pool(), Duration::ZERO);
        let token = create_session(&store, &SessionData::for_user(1)).await.unwrap();
        assert!(store.load(&token).await.unwrap().is_none());
        assert_eq!(store.purge_expired().await.unwrap(), 1);
    }
}
