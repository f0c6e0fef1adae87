//! Append-only activity log. Each entry is a JSON document keyed by the
//! time it was recorded.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::state::DbPool;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityDocument {
    pub user_id: Option<i64>,
    pub action: String,
    #[serde(default)]
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub id: i64,
    pub recorded_at: String,
    pub document: ActivityDocument,
}

/// Record an event. Failures are logged and swallowed so that logging never
/// fails the request that triggered it.
pub fn record(pool: &DbPool, user_id: Option<i64>, action: &str, detail: serde_json::Value) {
    let document = ActivityDocument {
        user_id,
        action: action.to_string(),
        detail,
    };
    if let Err(e) = append(pool, &document) {
        tracing::warn!("Failed to record activity {}: {}", action, e);
    }
}

fn append(pool: &DbPool, document: &ActivityDocument) -> AppResult<()> {
    let json = serde_json::to_string(document)?;
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO activity_log (recorded_at, document) VALUES (?1, ?2)",
        params![Utc::now().to_rfc3339(), json],
    )?;
    Ok(())
}

/// Most recent entries first.
pub fn recent(pool: &DbPool, limit: usize) -> AppResult<Vec<ActivityEntry>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, recorded_at, document FROM activity_log
         ORDER BY recorded_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut entries = Vec::with_capacity(rows.len());
    for (id, recorded_at, json) in rows {
        entries.push(ActivityEntry {
            id,
            recorded_at,
            document: serde_json::from_str(&json)?,
        });
    }
    Ok(entries)
}
