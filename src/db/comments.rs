use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::Comment;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const COMMENT_SELECT: &str =
    "SELECT c.id, c.post_id, c.user_id, u.display_name, c.content, c.created_at \
     FROM comments c JOIN users u ON u.id = c.user_id";

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        author: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Add a comment to an existing post. A missing post is `NotFound`.
pub fn create(pool: &DbPool, post_id: i64, user_id: i64, content: &str) -> AppResult<i64> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "INSERT INTO comments (post_id, user_id, content)
         SELECT id, ?2, ?3 FROM posts WHERE id = ?1",
        params![post_id, user_id, content],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    Ok(conn.last_insert_rowid())
}

pub fn get(pool: &DbPool, id: i64) -> AppResult<Option<Comment>> {
    let conn = pool.get()?;
    let comment = conn
        .query_row(
            &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
            params![id],
            map_comment,
        )
        .optional()?;
    Ok(comment)
}

/// Comments on a post, newest first.
pub fn list_for_post(pool: &DbPool, post_id: i64) -> AppResult<Vec<Comment>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.id DESC"
    ))?;
    let comments = stmt
        .query_map(params![post_id], map_comment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn update(pool: &DbPool, id: i64, content: &str) -> AppResult<()> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE comments SET content = ?1 WHERE id = ?2",
        params![content, id],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn delete(pool: &DbPool, id: i64) -> AppResult<()> {
    let conn = pool.get()?;
    let rows = conn.execute("DELETE FROM comments WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}
