use rusqlite::{params, OptionalExtension, Row};

use crate::db::is_constraint_violation;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const USER_COLUMNS: &str =
    "id, username, display_name, password_hash, email, profile_image, created_at";

pub struct NewUser<'a> {
    pub username: &'a str,
    pub display_name: &'a str,
    pub password_hash: &'a str,
    pub email: &'a str,
}

/// Profile fields a user may change; `None` keeps the current value.
#[derive(Default)]
pub struct ProfileUpdate<'a> {
    pub display_name: Option<&'a str>,
    pub email: Option<&'a str>,
    pub password_hash: Option<&'a str>,
    pub profile_image: Option<&'a str>,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        display_name: row.get(2)?,
        password_hash: row.get(3)?,
        email: row.get(4)?,
        profile_image: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn conflict_or(err: rusqlite::Error) -> AppError {
    if is_constraint_violation(&err) {
        AppError::Conflict("That username or display name is already taken".into())
    } else {
        err.into()
    }
}

pub fn create(pool: &DbPool, user: &NewUser<'_>) -> AppResult<i64> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO users (username, display_name, password_hash, email) VALUES (?1, ?2, ?3, ?4)",
        params![user.username, user.display_name, user.password_hash, user.email],
    )
    .map_err(conflict_or)?;
    Ok(conn.last_insert_rowid())
}

pub fn find_by_id(pool: &DbPool, id: i64) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn find_by_username(pool: &DbPool, username: &str) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
            params![username],
            map_user,
        )
        .optional()?;
    Ok(user)
}

/// All accounts registered with `email`, oldest first.
pub fn find_by_email(pool: &DbPool, email: &str) -> AppResult<Vec<User>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = ?1 ORDER BY id"
    ))?;
    let users = stmt
        .query_map(params![email], map_user)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}

pub fn find_by_username_and_email(
    pool: &DbPool,
    username: &str,
    email: &str,
) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 AND email = ?2"),
            params![username, email],
            map_user,
        )
        .optional()?;
    Ok(user)
}

pub fn update_profile(pool: &DbPool, id: i64, update: &ProfileUpdate<'_>) -> AppResult<()> {
    let conn = pool.get()?;
    let rows = conn
        .execute(
            "UPDATE users SET
                display_name = COALESCE(?1, display_name),
                email = COALESCE(?2, email),
                password_hash = COALESCE(?3, password_hash),
                profile_image = COALESCE(?4, profile_image)
             WHERE id = ?5",
            params![
                update.display_name,
                update.email,
                update.password_hash,
                update.profile_image,
                id
            ],
        )
        .map_err(conflict_or)?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

pub fn update_password(pool: &DbPool, id: i64, password_hash: &str) -> AppResult<()> {
    update_profile(
        pool,
        id,
        &ProfileUpdate {
            password_hash: Some(password_hash),
            ..Default::default()
        },
    )
}

/// Delete an account together with its comments, its posts and every comment
/// on those posts, in one transaction.
pub fn delete(pool: &DbPool, id: i64) -> AppResult<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM comments WHERE user_id = ?1", params![id])?;
    tx.execute(
        "DELETE FROM comments WHERE post_id IN (SELECT id FROM posts WHERE user_id = ?1)",
        params![id],
    )?;
    tx.execute("DELETE FROM posts WHERE user_id = ?1", params![id])?;
    let rows = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn insert_test_user(pool: &DbPool, username: &str) -> i64 {
    create(
        pool,
        &NewUser {
            username,
            display_name: &format!("{username} display"),
            password_hash: "not-a-real-hash",
            email: &format!("{username}@example.com"),
        },
    )
    .unwrap()
}
