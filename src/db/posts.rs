use rusqlite::{params, OptionalExtension, Row};
use serde::Deserialize;

use crate::db::models::Post;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

const POST_SELECT: &str = "SELECT p.id, p.user_id, u.display_name, p.title, p.content, p.image, \
     p.rating, p.created_at, p.lat, p.lng \
     FROM posts p JOIN users u ON u.id = p.user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Title,
    Rating,
    /// Creation order (post id).
    Date,
}

impl SortKey {
    /// Unrecognized or missing keys fall back to `Date`.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("title") => SortKey::Title,
            Some("rating") => SortKey::Rating,
            _ => SortKey::Date,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Title => "title",
            SortKey::Rating => "rating",
            SortKey::Date => "date",
        }
    }

    fn column(self) -> &'static str {
        match self {
            SortKey::Title => "p.title",
            SortKey::Rating => "p.rating",
            SortKey::Date => "p.id",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Only an explicit `asc` sorts ascending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Raw `?q=&sort=&order=` parameters of the list view.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub sort: SortKey,
    pub order: SortOrder,
}

impl From<&ListParams> for ListQuery {
    fn from(params: &ListParams) -> Self {
        let search = params
            .q
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        Self {
            search,
            sort: SortKey::parse(params.sort.as_deref()),
            order: SortOrder::parse(params.order.as_deref()),
        }
    }
}

impl ListQuery {
    fn sql(&self) -> String {
        let filter = if self.search.is_some() {
            " WHERE p.title LIKE ?1 ESCAPE '\\' OR p.content LIKE ?1 ESCAPE '\\'"
        } else {
            ""
        };
        // id breaks ties so equal titles/ratings list deterministically
        format!(
            "{POST_SELECT}{filter} ORDER BY {} {}, p.id {}",
            self.sort.column(),
            self.order.sql(),
            self.order.sql()
        )
    }
}

/// Fields submitted by the write and edit forms.
#[derive(Debug, Clone, PartialEq)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    pub rating: i64,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        author: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        image: row.get(5)?,
        rating: row.get(6)?,
        created_at: row.get(7)?,
        lat: row.get(8)?,
        lng: row.get(9)?,
    })
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

pub fn create(
    pool: &DbPool,
    user_id: i64,
    input: &PostInput,
    image: Option<&str>,
) -> AppResult<i64> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO posts (user_id, title, content, image, rating, lat, lng)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user_id,
            input.title,
            input.content,
            image,
            input.rating,
            input.lat,
            input.lng
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get(pool: &DbPool, id: i64) -> AppResult<Option<Post>> {
    let conn = pool.get()?;
    let post = conn
        .query_row(
            &format!("{POST_SELECT} WHERE p.id = ?1"),
            params![id],
            map_post,
        )
        .optional()?;
    Ok(post)
}

pub fn list(pool: &DbPool, query: &ListQuery) -> AppResult<Vec<Post>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&query.sql())?;
    let rows = match &query.search {
        Some(search) => stmt.query_map(params![like_pattern(search)], map_post)?,
        None => stmt.query_map([], map_post)?,
    };
    let posts = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

/// Overwrite a post's fields. `image: None` keeps the stored image.
pub fn update(pool: &DbPool, id: i64, input: &PostInput, image: Option<&str>) -> AppResult<()> {
    let conn = pool.get()?;
    let rows = conn.execute(
        "UPDATE posts SET title = ?1, content = ?2, rating = ?3, lat = ?4, lng = ?5,
             image = COALESCE(?6, image)
         WHERE id = ?7",
        params![
            input.title,
            input.content,
            input.rating,
            input.lat,
            input.lng,
            image,
            id
        ],
    )?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Delete a post and its comments atomically.
pub fn delete(pool: &DbPool, id: i64) -> AppResult<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM comments WHERE post_id = ?1", params![id])?;
    let rows = tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    if rows == 0 {
        return Err(AppError::NotFound);
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::db::users::insert_test_user;

    fn input(title: &str, content: &str, rating: i64) -> PostInput {
        PostInput {
            title: title.to_string(),
            content: content.to_string(),
            rating,
            lat: None,
            lng: None,
        }
    }

    fn query(search: Option<&str>, sort: &str, order: &str) -> ListQuery {
        ListQuery::from(&ListParams {
            q: search.map(str::to_string),
            sort: Some(sort.to_string()),
            order: Some(order.to_string()),
        })
    }

    #[test]
    fn sort_key_falls_back_to_date() {
        assert_eq!(SortKey::parse(Some("title")), SortKey::Title);
        assert_eq!(SortKey::parse(Some("rating")), SortKey::Rating);
        assert_eq!(SortKey::parse(Some("popularity")), SortKey::Date);
        assert_eq!(SortKey::parse(Some("p.id; DROP TABLE posts")), SortKey::Date);
        assert_eq!(SortKey::parse(None), SortKey::Date);
    }

    #[test]
    fn sort_order_defaults_to_desc() {
        assert_eq!(SortOrder::parse(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(Some("ASC ")), SortOrder::Desc);
        assert_eq!(SortOrder::parse(None), SortOrder::Desc);
    }

    #[test]
    fn blank_search_is_ignored() {
        let q = query(Some("   "), "date", "desc");
        assert!(q.search.is_none());
    }

    #[test]
    fn list_by_rating_ascending_is_non_decreasing() {
        let pool = test_pool();
        let user = insert_test_user(&pool, "alice");
        for rating in [3, 1, 5, 1, 4] {
            create(&pool, user, &input("t", "c", rating), None).unwrap();
        }

        let posts = list(&pool, &query(None, "rating", "asc")).unwrap();
        let ratings: Vec<i64> = posts.iter().map(|p| p.rating).collect();
        assert_eq!(ratings, vec![1, 1, 3, 4, 5]);
    }

    #[test]
    fn unknown_sort_lists_newest_first() {
        let pool = test_pool();
        let user = insert_test_user(&pool, "alice");
        let first = create(&pool, user, &input("b", "c", 1), None).unwrap();
        let second = create(&pool, user, &input("a", "c", 2), None).unwrap();

        let posts = list(&pool, &query(None, "bogus", "bogus")).unwrap();
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn sort_by_title_ascending() {
        let pool = test_pool();
        let user = insert_test_user(&pool, "alice");
        for title in ["banana", "apple", "cherry"] {
            create(&pool, user, &input(title, "c", 0), None).unwrap();
        }
        let titles: Vec<String> = list(&pool, &query(None, "title", "asc"))
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["apple", "banana", "cherry"]);
    }

    #[test]
    fn search_matches_title_or_content() {
        let pool = test_pool();
        let user = insert_test_user(&pool, "alice");
        create(&pool, user, &input("Rust meetup", "pizza", 0), None).unwrap();
        create(&pool, user, &input("Lunch", "we talked about rust", 0), None).unwrap();
        create(&pool, user, &input("Other", "nothing", 0), None).unwrap();

        let posts = list(&pool, &query(Some("rust"), "date", "desc")).unwrap();
        assert_eq!(posts.len(), 2);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let pool = test_pool();
        let user = insert_test_user(&pool, "alice");
        create(&pool, user, &input("100% fun", "c", 0), None).unwrap();
        create(&pool, user, &input("100 fun", "c", 0), None).unwrap();

        let posts = list(&pool, &query(Some("100%"), "date", "desc")).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "100% fun");
    }

    #[test]
    fn get_includes_author_and_location() {
        let pool = test_pool();
        let user = insert_test_user(&pool, "alice");
        let mut post = input("Here", "c", 2);
        post.lat = Some(37.5);
        post.lng = Some(127.0);
        let id = create(&pool, user, &post, Some("pic.png")).unwrap();

        let stored = get(&pool, id).unwrap().unwrap();
        assert_eq!(stored.author, "alice display");
        assert_eq!(stored.image.as_deref(), Some("pic.png"));
        assert_eq!(stored.lat, Some(37.5));
        assert_eq!(stored.lng, Some(127.0));
        assert!(get(&pool, id + 1).unwrap().is_none());
    }

    #[test]
    fn update_without_image_keeps_previous_image() {
        let pool = test_pool();
        let user = insert_test_user(&pool, "alice");
        let id = create(&pool, user, &input("t", "c", 1), Some("old.png")).unwrap();

        update(&pool, id, &input("t2", "c2", 4), None).unwrap();
        let post = get(&pool, id).unwrap().unwrap();
        assert_eq!(post.title, "t2");
        assert_eq!(post.rating, 4);
        assert_eq!(post.image.as_deref(), Some("old.png"));

        update(&pool, id, &input("t2", "c2", 4), Some("new.png")).unwrap();
        let post = get(&pool, id).unwrap().unwrap();
        assert_eq!(post.image.as_deref(), Some("new.png"));
    }

    #[test]
    fn delete_removes_comments() {
        let pool = test_pool();
        let user = insert_test_user(&pool, "alice");
        let id = create(&pool, user, &input("t", "c", 1), None).unwrap();
        {
            let conn = pool.get().unwrap();
            conn.execute(
                "INSERT INTO comments (post_id, user_id, content) VALUES (?1, ?2, 'x')",
                params![id, user],
            )
            .unwrap();
        }

        delete(&pool, id).unwrap();
        assert!(get(&pool, id).unwrap().is_none());
        let conn = pool.get().unwrap();
        let remaining: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn delete_missing_post_is_not_found() {
        let pool = test_pool();
        assert!(matches!(delete(&pool, 7), Err(AppError::NotFound)));
    }
}
