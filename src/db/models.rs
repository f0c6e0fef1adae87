use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub email: String,
    pub profile_image: Option<String>,
    pub created_at: String,
}

/// A post joined with its author's display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub author: String,
    pub title: String,
    pub content: String,
    pub image: Option<String>,
    pub rating: i64,
    pub created_at: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// A comment joined with its author's display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub author: String,
    pub content: String,
    pub created_at: String,
}
