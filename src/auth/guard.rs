use crate::db::models::{Comment, Post};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;

/// A resource with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> i64;
}

impl Owned for Post {
    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

impl Owned for Comment {
    fn owner_id(&self) -> i64 {
        self.user_id
    }
}

/// Allow only when the identity is the owner. Compared by user id, never by
/// display name.
pub fn authorize(user: &CurrentUser, owner_id: i64) -> AppResult<()> {
    if user.id == owner_id {
        Ok(())
    } else {
        tracing::warn!(
            "User {} denied mutation of resource owned by {}",
            user.id,
            owner_id
        );
        Err(AppError::Forbidden)
    }
}

pub fn ensure_owner<T: Owned>(user: &CurrentUser, resource: &T) -> AppResult<()> {
    authorize(user, resource.owner_id())
}
