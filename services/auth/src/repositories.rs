//! Account persistence

use async_trait::async_trait;
use common::error::DatabaseResult;
use uuid::Uuid;

use crate::models::User;

#[cfg(test)]
pub mod memory;
pub mod user;

pub use user::UserRepository;

/// Storage for accounts and their credentials
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Lookup by lower-cased email
    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    /// Store a new account with an already hashed password and a
    /// `credentials` provider link. A taken email fails with
    /// `DatabaseError::UniqueViolation`.
    async fn insert(&self, user: &User) -> DatabaseResult<()>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> DatabaseResult<bool>;
}
