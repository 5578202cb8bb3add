//! User administration

use std::sync::Arc;

use common::{
    error::DatabaseError,
    identity::{Principal, UserStatus},
    query::{Paged, QueryBuilder, QueryParams},
};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{ServiceError, ServiceResult},
    models::user::{UpdateUserRequest, User},
    repositories::UserStore,
};

pub const USER_SEARCH_FIELDS: [&str; 3] = ["name", "email", "phone"];

/// Whether `principal` may apply `patch` to the account `target`
pub fn check_update_permission(
    principal: &Principal,
    target: Uuid,
    patch: &UpdateUserRequest,
) -> ServiceResult<()> {
    if principal.is_admin() {
        return Ok(());
    }
    if principal.id != target {
        return Err(ServiceError::Forbidden(
            "You can only update your own profile".to_string(),
        ));
    }
    if patch.is_privileged() {
        return Err(ServiceError::Forbidden(
            "Only an admin can change role or status".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn list(&self, params: &QueryParams) -> ServiceResult<Paged<User>> {
        let paged = QueryBuilder::new(&*self.users, params)
            .filter()
            .search(&USER_SEARCH_FIELDS)
            .sort()
            .paginate()
            .execute()
            .await?;
        Ok(paged)
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))
    }

    pub async fn me(&self, principal: &Principal) -> ServiceResult<User> {
        self.get(principal.id).await
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        patch: UpdateUserRequest,
    ) -> ServiceResult<User> {
        check_update_permission(principal, id, &patch)?;
        patch.validate().map_err(ServiceError::Validation)?;

        let updated = match self.users.update(id, &patch).await {
            Ok(updated) => updated,
            Err(DatabaseError::UniqueViolation(_)) => {
                return Err(ServiceError::Validation("Email already in use".to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let user = updated.ok_or_else(|| ServiceError::not_found("User", id))?;
        info!("User {} updated by {}", id, principal.id);
        Ok(user)
    }

    pub async fn set_blocked(&self, id: Uuid, block: bool) -> ServiceResult<User> {
        let status = if block {
            UserStatus::Blocked
        } else {
            UserStatus::Active
        };
        let user = self
            .users
            .set_status(id, status)
            .await?
            .ok_or_else(|| ServiceError::not_found("User", id))?;
        info!("User {} is now {}", id, status);
        Ok(user)
    }

    pub async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        if !self.users.delete(id).await? {
            return Err(ServiceError::not_found("User", id));
        }
        info!("User {} deleted", id);
        Ok(())
    }
}
