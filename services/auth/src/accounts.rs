//! Account flows behind the auth endpoints
//!
//! Token handling stays in the routes; this module decides who an account
//! is and whether it may sign in.

use chrono::Utc;
use common::{
    error::DatabaseError,
    identity::{Claims, Role, UserStatus},
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AuthError, AuthResult},
    models::{LoginRequest, RegisterRequest, ResetPasswordRequest, User},
    password::{hash_password, verify_password},
    rate_limiter::RateLimiter,
    repositories::AccountStore,
    validation::validate_password,
};

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    limiter: RateLimiter,
}

fn ensure_active(user: &User) -> AuthResult<()> {
    match user.status {
        UserStatus::Active => Ok(()),
        status => Err(AuthError::Forbidden(format!("User is {}", status))),
    }
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, limiter: RateLimiter) -> Self {
        Self { store, limiter }
    }

    async fn create(
        &self,
        name: String,
        email: String,
        phone: Option<String>,
        password: &str,
        role: Role,
    ) -> AuthResult<User> {
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            password_hash: Some(hash_password(password)?),
            role,
            status: UserStatus::Active,
            created_at: now,
            updated_at: now,
        };

        match self.store.insert(&user).await {
            Ok(()) => Ok(user),
            Err(DatabaseError::UniqueViolation(_)) => Err(AuthError::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> AuthResult<User> {
        let new_user = request.validate().map_err(AuthError::Validation)?;

        let user = self
            .create(
                new_user.name,
                new_user.email,
                new_user.phone,
                &new_user.password,
                new_user.role,
            )
            .await?;

        info!("Registered {} as {}", user.email, user.role);
        Ok(user)
    }

    /// Check email and password, counting failures per email
    pub async fn login(&self, request: &LoginRequest) -> AuthResult<User> {
        let email = request.email.trim().to_lowercase();

        if !self.limiter.is_allowed(&email).await {
            warn!("Login refused for locked out {}", email);
            return Err(AuthError::TooManyAttempts);
        }

        let Some(user) = self.store.find_by_email(&email).await? else {
            self.limiter.record_failure(&email).await;
            return Err(AuthError::InvalidCredentials);
        };

        let Some(password_hash) = user.password_hash.as_deref() else {
            return Err(AuthError::Unauthorized(
                "This account has no password, sign in with its linked provider".to_string(),
            ));
        };

        if !verify_password(&request.password, password_hash)? {
            self.limiter.record_failure(&email).await;
            return Err(AuthError::InvalidCredentials);
        }

        ensure_active(&user)?;
        self.limiter.reset(&email).await;

        info!("User {} logged in", user.id);
        Ok(user)
    }

    /// Re-read the account a refresh token was issued for
    pub async fn refresh(&self, claims: &Claims) -> AuthResult<User> {
        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AuthError::Unauthorized("User does not exist".to_string()))?;

        ensure_active(&user)?;
        Ok(user)
    }

    pub async fn reset_password(
        &self,
        user_id: Uuid,
        request: &ResetPasswordRequest,
    ) -> AuthResult<()> {
        validate_password(&request.new_password).map_err(AuthError::Validation)?;

        let user = self.store.find_by_id(user_id).await?;
        let Some(password_hash) = user.as_ref().and_then(|user| user.password_hash.as_deref())
        else {
            return Err(AuthError::NotFound(
                "User not found or password missing".to_string(),
            ));
        };

        if !verify_password(&request.old_password, password_hash)? {
            return Err(AuthError::Unauthorized(
                "Old password does not match".to_string(),
            ));
        }

        let new_hash = hash_password(&request.new_password)?;
        if !self.store.update_password(user_id, &new_hash).await? {
            return Err(AuthError::NotFound("User not found".to_string()));
        }

        info!("Password reset for user {}", user_id);
        Ok(())
    }

    /// Create the admin account unless the email is already taken
    ///
    /// Returns whether an account was created.
    pub async fn seed_admin(&self, email: &str, password: &str) -> AuthResult<bool> {
        let email = email.trim().to_lowercase();
        match self
            .create("Admin".to_string(), email, None, password, Role::Admin)
            .await
        {
            Ok(admin) => {
                info!("Admin {} created", admin.email);
                Ok(true)
            }
            Err(AuthError::AlreadyExists) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
