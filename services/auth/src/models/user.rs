//! User model and the request payloads of the auth endpoints

use chrono::{DateTime, Utc};
use common::identity::{Role, UserStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::{validate_email, validate_name, validate_password, validate_phone};

/// Provider name stored for email/password accounts
pub const CREDENTIALS_PROVIDER: &str = "credentials";

/// User entity, including its credentials
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// Accounts linked through an external provider may have no password
    pub password_hash: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            role: self.role,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// What the auth endpoints return about an account
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

/// New user creation payload, password still in clear text
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub role: Option<Role>,
}

impl RegisterRequest {
    /// Check every field and turn the request into a [`NewUser`]
    ///
    /// Emails are stored lower-cased. Admin accounts cannot be self-registered.
    pub fn validate(self) -> Result<NewUser, String> {
        validate_name(&self.name)?;
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if let Some(phone) = &self.phone {
            validate_phone(phone)?;
        }

        let role = self.role.unwrap_or(Role::Sender);
        if role == Role::Admin {
            return Err("Role must be SENDER or RECEIVER".to_string());
        }

        Ok(NewUser {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone,
            password: self.password,
            role,
        })
    }
}

/// User login credentials
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request for token refresh and logout
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub old_password: String,
    pub new_password: String,
}
