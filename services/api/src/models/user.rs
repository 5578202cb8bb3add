//! User accounts as the api service sees them

use chrono::{DateTime, Utc};
use common::{
    identity::{Role, UserStatus},
    query::{FieldValue, Record},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Link between an account and the provider that authenticates it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProvider {
    pub provider: String,
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub postal_code: Option<String>,
}

/// User without credentials
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub auths: Vec<AuthProvider>,
    pub address: Option<Address>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for User {
    const FIELDS: &'static [&'static str] = &[
        "name",
        "email",
        "phone",
        "role",
        "status",
        "createdAt",
        "updatedAt",
    ];

    fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "name" => FieldValue::Text(self.name.clone()),
            "email" => FieldValue::Text(self.email.clone()),
            "phone" => FieldValue::Text(self.phone.clone()?),
            "role" => FieldValue::Text(self.role.as_str().to_string()),
            "status" => FieldValue::Text(self.status.as_str().to_string()),
            "createdAt" => FieldValue::Timestamp(self.created_at),
            "updatedAt" => FieldValue::Timestamp(self.updated_at),
            _ => return None,
        };
        Some(value)
    }
}

/// Contact card embedded in parcel responses
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Partial update of a user; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<Address>,
    pub role: Option<Role>,
    pub status: Option<UserStatus>,
}

impl UpdateUserRequest {
    /// Whether the patch touches fields only an admin may change
    pub fn is_privileged(&self) -> bool {
        self.role.is_some() || self.status.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            let length = name.trim().chars().count();
            if !(2..=50).contains(&length) {
                return Err("Name must be between 2 and 50 characters".to_string());
            }
        }
        if let Some(email) = &self.email {
            if !email.contains('@') || email.trim().len() < 3 {
                return Err(format!("Invalid email address: {}", email));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockUserRequest {
    pub block: bool,
}
