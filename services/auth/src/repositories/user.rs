//! User repository for database operations

use async_trait::async_trait;
use common::error::{DatabaseError, DatabaseResult};
use serde_json::json;
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;
use uuid::Uuid;

use super::AccountStore;
use crate::models::{User, user::CREDENTIALS_PROVIDER};

const USER_SELECT: &str = r#"
    SELECT id, name, email, phone, password_hash, role, status, created_at, updated_at
    FROM users
"#;

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn optional_user(row: Option<PgRow>) -> DatabaseResult<Option<User>> {
    row.as_ref()
        .map(user_from_row)
        .transpose()
        .map_err(DatabaseError::Query)
}

fn decode_text<T: std::str::FromStr<Err = String>>(row: &PgRow, column: &str) -> sqlx::Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|err: String| sqlx::Error::Decode(err.into()))
}

fn user_from_row(row: &PgRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        password_hash: row.try_get("password_hash")?,
        role: decode_text(row, "role")?,
        status: decode_text(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AccountStore for UserRepository {
    async fn find_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        info!("Finding user by email: {}", email);

        let row = sqlx::query(&format!("{} WHERE email = $1", USER_SELECT))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        optional_user(row)
    }

    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("{} WHERE id = $1", USER_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        optional_user(row)
    }

    async fn insert(&self, user: &User) -> DatabaseResult<()> {
        info!("Creating new user: {}", user.email);

        let auths = json!([{
            "provider": CREDENTIALS_PROVIDER,
            "providerId": user.email,
            "email": user.email,
        }]);

        sqlx::query(
            r#"
            INSERT INTO users
                (id, name, email, phone, password_hash, role, status, auths, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(auths)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> DatabaseResult<bool> {
        info!("Updating password of user: {}", id);

        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        Ok(result.rows_affected() > 0)
    }
}
