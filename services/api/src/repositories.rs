//! Persistence capabilities and their Postgres implementations

use async_trait::async_trait;
use common::{
    error::{DatabaseError, DatabaseResult},
    identity::{Role, UserStatus},
    query::{FieldKind, ListQuery, QuerySource, sql},
};
use sqlx::{PgPool, Postgres, Row, postgres::PgRow, types::Json};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    delivery_charge::DeliveryChargeRule,
    parcel::{Parcel, ParcelChange, ParcelPredicate, ParcelType, SearchFilter},
    user::{UpdateUserRequest, User, UserSummary},
};

pub mod delivery_charge;
#[cfg(test)]
pub mod memory;
pub mod parcel;

pub use delivery_charge::DeliveryChargeRepository;
pub use parcel::ParcelRepository;

/// Parcel persistence; listing goes through [`QuerySource`]
#[async_trait]
pub trait ParcelStore: QuerySource<Item = Parcel> {
    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Parcel>>;

    async fn find_by_tracking_id(&self, tracking_id: &str) -> DatabaseResult<Option<Parcel>>;

    /// Fails with `UniqueViolation` when the tracking id is taken
    async fn insert(&self, parcel: &Parcel) -> DatabaseResult<()>;

    /// Apply `change` only if the stored version still equals `expected_version`
    ///
    /// Returns `Ok(None)` when the parcel no longer exists and
    /// `VersionConflict` when another write got there first.
    async fn apply_change(
        &self,
        id: Uuid,
        expected_version: i64,
        change: &ParcelChange,
    ) -> DatabaseResult<Option<Parcel>>;

    /// Delete only if the stored version still equals `expected_version`
    ///
    /// Returns `Ok(false)` when the parcel no longer exists and
    /// `VersionConflict` when it changed since it was read.
    async fn delete(&self, id: Uuid, expected_version: i64) -> DatabaseResult<bool>;

    async fn count_matching(&self, predicate: &ParcelPredicate) -> DatabaseResult<u64>;

    async fn sum_total_amount(&self, predicate: &ParcelPredicate) -> DatabaseResult<f64>;

    /// Newest first, at most `limit` parcels
    async fn search(&self, filter: &SearchFilter, limit: u32) -> DatabaseResult<Vec<Parcel>>;
}

/// Lookup of the people a parcel refers to
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_summary(&self, id: Uuid) -> DatabaseResult<Option<UserSummary>>;
}

/// Delivery charge rules keyed by district and parcel type
#[async_trait]
pub trait ChargeRuleStore: Send + Sync {
    async fn find_rule(
        &self,
        district: &str,
        parcel_type: ParcelType,
    ) -> DatabaseResult<Option<DeliveryChargeRule>>;

    async fn upsert_rule(&self, rule: &DeliveryChargeRule) -> DatabaseResult<DeliveryChargeRule>;
}

/// User account persistence
#[async_trait]
pub trait UserStore: QuerySource<Item = User> + UserDirectory {
    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>>;

    /// Fails with `UniqueViolation` when the new email is taken
    async fn update(&self, id: Uuid, patch: &UpdateUserRequest) -> DatabaseResult<Option<User>>;

    async fn set_status(&self, id: Uuid, status: UserStatus) -> DatabaseResult<Option<User>>;

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool>;
}

const USER_COLUMNS: &sql::ColumnMap = &[
    ("name", "name", FieldKind::Text),
    ("email", "email", FieldKind::Text),
    ("phone", "phone", FieldKind::Text),
    ("role", "role", FieldKind::Text),
    ("status", "status", FieldKind::Text),
    ("createdAt", "created_at", FieldKind::Timestamp),
    ("updatedAt", "updated_at", FieldKind::Timestamp),
];

const USER_SELECT: &str = r#"
    SELECT id, name, email, phone, role, status, auths, address, created_at, updated_at
    FROM users
"#;

/// User repository for database operations
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

pub(crate) fn decode_text<T: FromStr<Err = String>>(row: &PgRow, column: &str) -> sqlx::Result<T> {
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
        role: decode_text::<Role>(row, "role")?,
        status: decode_text::<UserStatus>(row, "status")?,
        auths: row.try_get::<Json<_>, _>("auths")?.0,
        address: row
            .try_get::<Option<Json<_>>, _>("address")?
            .map(|address| address.0),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn users_from_rows(rows: Vec<PgRow>) -> DatabaseResult<Vec<User>> {
    rows.iter()
        .map(user_from_row)
        .collect::<sqlx::Result<Vec<_>>>()
        .map_err(DatabaseError::Query)
}

#[async_trait]
impl QuerySource for UserRepository {
    type Item = User;

    async fn fetch(&self, query: &ListQuery) -> DatabaseResult<Vec<User>> {
        let mut builder = sqlx::QueryBuilder::<Postgres>::new(USER_SELECT);
        sql::push_predicate(&mut builder, query, USER_COLUMNS);
        sql::push_order_and_page(&mut builder, query, USER_COLUMNS);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        users_from_rows(rows)
    }

    async fn count(&self, query: &ListQuery) -> DatabaseResult<u64> {
        let mut builder = sqlx::QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        sql::push_predicate(&mut builder, query, USER_COLUMNS);

        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl UserDirectory for UserRepository {
    async fn find_summary(&self, id: Uuid) -> DatabaseResult<Option<UserSummary>> {
        let row = sqlx::query("SELECT id, name, email, phone FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.map(|row| -> sqlx::Result<UserSummary> {
            Ok(UserSummary {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                phone: row.try_get("phone")?,
            })
        })
        .transpose()
        .map_err(DatabaseError::Query)
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<User>> {
        let row = sqlx::query(&format!("{} WHERE id = $1", USER_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn update(&self, id: Uuid, patch: &UpdateUserRequest) -> DatabaseResult<Option<User>> {
        info!("Updating user: {}", id);

        let row = sqlx::query(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                email = COALESCE(LOWER($3), email),
                phone = COALESCE($4, phone),
                address = COALESCE($5, address),
                role = COALESCE($6, role),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, phone, role, status, auths, address, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(patch.name.as_deref().map(str::trim))
        .bind(patch.email.as_deref().map(str::trim))
        .bind(patch.phone.as_deref())
        .bind(patch.address.as_ref().map(Json))
        .bind(patch.role.map(|role| role.as_str()))
        .bind(patch.status.map(|status| status.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn set_status(&self, id: Uuid, status: UserStatus) -> DatabaseResult<Option<User>> {
        info!("Setting status of user {} to {}", id, status);

        let row = sqlx::query(
            r#"
            UPDATE users SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, name, email, phone, role, status, auths, address, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn delete(&self, id: Uuid) -> DatabaseResult<bool> {
        info!("Deleting user: {}", id);

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(result.rows_affected() > 0)
    }
}
