//! Parcel repository for database operations

use async_trait::async_trait;
use common::{
    error::{DatabaseError, DatabaseResult},
    query::{FieldKind, ListQuery, QuerySource, sql},
};
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow, types::Json};
use tracing::info;
use uuid::Uuid;

use super::{ParcelStore, decode_text};
use crate::models::parcel::{Parcel, ParcelChange, ParcelPredicate, SearchFilter};

const PARCEL_COLUMNS: &sql::ColumnMap = &[
    ("trackingId", "tracking_id", FieldKind::Text),
    ("type", "parcel_type", FieldKind::Text),
    ("weight", "weight", FieldKind::Number),
    ("price", "price", FieldKind::Number),
    ("deliveryCharge", "delivery_charge", FieldKind::Number),
    ("totalAmount", "total_amount", FieldKind::Number),
    ("sender", "sender_id", FieldKind::Id),
    ("receiver", "receiver_id", FieldKind::Id),
    ("senderAddress", "sender_address", FieldKind::Text),
    ("receiverAddress", "receiver_address", FieldKind::Text),
    ("deliveryDate", "delivery_date", FieldKind::Timestamp),
    ("deliveredAt", "delivered_at", FieldKind::Timestamp),
    ("status", "status", FieldKind::Text),
    ("isBlocked", "is_blocked", FieldKind::Bool),
    ("isPaid", "is_paid", FieldKind::Bool),
    ("paymentMethod", "payment_method", FieldKind::Text),
    ("assignedDriver", "assigned_driver_id", FieldKind::Id),
    ("createdAt", "created_at", FieldKind::Timestamp),
    ("updatedAt", "updated_at", FieldKind::Timestamp),
];

const RETURNING: &str = r#"
    id, tracking_id, parcel_type, weight, price, delivery_charge, total_amount,
    sender_id, receiver_id, sender_address, receiver_address, delivery_date,
    delivered_at, status, status_logs, is_blocked, is_paid, payment_method,
    assigned_driver_id, version, created_at, updated_at
"#;

/// Parcel repository for database operations
#[derive(Clone)]
pub struct ParcelRepository {
    pool: PgPool,
}

impl ParcelRepository {
    /// Create a new parcel repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn select() -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new("SELECT ");
        builder.push(RETURNING);
        builder.push(" FROM parcels");
        builder
    }

    async fn find_one(&self, column: &str, value: &str) -> DatabaseResult<Option<Parcel>> {
        let mut builder = Self::select();
        builder.push(" WHERE ");
        builder.push(column);
        builder.push(" = ");
        builder.push_bind(value.to_string());

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        row.as_ref().map(decode).transpose()
    }

    async fn current_version(&self, id: Uuid) -> DatabaseResult<Option<i64>> {
        sqlx::query_scalar("SELECT version FROM parcels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)
    }

    fn push_aggregate_predicate(builder: &mut QueryBuilder<'_, Postgres>, predicate: &ParcelPredicate) {
        builder.push(" WHERE TRUE");
        if !predicate.statuses.is_empty() {
            let statuses: Vec<String> = predicate
                .statuses
                .iter()
                .map(|status| status.as_str().to_string())
                .collect();
            builder.push(" AND status = ANY(");
            builder.push_bind(statuses);
            builder.push(")");
        }
        if let Some(paid) = predicate.is_paid {
            builder.push(" AND is_paid = ");
            builder.push_bind(paid);
        }
    }
}

fn parcel_from_row(row: &PgRow) -> sqlx::Result<Parcel> {
    Ok(Parcel {
        id: row.try_get("id")?,
        tracking_id: row.try_get("tracking_id")?,
        parcel_type: decode_text(row, "parcel_type")?,
        weight: row.try_get("weight")?,
        price: row.try_get("price")?,
        delivery_charge: row.try_get("delivery_charge")?,
        total_amount: row.try_get("total_amount")?,
        sender: row.try_get("sender_id")?,
        receiver: row.try_get("receiver_id")?,
        sender_address: row.try_get("sender_address")?,
        receiver_address: row.try_get("receiver_address")?,
        delivery_date: row.try_get("delivery_date")?,
        delivered_at: row.try_get("delivered_at")?,
        status: decode_text(row, "status")?,
        status_logs: row.try_get::<Json<_>, _>("status_logs")?.0,
        is_blocked: row.try_get("is_blocked")?,
        is_paid: row.try_get("is_paid")?,
        payment_method: row.try_get("payment_method")?,
        assigned_driver: row.try_get("assigned_driver_id")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn version_conflict(id: Uuid, expected: i64) -> DatabaseError {
    DatabaseError::VersionConflict {
        entity: "parcel",
        id: id.to_string(),
        expected,
    }
}

fn decode(row: &PgRow) -> DatabaseResult<Parcel> {
    parcel_from_row(row).map_err(DatabaseError::Query)
}

#[async_trait]
impl QuerySource for ParcelRepository {
    type Item = Parcel;

    async fn fetch(&self, query: &ListQuery) -> DatabaseResult<Vec<Parcel>> {
        let mut builder = Self::select();
        sql::push_predicate(&mut builder, query, PARCEL_COLUMNS);
        sql::push_order_and_page(&mut builder, query, PARCEL_COLUMNS);

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        rows.iter().map(decode).collect()
    }

    async fn count(&self, query: &ListQuery) -> DatabaseResult<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM parcels");
        sql::push_predicate(&mut builder, query, PARCEL_COLUMNS);

        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        Ok(total.max(0) as u64)
    }
}

#[async_trait]
impl ParcelStore for ParcelRepository {
    async fn find_by_id(&self, id: Uuid) -> DatabaseResult<Option<Parcel>> {
        let mut builder = Self::select();
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let row = builder
            .build()
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        row.as_ref().map(decode).transpose()
    }

    async fn find_by_tracking_id(&self, tracking_id: &str) -> DatabaseResult<Option<Parcel>> {
        self.find_one("tracking_id", tracking_id).await
    }

    async fn insert(&self, parcel: &Parcel) -> DatabaseResult<()> {
        info!("Inserting parcel: {}", parcel.tracking_id);

        sqlx::query(
            r#"
            INSERT INTO parcels (
                id, tracking_id, parcel_type, weight, price, delivery_charge, total_amount,
                sender_id, receiver_id, sender_address, receiver_address, delivery_date,
                delivered_at, status, status_logs, is_blocked, is_paid, payment_method,
                assigned_driver_id, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(parcel.id)
        .bind(&parcel.tracking_id)
        .bind(parcel.parcel_type.as_str())
        .bind(parcel.weight)
        .bind(parcel.price)
        .bind(parcel.delivery_charge)
        .bind(parcel.total_amount)
        .bind(parcel.sender)
        .bind(parcel.receiver)
        .bind(&parcel.sender_address)
        .bind(&parcel.receiver_address)
        .bind(parcel.delivery_date)
        .bind(parcel.delivered_at)
        .bind(parcel.status.as_str())
        .bind(Json(&parcel.status_logs))
        .bind(parcel.is_blocked)
        .bind(parcel.is_paid)
        .bind(&parcel.payment_method)
        .bind(parcel.assigned_driver)
        .bind(parcel.version)
        .bind(parcel.created_at)
        .bind(parcel.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_query)?;

        Ok(())
    }

    async fn apply_change(
        &self,
        id: Uuid,
        expected_version: i64,
        change: &ParcelChange,
    ) -> DatabaseResult<Option<Parcel>> {
        let payment = change.payment.as_ref();

        // status and log entry land in one statement, guarded by the revision
        let row = sqlx::query(&format!(
            r#"
            UPDATE parcels SET
                status = $3,
                status_logs = status_logs || $4::jsonb,
                is_blocked = COALESCE($5, is_blocked),
                is_paid = COALESCE($6, is_paid),
                payment_method = CASE WHEN $7 THEN $8 ELSE payment_method END,
                delivered_at = COALESCE($9, delivered_at),
                version = version + 1,
                updated_at = $10
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            RETURNING
        ))
        .bind(id)
        .bind(expected_version)
        .bind(change.status().as_str())
        .bind(Json(std::slice::from_ref(&change.log)))
        .bind(change.is_blocked)
        .bind(payment.map(|payment| payment.is_paid))
        .bind(payment.is_some())
        .bind(payment.and_then(|payment| payment.method.as_deref()))
        .bind(change.delivered_at)
        .bind(change.log.timestamp)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        if let Some(row) = row {
            return decode(&row).map(Some);
        }

        match self.current_version(id).await? {
            Some(_) => Err(version_conflict(id, expected_version)),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: Uuid, expected_version: i64) -> DatabaseResult<bool> {
        info!("Deleting parcel: {}", id);

        let result = sqlx::query("DELETE FROM parcels WHERE id = $1 AND version = $2")
            .bind(id)
            .bind(expected_version)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        match self.current_version(id).await? {
            Some(_) => Err(version_conflict(id, expected_version)),
            None => Ok(false),
        }
    }

    async fn count_matching(&self, predicate: &ParcelPredicate) -> DatabaseResult<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM parcels");
        Self::push_aggregate_predicate(&mut builder, predicate);

        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        Ok(total.max(0) as u64)
    }

    async fn sum_total_amount(&self, predicate: &ParcelPredicate) -> DatabaseResult<f64> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT COALESCE(SUM(total_amount), 0)::DOUBLE PRECISION FROM parcels",
        );
        Self::push_aggregate_predicate(&mut builder, predicate);

        builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::Query)
    }

    async fn search(&self, filter: &SearchFilter, limit: u32) -> DatabaseResult<Vec<Parcel>> {
        let mut builder = Self::select();
        builder.push(" WHERE TRUE");

        if let Some(term) = filter.tracking_id.as_deref().filter(|term| !term.is_empty()) {
            builder.push(" AND tracking_id ILIKE ");
            builder.push_bind(format!("%{}%", sql::escape_like(term)));
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(parcel_type) = filter.parcel_type {
            builder.push(" AND parcel_type = ");
            builder.push_bind(parcel_type.as_str());
        }
        if let Some(sender) = filter.sender {
            builder.push(" AND sender_id = ");
            builder.push_bind(sender);
        }
        if let Some(receiver) = filter.receiver {
            builder.push(" AND receiver_id = ");
            builder.push_bind(receiver);
        }
        if let Some(from) = filter.date_from {
            builder.push(" AND created_at >= ");
            builder.push_bind(from);
        }
        if let Some(to) = filter.date_to {
            builder.push(" AND created_at <= ");
            builder.push_bind(to);
        }

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(i64::from(limit));

        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;
        rows.iter().map(decode).collect()
    }
}
