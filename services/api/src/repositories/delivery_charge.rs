//! Delivery charge rule repository

use async_trait::async_trait;
use common::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Row, postgres::PgRow};
use tracing::info;

use super::{ChargeRuleStore, decode_text};
use crate::models::{delivery_charge::DeliveryChargeRule, parcel::ParcelType};

#[derive(Clone)]
pub struct DeliveryChargeRepository {
    pool: PgPool,
}

impl DeliveryChargeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn rule_from_row(row: &PgRow) -> sqlx::Result<DeliveryChargeRule> {
    Ok(DeliveryChargeRule {
        district: row.try_get("district")?,
        parcel_type: decode_text(row, "parcel_type")?,
        base_fee: row.try_get("base_fee")?,
        per_kg_rate: row.try_get("per_kg_rate")?,
        estimated_delivery_days: row.try_get("estimated_delivery_days")?,
    })
}

#[async_trait]
impl ChargeRuleStore for DeliveryChargeRepository {
    async fn find_rule(
        &self,
        district: &str,
        parcel_type: ParcelType,
    ) -> DatabaseResult<Option<DeliveryChargeRule>> {
        let row = sqlx::query(
            r#"
            SELECT district, parcel_type, base_fee, per_kg_rate, estimated_delivery_days
            FROM delivery_charges
            WHERE district = $1 AND parcel_type = $2
            "#,
        )
        .bind(district)
        .bind(parcel_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        row.as_ref()
            .map(rule_from_row)
            .transpose()
            .map_err(DatabaseError::Query)
    }

    async fn upsert_rule(&self, rule: &DeliveryChargeRule) -> DatabaseResult<DeliveryChargeRule> {
        info!(
            "Upserting delivery charge rule: {} / {}",
            rule.district, rule.parcel_type
        );

        let row = sqlx::query(
            r#"
            INSERT INTO delivery_charges
                (district, parcel_type, base_fee, per_kg_rate, estimated_delivery_days)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (district, parcel_type) DO UPDATE SET
                base_fee = EXCLUDED.base_fee,
                per_kg_rate = EXCLUDED.per_kg_rate,
                estimated_delivery_days = EXCLUDED.estimated_delivery_days,
                updated_at = NOW()
            RETURNING district, parcel_type, base_fee, per_kg_rate, estimated_delivery_days
            "#,
        )
        .bind(&rule.district)
        .bind(rule.parcel_type.as_str())
        .bind(rule.base_fee)
        .bind(rule.per_kg_rate)
        .bind(rule.estimated_delivery_days)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::Query)?;

        rule_from_row(&row).map_err(DatabaseError::Query)
    }
}
