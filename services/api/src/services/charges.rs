//! Delivery charge calculation

use std::sync::Arc;

use tracing::info;

use crate::{
    error::{ServiceError, ServiceResult},
    models::{
        delivery_charge::{DeliveryChargeRule, Quote},
        parcel::ParcelType,
    },
    repositories::ChargeRuleStore,
};

/// Base fee charged when no rule covers a destination
pub const DEFAULT_BASE_FEE: f64 = 50.0;
/// Per-kilogram rate charged when no rule covers a destination
pub const DEFAULT_PER_KG_RATE: f64 = 20.0;

/// Fee for `weight` kilograms under `rule`, or under the defaults
pub fn fee_for(rule: Option<&DeliveryChargeRule>, weight: f64) -> f64 {
    match rule {
        Some(rule) => rule.base_fee + rule.per_kg_rate * weight,
        None => DEFAULT_BASE_FEE + DEFAULT_PER_KG_RATE * weight,
    }
}

#[derive(Clone)]
pub struct ChargeCalculator {
    rules: Arc<dyn ChargeRuleStore>,
}

impl ChargeCalculator {
    pub fn new(rules: Arc<dyn ChargeRuleStore>) -> Self {
        Self { rules }
    }

    pub async fn calculate_fee(
        &self,
        destination: &str,
        parcel_type: ParcelType,
        weight: f64,
    ) -> ServiceResult<f64> {
        let rule = self.rules.find_rule(destination, parcel_type).await?;
        Ok(fee_for(rule.as_ref(), weight))
    }

    pub async fn quote(
        &self,
        district: &str,
        parcel_type: ParcelType,
        weight: f64,
    ) -> ServiceResult<Quote> {
        if !(weight > 0.0) || !weight.is_finite() {
            return Err(ServiceError::Validation(
                "Weight must be greater than 0".to_string(),
            ));
        }

        let rule = self.rules.find_rule(district, parcel_type).await?;
        Ok(Quote {
            fee: fee_for(rule.as_ref(), weight),
            estimated_delivery_days: rule.map(|rule| rule.estimated_delivery_days),
        })
    }

    pub async fn upsert_rule(&self, rule: DeliveryChargeRule) -> ServiceResult<DeliveryChargeRule> {
        rule.validate().map_err(ServiceError::Validation)?;
        let saved = self.rules.upsert_rule(&rule).await?;
        info!(
            "Delivery charge rule saved: {} / {} base={} perKg={}",
            saved.district, saved.parcel_type, saved.base_fee, saved.per_kg_rate
        );
        Ok(saved)
    }
}
