//! Delivery charge rules and quotes

use serde::{Deserialize, Serialize};

use super::parcel::ParcelType;

/// Rate applied to parcels of one type bound for one district
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryChargeRule {
    pub district: String,
    pub parcel_type: ParcelType,
    pub base_fee: f64,
    pub per_kg_rate: f64,
    pub estimated_delivery_days: i32,
}

impl DeliveryChargeRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.district.trim().is_empty() {
            return Err("District is required".to_string());
        }
        if !(self.base_fee >= 0.0) || !(self.per_kg_rate >= 0.0) {
            return Err("Fees cannot be negative".to_string());
        }
        if self.estimated_delivery_days < 1 {
            return Err("Estimated delivery days must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub district: String,
    #[serde(rename = "type")]
    pub parcel_type: ParcelType,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub fee: f64,
    /// Present only when a rule matched
    pub estimated_delivery_days: Option<i32>,
}
