//! Parcel entity, its status log and the payloads that act on it

use chrono::{DateTime, Utc};
use common::query::{FieldValue, Record};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

use super::user::UserSummary;

/// Delivery status of a parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelStatus {
    Requested,
    Approved,
    Dispatched,
    InTransit,
    OutForDelivery,
    Delivered,
    Cancelled,
    Returned,
    Blocked,
}

impl ParcelStatus {
    pub const ALL: [ParcelStatus; 9] = [
        ParcelStatus::Requested,
        ParcelStatus::Approved,
        ParcelStatus::Dispatched,
        ParcelStatus::InTransit,
        ParcelStatus::OutForDelivery,
        ParcelStatus::Delivered,
        ParcelStatus::Cancelled,
        ParcelStatus::Returned,
        ParcelStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelStatus::Requested => "REQUESTED",
            ParcelStatus::Approved => "APPROVED",
            ParcelStatus::Dispatched => "DISPATCHED",
            ParcelStatus::InTransit => "IN_TRANSIT",
            ParcelStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            ParcelStatus::Delivered => "DELIVERED",
            ParcelStatus::Cancelled => "CANCELLED",
            ParcelStatus::Returned => "RETURNED",
            ParcelStatus::Blocked => "BLOCKED",
        }
    }

    /// No transition leaves a terminal status
    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ParcelStatus::Delivered | ParcelStatus::Cancelled | ParcelStatus::Returned
        )
    }

    /// Statuses in which a parcel is with the carrier or already delivered
    pub fn is_locked_for_deletion(&self) -> bool {
        matches!(
            self,
            ParcelStatus::Dispatched
                | ParcelStatus::InTransit
                | ParcelStatus::OutForDelivery
                | ParcelStatus::Delivered
        )
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParcelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParcelStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown parcel status: {}", s))
    }
}

/// Kind of goods in a parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParcelType {
    Document,
    Package,
    Fragile,
    Food,
    Electronics,
}

impl ParcelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParcelType::Document => "DOCUMENT",
            ParcelType::Package => "PACKAGE",
            ParcelType::Fragile => "FRAGILE",
            ParcelType::Food => "FOOD",
            ParcelType::Electronics => "ELECTRONICS",
        }
    }
}

impl fmt::Display for ParcelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParcelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DOCUMENT" => Ok(ParcelType::Document),
            "PACKAGE" => Ok(ParcelType::Package),
            "FRAGILE" => Ok(ParcelType::Fragile),
            "FOOD" => Ok(ParcelType::Food),
            "ELECTRONICS" => Ok(ParcelType::Electronics),
            other => Err(format!("unknown parcel type: {}", other)),
        }
    }
}

/// One immutable entry of a parcel's status history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusLogEntry {
    pub status: ParcelStatus,
    pub timestamp: DateTime<Utc>,
    pub updated_by: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parcel {
    pub id: Uuid,
    pub tracking_id: String,
    #[serde(rename = "type")]
    pub parcel_type: ParcelType,
    pub weight: f64,
    pub price: f64,
    pub delivery_charge: f64,
    pub total_amount: f64,
    pub sender: Uuid,
    pub receiver: Uuid,
    pub sender_address: String,
    pub receiver_address: String,
    pub delivery_date: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: ParcelStatus,
    pub status_logs: Vec<StatusLogEntry>,
    pub is_blocked: bool,
    pub is_paid: bool,
    pub payment_method: Option<String>,
    pub assigned_driver: Option<Uuid>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
impl Parcel {
    /// Status recorded by the newest log entry
    pub fn last_logged_status(&self) -> Option<ParcelStatus> {
        self.status_logs.last().map(|entry| entry.status)
    }
}

impl Record for Parcel {
    const FIELDS: &'static [&'static str] = &[
        "trackingId",
        "type",
        "weight",
        "price",
        "deliveryCharge",
        "totalAmount",
        "sender",
        "receiver",
        "senderAddress",
        "receiverAddress",
        "deliveryDate",
        "deliveredAt",
        "status",
        "isBlocked",
        "isPaid",
        "paymentMethod",
        "assignedDriver",
        "createdAt",
        "updatedAt",
    ];

    fn field(&self, name: &str) -> Option<FieldValue> {
        let value = match name {
            "trackingId" => FieldValue::Text(self.tracking_id.clone()),
            "type" => FieldValue::Text(self.parcel_type.as_str().to_string()),
            "weight" => FieldValue::Number(self.weight),
            "price" => FieldValue::Number(self.price),
            "deliveryCharge" => FieldValue::Number(self.delivery_charge),
            "totalAmount" => FieldValue::Number(self.total_amount),
            "sender" => FieldValue::Id(self.sender),
            "receiver" => FieldValue::Id(self.receiver),
            "senderAddress" => FieldValue::Text(self.sender_address.clone()),
            "receiverAddress" => FieldValue::Text(self.receiver_address.clone()),
            "deliveryDate" => FieldValue::Timestamp(self.delivery_date?),
            "deliveredAt" => FieldValue::Timestamp(self.delivered_at?),
            "status" => FieldValue::Text(self.status.as_str().to_string()),
            "isBlocked" => FieldValue::Bool(self.is_blocked),
            "isPaid" => FieldValue::Bool(self.is_paid),
            "paymentMethod" => FieldValue::Text(self.payment_method.clone()?),
            "assignedDriver" => FieldValue::Id(self.assigned_driver?),
            "createdAt" => FieldValue::Timestamp(self.created_at),
            "updatedAt" => FieldValue::Timestamp(self.updated_at),
            _ => return None,
        };
        Some(value)
    }
}

/// A versioned write against one parcel
///
/// Every change sets the status and appends exactly one log entry carrying
/// that status, so the two can never drift apart.
#[derive(Debug, Clone, PartialEq)]
pub struct ParcelChange {
    pub log: StatusLogEntry,
    pub is_blocked: Option<bool>,
    pub payment: Option<Payment>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub is_paid: bool,
    pub method: Option<String>,
}

impl ParcelChange {
    pub fn new(
        status: ParcelStatus,
        actor: Uuid,
        note: Option<String>,
        location: Option<String>,
    ) -> Self {
        ParcelChange {
            log: StatusLogEntry {
                status,
                timestamp: Utc::now(),
                updated_by: actor,
                location,
                note,
            },
            is_blocked: None,
            payment: None,
            delivered_at: None,
        }
    }

    pub fn status(&self) -> ParcelStatus {
        self.log.status
    }

    pub fn blocked(mut self, blocked: bool) -> Self {
        self.is_blocked = Some(blocked);
        self
    }

    pub fn paid(mut self, is_paid: bool, method: Option<String>) -> Self {
        self.payment = Some(Payment { is_paid, method });
        self
    }

    /// Stamp the delivery time with the log entry's timestamp
    pub fn delivered(mut self) -> Self {
        self.delivered_at = Some(self.log.timestamp);
        self
    }
}

/// Predicate used by the statistics aggregates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelPredicate {
    /// Empty means any status
    pub statuses: Vec<ParcelStatus>,
    pub is_paid: Option<bool>,
}

impl ParcelPredicate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_status(statuses: &[ParcelStatus]) -> Self {
        ParcelPredicate {
            statuses: statuses.to_vec(),
            is_paid: None,
        }
    }

    pub fn paid(mut self) -> Self {
        self.is_paid = Some(true);
        self
    }
}

/// Admin search over parcels
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    pub tracking_id: Option<String>,
    pub status: Option<ParcelStatus>,
    #[serde(rename = "type")]
    pub parcel_type: Option<ParcelType>,
    pub sender: Option<Uuid>,
    pub receiver: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Aggregate counters for the admin dashboard
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelStatistics {
    pub total: u64,
    pub delivered: u64,
    pub in_transit: u64,
    pub cancelled: u64,
    pub pending: u64,
    pub revenue: f64,
}

/// Parcel with its sender and receiver resolved to user summaries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParcelDetails {
    #[serde(flatten)]
    pub parcel: Parcel,
    pub sender_info: Option<UserSummary>,
    pub receiver_info: Option<UserSummary>,
}

/// Request for creating a parcel
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateParcelRequest {
    #[serde(rename = "type")]
    pub parcel_type: ParcelType,
    pub weight: f64,
    pub price: f64,
    pub receiver: Uuid,
    pub sender_address: String,
    pub receiver_address: String,
    pub delivery_date: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub assigned_driver: Option<Uuid>,
}

impl CreateParcelRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.weight > 0.0) || !self.weight.is_finite() {
            return Err("Weight must be greater than 0".to_string());
        }
        if !(self.price >= 0.0) || !self.price.is_finite() {
            return Err("Price cannot be negative".to_string());
        }
        check_text("Sender address", &self.sender_address, 500)?;
        check_text("Receiver address", &self.receiver_address, 500)?;
        if let Some(method) = &self.payment_method {
            check_length("Payment method", method, 50)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub status: ParcelStatus,
    pub note: Option<String>,
    pub location: Option<String>,
}

impl UpdateStatusRequest {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(note) = &self.note {
            check_length("Note", note, 500)?;
        }
        if let Some(location) = &self.location {
            check_length("Location", location, 100)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockParcelRequest {
    pub block: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub is_paid: bool,
    pub payment_method: Option<String>,
}

fn check_text(label: &str, value: &str, max: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", label));
    }
    check_length(label, value, max)
}

fn check_length(label: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("{} cannot exceed {} characters", label, max));
    }
    Ok(())
}
