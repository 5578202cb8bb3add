//! API models for request and response payloads

use serde::Serialize;

pub mod delivery_charge;
pub mod parcel;
pub mod user;

/// Envelope every successful response is wrapped in
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Paged list response; `meta` sits next to `data` in the envelope
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Vec<T>,
    pub meta: common::query::PageMeta,
}

impl<T> ListResponse<T> {
    pub fn new(message: impl Into<String>, paged: common::query::Paged<T>) -> Self {
        ListResponse {
            success: true,
            message: message.into(),
            data: paged.data,
            meta: paged.meta,
        }
    }
}
