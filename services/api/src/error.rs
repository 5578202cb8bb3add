//! Custom error types for the API service

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::error::DatabaseError;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::parcel::ParcelStatus;

/// Category of a failed operation, independent of transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    InvalidState,
    Forbidden,
    Validation,
    Internal,
}

/// Error returned by the domain services
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot change status from {from} to {to}")]
    InvalidTransition { from: ParcelStatus, to: ParcelStatus },

    /// Another writer changed the parcel between our read and our write
    #[error("Parcel {id} changed while moving from {from} to {to}; reload and retry")]
    ConcurrentModification {
        id: Uuid,
        from: ParcelStatus,
        to: ParcelStatus,
    },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::InvalidTransition { .. } | ServiceError::ConcurrentModification { .. } => {
                ErrorKind::InvalidTransition
            }
            ServiceError::InvalidState(_) => ErrorKind::InvalidState,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::Database(_) => ErrorKind::Internal,
        }
    }
}

/// Type alias for service results
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error type rendered to HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing, malformed, expired or revoked credentials
    #[error("Unauthorized")]
    Unauthorized,

    /// Bad request with message
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error
    #[error("Internal server error")]
    InternalServerError,

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        ApiError::Service(ServiceError::Database(err))
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Service(ServiceError::ConcurrentModification { .. }) => StatusCode::CONFLICT,
            ApiError::Service(err) => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InvalidTransition
                | ErrorKind::InvalidState
                | ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ApiError::Unauthorized => "Unauthorized".to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::InternalServerError => "Internal server error".to_string(),
            ApiError::Service(ServiceError::Database(err)) => {
                tracing::error!("Database error: {}", err);
                "Database error".to_string()
            }
            ApiError::Service(err) => err.to_string(),
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}
