//! API service routes

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use common::{
    identity::{Principal, Role},
    query::QueryParams,
};
use serde_json::json;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    middleware::{auth_middleware, authorize_status_update, check_parcel_access, require_role},
    models::{
        ApiResponse, ListResponse,
        delivery_charge::{DeliveryChargeRule, QuoteRequest},
        parcel::{
            BlockParcelRequest, CreateParcelRequest, PaymentRequest, SearchFilter,
            UpdateStatusRequest,
        },
        user::{BlockUserRequest, UpdateUserRequest},
    },
};

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/parcels", post(create_parcel).get(list_parcels))
        .route("/parcels/my-parcels", get(my_parcels))
        .route("/parcels/incoming", get(incoming_parcels))
        .route("/parcels/statistics", get(parcel_statistics))
        .route("/parcels/search", get(search_parcels))
        .route("/parcels/:id", get(get_parcel).delete(delete_parcel))
        .route("/parcels/:id/status", patch(update_parcel_status))
        .route("/parcels/:id/cancel", patch(cancel_parcel))
        .route("/parcels/:id/confirm-delivery", patch(confirm_delivery))
        .route("/parcels/:id/block", patch(block_parcel))
        .route("/parcels/:id/payment", patch(update_payment))
        .route("/delivery-charges", put(upsert_charge_rule))
        .route("/users", get(list_users))
        .route("/users/me", get(current_user))
        .route("/users/:id", patch(update_user).delete(delete_user))
        .route("/users/:id/block", patch(block_user))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/parcels/track/:tracking_id", get(track_parcel))
        .route("/delivery-charges/quote", get(quote_delivery_charge))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match common::database::health_check(&state.db_pool).await {
        Ok(true) => "ok",
        Ok(false) => "degraded",
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "service": "api-service",
        "database": database,
    }))
}

/// Create a parcel on behalf of the calling sender
pub async fn create_parcel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateParcelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Sender])?;
    let parcel = state.parcels.create(payload, principal.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Parcel created successfully", parcel)),
    ))
}

/// All parcels, for admins
pub async fn list_parcels(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    let paged = state.parcels.list(&params).await?;

    Ok(Json(ListResponse::new("Parcels retrieved successfully", paged)))
}

/// Parcels sent by the caller
pub async fn my_parcels(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Sender])?;
    let paged = state.parcels.list_by_sender(principal.id, &params).await?;

    Ok(Json(ListResponse::new("Your parcels retrieved successfully", paged)))
}

/// Parcels addressed to the caller
pub async fn incoming_parcels(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Receiver])?;
    let paged = state.parcels.list_by_receiver(principal.id, &params).await?;

    Ok(Json(ListResponse::new(
        "Incoming parcels retrieved successfully",
        paged,
    )))
}

pub async fn parcel_statistics(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    let stats = state.parcels.statistics().await?;

    Ok(Json(ApiResponse::ok("Parcel statistics retrieved", stats)))
}

pub async fn search_parcels(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<SearchFilter>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    let parcels = state.parcels.search(&filter).await?;

    Ok(Json(ApiResponse::ok("Parcels found", parcels)))
}

/// Public tracking lookup
pub async fn track_parcel(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state.parcels.get_by_tracking_id(&tracking_id).await?;

    Ok(Json(ApiResponse::ok("Parcel retrieved successfully", details)))
}

pub async fn get_parcel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let details = state.parcels.get(id).await?;
    check_parcel_access(&principal, &details.parcel)?;

    Ok(Json(ApiResponse::ok("Parcel retrieved successfully", details)))
}

pub async fn update_parcel_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;

    let target = payload.status;
    let updated = state
        .lifecycle
        .update_status_authorized(
            id,
            target,
            principal.id,
            payload.note,
            payload.location,
            |parcel| authorize_status_update(&principal, parcel, target),
        )
        .await?;
    let details = state.parcels.populate(updated).await?;

    Ok(Json(ApiResponse::ok(
        "Parcel status updated successfully",
        details,
    )))
}

pub async fn cancel_parcel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Sender])?;
    let parcel = state.lifecycle.cancel(id, principal.id).await?;
    let details = state.parcels.populate(parcel).await?;

    Ok(Json(ApiResponse::ok("Parcel cancelled successfully", details)))
}

pub async fn confirm_delivery(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Receiver])?;
    let parcel = state.lifecycle.confirm_delivery(id, principal.id).await?;
    let details = state.parcels.populate(parcel).await?;

    Ok(Json(ApiResponse::ok("Delivery confirmed successfully", details)))
}

pub async fn block_parcel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BlockParcelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    if payload.reason.as_ref().is_some_and(|reason| reason.chars().count() > 500) {
        return Err(ApiError::BadRequest(
            "Reason cannot exceed 500 characters".to_string(),
        ));
    }

    let parcel = state
        .lifecycle
        .block_unblock(id, payload.block, payload.reason, Some(principal.id))
        .await?;
    let details = state.parcels.populate(parcel).await?;
    let message = if payload.block {
        "Parcel blocked successfully"
    } else {
        "Parcel unblocked successfully"
    };

    Ok(Json(ApiResponse::ok(message, details)))
}

pub async fn update_payment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    if payload
        .payment_method
        .as_ref()
        .is_some_and(|method| method.chars().count() > 50)
    {
        return Err(ApiError::BadRequest(
            "Payment method cannot exceed 50 characters".to_string(),
        ));
    }

    let parcel = state
        .lifecycle
        .update_payment(id, payload.is_paid, payload.payment_method, Some(principal.id))
        .await?;
    let details = state.parcels.populate(parcel).await?;

    Ok(Json(ApiResponse::ok("Payment status updated successfully", details)))
}

pub async fn delete_parcel(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    state.lifecycle.delete(id).await?;

    Ok(Json(ApiResponse::message("Parcel deleted successfully")))
}

/// Public fee quote
pub async fn quote_delivery_charge(
    State(state): State<AppState>,
    Query(request): Query<QuoteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let quote = state
        .charges
        .quote(&request.district, request.parcel_type, request.weight)
        .await?;

    Ok(Json(ApiResponse::ok("Delivery charge calculated", quote)))
}

pub async fn upsert_charge_rule(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(rule): Json<DeliveryChargeRule>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    let saved = state.charges.upsert_rule(rule).await?;

    Ok(Json(ApiResponse::ok("Delivery charge rule saved", saved)))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<QueryParams>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    let paged = state.users.list(&params).await?;

    Ok(Json(ListResponse::new("Users retrieved successfully", paged)))
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.users.me(&principal).await?;

    Ok(Json(ApiResponse::ok("Profile retrieved successfully", user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.users.update(&principal, id, patch).await?;

    Ok(Json(ApiResponse::ok("User updated successfully", user)))
}

pub async fn block_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BlockUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    let user = state.users.set_blocked(id, payload.block).await?;
    let message = if payload.block {
        "User blocked successfully"
    } else {
        "User unblocked successfully"
    };

    Ok(Json(ApiResponse::ok(message, user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_role(&principal, &[Role::Admin])?;
    state.users.delete(id).await?;

    Ok(Json(ApiResponse::message("User deleted successfully")))
}
