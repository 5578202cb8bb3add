//! Authentication service routes

use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use common::identity::Principal;
use serde_json::json;
use tracing::{error, info};

use crate::{
    AppState,
    error::{AuthError, AuthResult},
    middleware::auth_middleware,
    models::{LoginRequest, RefreshTokenRequest, RegisterRequest, ResetPasswordRequest},
};

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/auth/reset-password", post(reset_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh-token", post(refresh_token))
        .route("/auth/logout", post(logout))
        .merge(protected_routes)
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    let user = state.accounts.register(payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "User created successfully",
            "data": user.profile(),
        })),
    ))
}

/// User login endpoint
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    info!("Login attempt for user: {}", payload.email);

    let user = state.accounts.login(&payload).await?;
    let tokens = state.jwt_service.generate_pair(&user)?;

    Ok(Json(json!({
        "success": true,
        "message": "User logged in successfully",
        "data": {
            "accessToken": tokens.access_token,
            "refreshToken": tokens.refresh_token,
            "user": user.profile(),
        },
    })))
}

/// Exchange a refresh token for a new access token
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    let claims = state
        .jwt_service
        .validate_refresh_token(&payload.refresh_token)?;

    let revoked = state
        .redis_pool
        .is_token_revoked(&payload.refresh_token)
        .await
        .map_err(|e| {
            error!("Failed to check token revocation: {}", e);
            AuthError::Internal
        })?;
    if revoked {
        return Err(AuthError::Unauthorized(
            "Refresh token has been revoked".to_string(),
        ));
    }

    let user = state.accounts.refresh(&claims).await?;
    let access_token = state.jwt_service.generate_access_token(&user)?;

    Ok(Json(json!({
        "success": true,
        "message": "New access token retrieved successfully",
        "data": { "accessToken": access_token },
    })))
}

/// Revoke a refresh token for the rest of its lifetime
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> AuthResult<impl IntoResponse> {
    let claims = state
        .jwt_service
        .validate_refresh_token(&payload.refresh_token)?;
    let remaining = state.jwt_service.remaining_lifetime(&claims)?;

    state
        .redis_pool
        .revoke_token(&payload.refresh_token, remaining)
        .await
        .map_err(|e| {
            error!("Failed to revoke refresh token: {}", e);
            AuthError::Internal
        })?;

    info!("User {} logged out", claims.sub);

    Ok(Json(json!({
        "success": true,
        "message": "User logged out successfully",
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AuthResult<impl IntoResponse> {
    state
        .accounts
        .reset_password(principal.id, &payload)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Password changed successfully",
    })))
}
