//! Middleware for JWT token validation and authentication

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use common::identity::Principal;
use tracing::error;

use crate::{AppState, error::AuthError};

/// Validate the bearer access token and attach the caller's [`Principal`]
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let TypedHeader(Authorization(bearer)) = bearer.ok_or_else(AuthError::unauthorized)?;
    let token = bearer.token();

    let claims = state.jwt_service.validate_access_token(token)?;

    let revoked = state.redis_pool.is_token_revoked(token).await.map_err(|e| {
        error!("Failed to check token revocation: {}", e);
        AuthError::Internal
    })?;
    if revoked {
        return Err(AuthError::unauthorized());
    }

    req.extensions_mut().insert(Principal::from(&claims));

    Ok(next.run(req).await)
}
