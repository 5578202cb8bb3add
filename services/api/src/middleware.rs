//! Authentication middleware and access policy
//!
//! [`auth_middleware`] verifies the bearer access token once per request and
//! stores the resulting [`Principal`] in the request extensions. Handlers
//! then apply the role gates and ownership rules below before touching the
//! lifecycle engine.

use axum::{
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use common::identity::{Claims, Principal, Role, TokenType};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use std::env;
use tracing::{error, warn};

use crate::{
    error::{ApiError, ServiceError, ServiceResult},
    models::parcel::{Parcel, ParcelStatus},
    state::AppState,
};

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Shared secret the auth service signs access tokens with
    pub access_secret: String,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    pub fn from_env() -> Result<Self, String> {
        let access_secret = env::var("JWT_ACCESS_SECRET")
            .map_err(|_| "JWT_ACCESS_SECRET environment variable not set".to_string())?;
        if access_secret.is_empty() {
            return Err("JWT_ACCESS_SECRET must not be empty".to_string());
        }

        Ok(JwtConfig { access_secret })
    }
}

/// Verifies access tokens issued by the auth service
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        Self {
            key: DecodingKey::from_secret(config.access_secret.as_bytes()),
            validation,
        }
    }

    /// Decode an access token; refresh tokens are rejected
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation).map_err(
            |e| {
                warn!("Failed to validate token: {}", e);
                ApiError::Unauthorized
            },
        )?;

        if data.claims.token_type != TokenType::Access {
            warn!("Refresh token presented as access token for {}", data.claims.sub);
            return Err(ApiError::Unauthorized);
        }

        Ok(data.claims)
    }
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.token_verifier.verify(token)?;

    let revoked = state.redis_pool.is_token_revoked(token).await.map_err(|e| {
        error!("Failed to check token revocation: {}", e);
        ApiError::InternalServerError
    })?;
    if revoked {
        return Err(ApiError::Unauthorized);
    }

    req.extensions_mut().insert(Principal::from(&claims));

    Ok(next.run(req).await)
}

/// Fail with Forbidden unless the principal holds one of `roles`
pub fn require_role(principal: &Principal, roles: &[Role]) -> ServiceResult<()> {
    if principal.has_any_role(roles) {
        Ok(())
    } else {
        let allowed: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(ServiceError::Forbidden(format!(
            "This action requires role {}",
            allowed.join(" or ")
        )))
    }
}

/// Reading a parcel requires being an admin, its sender or its receiver
pub fn check_parcel_access(principal: &Principal, parcel: &Parcel) -> ServiceResult<()> {
    if principal.is_admin() || parcel.sender == principal.id || parcel.receiver == principal.id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "You do not have access to this parcel".to_string(),
        ))
    }
}

/// Who may ask for `target` on `parcel`
///
/// Admins may request any status and leave validity to the engine. Everyone
/// else gets exactly two moves: the sender cancelling before dispatch and
/// the receiver confirming a parcel that is out for delivery.
pub fn authorize_status_update(
    principal: &Principal,
    parcel: &Parcel,
    target: ParcelStatus,
) -> ServiceResult<()> {
    if principal.is_admin() {
        return Ok(());
    }

    let sender_cancels = parcel.sender == principal.id
        && target == ParcelStatus::Cancelled
        && matches!(
            parcel.status,
            ParcelStatus::Requested | ParcelStatus::Approved
        );
    let receiver_confirms = parcel.receiver == principal.id
        && target == ParcelStatus::Delivered
        && parcel.status == ParcelStatus::OutForDelivery;

    if sender_cancels || receiver_confirms {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "You are not allowed to change this parcel from {} to {}",
            parcel.status, target
        )))
    }
}
