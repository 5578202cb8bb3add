//! JWT service for token generation and validation
//!
//! Access and refresh tokens are HS256-signed with two different secrets, so
//! a refresh token can never pass as an access token (and vice versa) even
//! before the `token_type` claim is looked at. The api service only knows the
//! access secret.

use anyhow::Result;
use common::identity::{Claims, TokenType};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, warn};

use crate::{
    error::{AuthError, AuthResult},
    models::User,
};

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret for signing access tokens
    pub access_secret: String,
    /// Secret for signing refresh tokens
    pub refresh_secret: String,
    /// Access token expiration time in seconds (default: 1 day)
    pub access_token_expiry: u64,
    /// Refresh token expiration time in seconds (default: 30 days)
    pub refresh_token_expiry: u64,
}

impl JwtConfig {
    /// Create a new JwtConfig from environment variables
    ///
    /// # Environment Variables
    /// - `JWT_ACCESS_SECRET`: Secret for access tokens
    /// - `JWT_REFRESH_SECRET`: Secret for refresh tokens, must differ from the access secret
    /// - `JWT_ACCESS_TOKEN_EXPIRY`: Access token expiry in seconds (default: 86400)
    /// - `JWT_REFRESH_TOKEN_EXPIRY`: Refresh token expiry in seconds (default: 2592000)
    pub fn from_env() -> Result<Self> {
        let access_secret = std::env::var("JWT_ACCESS_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_ACCESS_SECRET environment variable not set"))?;
        let refresh_secret = std::env::var("JWT_REFRESH_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_REFRESH_SECRET environment variable not set"))?;

        if access_secret.is_empty() || refresh_secret.is_empty() {
            anyhow::bail!("JWT secrets must not be empty");
        }
        if access_secret == refresh_secret {
            anyhow::bail!("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ");
        }

        let access_token_expiry = std::env::var("JWT_ACCESS_TOKEN_EXPIRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(86_400);

        let refresh_token_expiry = std::env::var("JWT_REFRESH_TOKEN_EXPIRY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2_592_000);

        Ok(JwtConfig {
            access_secret,
            refresh_secret,
            access_token_expiry,
            refresh_token_expiry,
        })
    }
}

/// Access and refresh token pair returned on login
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// JWT service
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
    config: JwtConfig,
}

fn now_secs() -> AuthResult<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| {
            error!("Failed to get current time: {}", e);
            AuthError::Internal
        })
}

impl JwtService {
    /// Initialize a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        JwtService {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            validation,
            config,
        }
    }

    fn sign(&self, user: &User, token_type: TokenType) -> AuthResult<String> {
        let now = now_secs()?;
        let (key, lifetime) = match token_type {
            TokenType::Access => (&self.access_encoding, self.config.access_token_expiry),
            TokenType::Refresh => (&self.refresh_encoding, self.config.refresh_token_expiry),
        };

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + lifetime,
            token_type,
        };

        encode(&Header::new(Algorithm::HS256), &claims, key).map_err(|e| {
            error!("Failed to sign {:?} token: {}", token_type, e);
            AuthError::Internal
        })
    }

    /// Generate an access token for a user
    pub fn generate_access_token(&self, user: &User) -> AuthResult<String> {
        self.sign(user, TokenType::Access)
    }

    /// Generate a refresh token for a user
    pub fn generate_refresh_token(&self, user: &User) -> AuthResult<String> {
        self.sign(user, TokenType::Refresh)
    }

    pub fn generate_pair(&self, user: &User) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.generate_access_token(user)?,
            refresh_token: self.generate_refresh_token(user)?,
        })
    }

    fn validate(&self, token: &str, expected: TokenType) -> AuthResult<Claims> {
        let key = match expected {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };

        let claims = decode::<Claims>(token, key, &self.validation)
            .map_err(|e| {
                warn!("Failed to validate {:?} token: {}", expected, e);
                AuthError::Unauthorized("Invalid or expired token".to_string())
            })?
            .claims;

        if claims.token_type != expected {
            warn!("Expected {:?} token for {}", expected, claims.sub);
            return Err(AuthError::Unauthorized(
                "Invalid or expired token".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Validate an access token and return the claims
    pub fn validate_access_token(&self, token: &str) -> AuthResult<Claims> {
        self.validate(token, TokenType::Access)
    }

    /// Validate a refresh token and return the claims
    pub fn validate_refresh_token(&self, token: &str) -> AuthResult<Claims> {
        self.validate(token, TokenType::Refresh)
    }

    /// Seconds until the token expires, zero if it already has
    pub fn remaining_lifetime(&self, claims: &Claims) -> AuthResult<u64> {
        Ok(claims.exp.saturating_sub(now_secs()?))
    }
}
