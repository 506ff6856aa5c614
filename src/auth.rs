//! Bearer token authentication
//!
//! Tokens are HS256 JWTs issued by the identity provider. The only claim the
//! sync engine relies on is `user_id`, the stable owner identifier.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Claims carried by an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Owner resolved from a verified token, stored in request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedOwner {
    pub owner_id: Uuid,
    /// Device named in the token, if the identity provider set one
    pub device_id: Option<String>,
}

#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AuthenticatedOwner> {
        let decoded = decode::<Claims>(token, &self.key, &self.validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", error))
        })?;

        if decoded.claims.user_id.is_nil() {
            return Err(AppError::unauthorized("Token carries no user"));
        }

        Ok(AuthenticatedOwner {
            owner_id: decoded.claims.user_id,
            device_id: decoded.claims.device_id.filter(|d| !d.is_empty()),
        })
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized("Authorization scheme must be `Bearer`"));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

/// Reject unauthenticated requests and attach the [`AuthenticatedOwner`]
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = extract_bearer_token(request.headers())?;
    let owner = state.verifier().verify(token)?;
    request.extensions_mut().insert(owner);
    Ok(next.run(request).await)
}
