//! Authentication middleware for Axum.
//!
//! Thin HTTP adapters over [`AuthGate`]:
//! - `Authorization: Basic base64(key:secret)` on the token endpoint
//! - `Authorization: Bearer <token>` on protected routes

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::{
    error::{AuthError, AuthErrorCode},
    gate::{AuthGate, BasicCredentials},
    models::RequiredLevel,
};

fn authorization_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Extract `key:secret` from a Basic `Authorization` header.
///
/// Returns `Ok(None)` when no Basic credentials are present and
/// `AuthenticationInvalid` when they are present but undecodable.
pub fn extract_basic_credentials(
    headers: &HeaderMap,
) -> Result<Option<BasicCredentials>, AuthError> {
    let Some(encoded) = authorization_header(headers).and_then(|h| h.strip_prefix("Basic ")) else {
        return Ok(None);
    };

    let invalid = || {
        AuthError::new(
            AuthErrorCode::AuthenticationInvalid,
            "Malformed Basic credentials",
        )
    };
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let (key, secret) = decoded.split_once(':').ok_or_else(invalid)?;

    Ok(Some(BasicCredentials::new(key, secret)))
}

/// Extract the token from a Bearer `Authorization` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    authorization_header(headers)
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Body of a successful token request.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    /// `None` for a token that never expires
    pub expires: Option<DateTime<Utc>>,
}

/// Issue a session token in exchange for Basic credentials.
pub async fn issue_token_handler(
    State(gate): State<Arc<AuthGate>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AuthError> {
    let credentials = extract_basic_credentials(&headers)?;
    let issued = gate.authenticate(credentials).await?;
    Ok(Json(TokenResponse {
        token: issued.token.expose().to_string(),
        expires: issued.claim.expiration(),
    }))
}

/// Gate and required level for a group of routes.
#[derive(Clone)]
pub struct BearerAuthState {
    pub gate: Arc<AuthGate>,
    pub required: RequiredLevel,
}

impl BearerAuthState {
    pub fn new(gate: Arc<AuthGate>, required: RequiredLevel) -> Self {
        Self { gate, required }
    }
}

/// Axum middleware for bearer-token routes.
///
/// Runs `authenticated` then `authorization` and injects the permitted
/// [`Client`](crate::credential::Client) into request extensions.
pub async fn bearer_auth_middleware(
    State(state): State<BearerAuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    let permitted = state
        .gate
        .authorize(extract_bearer_token(request.headers()), state.required)
        .await?;

    request.extensions_mut().insert(permitted.client);
    Ok(next.run(request).await)
}
