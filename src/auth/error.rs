//! Authentication error types.
//!
//! Every failure in token handling, credential lifecycle and the request
//! pipeline surfaces as an [`AuthError`] carrying one distinct
//! [`AuthErrorCode`]. Codes are never collapsed: a forged token
//! (`TokenInvalid`) and a wrong static credential (`AuthenticationInvalid`)
//! stay distinguishable all the way to the HTTP layer.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::credential::StoreError;
use crate::token::DigitsError;

/// Authentication error codes (4001-4012).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum AuthErrorCode {
    /// 4001: Root key missing or malformed
    ConfigurationError = 4001,
    /// 4002: Digits violate length or alphabet
    FormatInvalid = 4002,
    /// 4003: No key:secret presented
    AuthenticationNotFound = 4003,
    /// 4004: Unknown key or wrong secret
    AuthenticationInvalid = 4004,
    /// 4005: No bearer token presented
    TokenNotFound = 4005,
    /// 4006: Token malformed, forged or superseded
    TokenInvalid = 4006,
    /// 4007: Token past its expiration
    TokenExpired = 4007,
    /// 4008: Client has been revoked
    ClientInvalid = 4008,
    /// 4009: Client level above the required level
    ClientInsufficient = 4009,
    /// 4010: No client for the requested user
    ClientNotFound = 4010,
    /// 4011: User already has a client
    ClientExists = 4011,
    /// 4012: Credential store failure
    StoreUnavailable = 4012,
}

impl AuthErrorCode {
    /// Get error code as i32.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get error name string.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::FormatInvalid => "FORMAT_INVALID",
            Self::AuthenticationNotFound => "AUTHENTICATION_NOT_FOUND",
            Self::AuthenticationInvalid => "AUTHENTICATION_INVALID",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::ClientInvalid => "CLIENT_INVALID",
            Self::ClientInsufficient => "CLIENT_INSUFFICIENT",
            Self::ClientNotFound => "CLIENT_NOT_FOUND",
            Self::ClientExists => "CLIENT_EXISTS",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }

    /// Get HTTP status code.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::ConfigurationError | Self::StoreUnavailable => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::FormatInvalid => StatusCode::BAD_REQUEST,
            Self::ClientInvalid | Self::ClientInsufficient => StatusCode::FORBIDDEN,
            Self::ClientNotFound => StatusCode::NOT_FOUND,
            Self::ClientExists => StatusCode::CONFLICT,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Authentication error with message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    /// Create a new auth error.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create error with default message.
    pub fn from_code(code: AuthErrorCode) -> Self {
        let message = match code {
            AuthErrorCode::ConfigurationError => "Missing or malformed 'api.rootkey'",
            AuthErrorCode::FormatInvalid => "Malformed credential digits",
            AuthErrorCode::AuthenticationNotFound => "Missing key:secret in header",
            AuthErrorCode::AuthenticationInvalid => "Client key invalid",
            AuthErrorCode::TokenNotFound => "Expected \"Authorization: Bearer <token>\" in header",
            AuthErrorCode::TokenInvalid => "Token invalid",
            AuthErrorCode::TokenExpired => "Token expired",
            AuthErrorCode::ClientInvalid => "Access has been revoked",
            AuthErrorCode::ClientInsufficient => "Authorization level insufficient",
            AuthErrorCode::ClientNotFound => "Client not found",
            AuthErrorCode::ClientExists => "Client already exists",
            AuthErrorCode::StoreUnavailable => "Credential store unavailable",
        };
        Self::new(code, message)
    }

    /// `TokenInvalid` naming the offending token by its redacted form only.
    pub fn token_invalid(redacted: &str) -> Self {
        Self::new(
            AuthErrorCode::TokenInvalid,
            format!("Token invalid: '{}'", redacted),
        )
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.name(), self.message)
    }
}

impl std::error::Error for AuthError {}

impl From<DigitsError> for AuthError {
    fn from(e: DigitsError) -> Self {
        AuthError::new(AuthErrorCode::FormatInvalid, e.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AuthError::new(AuthErrorCode::ClientExists, msg),
            StoreError::MissingClient(id) => AuthError::new(
                AuthErrorCode::ClientNotFound,
                format!("No client with id={}", id),
            ),
            other => AuthError::new(AuthErrorCode::StoreUnavailable, other.to_string()),
        }
    }
}

/// JSON response body for auth errors.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub code: i32,
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = AuthErrorResponse {
            code: self.code.code(),
            error: self.code.name(),
            message: self.message,
        };
        (self.code.http_status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthErrorCode::ConfigurationError.code(), 4001);
        assert_eq!(AuthErrorCode::TokenInvalid.code(), 4006);
        assert_eq!(AuthErrorCode::StoreUnavailable.code(), 4012);
    }

    #[test]
    fn test_error_names() {
        assert_eq!(AuthErrorCode::TokenExpired.name(), "TOKEN_EXPIRED");
        assert_eq!(
            AuthErrorCode::ClientInsufficient.name(),
            "CLIENT_INSUFFICIENT"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(
            AuthErrorCode::TokenInvalid.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthErrorCode::ClientInvalid.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthErrorCode::ConfigurationError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthErrorCode::ClientExists.http_status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_error_from_code() {
        let err = AuthError::from_code(AuthErrorCode::AuthenticationNotFound);
        assert_eq!(err.code, AuthErrorCode::AuthenticationNotFound);
        assert_eq!(err.message, "Missing key:secret in header");
    }

    #[test]
    fn test_token_invalid_message() {
        let err = AuthError::token_invalid("bad...ken");
        assert_eq!(err.code, AuthErrorCode::TokenInvalid);
        assert_eq!(err.message, "Token invalid: 'bad...ken'");
    }

    #[test]
    fn test_digits_error_is_format_invalid() {
        let err: AuthError = DigitsError::Alphabet { class: "Key" }.into();
        assert_eq!(err.code, AuthErrorCode::FormatInvalid);
    }

    #[test]
    fn test_store_conflict_is_client_exists() {
        let err: AuthError = StoreError::Conflict("user 42".into()).into();
        assert_eq!(err.code, AuthErrorCode::ClientExists);

        let err: AuthError = StoreError::Corrupt("bad key".into()).into();
        assert_eq!(err.code, AuthErrorCode::StoreUnavailable);
    }

    #[test]
    fn test_into_response_status() {
        let response = AuthError::from_code(AuthErrorCode::ClientInsufficient).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
