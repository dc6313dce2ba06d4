//! Request-time authentication pipeline.
//!
//! Three stages, each taking the previous stage's typed output:
//!
//! ```text
//! BasicCredentials --authenticate--> IssuedSession (new token)
//! bearer token     --authenticated--> Resolved { client, claim }
//! Resolved + RequiredLevel --authorization--> Permitted { client }
//! ```
//!
//! Every denial is a single [`AuthError`] whose code names the stage's
//! failure; no stage rewrites an error from an earlier one.

use std::fmt;

use chrono::{DateTime, Utc};

use super::error::{AuthError, AuthErrorCode};
use super::models::RequiredLevel;
use crate::credential::{Client, CredentialService, IssuedSession};
use crate::token::digits::redact;
use crate::token::{Claim, Key, Secret, Token};

/// `key:secret` as presented by the caller, not yet validated.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub key: String,
    pub secret: String,
}

impl BasicCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("key", &redact(&self.key))
            .field("secret", &redact(&self.secret))
            .finish()
    }
}

/// Identity resolved from a bearer token. Privilege not yet checked.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub client: Client,
    pub claim: Claim,
}

/// A client cleared for the requested resource.
#[derive(Debug, Clone)]
pub struct Permitted {
    pub client: Client,
}

/// Pipeline stage, for denial logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    Authenticated,
    Authorization,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Authenticate => "authenticate",
            Stage::Authenticated => "authenticated",
            Stage::Authorization => "authorization",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn denied(stage: Stage, err: AuthError) -> AuthError {
    tracing::warn!(
        stage = %stage,
        code = err.code.code(),
        error = err.code.name(),
        "{}",
        err.message
    );
    err
}

/// Stateless authentication pipeline over a [`CredentialService`].
#[derive(Debug, Clone)]
pub struct AuthGate {
    credentials: CredentialService,
}

impl AuthGate {
    pub fn new(credentials: CredentialService) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &CredentialService {
        &self.credentials
    }

    /// Exchange `key:secret` for a fresh session token.
    pub async fn authenticate(
        &self,
        credentials: Option<BasicCredentials>,
    ) -> Result<IssuedSession, AuthError> {
        let client = self
            .verify_basic(credentials)
            .await
            .map_err(|e| denied(Stage::Authenticate, e))?;
        self.credentials.issue_session(&client).await
    }

    async fn verify_basic(
        &self,
        credentials: Option<BasicCredentials>,
    ) -> Result<Client, AuthError> {
        let credentials = credentials
            .ok_or_else(|| AuthError::from_code(AuthErrorCode::AuthenticationNotFound))?;
        tracing::debug!(?credentials, "authenticate");

        let key_invalid =
            || AuthError::new(AuthErrorCode::AuthenticationInvalid, "Client key invalid");
        let secret_invalid =
            || AuthError::new(AuthErrorCode::AuthenticationInvalid, "Client secret invalid");

        let key = Key::new(credentials.key).map_err(|_| key_invalid())?;
        let secret = Secret::new(credentials.secret).map_err(|_| secret_invalid())?;

        let client = self
            .credentials
            .store()
            .find_client_by_key(&key)
            .await?
            .ok_or_else(key_invalid)?;
        if !secret.equals(&client.secret_hash) {
            return Err(secret_invalid());
        }
        if !client.valid {
            return Err(AuthError::from_code(AuthErrorCode::ClientInvalid));
        }
        Ok(client)
    }

    /// Resolve the client behind a bearer token.
    pub async fn authenticated(&self, bearer: Option<&str>) -> Result<Resolved, AuthError> {
        self.authenticated_at(bearer, Utc::now()).await
    }

    /// [`authenticated`](Self::authenticated) against an explicit clock.
    pub async fn authenticated_at(
        &self,
        bearer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Resolved, AuthError> {
        self.resolve(bearer, now)
            .await
            .map_err(|e| denied(Stage::Authenticated, e))
    }

    async fn resolve(
        &self,
        bearer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Resolved, AuthError> {
        let raw = bearer.ok_or_else(|| AuthError::from_code(AuthErrorCode::TokenNotFound))?;
        let token = Token::new(raw).map_err(|_| AuthError::token_invalid(&redact(raw)))?;
        tracing::debug!(%token, "authenticated");

        let claim = Claim::decrypt(&token, self.credentials.cipher())?;
        claim.check_expiration(now)?;

        let store = self.credentials.store();
        let invalid = || AuthError::token_invalid(&token.redacted());
        let client = store
            .find_client_by_id(claim.subject())
            .await?
            .ok_or_else(invalid)?;
        let session = store
            .find_session_by_client_id(client.id)
            .await?
            .ok_or_else(invalid)?;
        if !session.matches(&token) {
            return Err(invalid());
        }

        Ok(Resolved { client, claim })
    }

    /// Check revocation, then privilege.
    pub fn authorization(
        &self,
        resolved: Resolved,
        required: RequiredLevel,
    ) -> Result<Permitted, AuthError> {
        let client = resolved.client;
        if !client.valid {
            return Err(denied(
                Stage::Authorization,
                AuthError::from_code(AuthErrorCode::ClientInvalid),
            ));
        }
        if !required.admits(client.level) {
            return Err(denied(
                Stage::Authorization,
                AuthError::from_code(AuthErrorCode::ClientInsufficient),
            ));
        }
        Ok(Permitted { client })
    }

    /// `authenticated` followed by `authorization`.
    pub async fn authorize(
        &self,
        bearer: Option<&str>,
        required: RequiredLevel,
    ) -> Result<Permitted, AuthError> {
        let resolved = self.authenticated(bearer).await?;
        self.authorization(resolved, required)
    }
}
