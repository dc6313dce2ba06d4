//! Client and session records.
//!
//! Only hashes of secrets and tokens appear here; plaintext values exist
//! solely in the issuance results handed back to the caller once.

use chrono::{DateTime, Utc};

use crate::auth::models::Level;
use crate::token::{Claim, Key, Secret, Token};

/// Long-lived client identity, one per user.
#[derive(Debug, Clone)]
pub struct Client {
    /// Primary key
    pub id: i64,
    /// Owner user ID (unique)
    pub user_id: i64,
    /// Privilege level (0 = administrator)
    pub level: Level,
    /// Public key (unique)
    pub key: Key,
    /// SHA-256 of the secret
    pub secret_hash: Secret,
    /// False once revoked
    pub valid: bool,
    pub created: DateTime<Utc>,
}

/// The single live session of a client.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: i64,
    /// Owning client (unique)
    pub client_id: i64,
    /// SHA-256 of the current token
    pub token_hash: Token,
    /// `None` means the token never expires
    pub expires: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

impl Session {
    /// Check whether `token` is the one this session was issued for.
    pub fn matches(&self, token: &Token) -> bool {
        self.token_hash.equals(token)
    }
}

/// Client row as written by `upsert_client` (keyed by `user_id`).
///
/// Stores persist `secret_hash.hashed()`, so a plaintext secret handed in
/// by mistake is still never written.
#[derive(Debug, Clone)]
pub struct ClientFields {
    pub user_id: i64,
    pub level: Level,
    pub key: Key,
    pub secret_hash: Secret,
    pub valid: bool,
}

/// Session row as written by `upsert_session` (keyed by `client_id`).
#[derive(Debug, Clone)]
pub struct SessionFields {
    pub client_id: i64,
    pub token_hash: Token,
    pub expires: Option<DateTime<Utc>>,
}

/// Plaintext key and secret, returned exactly once.
#[derive(Debug, Clone)]
pub struct IssuedCredentials {
    pub key: Key,
    pub secret: Secret,
    pub client: Client,
}

/// Plaintext token and its claim, returned exactly once.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub claim: Claim,
    pub token: Token,
    pub session: Session,
}
