//! Credential store contract.
//!
//! The credential core never issues queries directly; it only calls this
//! trait. Lookups return `Ok(None)` for a missing record, leaving storage
//! failures as the only error case.

use async_trait::async_trait;
use thiserror::Error;

use super::models::{Client, ClientFields, Session, SessionFields};
use crate::token::{Key, Secret};

/// Storage failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Uniqueness violated (user already has a client, or key collision)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Write targets a client id that does not exist
    #[error("No client with id={0}")]
    MissingClient(i64),

    /// Stored value fails validation on the way back out
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Repository trait for client and session records.
///
/// Both upserts must be atomic per key: concurrent `upsert_session` calls
/// for one client leave exactly one row matching one of the writers.
/// The `update_*`/`set_valid` calls change only the columns they name, so
/// a rotation never undoes a revocation and vice versa.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get a client by primary key
    async fn find_client_by_id(&self, id: i64) -> Result<Option<Client>, StoreError>;

    /// Get a client by its public key
    async fn find_client_by_key(&self, key: &Key) -> Result<Option<Client>, StoreError>;

    /// Get the client owned by a user
    async fn find_client_by_user_id(&self, user_id: i64) -> Result<Option<Client>, StoreError>;

    /// Get the live session of a client
    async fn find_session_by_client_id(
        &self,
        client_id: i64,
    ) -> Result<Option<Session>, StoreError>;

    /// Insert or replace the client of `fields.user_id`
    async fn upsert_client(&self, fields: ClientFields) -> Result<Client, StoreError>;

    /// Replace the secret hash only
    async fn update_secret(&self, client_id: i64, secret_hash: Secret)
    -> Result<Client, StoreError>;

    /// Replace key and secret hash in one write
    async fn update_key_and_secret(
        &self,
        client_id: i64,
        key: Key,
        secret_hash: Secret,
    ) -> Result<Client, StoreError>;

    /// Set the validity flag only
    async fn set_valid(&self, client_id: i64, valid: bool) -> Result<Client, StoreError>;

    /// Insert or replace the session of `fields.client_id`
    async fn upsert_session(&self, fields: SessionFields) -> Result<Session, StoreError>;
}
