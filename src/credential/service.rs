//! Credential lifecycle.
//!
//! Mints and rotates key/secret pairs and mints or refreshes session
//! tokens. Plaintext key, secret and token values appear only in the
//! returned [`IssuedCredentials`] / [`IssuedSession`]; everything written
//! to the store is hashed.

use std::sync::Arc;

use super::models::{Client, ClientFields, IssuedCredentials, IssuedSession, SessionFields};
use super::store::CredentialStore;
use crate::auth::error::{AuthError, AuthErrorCode};
use crate::auth::models::Level;
use crate::config::ApiConfig;
use crate::token::{Cipher, Claim, Key, Secret, SessionTtl};

/// Client and session lifecycle over a [`CredentialStore`].
#[derive(Clone)]
pub struct CredentialService {
    store: Arc<dyn CredentialStore>,
    cipher: Arc<Cipher>,
    default_ttl: SessionTtl,
    default_level: Level,
}

impl CredentialService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: Arc<Cipher>,
        default_ttl: SessionTtl,
        default_level: Level,
    ) -> Self {
        Self {
            store,
            cipher,
            default_ttl,
            default_level,
        }
    }

    /// Build from the `api` configuration section, loading the cipher.
    pub fn from_config(
        store: Arc<dyn CredentialStore>,
        config: &ApiConfig,
    ) -> Result<Self, AuthError> {
        let cipher = Cipher::from_config(config)?;
        Ok(Self::new(
            store,
            Arc::new(cipher),
            config.session_ttl(),
            config.client_level(),
        ))
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    pub fn default_ttl(&self) -> SessionTtl {
        self.default_ttl
    }

    /// Resolve the client owned by `user_id`.
    pub async fn client_for_user(&self, user_id: i64) -> Result<Client, AuthError> {
        self.store
            .find_client_by_user_id(user_id)
            .await?
            .ok_or_else(|| {
                AuthError::new(
                    AuthErrorCode::ClientNotFound,
                    format!("No client for user_id={}", user_id),
                )
            })
    }

    /// Create a client for a user that has none.
    ///
    /// Returns the plaintext key and secret; only the secret hash is stored.
    pub async fn issue_client(
        &self,
        user_id: i64,
        level: Option<Level>,
    ) -> Result<IssuedCredentials, AuthError> {
        if self.store.find_client_by_user_id(user_id).await?.is_some() {
            return Err(AuthError::new(
                AuthErrorCode::ClientExists,
                format!("Client already exists for user_id={}", user_id),
            ));
        }

        let key = Key::generate()?;
        let secret = Secret::generate()?;
        let level = level.unwrap_or(self.default_level);
        let client = self
            .store
            .upsert_client(ClientFields {
                user_id,
                level,
                key: key.clone(),
                secret_hash: secret.hashed(),
                valid: true,
            })
            .await?;

        tracing::info!(
            user_id,
            client_id = client.id,
            level = %client.level,
            key = %key,
            "Added client for user"
        );
        Ok(IssuedCredentials {
            key,
            secret,
            client,
        })
    }

    /// Replace the secret, keeping the key.
    ///
    /// Only `client.id` is read; level and validity come from the store.
    pub async fn rotate_secret(&self, client: &Client) -> Result<IssuedCredentials, AuthError> {
        let secret = Secret::generate()?;
        let client = self
            .store
            .update_secret(client.id, secret.hashed())
            .await?;

        tracing::info!(
            user_id = client.user_id,
            client_id = client.id,
            "Updated client secret"
        );
        Ok(IssuedCredentials {
            key: client.key.clone(),
            secret,
            client,
        })
    }

    /// Replace key and secret in a single write.
    pub async fn rotate_key_and_secret(
        &self,
        client: &Client,
    ) -> Result<IssuedCredentials, AuthError> {
        let key = Key::generate()?;
        let secret = Secret::generate()?;
        let client = self
            .store
            .update_key_and_secret(client.id, key.clone(), secret.hashed())
            .await?;

        tracing::info!(
            user_id = client.user_id,
            client_id = client.id,
            key = %key,
            "Updated client key and secret"
        );
        Ok(IssuedCredentials {
            key,
            secret,
            client,
        })
    }

    /// Mark the client revoked. Key, secret hash and session are kept.
    pub async fn revoke(&self, client: &Client) -> Result<Client, AuthError> {
        let client = self.store.set_valid(client.id, false).await?;

        tracing::info!(
            user_id = client.user_id,
            client_id = client.id,
            "Revoked client credentials"
        );
        Ok(client)
    }

    /// Mint a token for `client` and replace its stored session.
    pub async fn issue_or_refresh_session(
        &self,
        client: &Client,
        ttl: SessionTtl,
    ) -> Result<IssuedSession, AuthError> {
        let claim = Claim::issue(client.id, ttl);
        let token = claim.encrypt(&self.cipher)?;
        let session = self
            .store
            .upsert_session(SessionFields {
                client_id: client.id,
                token_hash: token.hashed(),
                expires: claim.expiration(),
            })
            .await?;

        tracing::info!(
            client_id = client.id,
            session_id = session.id,
            token = %token,
            expires = ?claim.expiration(),
            "Refreshed session token"
        );
        Ok(IssuedSession {
            claim,
            token,
            session,
        })
    }

    /// [`issue_or_refresh_session`](Self::issue_or_refresh_session) with the configured TTL.
    pub async fn issue_session(&self, client: &Client) -> Result<IssuedSession, AuthError> {
        self.issue_or_refresh_session(client, self.default_ttl).await
    }
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService")
            .field("cipher", &self.cipher)
            .field("default_ttl", &self.default_ttl)
            .field("default_level", &self.default_level)
            .finish_non_exhaustive()
    }
}
