//! In-process credential store.
//!
//! Clients live behind one `RwLock` so the user-id and key indexes change
//! together with the row. Sessions live in a `DashMap` keyed by client id;
//! the entry API holds the shard lock for the whole read-modify-write, so a
//! refresh replaces the row in place and concurrent refreshes of one client
//! are last-writer-wins with no duplicates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;

use super::models::{Client, ClientFields, Session, SessionFields};
use super::store::{CredentialStore, StoreError};
use crate::token::{Key, Secret};

#[derive(Default)]
struct ClientTable {
    by_id: HashMap<i64, Client>,
    id_by_user: HashMap<i64, i64>,
    id_by_key: HashMap<String, i64>,
}

/// Thread-safe in-memory store.
pub struct MemoryCredentialStore {
    clients: RwLock<ClientTable>,
    sessions: DashMap<i64, Session>,
    next_client_id: AtomicI64,
    next_session_id: AtomicI64,
}

impl MemoryCredentialStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(ClientTable::default()),
            sessions: DashMap::new(),
            next_client_id: AtomicI64::new(1),
            next_session_id: AtomicI64::new(1),
        }
    }

    /// Number of clients.
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.by_id.len()
    }

    /// Number of sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_client_by_id(&self, id: i64) -> Result<Option<Client>, StoreError> {
        Ok(self.clients.read().await.by_id.get(&id).cloned())
    }

    async fn find_client_by_key(&self, key: &Key) -> Result<Option<Client>, StoreError> {
        let table = self.clients.read().await;
        Ok(table
            .id_by_key
            .get(key.expose())
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_client_by_user_id(&self, user_id: i64) -> Result<Option<Client>, StoreError> {
        let table = self.clients.read().await;
        Ok(table
            .id_by_user
            .get(&user_id)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn find_session_by_client_id(
        &self,
        client_id: i64,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(&client_id).map(|s| s.value().clone()))
    }

    async fn upsert_client(&self, fields: ClientFields) -> Result<Client, StoreError> {
        let mut table = self.clients.write().await;
        let existing = table.id_by_user.get(&fields.user_id).copied();

        if let Some(owner) = table.id_by_key.get(fields.key.expose()) {
            if Some(*owner) != existing {
                return Err(StoreError::Conflict(format!(
                    "key {} already in use",
                    fields.key
                )));
            }
        }

        let client = match existing.and_then(|id| table.by_id.get(&id)) {
            Some(old) => Client {
                id: old.id,
                user_id: old.user_id,
                level: fields.level,
                key: fields.key,
                secret_hash: fields.secret_hash.hashed(),
                valid: fields.valid,
                created: old.created,
            },
            None => Client {
                id: self.next_client_id.fetch_add(1, Ordering::Relaxed),
                user_id: fields.user_id,
                level: fields.level,
                key: fields.key,
                secret_hash: fields.secret_hash.hashed(),
                valid: fields.valid,
                created: Utc::now(),
            },
        };

        if let Some(old_key) = table
            .by_id
            .get(&client.id)
            .map(|old| old.key.expose().to_string())
        {
            table.id_by_key.remove(&old_key);
        }
        table
            .id_by_key
            .insert(client.key.expose().to_string(), client.id);
        table.id_by_user.insert(client.user_id, client.id);
        table.by_id.insert(client.id, client.clone());

        Ok(client)
    }

    async fn update_secret(
        &self,
        client_id: i64,
        secret_hash: Secret,
    ) -> Result<Client, StoreError> {
        let mut table = self.clients.write().await;
        let client = table
            .by_id
            .get_mut(&client_id)
            .ok_or(StoreError::MissingClient(client_id))?;
        client.secret_hash = secret_hash.hashed();
        Ok(client.clone())
    }

    async fn update_key_and_secret(
        &self,
        client_id: i64,
        key: Key,
        secret_hash: Secret,
    ) -> Result<Client, StoreError> {
        let mut table = self.clients.write().await;
        if let Some(owner) = table.id_by_key.get(key.expose()) {
            if *owner != client_id {
                return Err(StoreError::Conflict(format!("key {} already in use", key)));
            }
        }

        let ClientTable {
            by_id, id_by_key, ..
        } = &mut *table;
        let client = by_id
            .get_mut(&client_id)
            .ok_or(StoreError::MissingClient(client_id))?;
        id_by_key.remove(client.key.expose());
        id_by_key.insert(key.expose().to_string(), client_id);
        client.key = key;
        client.secret_hash = secret_hash.hashed();
        Ok(client.clone())
    }

    async fn set_valid(&self, client_id: i64, valid: bool) -> Result<Client, StoreError> {
        let mut table = self.clients.write().await;
        let client = table
            .by_id
            .get_mut(&client_id)
            .ok_or(StoreError::MissingClient(client_id))?;
        client.valid = valid;
        Ok(client.clone())
    }

    async fn upsert_session(&self, fields: SessionFields) -> Result<Session, StoreError> {
        if !self
            .clients
            .read()
            .await
            .by_id
            .contains_key(&fields.client_id)
        {
            return Err(StoreError::MissingClient(fields.client_id));
        }

        let token_hash = fields.token_hash.hashed();
        let session = match self.sessions.entry(fields.client_id) {
            Entry::Occupied(mut entry) => {
                let session = entry.get_mut();
                session.token_hash = token_hash;
                session.expires = fields.expires;
                session.created = Utc::now();
                session.clone()
            }
            Entry::Vacant(entry) => {
                let session = Session {
                    id: self.next_session_id.fetch_add(1, Ordering::Relaxed),
                    client_id: fields.client_id,
                    token_hash,
                    expires: fields.expires,
                    created: Utc::now(),
                };
                entry.insert(session.clone());
                session
            }
        };
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Level;
    use crate::token::Token;
    use std::sync::Arc;

    fn fields(user_id: i64) -> ClientFields {
        ClientFields {
            user_id,
            level: Level::DEFAULT,
            key: Key::generate().unwrap(),
            secret_hash: Secret::generate().unwrap().hashed(),
            valid: true,
        }
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryCredentialStore::new();
        let f = fields(42);
        let key = f.key.clone();
        let client = store.upsert_client(f).await.unwrap();

        assert_eq!(client.user_id, 42);
        let by_key = store.find_client_by_key(&key).await.unwrap().unwrap();
        assert_eq!(by_key.id, client.id);
        let by_user = store.find_client_by_user_id(42).await.unwrap().unwrap();
        assert_eq!(by_user.id, client.id);
        let by_id = store.find_client_by_id(client.id).await.unwrap().unwrap();
        assert_eq!(by_id.key, key);
        assert!(store.find_client_by_user_id(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_key() {
        let store = MemoryCredentialStore::new();
        let first = fields(42);
        let old_key = first.key.clone();
        let client = store.upsert_client(first).await.unwrap();

        let second = fields(42);
        let new_key = second.key.clone();
        let updated = store.upsert_client(second).await.unwrap();

        assert_eq!(updated.id, client.id);
        assert_eq!(updated.created, client.created);
        assert!(store.find_client_by_key(&old_key).await.unwrap().is_none());
        assert!(store.find_client_by_key(&new_key).await.unwrap().is_some());
        assert_eq!(store.client_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_key_and_secret_reindexes() {
        let store = MemoryCredentialStore::new();
        let client = store.upsert_client(fields(42)).await.unwrap();

        let key = Key::generate().unwrap();
        let secret = Secret::generate().unwrap();
        let updated = store
            .update_key_and_secret(client.id, key.clone(), secret.clone())
            .await
            .unwrap();

        assert_eq!(updated.id, client.id);
        assert!(updated.secret_hash.is_hash());
        assert!(secret.equals(&updated.secret_hash));
        assert!(store.find_client_by_key(&client.key).await.unwrap().is_none());
        let found = store.find_client_by_key(&key).await.unwrap().unwrap();
        assert_eq!(found.id, client.id);
    }

    #[tokio::test]
    async fn test_update_key_taken_by_other_client() {
        let store = MemoryCredentialStore::new();
        let a = store.upsert_client(fields(1)).await.unwrap();
        let b = store.upsert_client(fields(2)).await.unwrap();

        let result = store
            .update_key_and_secret(b.id, a.key.clone(), Secret::generate().unwrap())
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        let owner = store.find_client_by_key(&a.key).await.unwrap().unwrap();
        assert_eq!(owner.id, a.id);
        assert!(store.find_client_by_key(&b.key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_partial_updates_leave_other_columns() {
        let store = MemoryCredentialStore::new();
        let client = store.upsert_client(fields(42)).await.unwrap();

        let revoked = store.set_valid(client.id, false).await.unwrap();
        assert!(!revoked.valid);

        let secret = Secret::generate().unwrap();
        let rotated = store.update_secret(client.id, secret.hashed()).await.unwrap();
        assert!(!rotated.valid);
        assert_eq!(rotated.key, client.key);
        assert_eq!(rotated.level, client.level);
        assert!(secret.equals(&rotated.secret_hash));
    }

    #[tokio::test]
    async fn test_update_missing_client() {
        let store = MemoryCredentialStore::new();
        assert!(matches!(
            store.set_valid(7, false).await,
            Err(StoreError::MissingClient(7))
        ));
        assert!(matches!(
            store.update_secret(7, Secret::generate().unwrap()).await,
            Err(StoreError::MissingClient(7))
        ));
        assert!(matches!(
            store
                .update_key_and_secret(7, Key::generate().unwrap(), Secret::generate().unwrap())
                .await,
            Err(StoreError::MissingClient(7))
        ));
    }

    #[tokio::test]
    async fn test_key_conflict() {
        let store = MemoryCredentialStore::new();
        let a = fields(1);
        let mut b = fields(2);
        b.key = a.key.clone();
        store.upsert_client(a).await.unwrap();
        assert!(matches!(
            store.upsert_client(b).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_secret_always_stored_hashed() {
        let store = MemoryCredentialStore::new();
        let mut f = fields(1);
        let secret = Secret::generate().unwrap();
        f.secret_hash = secret.clone();
        let client = store.upsert_client(f).await.unwrap();
        assert!(client.secret_hash.is_hash());
        assert!(secret.equals(&client.secret_hash));
    }

    #[tokio::test]
    async fn test_session_requires_client() {
        let store = MemoryCredentialStore::new();
        let result = store
            .upsert_session(SessionFields {
                client_id: 99,
                token_hash: Token::new("abc").unwrap().hashed(),
                expires: None,
            })
            .await;
        assert!(matches!(result, Err(StoreError::MissingClient(99))));
    }

    #[tokio::test]
    async fn test_session_replaced_in_place() {
        let store = MemoryCredentialStore::new();
        let client = store.upsert_client(fields(1)).await.unwrap();

        let t1 = Token::new("first-token").unwrap();
        let t2 = Token::new("second-token").unwrap();
        let s1 = store
            .upsert_session(SessionFields {
                client_id: client.id,
                token_hash: t1.hashed(),
                expires: None,
            })
            .await
            .unwrap();
        let s2 = store
            .upsert_session(SessionFields {
                client_id: client.id,
                token_hash: t2.hashed(),
                expires: None,
            })
            .await
            .unwrap();

        assert_eq!(s1.id, s2.id);
        assert_eq!(store.session_count(), 1);
        let live = store
            .find_session_by_client_id(client.id)
            .await
            .unwrap()
            .unwrap();
        assert!(live.matches(&t2));
        assert!(!live.matches(&t1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_single_row() {
        let store = Arc::new(MemoryCredentialStore::new());
        let client = store.upsert_client(fields(1)).await.unwrap();

        let mut handles = vec![];
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let token = Token::new(format!("token-{}", i)).unwrap();
                store
                    .upsert_session(SessionFields {
                        client_id: client.id,
                        token_hash: token.hashed(),
                        expires: None,
                    })
                    .await
                    .unwrap();
                token
            }));
        }

        let mut tokens = vec![];
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }

        assert_eq!(store.session_count(), 1);
        let live = store
            .find_session_by_client_id(client.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tokens.iter().filter(|t| live.matches(t)).count(), 1);
    }
}
