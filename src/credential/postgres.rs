//! PostgreSQL credential store.
//!
//! Uses runtime queries so builds do not need a live database. Both upserts
//! are single `INSERT .. ON CONFLICT .. DO UPDATE .. RETURNING` statements,
//! which makes them atomic per user (clients) and per client (sessions).
//! Rotation and revocation are single-column `UPDATE .. RETURNING` writes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;

use super::models::{Client, ClientFields, Session, SessionFields};
use super::store::{CredentialStore, StoreError};
use crate::auth::models::Level;
use crate::db::{Database, SafeRow};
use crate::token::{Key, Secret, Token};

/// Schema bootstrap, idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS client_tb (
    client_id   BIGSERIAL PRIMARY KEY,
    user_id     BIGINT NOT NULL UNIQUE,
    level       INTEGER NOT NULL,
    key         VARCHAR(16) NOT NULL UNIQUE,
    secret_hash CHAR(64) NOT NULL,
    valid       BOOLEAN NOT NULL DEFAULT TRUE,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS session_tb (
    session_id  BIGSERIAL PRIMARY KEY,
    client_id   BIGINT NOT NULL UNIQUE REFERENCES client_tb (client_id) ON DELETE CASCADE,
    token_hash  CHAR(64) NOT NULL,
    expires_at  TIMESTAMPTZ,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

const CLIENT_COLUMNS: &str = "client_id, user_id, level, key, secret_hash, valid, created_at";
const SESSION_COLUMNS: &str = "session_id, client_id, token_hash, expires_at, created_at";

/// Credential store backed by `client_tb` / `session_tb`.
pub struct PgCredentialStore {
    db: Arc<Database>,
}

impl PgCredentialStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create tables if they do not exist.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(self.db.pool()).await?;
        tracing::info!("Credential schema ready");
        Ok(())
    }

    fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get_log(name)
            .ok_or_else(|| StoreError::Database(sqlx::Error::ColumnNotFound(name.into())))
    }

    fn row_to_client(row: &PgRow) -> Result<Client, StoreError> {
        let id: i64 = Self::column(row, "client_id")?;
        let key: String = Self::column(row, "key")?;
        let secret_hash: String = Self::column(row, "secret_hash")?;
        Ok(Client {
            id,
            user_id: Self::column(row, "user_id")?,
            level: Level(Self::column(row, "level")?),
            key: Key::new(key)
                .map_err(|e| StoreError::Corrupt(format!("client {} key: {}", id, e)))?,
            secret_hash: Secret::from_hash(secret_hash)
                .map_err(|e| StoreError::Corrupt(format!("client {} secret_hash: {}", id, e)))?,
            valid: Self::column(row, "valid")?,
            created: Self::column(row, "created_at")?,
        })
    }

    fn row_to_session(row: &PgRow) -> Result<Session, StoreError> {
        let id: i64 = Self::column(row, "session_id")?;
        let token_hash: String = Self::column(row, "token_hash")?;
        Ok(Session {
            id,
            client_id: Self::column(row, "client_id")?,
            token_hash: Token::from_hash(token_hash)
                .map_err(|e| StoreError::Corrupt(format!("session {} token_hash: {}", id, e)))?,
            expires: Self::column::<Option<DateTime<Utc>>>(row, "expires_at")?,
            created: Self::column(row, "created_at")?,
        })
    }

    async fn fetch_client(
        &self,
        column: &str,
        bind: ClientFilter<'_>,
    ) -> Result<Option<Client>, StoreError> {
        let sql = format!("SELECT {} FROM client_tb WHERE {} = $1", CLIENT_COLUMNS, column);
        let query = sqlx::query(&sql);
        let query = match bind {
            ClientFilter::Id(v) => query.bind(v),
            ClientFilter::Key(v) => query.bind(v),
        };
        let row = query.fetch_optional(self.db.pool()).await?;
        row.as_ref().map(Self::row_to_client).transpose()
    }
}

enum ClientFilter<'a> {
    Id(i64),
    Key(&'a str),
}

/// Map constraint violations onto store error kinds.
fn classify(e: sqlx::Error, client_id: Option<i64>) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StoreError::Conflict(db.message().to_string());
        }
        if db.is_foreign_key_violation() {
            if let Some(id) = client_id {
                return StoreError::MissingClient(id);
            }
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_client_by_id(&self, id: i64) -> Result<Option<Client>, StoreError> {
        self.fetch_client("client_id", ClientFilter::Id(id)).await
    }

    async fn find_client_by_key(&self, key: &Key) -> Result<Option<Client>, StoreError> {
        self.fetch_client("key", ClientFilter::Key(key.expose())).await
    }

    async fn find_client_by_user_id(&self, user_id: i64) -> Result<Option<Client>, StoreError> {
        self.fetch_client("user_id", ClientFilter::Id(user_id)).await
    }

    async fn find_session_by_client_id(
        &self,
        client_id: i64,
    ) -> Result<Option<Session>, StoreError> {
        let sql = format!(
            "SELECT {} FROM session_tb WHERE client_id = $1",
            SESSION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(client_id)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn upsert_client(&self, fields: ClientFields) -> Result<Client, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO client_tb (user_id, level, key, secret_hash, valid)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET level = EXCLUDED.level,
                key = EXCLUDED.key,
                secret_hash = EXCLUDED.secret_hash,
                valid = EXCLUDED.valid
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        );
        let secret_hash = fields.secret_hash.hashed();
        let row = sqlx::query(&sql)
            .bind(fields.user_id)
            .bind(fields.level.0)
            .bind(fields.key.expose())
            .bind(secret_hash.expose())
            .bind(fields.valid)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| classify(e, None))?;
        Self::row_to_client(&row)
    }

    async fn update_secret(
        &self,
        client_id: i64,
        secret_hash: Secret,
    ) -> Result<Client, StoreError> {
        let sql = format!(
            "UPDATE client_tb SET secret_hash = $2 WHERE client_id = $1 RETURNING {}",
            CLIENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(client_id)
            .bind(secret_hash.hashed().expose())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| classify(e, Some(client_id)))?;
        let row = row.ok_or(StoreError::MissingClient(client_id))?;
        Self::row_to_client(&row)
    }

    async fn update_key_and_secret(
        &self,
        client_id: i64,
        key: Key,
        secret_hash: Secret,
    ) -> Result<Client, StoreError> {
        let sql = format!(
            "UPDATE client_tb SET key = $2, secret_hash = $3 WHERE client_id = $1 RETURNING {}",
            CLIENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(client_id)
            .bind(key.expose())
            .bind(secret_hash.hashed().expose())
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| classify(e, Some(client_id)))?;
        let row = row.ok_or(StoreError::MissingClient(client_id))?;
        Self::row_to_client(&row)
    }

    async fn set_valid(&self, client_id: i64, valid: bool) -> Result<Client, StoreError> {
        let sql = format!(
            "UPDATE client_tb SET valid = $2 WHERE client_id = $1 RETURNING {}",
            CLIENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(client_id)
            .bind(valid)
            .fetch_optional(self.db.pool())
            .await?;
        let row = row.ok_or(StoreError::MissingClient(client_id))?;
        Self::row_to_client(&row)
    }

    async fn upsert_session(&self, fields: SessionFields) -> Result<Session, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO session_tb (client_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (client_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = NOW()
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );
        let token_hash = fields.token_hash.hashed();
        let row = sqlx::query(&sql)
            .bind(fields.client_id)
            .bind(token_hash.expose())
            .bind(fields.expires)
            .fetch_one(self.db.pool())
            .await
            .map_err(|e| classify(e, Some(fields.client_id)))?;
        Self::row_to_session(&row)
    }
}
