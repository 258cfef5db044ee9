//! Database repository for API keys.
//!
//! Each user holds at most one key. Issuing a key for a user that already has one replaces it,
//! so the previous secret stops working immediately.

use crate::crypto::{digest_api_key, generate_api_key};
use crate::db::{
    errors::Result,
    models::api_keys::{ApiKeyCredentialRecord, ApiKeyDBResponse, IssuedApiKey},
};
use crate::types::{ApiKeyId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection};
use tracing::instrument;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct ApiKey {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub key_digest: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

impl From<ApiKey> for ApiKeyDBResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            user_id: key.user_id,
            key_digest: key.key_digest,
            created_at: key.created_at,
            last_used: key.last_used,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct CredentialRow {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub key_digest: Option<String>,
}

pub struct ApiKeys<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> ApiKeys<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Generate a fresh key for the user, replacing any existing one.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn issue(&mut self, user_id: UserId) -> Result<IssuedApiKey> {
        let secret = generate_api_key();

        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (id, user_id, key_digest, created_at, last_used)
            VALUES (?, ?, ?, ?, NULL)
            ON CONFLICT (user_id) DO UPDATE SET
                id = excluded.id,
                key_digest = excluded.key_digest,
                created_at = excluded.created_at,
                last_used = NULL
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(digest_api_key(&secret))
        .bind(Utc::now())
        .fetch_one(&mut *self.db)
        .await?;

        Ok(IssuedApiKey {
            key: ApiKeyDBResponse::from(key),
            secret,
        })
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_for_user(&mut self, user_id: UserId) -> Result<Option<ApiKeyDBResponse>> {
        let key = sqlx::query_as::<_, ApiKey>("SELECT * FROM api_keys WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(key.map(ApiKeyDBResponse::from))
    }

    /// Remove the user's key. Returns false if they had none.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn revoke_for_user(&mut self, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM api_keys WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn touch(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used = ? WHERE user_id = ?")
            .bind(Utc::now())
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Look up a user and their key digest by username in a single query.
    ///
    /// `key_digest` is `None` when the user exists but has no key.
    #[instrument(skip(self), err)]
    pub async fn get_credentials(&mut self, username: &str) -> Result<Option<ApiKeyCredentialRecord>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT u.id AS user_id, u.username, u.email, u.is_admin, u.is_active, k.key_digest
            FROM users u
            LEFT JOIN api_keys k ON k.user_id = u.id
            WHERE u.username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(row.map(|r| ApiKeyCredentialRecord {
            user_id: r.user_id,
            username: r.username,
            email: r.email,
            is_admin: r.is_admin,
            is_active: r.is_active,
            key_digest: r.key_digest,
        }))
    }
}
