//! Database models for API keys.

use crate::types::{ApiKeyId, UserId};
use chrono::{DateTime, Utc};

/// Database response for an API key. Only the digest of the secret is stored.
#[derive(Debug, Clone)]
pub struct ApiKeyDBResponse {
    pub id: ApiKeyId,
    pub user_id: UserId,
    pub key_digest: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// A freshly issued key. `secret` exists only in memory and is returned to the caller once.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key: ApiKeyDBResponse,
    pub secret: String,
}

/// Everything needed to verify an `ApiKey <username>:<key>` credential in one lookup
#[derive(Debug, Clone)]
pub struct ApiKeyCredentialRecord {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
    pub key_digest: Option<String>,
}
