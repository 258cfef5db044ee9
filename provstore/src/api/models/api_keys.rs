//! API request/response models for API keys.

use crate::db::models::api_keys::IssuedApiKey;
use crate::types::{ApiKeyId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Exchange a username and password for a new API key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyLogin {
    #[schema(example = "alice")]
    pub username: String,
    pub password: String,
}

/// A freshly issued key. This is the only time the secret is returned.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ApiKeyId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub username: String,
    /// The secret, 40 lowercase hex characters
    pub key: String,
    /// Ready-made `Authorization` header value
    #[schema(example = "ApiKey alice:0123456789abcdef0123456789abcdef01234567")]
    pub authorization: String,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyResponse {
    pub fn new(issued: IssuedApiKey, username: String) -> Self {
        Self {
            authorization: format!("ApiKey {username}:{}", issued.secret),
            id: issued.key.id,
            user_id: issued.key.user_id,
            username,
            key: issued.secret,
            created_at: issued.key.created_at,
        }
    }
}
