//! Verification of `Authorization: ApiKey <username>:<key>` credentials.

use crate::{
    api::models::users::CurrentUser,
    crypto::verify_api_key,
    db::handlers::ApiKeys,
    errors::{Error, Result},
};
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

/// Authorization scheme carrying an API key. Matched case-insensitively.
pub const API_KEY_SCHEME: &str = "ApiKey";

/// A username and key pair taken from an `Authorization` header.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyCredentials {
    pub username: String,
    pub key: String,
}

// Keep keys out of logs and spans
impl std::fmt::Debug for ApiKeyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyCredentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn malformed() -> Error {
    Error::Unauthenticated {
        message: Some("Malformed ApiKey authorization header, expected 'ApiKey <username>:<key>'".to_string()),
    }
}

/// Parse an `Authorization` header value.
///
/// Returns:
/// - `Ok(None)`: the header uses some other scheme
/// - `Ok(Some(credentials))`: a well-formed `ApiKey <username>:<key>`
/// - `Err(Unauthenticated)`: the `ApiKey` scheme with a malformed payload
pub fn parse_authorization(header: &str) -> Result<Option<ApiKeyCredentials>> {
    let mut parts = header.split_whitespace();
    let Some(scheme) = parts.next() else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case(API_KEY_SCHEME) {
        return Ok(None);
    }

    let payload = parts.next().ok_or_else(malformed)?;
    if parts.next().is_some() {
        return Err(malformed());
    }

    let (username, key) = payload.split_once(':').ok_or_else(malformed)?;
    if username.is_empty() || key.is_empty() {
        return Err(malformed());
    }

    Ok(Some(ApiKeyCredentials {
        username: username.to_string(),
        key: key.to_string(),
    }))
}

/// Resolve credentials to a user.
///
/// Unknown users, inactive users, users without a key and wrong keys all fail the same way, so
/// a caller cannot tell which usernames exist. On success the key's `last_used` is stamped.
#[instrument(skip(conn, credentials), fields(username = %credentials.username), err)]
pub async fn authenticate(conn: &mut SqliteConnection, credentials: &ApiKeyCredentials) -> Result<CurrentUser> {
    let rejected = || Error::Unauthenticated {
        message: Some("Invalid API key".to_string()),
    };

    let mut keys = ApiKeys::new(conn);
    let Some(record) = keys.get_credentials(&credentials.username).await? else {
        debug!("API key presented for unknown user");
        return Err(rejected());
    };

    if !record.is_active {
        debug!("API key presented for inactive user");
        return Err(rejected());
    }

    let digest = record.key_digest.as_deref().ok_or_else(rejected)?;
    if !verify_api_key(&credentials.key, digest) {
        return Err(rejected());
    }

    keys.touch(record.user_id).await?;

    Ok(CurrentUser {
        id: record.user_id,
        username: record.username,
        email: record.email,
        is_admin: record.is_admin,
        is_active: record.is_active,
    })
}
