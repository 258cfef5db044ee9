//! Axum extractors resolving the caller of a request.
//!
//! - [`Principal`]: the authenticated user, or `Anonymous` when no credentials were presented
//! - [`CurrentUser`]: like `Principal`, but rejects anonymous callers with 401
//!
//! Credentials that are present but invalid are always rejected, even on endpoints anonymous
//! callers may use. A caller never silently falls back to anonymous with a bad key.

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::credentials::{authenticate, parse_authorization},
    db::errors::DbError,
    errors::{Error, Result},
    types::Principal,
};
use axum::{extract::FromRequestParts, http::request::Parts};
use sqlx::SqlitePool;
use tracing::{debug, instrument, trace};

/// Extract user from the `ApiKey` Authorization header if present and valid
/// Returns:
/// - None: No Authorization header, or a scheme other than ApiKey
/// - Some(Ok(user)): Valid API key found and user authenticated
/// - Some(Err(error)): ApiKey credentials present but malformed or invalid
#[instrument(skip(parts, db))]
async fn try_api_key_auth(parts: &Parts, db: &SqlitePool) -> Option<Result<CurrentUser>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::Unauthenticated {
                message: Some(format!("Invalid authorization header: {e}")),
            }));
        }
    };

    let credentials = match parse_authorization(auth_str) {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return None,
        Err(e) => return Some(Err(e)),
    };

    let mut conn = match db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(DbError::from(e).into())),
    };

    Some(authenticate(&mut conn, &credentials).await)
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        if state.config.auth.api_key.enabled {
            match try_api_key_auth(parts, &state.db).await {
                Some(Ok(user)) => {
                    debug!("Found API key authenticated user: {}", user.username);
                    return Ok(Principal::User(user));
                }
                Some(Err(e)) => {
                    trace!("API key authentication failed: {:?}", e);
                    return Err(e);
                }
                None => trace!("No API key authentication attempted"),
            }
        }

        if !state.config.auth.anonymous_read {
            trace!("Anonymous access disabled");
            return Err(Error::Unauthenticated { message: None });
        }

        Ok(Principal::Anonymous)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Anonymous access settings are irrelevant here; credentials are mandatory
        if state.config.auth.api_key.enabled {
            if let Some(result) = try_api_key_auth(parts, &state.db).await {
                return result;
            }
        }

        trace!("No authentication credentials found in request");
        Err(Error::Unauthenticated { message: None })
    }
}
