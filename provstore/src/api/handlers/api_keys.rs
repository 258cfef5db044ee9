use crate::{
    AppState,
    api::models::{
        api_keys::{ApiKeyLogin, ApiKeyResponse},
        users::CurrentUser,
    },
    auth::password::verify_login,
    db::{
        errors::DbError,
        handlers::{ApiKeys, Users},
    },
    errors::{Error, Result},
};
use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

/// Issue a new key for the caller, replacing the current one.
///
/// This is the only time the key is returned in a response.
#[utoipa::path(
    post,
    path = "/users/me/api-key",
    tag = "api_keys",
    summary = "Rotate own API key",
    responses(
        (status = 201, description = "New API key", body = ApiKeyResponse),
        (status = 401, description = "Authentication required"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(username = %current_user.username))]
pub async fn rotate_own_api_key(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<(StatusCode, Json<ApiKeyResponse>)> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let issued = ApiKeys::new(&mut conn).issue(current_user.id).await?;

    info!("Rotated API key");
    Ok((StatusCode::CREATED, Json(ApiKeyResponse::new(issued, current_user.username))))
}

/// Revoke the caller's key. Subsequent requests with it are rejected.
#[utoipa::path(
    delete,
    path = "/users/me/api-key",
    tag = "api_keys",
    summary = "Revoke own API key",
    responses(
        (status = 204, description = "API key revoked"),
        (status = 401, description = "Authentication required"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(username = %current_user.username))]
pub async fn revoke_own_api_key(State(state): State<AppState>, current_user: CurrentUser) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    ApiKeys::new(&mut conn).revoke_for_user(current_user.id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Exchange a username and password for a new API key, replacing any existing one.
#[utoipa::path(
    post,
    path = "/authentication/api-key",
    tag = "authentication",
    summary = "Obtain API key",
    request_body = ApiKeyLogin,
    responses(
        (status = 201, description = "New API key", body = ApiKeyResponse),
        (status = 401, description = "Invalid username or password"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all, fields(username = %data.username))]
pub async fn obtain_api_key(State(state): State<AppState>, Json(data): Json<ApiKeyLogin>) -> Result<(StatusCode, Json<ApiKeyResponse>)> {
    let invalid = || Error::Unauthenticated {
        message: Some("Invalid username or password".to_string()),
    };

    let user = {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Users::new(&mut conn).get_user_by_username(&data.username).await?
    };

    // Verify password on a blocking thread to avoid blocking async runtime
    let password = data.password;
    let (user, is_valid) = tokio::task::spawn_blocking(move || {
        let is_valid = verify_login(user.as_ref(), &password);
        (user, is_valid)
    })
    .await
    .map_err(|e| Error::Internal {
        operation: format!("spawn password verification task: {e}"),
    })?;

    let user = match (user, is_valid?) {
        (Some(user), true) => user,
        _ => return Err(invalid()),
    };

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    let issued = ApiKeys::new(&mut tx).issue(user.id).await?;
    tx.commit().await.map_err(DbError::from)?;

    info!("Issued API key from password");
    Ok((StatusCode::CREATED, Json(ApiKeyResponse::new(issued, user.username))))
}
