use crate::{
    AppState,
    api::models::users::{CurrentUser, UserCreate, UserResponse},
    auth::{
        password::{hash_string, validate_password},
        permissions::require_admin,
    },
    db::{
        errors::DbError,
        handlers::{Groups, Repository, Users},
        models::users::UserCreateDBRequest,
    },
    errors::{Error, Result},
    types::Operation,
};
use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

/// Usernames appear inside `ApiKey <username>:<key>`, so they may not contain colons or
/// whitespace.
fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() || username.len() > 150 {
        return Err(Error::BadRequest {
            message: "Username must be between 1 and 150 characters".to_string(),
        });
    }
    if username.chars().any(|c| c == ':' || c.is_whitespace()) {
        return Err(Error::BadRequest {
            message: "Username must not contain ':' or whitespace".to_string(),
        });
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    summary = "Create user",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid username or password"),
        (status = 401, description = "Authentication required"),
        (status = 403, description = "Administrator privileges required"),
        (status = 409, description = "Username already taken"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(username = %data.username))]
pub async fn create_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(data): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    require_admin(&current_user, Operation::Create, "users")?;
    validate_username(&data.username)?;

    let password_hash = match data.password.clone() {
        Some(password) => {
            validate_password(&password)?;
            // Hash the password on a blocking thread to avoid blocking async runtime
            let hash = tokio::task::spawn_blocking(move || hash_string(&password))
                .await
                .map_err(|e| Error::Internal {
                    operation: format!("spawn password hashing task: {e}"),
                })??;
            Some(hash)
        }
        None => None,
    };

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn).create(&UserCreateDBRequest::new(data, password_hash)).await?;

    info!(user = %user.username, is_admin = user.is_admin, "Created user");
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    summary = "Get current user",
    responses(
        (status = 200, description = "The authenticated caller with group names", body = UserResponse),
        (status = 401, description = "Authentication required"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("ApiKeyAuth" = [])
    )
)]
#[tracing::instrument(skip_all, fields(username = %current_user.username))]
pub async fn get_current_user(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn)
        .get_by_id(current_user.id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "User".to_string(),
            id: current_user.id.to_string(),
        })?;
    let groups = Groups::new(&mut conn).get_user_groups(current_user.id).await?;

    Ok(Json(UserResponse::from(user).with_groups(groups.into_iter().map(|g| g.name).collect())))
}
