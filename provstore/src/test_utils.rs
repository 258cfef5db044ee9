//! Test utilities for integration testing (available with `test-utils` feature).

use crate::auth::password::{Argon2Params, hash_string_with_params};
use crate::config::{Config, DatabaseConfig, PoolSettings};
use crate::types::{BundleId, UserId};
use crate::{
    AppState,
    api::models::bundles::BundleResponse,
    db::{
        handlers::{ApiKeys, Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

/// A fresh, migrated in-memory database.
///
/// The pool holds a single connection that never expires, since every in-memory connection is
/// a separate database. Tests must release connections before issuing HTTP requests.
pub async fn create_test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("Invalid SQLite URL")
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to open in-memory database");

    crate::migrator().run(&pool).await.expect("Failed to run migrations");
    pool
}

pub fn create_test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            pool: PoolSettings {
                max_connections: 1,
                idle_timeout_secs: 0,
                max_lifetime_secs: 0,
                ..Default::default()
            },
        },
        admin_username: "admin".to_string(),
        admin_password: None,
        enable_metrics: false,
        enable_otel_export: false,
        ..Default::default()
    }
}

pub async fn create_test_app_with_config(config: Config) -> (TestServer, SqlitePool) {
    let pool = create_test_pool().await;
    let state = AppState::builder().db(pool.clone()).config(config).build();
    let router = crate::build_router(&state).expect("Failed to build router");
    let server = TestServer::new(router).expect("Failed to create test server");
    (server, pool)
}

pub async fn create_test_app() -> (TestServer, SqlitePool) {
    create_test_app_with_config(create_test_config()).await
}

/// Create a user and issue them an API key. Returns the user and the plaintext key.
pub async fn create_test_user(pool: &SqlitePool, username: &str, is_admin: bool) -> (UserDBResponse, String) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    let user = Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            username: username.to_string(),
            email: Some(format!("{username}@example.com")),
            password_hash: None,
            is_admin,
        })
        .await
        .expect("Failed to create test user");

    let issued = ApiKeys::new(&mut conn)
        .issue(user.id)
        .await
        .expect("Failed to issue test API key");

    (user, issued.secret)
}

/// Give a user a password, hashed with cheap parameters.
pub async fn set_test_password(pool: &SqlitePool, user_id: UserId, password: &str) {
    let hash = hash_string_with_params(password, Argon2Params::insecure_fast()).expect("Failed to hash password");
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .update(
            user_id,
            &UserUpdateDBRequest {
                password_hash: Some(hash),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to set test password");
}

/// The `Authorization` header value for a user's key.
pub fn api_key_header(username: &str, key: &str) -> String {
    format!("ApiKey {username}:{key}")
}

/// Store a small bundle as `username` through the API and return its id.
pub async fn create_bundle(server: &TestServer, username: &str, key: &str) -> BundleId {
    let response = server
        .post("/api/v0/bundle/")
        .add_header("authorization", api_key_header(username, key))
        .json(&json!({
            "rec_id": "#mockup",
            "content": {
                "prefix": {"ex": "http://example.org/"},
                "entity": {"ex:dataset": {"prov:label": "input data"}},
                "activity": {"ex:analysis": {}},
                "wasGeneratedBy": {"_:g1": {"prov:entity": "ex:dataset", "prov:activity": "ex:analysis"}}
            }
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<BundleResponse>().id
}
