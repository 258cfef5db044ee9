//! # provstore: a provenance bundle store
//!
//! `provstore` stores provenance documents ("bundles") behind a REST API under `/api/v0`, with
//! API-key authentication and per-object capabilities.
//!
//! ## Overview
//!
//! Every request resolves to a principal: either a user authenticated with
//! `Authorization: ApiKey <username>:<key>`, or the anonymous caller. Each bundle carries grants
//! of five independent capabilities (`view`, `change`, `delete`, `admin`, `ownership`), made
//! either to individual users or to groups. The built-in `public` group contains every user and
//! the anonymous principal, so granting `view` to it publishes a bundle.
//!
//! A caller's capabilities on a bundle are the union of their direct grants, the grants of
//! every group they belong to, and the public group's grants. Administrators hold every
//! capability; inactive users hold none.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum) and storage is SQLite through
//! `sqlx`. Migrations are embedded and run on startup.
//!
//! - The **API layer** ([`api`]) holds handlers and wire models.
//! - The **authentication layer** ([`auth`]) parses credentials, resolves the principal and
//!   evaluates capabilities.
//! - The **database layer** ([`db`]) provides one repository per entity over a borrowed
//!   `SqliteConnection`, so handlers can compose them inside a transaction.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use provstore::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = provstore::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     provstore::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod errors;
mod openapi;
pub mod telemetry;
pub mod types;
use crate::config::CorsOrigin;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod test;

use crate::{
    auth::password,
    db::{
        errors::DbError,
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    openapi::ApiDoc,
};
use axum::http::HeaderValue;
use axum::{
    Router, http,
    routing::{get, post, put},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::{str::FromStr, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use types::{ApiKeyId, BundleId, Capability, CapabilitySet, GroupId, Principal, UserId};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder().db(pool).config(config).build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
}

/// Get the provstore database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial administrator if it doesn't exist.
///
/// Idempotent: an existing user with this username is promoted to administrator, reactivated,
/// and has its password replaced when one is given.
///
/// ```no_run
/// # use provstore::create_initial_admin_user;
/// # use sqlx::SqlitePool;
/// # async fn example(pool: SqlitePool) -> provstore::errors::Result<()> {
/// let user_id = create_initial_admin_user("admin", Some("secure_password"), &pool).await?;
/// # Ok(())
/// # }
/// ```
#[instrument(skip_all, fields(username = %username))]
pub async fn create_initial_admin_user(username: &str, password: Option<&str>, db: &SqlitePool) -> errors::Result<UserId> {
    let password_hash = password.map(password::hash_string).transpose()?;

    let mut tx = db.begin().await.map_err(DbError::from)?;
    let mut user_repo = Users::new(&mut tx);

    let user_id = match user_repo.get_user_by_username(username).await? {
        Some(existing) => {
            let update = UserUpdateDBRequest {
                password_hash,
                is_admin: Some(true),
                is_active: Some(true),
                ..Default::default()
            };
            user_repo.update(existing.id, &update).await?.id
        }
        None => {
            let create = UserCreateDBRequest {
                username: username.to_string(),
                email: None,
                password_hash,
                is_admin: true,
            };
            let created = user_repo.create(&create).await?;
            info!("Created initial admin user");
            created.id
        }
    };

    tx.commit().await.map_err(DbError::from)?;

    if password.is_none() {
        warn!("No admin password configured; API keys for the admin user can only be issued by another administrator");
    }

    Ok(user_id)
}

/// Open the SQLite pool, run migrations and ensure the initial administrator exists.
///
/// `sqlite::memory:` gives each pooled connection its own database, so in-memory setups should
/// use `max_connections: 1`.
async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.database.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let settings = &config.database.pool;
    let idle_timeout = (settings.idle_timeout_secs > 0).then(|| Duration::from_secs(settings.idle_timeout_secs));
    let max_lifetime = (settings.max_lifetime_secs > 0).then(|| Duration::from_secs(settings.max_lifetime_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(idle_timeout)
        .max_lifetime(max_lifetime)
        .connect_with(options)
        .await?;

    migrator().run(&pool).await?;

    create_initial_admin_user(&config.admin_username, config.admin_password.as_deref(), &pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create initial admin user: {}", e))?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let allowed = &config.security.cors.allowed_origins;
    let origins = if allowed.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(allowed.len());
        for origin in allowed {
            if let CorsOrigin::Url(url) = origin {
                values.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE])
        .allow_credentials(config.security.cors.allow_credentials)
        .expose_headers(vec![http::header::LOCATION]);

    if let Some(max_age) = config.security.cors.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Routes served under `/api/v0`. Bundle paths are registered with and without the trailing
/// slash.
fn api_routes(state: AppState) -> Router {
    use api::handlers::{api_keys, bundles, groups, permissions, users};

    Router::new()
        // Bundles
        .route("/bundle/", get(bundles::list_bundles).post(bundles::create_bundle))
        .route("/bundle", get(bundles::list_bundles).post(bundles::create_bundle))
        .route(
            "/bundle/{id}/",
            get(bundles::get_bundle).put(bundles::update_bundle).delete(bundles::delete_bundle),
        )
        .route(
            "/bundle/{id}",
            get(bundles::get_bundle).put(bundles::update_bundle).delete(bundles::delete_bundle),
        )
        // Object permissions
        .route("/bundle/{id}/permissions/", get(permissions::get_own_permissions))
        .route("/bundle/{id}/permissions", get(permissions::get_own_permissions))
        .route("/bundle/{id}/permissions/users/{username}/", get(permissions::get_user_permissions))
        .route("/bundle/{id}/permissions/users/{username}", get(permissions::get_user_permissions))
        .route(
            "/bundle/{id}/permissions/users/{username}/{capability}",
            put(permissions::grant_user_permission).delete(permissions::revoke_user_permission),
        )
        .route("/bundle/{id}/permissions/groups/", get(permissions::list_group_grants))
        .route("/bundle/{id}/permissions/groups", get(permissions::list_group_grants))
        .route(
            "/bundle/{id}/permissions/groups/{group}/{capability}",
            put(permissions::grant_group_permission).delete(permissions::revoke_group_permission),
        )
        // Groups
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route("/groups/{name}", get(groups::get_group).delete(groups::delete_group))
        .route(
            "/groups/{name}/users/{username}",
            put(groups::add_user_to_group).delete(groups::remove_user_from_group),
        )
        // Users and keys
        .route("/users", post(users::create_user))
        .route("/users/me", get(users::get_current_user))
        .route(
            "/users/me/api-key",
            post(api_keys::rotate_own_api_key).delete(api_keys::revoke_own_api_key),
        )
        .route("/authentication/api-key", post(api_keys::obtain_api_key))
        .route("/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .with_state(state)
}

/// Build the application router with all endpoints and middleware.
///
/// - `/healthz` liveness probe
/// - `/api/v0/*` bundle, permission, group, user and key endpoints
/// - `/internal/metrics` when `enable_metrics` is set
/// - CORS and request tracing layers
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .nest("/api/v0", api_routes(state.clone()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The assembled service: database pool, router and configuration.
///
/// 1. [`Application::new`] opens the database, runs migrations and builds the router
/// 2. [`Application::serve`] binds to the configured address and handles requests until the
///    shutdown future resolves, then closes the pool and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting provstore with configuration: {:#?}", config);

        let pool = setup_database(&config).await?;
        let app_state = AppState::builder().db(pool.clone()).config(config.clone()).build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("provstore listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppState, Application, build_router, create_initial_admin_user};
    use crate::{
        auth::password::verify_user_password,
        config::{Config, CorsOrigin, PoolSettings},
        db::handlers::{Repository, Users},
        test_utils::create_test_pool,
    };

    #[test_log::test(tokio::test)]
    async fn test_initial_admin_is_idempotent() {
        let pool = create_test_pool().await;

        let first = create_initial_admin_user("root", None, &pool).await.unwrap();
        let second = create_initial_admin_user("root", Some("a long enough password"), &pool).await.unwrap();
        assert_eq!(first, second);

        let mut conn = pool.acquire().await.unwrap();
        let user = Users::new(&mut conn).get_by_id(first).await.unwrap().unwrap();
        assert!(user.is_admin);
        assert!(verify_user_password(&user, "a long enough password").unwrap());
    }

    #[test_log::test(tokio::test)]
    async fn test_router_builds_from_default_config() {
        let state = AppState::builder()
            .db(create_test_pool().await)
            .config(Config::default())
            .build();
        let server = axum_test::TestServer::new(build_router(&state).unwrap()).unwrap();

        let response = server
            .get("/healthz")
            .add_header("origin", "https://anywhere.example.org")
            .await;
        response.assert_status_ok();
        assert_eq!(response.header("access-control-allow-origin"), "*");
    }

    #[test_log::test(tokio::test)]
    async fn test_router_echoes_only_listed_origins() {
        let mut config = Config::default();
        config.security.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.com".parse().unwrap())];
        let state = AppState::builder().db(create_test_pool().await).config(config).build();
        let server = axum_test::TestServer::new(build_router(&state).unwrap()).unwrap();

        let allowed = server.get("/healthz").add_header("origin", "https://app.example.com").await;
        assert_eq!(allowed.header("access-control-allow-origin"), "https://app.example.com");

        let other = server.get("/healthz").add_header("origin", "https://evil.example.org").await;
        assert!(other.maybe_header("access-control-allow-origin").is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_application_starts_on_in_memory_database() {
        let mut config = Config::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.pool = PoolSettings {
            max_connections: 1,
            idle_timeout_secs: 0,
            max_lifetime_secs: 0,
            ..Default::default()
        };
        config.admin_password = Some("hunter2hunter2".to_string());

        let server = Application::new(config).await.unwrap().into_test_server();

        let health = server.get("/healthz").await;
        health.assert_status_ok();
        health.assert_text("OK");

        let doc: serde_json::Value = server.get("/api/v0/openapi.json").await.json();
        assert!(doc["paths"]["/bundle/"].is_object());

        server.get("/api/v0/bundle/").await.assert_status_ok();
    }
}
