//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The file path
//! defaults to `config.yaml` and can be set with `-f` or the `PROVSTORE_CONFIG` environment
//! variable.
//!
//! ## Loading Priority
//!
//! Sources are merged in this order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `PROVSTORE_`
//! 3. **DATABASE_URL** - Overrides `database.url` if set
//!
//! Nested values use double underscores, e.g. `PROVSTORE_AUTH__ANONYMOUS_READ=false`.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use provstore::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! PROVSTORE_PORT=8080
//! DATABASE_URL="sqlite://provstore.db"
//! PROVSTORE_DATABASE__POOL__MAX_CONNECTIONS=20
//! PROVSTORE_AUTH__API_KEY__ENABLED=false
//! PROVSTORE_ENABLE_METRICS=true
//! ```

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "PROVSTORE_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// All fields have defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Set from the `DATABASE_URL` environment variable; folded into `database.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// SQLite database settings
    pub database: DatabaseConfig,
    /// Username of the administrator created or updated on startup
    pub admin_username: String,
    /// Password for the initial administrator (optional, can be set via environment)
    pub admin_password: Option<String>,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// CORS settings
    pub security: SecurityConfig,
    /// Enable Prometheus metrics endpoint at `/internal/metrics`
    pub enable_metrics: bool,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// SQLite connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string, e.g. `sqlite://provstore.db` or `sqlite::memory:`
    pub url: String,
    /// Connection pool settings
    pub pool: PoolSettings,
}

/// Pool configuration passed through to `SqlitePoolOptions`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds, 0 = never)
    pub idle_timeout_secs: u64,
    /// Maximum lifetime of a connection (seconds, 0 = never)
    pub max_lifetime_secs: u64,
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// `Authorization: ApiKey <username>:<key>` authentication
    pub api_key: ApiKeyAuthConfig,
    /// Serve requests without credentials as the anonymous principal. When false, endpoints
    /// that accept anonymous callers answer 401 instead.
    pub anonymous_read: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiKeyAuthConfig {
    pub enabled: bool,
}

/// Security configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

/// CORS origin specification.
///
/// Can be either a wildcard (`*`) to allow all origins, or a specific URL.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    #[serde(deserialize_with = "parse_url")]
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

fn parse_url<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    Url::parse(&s).map_err(serde::de::Error::custom)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            database_url: None,
            database: DatabaseConfig::default(),
            admin_username: "admin".to_string(),
            admin_password: None,
            auth: AuthConfig::default(),
            security: SecurityConfig::default(),
            enable_metrics: false,
            enable_otel_export: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://provstore.db".to_string(),
            pool: PoolSettings::default(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: ApiKeyAuthConfig::default(),
            anonymous_read: true,
        }
    }
}

impl Default for ApiKeyAuthConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: Some(3600),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> Error {
    Error::Internal {
        operation: format!("Config validation: {message}"),
    }
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.database_url.take() {
            config.database.url = url;
        }

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.admin_username.trim().is_empty() {
            return Err(invalid("admin_username cannot be empty"));
        }
        if self.admin_username.contains(':') {
            return Err(invalid("admin_username cannot contain ':'"));
        }

        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url cannot be empty"));
        }

        let pool = &self.database.pool;
        if pool.max_connections == 0 {
            return Err(invalid("database.pool.max_connections must be at least 1"));
        }
        if pool.min_connections > pool.max_connections {
            return Err(invalid(format!(
                "database.pool.min_connections ({}) cannot be greater than max_connections ({})",
                pool.min_connections, pool.max_connections
            )));
        }

        if !self.auth.api_key.enabled && !self.auth.anonymous_read {
            return Err(invalid(
                "API key authentication is disabled and anonymous_read is false, so no request could be served",
            ));
        }

        let has_wildcard = self
            .security
            .cors
            .allowed_origins
            .iter()
            .any(|origin| matches!(origin, CorsOrigin::Wildcard));
        if has_wildcard && self.security.cors.allow_credentials {
            return Err(invalid(
                "CORS cannot use wildcard origin '*' with allow_credentials=true. Specify explicit origins.",
            ));
        }
        if has_wildcard && self.security.cors.allowed_origins.len() > 1 {
            return Err(invalid(
                "CORS wildcard origin '*' cannot be combined with explicit origins",
            ));
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            .merge(Yaml::file(&args.config))
            // PROVSTORE_CONFIG names the file itself
            .merge(Env::prefixed("PROVSTORE_").ignore(&["config"]).split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(path: &str) -> Args {
        Args {
            config: path.to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_defaults_without_file() {
        Jail::expect_with(|_jail| {
            let config = Config::load(&args("missing.yaml"))?;

            assert_eq!(config.port, 8000);
            assert_eq!(config.admin_username, "admin");
            assert!(config.auth.api_key.enabled);
            assert!(config.auth.anonymous_read);
            assert_eq!(config.database.pool.max_connections, 10);
            assert_eq!(config.security.cors.allowed_origins, vec![CorsOrigin::Wildcard]);
            Ok(())
        });
    }

    #[test]
    fn test_yaml_config() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
host: 127.0.0.1
port: 9000
admin_username: root
admin_password: hunter2hunter2
database:
  url: sqlite://test.db
  pool:
    max_connections: 4
auth:
  anonymous_read: false
security:
  cors:
    allowed_origins:
      - https://app.example.com
    allow_credentials: true
"#,
            )?;

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.bind_address(), "127.0.0.1:9000");
            assert_eq!(config.admin_username, "root");
            assert_eq!(config.admin_password.as_deref(), Some("hunter2hunter2"));
            assert_eq!(config.database.url, "sqlite://test.db");
            assert_eq!(config.database.pool.max_connections, 4);
            assert_eq!(config.database.pool.acquire_timeout_secs, 30);
            assert!(!config.auth.anonymous_read);
            assert_eq!(
                config.security.cors.allowed_origins,
                vec![CorsOrigin::Url(Url::parse("https://app.example.com").unwrap())]
            );
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_yaml() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 9000
database:
  url: sqlite://from-yaml.db
"#,
            )?;
            jail.set_env("PROVSTORE_PORT", "9100");
            jail.set_env("PROVSTORE_AUTH__API_KEY__ENABLED", "false");
            jail.set_env("DATABASE_URL", "sqlite://from-env.db");

            let config = Config::load(&args("test.yaml"))?;

            assert_eq!(config.port, 9100);
            assert!(!config.auth.api_key.enabled);
            assert_eq!(config.database.url, "sqlite://from-env.db");
            assert!(config.database_url.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file("test.yaml", "secret_key: nope\n")?;
            assert!(Config::load(&args("test.yaml")).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.admin_username = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.pool.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.pool.min_connections = 20;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auth.api_key.enabled = false;
        config.auth.anonymous_read = false;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.security.cors.allow_credentials = true;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config
            .security
            .cors
            .allowed_origins
            .push(CorsOrigin::Url(Url::parse("https://app.example.com").unwrap()));
        assert!(config.validate().is_err());
    }
}
