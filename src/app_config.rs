//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with POLLBOX_, sections split by `__`)
//! 2. Config file (pollbox.toml)
//! 3. Default values
//!
//! The conventional `DATABASE_URL`, `SECRET_KEY` and `PORT` variables are honoured
//! as well. Secrets belong in the environment, not in the config file.

use crate::permission::OwnershipPolicy;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// "development" exposes internal error details in responses.
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            environment: "production".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. Empty selects the in-memory store.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 5,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token signing secret (should be in env var SECRET_KEY)
    pub secret_key: String,
    /// Bearer token lifetime in hours
    pub token_ttl_hours: u32,
    /// Whether `/api/auth/register/admin` accepts registrations
    pub allow_admin_registration: bool,
    /// How a request against somebody else's poll is answered
    pub ownership_mismatch: OwnershipPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            token_ttl_hours: 24 * 30,
            allow_admin_registration: true,
            ownership_mismatch: OwnershipPolicy::NotFound,
        }
    }
}

impl AuthConfig {
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours as i64)
    }
}

/// Poll rules and listing limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollsConfig {
    /// A new closing date must lie at least this far in the future
    pub closing_date_buffer_seconds: u32,
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for PollsConfig {
    fn default() -> Self {
        Self {
            closing_date_buffer_seconds: 60,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl PollsConfig {
    pub fn closing_date_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.closing_date_buffer_seconds as i64)
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Login and registration attempts per window, per IP
    pub auth_max_attempts: u32,
    pub auth_window_seconds: u32,
    /// Votes per window, per user
    pub vote_max: u32,
    pub vote_window_seconds: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth_max_attempts: 10,
            auth_window_seconds: 900,
            vote_max: 30,
            vote_window_seconds: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn auth_window(&self) -> Duration {
        Duration::from_secs(self.auth_window_seconds as u64)
    }

    pub fn vote_window(&self) -> Duration {
        Duration::from_secs(self.vote_window_seconds as u64)
    }

    /// Longest window; entries older than this can be dropped.
    pub fn longest_window(&self) -> Duration {
        self.auth_window().max(self.vote_window())
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub polls: PollsConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_path("pollbox.toml")?;
        config.apply_conventional_env();
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // e.g. POLLBOX_SERVER__PORT, POLLBOX_AUTH__OWNERSHIP_MISMATCH
            .add_source(
                Environment::with_prefix("POLLBOX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Fill gaps from the variables every deployment platform sets.
    fn apply_conventional_env(&mut self) {
        if self.database.url.is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                self.database.url = url;
            }
        }
        if self.auth.secret_key.is_empty() {
            if let Ok(key) = std::env::var("SECRET_KEY") {
                self.auth.secret_key = key;
            }
        }
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}
