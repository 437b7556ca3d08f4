//! Database configuration module.
//!
//! Provides configuration structures for database connection management.

use crate::wallet::config::{env_lookup, parse_or};
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,

    /// How long a transaction waits for a wallet row lock, in milliseconds (0 = no limit)
    pub lock_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string (default: development database)
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 20)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 5)
    /// - `DB_CONNECTION_TIMEOUT`: Connection timeout in seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT`: Idle timeout in seconds (default: 600)
    /// - `DB_MAX_LIFETIME`: Max lifetime in seconds (default: 1800)
    /// - `DB_LOCK_TIMEOUT_MS`: Row lock wait limit in milliseconds (default: 5000)
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::development();
        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", defaults.min_connections),
            connection_timeout_secs: parse_or(
                &lookup,
                "DB_CONNECTION_TIMEOUT",
                defaults.connection_timeout_secs,
            ),
            idle_timeout_secs: parse_or(&lookup, "DB_IDLE_TIMEOUT", defaults.idle_timeout_secs),
            max_lifetime_secs: parse_or(&lookup, "DB_MAX_LIFETIME", defaults.max_lifetime_secs),
            lock_timeout_ms: parse_or(&lookup, "DB_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
        }
    }

    /// Create a default configuration for development
    ///
    /// Uses `postgres://postgres@localhost/digital_wallet` as the database URL
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/digital_wallet".to_string(),
            max_connections: 20,
            min_connections: 5,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            lock_timeout_ms: 5000,
        }
    }

    /// Row lock wait limit, if any
    pub fn lock_timeout(&self) -> Option<Duration> {
        (self.lock_timeout_ms > 0).then(|| Duration::from_millis(self.lock_timeout_ms))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}
