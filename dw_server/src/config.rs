//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use digital_wallet::db::DatabaseConfig;
use digital_wallet::wallet::WalletConfig;
use digital_wallet::wallet::config::{env_lookup, parse_or};
use std::net::SocketAddr;

/// Bind address used when neither `--bind` nor `SERVER_BIND` is given
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Wallet defaults and limits
    pub wallet: WalletConfig,
    /// Serve from the in-process store instead of PostgreSQL
    pub in_memory: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `in_memory` - Use the in-process store (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if `SERVER_BIND` is set but is not a socket address
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        in_memory: bool,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup, bind_override, database_url_override, in_memory)
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(
        lookup: F,
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        in_memory: bool,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind = match bind_override {
            Some(bind) => bind,
            None => {
                let raw = lookup("SERVER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
                raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "SERVER_BIND".to_string(),
                    reason: format!("'{raw}' is not a socket address"),
                })?
            }
        };

        let mut database = DatabaseConfig::from_lookup(&lookup);
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        Ok(ServerConfig {
            bind,
            database,
            wallet: WalletConfig::from_lookup(&lookup),
            in_memory: in_memory || parse_or(&lookup, "WALLET_IN_MEMORY", false),
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        let currency = &self.wallet.default_currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::Invalid {
                var: "WALLET_DEFAULT_CURRENCY".to_string(),
                reason: format!("'{currency}' is not a three-letter currency code"),
            });
        }

        if self.wallet.transaction_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "WALLET_TRANSACTION_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.in_memory {
            return Ok(());
        }

        let url = &self.database.database_url;
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(ConfigError::Invalid {
                var: "DATABASE_URL".to_string(),
                reason: "Must be a postgres:// or postgresql:// URL".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        // A lock wait longer than the unit of work would always surface as a timeout
        if self
            .database
            .lock_timeout()
            .is_some_and(|lock_timeout| lock_timeout >= self.wallet.transaction_timeout)
        {
            return Err(ConfigError::Invalid {
                var: "DB_LOCK_TIMEOUT_MS".to_string(),
                reason: format!(
                    "Must be shorter than the transaction timeout ({:?})",
                    self.wallet.transaction_timeout
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
