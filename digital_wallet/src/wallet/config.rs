//! Wallet behavior configuration.

use crate::db::timeouts::DEFAULT_TRANSACTION_TIMEOUT;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

/// Tunables for [`super::WalletManager`]
#[derive(Debug, Clone, PartialEq)]
pub struct WalletConfig {
    /// Currency assigned to lazily created wallets
    pub default_currency: String,
    /// Opening balance of lazily created wallets
    pub default_balance: Decimal,
    /// Upper bound on one withdrawal's unit of work
    pub transaction_timeout: Duration,
    /// Write a durable FAILED journal entry after a rolled-back withdrawal
    pub record_failed_attempts: bool,
    /// How many times get-or-create re-reads after losing an insert race
    pub max_create_retries: u32,
}

impl WalletConfig {
    /// Load configuration from environment variables
    ///
    /// - `WALLET_DEFAULT_CURRENCY` (default: IDR)
    /// - `WALLET_DEFAULT_BALANCE` (default: 0)
    /// - `WALLET_TRANSACTION_TIMEOUT_SECS` (default: 10)
    /// - `WALLET_RECORD_FAILED_ATTEMPTS` (default: true)
    /// - `WALLET_MAX_CREATE_RETRIES` (default: 3)
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let default_balance =
            parse_or(&lookup, "WALLET_DEFAULT_BALANCE", defaults.default_balance);

        Self {
            default_currency: lookup("WALLET_DEFAULT_CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or(defaults.default_currency),
            default_balance: if default_balance < Decimal::ZERO {
                defaults.default_balance
            } else {
                default_balance
            },
            transaction_timeout: Duration::from_secs(parse_or(
                &lookup,
                "WALLET_TRANSACTION_TIMEOUT_SECS",
                defaults.transaction_timeout.as_secs(),
            )),
            record_failed_attempts: parse_or(
                &lookup,
                "WALLET_RECORD_FAILED_ATTEMPTS",
                defaults.record_failed_attempts,
            ),
            max_create_retries: parse_or(
                &lookup,
                "WALLET_MAX_CREATE_RETRIES",
                defaults.max_create_retries,
            ),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_currency: "IDR".to_string(),
            default_balance: Decimal::ZERO,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            record_failed_attempts: true,
            max_create_retries: 3,
        }
    }
}

/// Process environment as a key lookup
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse a looked-up value, falling back to `default` when absent or malformed
pub fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Helper to parse environment variable with default fallback
pub fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    parse_or(&env_lookup, key, default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = WalletConfig::from_lookup(|_| None);
        assert_eq!(config, WalletConfig::default());
        assert_eq!(config.default_currency, "IDR");
        assert_eq!(config.default_balance, Decimal::ZERO);
        assert_eq!(config.transaction_timeout, Duration::from_secs(10));
        assert!(config.record_failed_attempts);
    }

    #[test]
    fn test_overrides() {
        let config = WalletConfig::from_lookup(lookup_from(&[
            ("WALLET_DEFAULT_CURRENCY", "usd"),
            ("WALLET_DEFAULT_BALANCE", "250.50"),
            ("WALLET_TRANSACTION_TIMEOUT_SECS", "3"),
            ("WALLET_RECORD_FAILED_ATTEMPTS", "false"),
            ("WALLET_MAX_CREATE_RETRIES", "5"),
        ]));

        assert_eq!(config.default_currency, "USD");
        assert_eq!(config.default_balance, dec!(250.50));
        assert_eq!(config.transaction_timeout, Duration::from_secs(3));
        assert!(!config.record_failed_attempts);
        assert_eq!(config.max_create_retries, 5);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = WalletConfig::from_lookup(lookup_from(&[
            ("WALLET_DEFAULT_BALANCE", "-1"),
            ("WALLET_TRANSACTION_TIMEOUT_SECS", "soon"),
            ("WALLET_DEFAULT_CURRENCY", "   "),
        ]));

        assert_eq!(config.default_balance, Decimal::ZERO);
        assert_eq!(config.transaction_timeout, Duration::from_secs(10));
        assert_eq!(config.default_currency, "IDR");
    }
}
