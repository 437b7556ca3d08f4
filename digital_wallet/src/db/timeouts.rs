//! Timeout helpers for units of work
//!
//! Dropping a unit of work on timeout drops its transaction scope, which rolls it back.

use crate::wallet::{WalletError, WalletResult};
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for transactions (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a wallet operation with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async operation to execute
///
/// # Returns
///
/// * `WalletResult<T>` - The operation's result, or `WalletError::Timeout`
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> WalletResult<T>
where
    F: std::future::Future<Output = WalletResult<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(WalletError::Timeout(duration)),
    }
}
