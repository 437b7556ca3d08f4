//! Structured logging configuration.
//!
//! The wallet library logs through the `log` facade; those records are
//! forwarded into the same tracing subscriber as the server's own events.

use rust_decimal::Decimal;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Initialize structured logging
///
/// Features:
/// - Request ID correlation (see [`crate::api::request_id`])
/// - `log` records from the wallet library bridged into tracing
/// - Configurable log levels via RUST_LOG env var
///
/// # Example
///
/// ```no_run
/// use dw_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // Console layer for development
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // Also installs the `log` bridge
    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        eprintln!("Logging already initialized: {e}");
        return;
    }

    tracing::info!("Structured logging initialized");
}

/// Log the outcome of one withdrawal request
///
/// # Arguments
///
/// * `request_id` - Correlation ID of the HTTP request
/// * `user_id` - Requesting user
/// * `amount` - Requested amount
/// * `outcome` - Journal status on success, error code on failure
/// * `duration_ms` - Time spent in the wallet service
///
/// # Example
///
/// ```
/// use dw_server::logging::log_withdrawal;
/// use rust_decimal::Decimal;
///
/// log_withdrawal("req-1", "user-42", Decimal::new(10_000, 2), "COMPLETED", 12);
/// ```
pub fn log_withdrawal(
    request_id: &str,
    user_id: &str,
    amount: Decimal,
    outcome: &str,
    duration_ms: u64,
) {
    if duration_ms > 1000 {
        tracing::warn!(
            request_id = request_id,
            user_id = user_id,
            amount = %amount,
            outcome = outcome,
            duration_ms = duration_ms,
            "PERFORMANCE: Slow withdrawal"
        );
    } else {
        tracing::info!(
            request_id = request_id,
            user_id = user_id,
            amount = %amount,
            outcome = outcome,
            duration_ms = duration_ms,
            "Withdrawal processed"
        );
    }
}
