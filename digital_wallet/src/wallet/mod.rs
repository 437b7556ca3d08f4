//! Wallet module: per-user balances with a concurrency-safe withdrawal protocol.
//!
//! This module implements:
//! - Wallet and journal entry models with the `PENDING -> COMPLETED | FAILED` state machine
//! - The error taxonomy with stable client-facing codes
//! - The unit-of-work executor (commit on success, rollback on error, panic or drop)
//! - The orchestrator that resolves wallets and runs withdrawals
//!
//! ## Example
//!
//! ```no_run
//! use digital_wallet::db::{Database, DatabaseConfig, PgWalletStore};
//! use digital_wallet::wallet::{WalletConfig, WalletManager, WithdrawRequest};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env();
//!     let db = Database::new(&config).await?;
//!     let manager = WalletManager::new(
//!         PgWalletStore::from_database(&db, &config),
//!         WalletConfig::from_env(),
//!     );
//!
//!     let receipt = manager
//!         .withdraw(WithdrawRequest {
//!             user_id: "user-42".to_string(),
//!             amount: Decimal::new(10_000, 2),
//!             description: Some("ATM".to_string()),
//!         })
//!         .await?;
//!     println!("New balance after withdrawal: {}", receipt.new_balance);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod errors;
pub mod manager;
pub mod models;
pub mod unit_of_work;

pub use config::WalletConfig;
pub use errors::{WalletError, WalletResult};
pub use manager::{WalletManager, WalletService};
pub use models::{
    BalanceResponse, TransactionHistory, TransactionStatus, TransactionType, Wallet,
    WalletTransaction, WithdrawRequest, WithdrawResponse,
};
pub use unit_of_work::run_in_transaction;
