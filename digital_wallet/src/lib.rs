//! # Digital Wallet
//!
//! A per-user wallet ledger with a concurrency-safe withdrawal protocol.
//!
//! Every balance change goes through three cooperating pieces:
//!
//! - **Unit of work**: one atomic transaction per operation, committed on success and
//!   rolled back on error, panic or cancellation ([`wallet::run_in_transaction`]).
//! - **Wallet ledger**: owns wallet rows; the withdraw path takes an exclusive row lock
//!   before checking and decrementing the balance ([`db::WalletRepository`]).
//! - **Transaction journal**: one status-tracked entry per attempt,
//!   `PENDING -> COMPLETED | FAILED` ([`db::WalletTransactionRepository`]).
//!
//! [`wallet::WalletManager`] composes them and is the entry point for callers.
//!
//! ## Core Modules
//!
//! - [`db`]: connection pool, repository traits, PostgreSQL and in-memory backends
//! - [`wallet`]: models, errors, configuration, unit of work and the orchestrator
//!
//! ## Example
//!
//! ```
//! use digital_wallet::db::MemoryWalletStore;
//! use digital_wallet::wallet::{WalletConfig, WalletManager};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), digital_wallet::wallet::WalletError> {
//! let manager = WalletManager::new(MemoryWalletStore::new(), WalletConfig::default());
//! let balance = manager.get_balance("user-1").await?;
//! assert!(balance.is_active);
//! # Ok(())
//! # }
//! ```

/// Database access: pool, repository traits and storage backends.
pub mod db;

/// Wallet domain: models, errors, unit of work and orchestration.
pub mod wallet;

pub use wallet::{WalletConfig, WalletError, WalletManager, WalletResult, WalletService};
