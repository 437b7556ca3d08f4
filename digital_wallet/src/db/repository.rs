//! Repository trait definitions for the wallet ledger and transaction journal.
//!
//! The orchestrator only ever talks to storage through these traits, so a
//! transaction-scoped handle and a plain pool-bound handle are interchangeable.
//! Backends live in [`super::postgres`] and [`super::memory`].

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::wallet::{
    TransactionStatus, Wallet, WalletError, WalletResult, WalletTransaction,
};

/// Wallet ledger: owns wallet rows and is the only writer of balances
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Insert a new wallet
    ///
    /// Fails with `WalletAlreadyExists` when the user already has a wallet.
    async fn create(&self, wallet: &Wallet) -> WalletResult<()>;

    /// Find wallet by ID
    async fn get_by_id(&self, id: &str) -> WalletResult<Option<Wallet>>;

    /// Find wallet by owning user
    async fn get_by_user_id(&self, user_id: &str) -> WalletResult<Option<Wallet>>;

    /// Point read of the balance, no locking
    async fn get_balance(&self, wallet_id: &str) -> WalletResult<Decimal>;

    /// Administrative update of currency, active flag and balance
    async fn update(&self, wallet: &Wallet) -> WalletResult<()>;

    /// Debit a wallet under an exclusive row lock
    ///
    /// The lock is held until the enclosing transaction ends, so concurrent
    /// withdrawals against one wallet are serialized.
    ///
    /// # Errors
    ///
    /// * `WalletError::WalletNotFound` - No such wallet
    /// * `WalletError::WalletInactive` - Wallet is deactivated
    /// * `WalletError::InsufficientBalance` - Balance is below `amount`
    /// * `WalletError::UpdateFailed` - Decrement touched no rows
    async fn withdraw(&self, wallet_id: &str, amount: Decimal) -> WalletResult<Wallet>;
}

/// Transaction journal: owns journal entries and is the only writer of their status
#[async_trait]
pub trait WalletTransactionRepository: Send + Sync {
    /// Insert a new journal entry
    async fn create(&self, entry: &WalletTransaction) -> WalletResult<()>;

    /// Find journal entry by ID
    async fn get_by_id(&self, id: &str) -> WalletResult<WalletTransaction>;

    /// Entries for a wallet, newest first
    async fn list_by_wallet(
        &self,
        wallet_id: &str,
        limit: i64,
        offset: i64,
    ) -> WalletResult<Vec<WalletTransaction>>;

    /// Number of entries for a wallet
    async fn count_by_wallet(&self, wallet_id: &str) -> WalletResult<i64>;

    /// Persist the mutable fields of an existing entry
    ///
    /// Fails with `InvalidStatusTransition` if the stored status is terminal and
    /// differs from `entry.status`.
    async fn update(&self, entry: &WalletTransaction) -> WalletResult<()>;

    /// Move an entry to a new status and persist it
    async fn update_status(
        &self,
        entry: &mut WalletTransaction,
        status: TransactionStatus,
    ) -> WalletResult<()> {
        if !entry.status.can_transition_to(status) {
            return Err(WalletError::InvalidStatusTransition {
                id: entry.id.clone(),
                from: entry.status.to_string(),
                to: status.to_string(),
            });
        }

        let previous = (entry.status, entry.updated_at);
        entry.status = status;
        entry.updated_at = Utc::now();

        if let Err(e) = self.update(entry).await {
            (entry.status, entry.updated_at) = previous;
            return Err(e);
        }
        Ok(())
    }
}

/// Access to the ledger and journal bound to one connection or transaction
pub trait RepositoryRegistry: Send + Sync {
    fn wallets(&self) -> &dyn WalletRepository;

    fn transactions(&self) -> &dyn WalletTransactionRepository;
}

/// An open transaction
///
/// Dropping a scope without committing rolls it back.
#[async_trait]
pub trait TransactionScope: RepositoryRegistry + Sized {
    async fn commit(self) -> WalletResult<()>;

    async fn rollback(self) -> WalletResult<()>;
}

/// A store that can open transactions
///
/// The store itself is also a registry whose handles run outside any transaction.
#[async_trait]
pub trait UnitOfWork: RepositoryRegistry {
    type Scope: TransactionScope + 'static;

    async fn begin(&self) -> WalletResult<Self::Scope>;

    /// Check that the store is reachable
    async fn health_check(&self) -> WalletResult<()>;
}
