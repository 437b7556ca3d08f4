//! Wallet orchestrator: wallet resolution, withdrawals and journal queries.

use super::{
    config::WalletConfig,
    errors::{WalletError, WalletResult},
    models::{
        BalanceResponse, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, TransactionHistory,
        TransactionStatus, Wallet, WalletTransaction, WithdrawRequest, WithdrawResponse,
    },
    unit_of_work::run_in_transaction,
};
use crate::db::{
    repository::{RepositoryRegistry, UnitOfWork},
    timeouts::with_timeout,
};
use async_trait::async_trait;
use chrono::Utc;
use futures_util::FutureExt;
use std::sync::Arc;

/// Operations the wallet service exposes to callers
///
/// Object safe, so transports can hold an `Arc<dyn WalletService>` without
/// knowing the storage backend.
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Return the user's wallet, creating it on first use
    async fn get_or_create_wallet(&self, user_id: &str) -> WalletResult<Wallet>;

    async fn get_balance(&self, user_id: &str) -> WalletResult<BalanceResponse>;

    async fn withdraw(&self, request: WithdrawRequest) -> WalletResult<WithdrawResponse>;

    async fn get_transaction_history(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> WalletResult<TransactionHistory>;

    async fn get_transaction(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> WalletResult<WalletTransaction>;

    /// Check that the backing store is reachable
    async fn health_check(&self) -> WalletResult<()>;
}

/// Wallet manager
pub struct WalletManager<U> {
    store: Arc<U>,
    config: WalletConfig,
}

impl<U> Clone for WalletManager<U> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<U: UnitOfWork> WalletManager<U> {
    /// Create a new wallet manager
    ///
    /// # Arguments
    ///
    /// * `store` - Storage backend
    /// * `config` - Defaults and limits for wallet operations
    pub fn new(store: U, config: WalletConfig) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    /// Create a wallet manager over a store shared with other owners
    pub fn from_shared(store: Arc<U>, config: WalletConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &U {
        &self.store
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Get the wallet for a user, creating it if absent
    ///
    /// Two first-time requests for one user can race to insert; the loser sees
    /// `WalletAlreadyExists` and re-reads the winner's wallet.
    ///
    /// # Errors
    ///
    /// * `WalletError::ValidationFailed` - Empty user ID
    /// * `WalletError::WalletAlreadyExists` - Still conflicting after `max_create_retries` re-reads
    pub async fn get_or_create_wallet(&self, user_id: &str) -> WalletResult<Wallet> {
        if user_id.trim().is_empty() {
            return Err(WalletError::ValidationFailed(
                "user_id is required".to_string(),
            ));
        }

        let mut conflicts = 0;
        loop {
            if let Some(wallet) = self.store.wallets().get_by_user_id(user_id).await? {
                return Ok(wallet);
            }

            let wallet = Wallet::new(
                user_id,
                self.config.default_balance,
                &self.config.default_currency,
            );

            match self.store.wallets().create(&wallet).await {
                Ok(()) => {
                    log::info!("Created wallet {} for user {}", wallet.id, user_id);
                    return Ok(wallet);
                }
                Err(WalletError::WalletAlreadyExists(_))
                    if conflicts < self.config.max_create_retries =>
                {
                    conflicts += 1;
                    log::warn!(
                        "Wallet for user {} was created concurrently, re-reading (conflict {})",
                        user_id,
                        conflicts
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get wallet balance for a user
    ///
    /// Creates the wallet on first use. The balance is a plain read and never
    /// waits on a withdrawal's row lock.
    pub async fn get_balance(&self, user_id: &str) -> WalletResult<BalanceResponse> {
        let wallet = self.get_or_create_wallet(user_id).await?;
        let balance = self.store.wallets().get_balance(&wallet.id).await?;

        Ok(BalanceResponse {
            wallet_id: wallet.id,
            balance,
            currency: wallet.currency,
            is_active: wallet.is_active,
        })
    }

    /// Withdraw from a user's wallet
    ///
    /// The journal entry, the locked debit and the entry's final status are
    /// written in one unit of work bounded by `transaction_timeout`.
    ///
    /// # Errors
    ///
    /// * `WalletError::ValidationFailed` - Malformed request
    /// * `WalletError::WalletInactive` - Wallet is deactivated
    /// * `WalletError::InsufficientBalance` - Not enough funds at lock time
    /// * `WalletError::JournalWriteFailed` - Entry could not be written or finalized
    /// * `WalletError::Timeout` - Unit of work exceeded `transaction_timeout`
    pub async fn withdraw(&self, request: WithdrawRequest) -> WalletResult<WithdrawResponse> {
        request.validate()?;

        let wallet = self.get_or_create_wallet(&request.user_id).await?;
        if !wallet.is_active {
            log::warn!(
                "Withdrawal rejected for user {}: wallet {} is not active",
                request.user_id,
                wallet.id
            );
            return Err(WalletError::WalletInactive(wallet.id));
        }

        let entry =
            WalletTransaction::new_withdrawal(&wallet.id, request.amount, request.description);
        let attempt = entry.clone();

        let result = with_timeout(
            self.config.transaction_timeout,
            run_in_transaction(self.store.as_ref(), move |scope| {
                withdraw_in_scope(scope, entry).boxed()
            }),
        )
        .await;

        match result {
            Ok(receipt) => {
                log::info!(
                    "Withdrawal {} completed: {} from wallet {}, balance now {}",
                    receipt.transaction_id,
                    receipt.amount,
                    receipt.wallet_id,
                    receipt.new_balance
                );
                Ok(receipt)
            }
            Err(e) => {
                log::warn!(
                    "Withdrawal failed for user {} (wallet {}, transaction {}): {}",
                    request.user_id,
                    wallet.id,
                    attempt.id,
                    e
                );
                if self.config.record_failed_attempts && records_attempt(&e) {
                    self.record_failed_attempt(attempt, &e).await;
                }
                Err(e)
            }
        }
    }

    /// Write a FAILED entry for a withdrawal whose unit of work rolled back
    ///
    /// Runs outside any transaction, so the entry survives the rollback. It
    /// reuses the attempt's ID so a given attempt is recorded at most once.
    async fn record_failed_attempt(&self, mut entry: WalletTransaction, error: &WalletError) {
        entry.status = TransactionStatus::Failed;
        entry.updated_at = Utc::now();
        entry.metadata = Some(serde_json::json!({
            "error_code": error.code(),
            "reason": error.client_message(),
        }));

        if let Err(e) = self.store.transactions().create(&entry).await {
            log::warn!("Failed to record failed withdrawal {}: {}", entry.id, e);
        }
    }

    /// Get a page of a user's journal, newest first
    ///
    /// A user without a wallet has an empty history. `limit` defaults to 10 and
    /// is clamped to 1..=100.
    ///
    /// # Errors
    ///
    /// * `WalletError::ValidationFailed` - Negative offset
    pub async fn get_transaction_history(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> WalletResult<TransactionHistory> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(WalletError::ValidationFailed(
                "offset must not be negative".to_string(),
            ));
        }

        let Some(wallet) = self.store.wallets().get_by_user_id(user_id).await? else {
            return Ok(TransactionHistory::empty(limit, offset));
        };

        let journal = self.store.transactions();
        let entries = journal.list_by_wallet(&wallet.id, limit, offset).await?;
        let total = journal.count_by_wallet(&wallet.id).await?;

        Ok(TransactionHistory {
            entries,
            total,
            limit,
            offset,
        })
    }

    /// Get one journal entry belonging to a user's wallet
    ///
    /// # Errors
    ///
    /// * `WalletError::TransactionNotFound` - No such entry, or it belongs to another wallet
    pub async fn get_transaction(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> WalletResult<WalletTransaction> {
        let not_found = || WalletError::TransactionNotFound(transaction_id.to_string());

        let wallet = self
            .store
            .wallets()
            .get_by_user_id(user_id)
            .await?
            .ok_or_else(not_found)?;

        let entry = self.store.transactions().get_by_id(transaction_id).await?;
        if entry.wallet_id != wallet.id {
            return Err(not_found());
        }
        Ok(entry)
    }

    pub async fn health_check(&self) -> WalletResult<()> {
        self.store.health_check().await
    }
}

/// Journal, debit and finalize inside an open transaction
async fn withdraw_in_scope<R>(
    repos: &R,
    mut entry: WalletTransaction,
) -> WalletResult<WithdrawResponse>
where
    R: RepositoryRegistry + ?Sized,
{
    let journal = repos.transactions();

    journal
        .create(&entry)
        .await
        .map_err(WalletError::into_journal_failure)?;

    let wallet = match repos.wallets().withdraw(&entry.wallet_id, entry.amount).await {
        Ok(wallet) => wallet,
        Err(e) => {
            // Best effort, the rollback discards it
            if let Err(mark_err) = journal
                .update_status(&mut entry, TransactionStatus::Failed)
                .await
            {
                log::warn!(
                    "Could not mark transaction {} as FAILED: {}",
                    entry.id,
                    mark_err
                );
            }
            return Err(e);
        }
    };

    journal
        .update_status(&mut entry, TransactionStatus::Completed)
        .await
        .map_err(|e| WalletError::JournalWriteFailed(e.to_string()))?;

    Ok(WithdrawResponse {
        transaction_id: entry.id,
        wallet_id: wallet.id,
        amount: entry.amount,
        new_balance: wallet.balance,
        status: entry.status,
        timestamp: entry.updated_at,
    })
}

/// Whether a failed withdrawal leaves a durable FAILED entry
///
/// Rejections of the wallet itself are not journaled.
fn records_attempt(error: &WalletError) -> bool {
    !matches!(
        error,
        WalletError::WalletInactive(_) | WalletError::WalletNotFound(_)
    )
}

#[async_trait]
impl<U: UnitOfWork + 'static> WalletService for WalletManager<U> {
    async fn get_or_create_wallet(&self, user_id: &str) -> WalletResult<Wallet> {
        WalletManager::get_or_create_wallet(self, user_id).await
    }

    async fn get_balance(&self, user_id: &str) -> WalletResult<BalanceResponse> {
        WalletManager::get_balance(self, user_id).await
    }

    async fn withdraw(&self, request: WithdrawRequest) -> WalletResult<WithdrawResponse> {
        WalletManager::withdraw(self, request).await
    }

    async fn get_transaction_history(
        &self,
        user_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> WalletResult<TransactionHistory> {
        WalletManager::get_transaction_history(self, user_id, limit, offset).await
    }

    async fn get_transaction(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> WalletResult<WalletTransaction> {
        WalletManager::get_transaction(self, user_id, transaction_id).await
    }

    async fn health_check(&self) -> WalletResult<()> {
        WalletManager::health_check(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        MemoryWalletStore, TransactionScope, WalletRepository, WalletTransactionRepository,
    };
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    /// Memory store whose scoped journal refuses every update
    #[derive(Clone)]
    struct RejectingUpdates {
        inner: MemoryWalletStore,
    }

    struct RejectingScope {
        inner: <MemoryWalletStore as UnitOfWork>::Scope,
    }

    impl RepositoryRegistry for RejectingUpdates {
        fn wallets(&self) -> &dyn WalletRepository {
            self.inner.wallets()
        }

        fn transactions(&self) -> &dyn WalletTransactionRepository {
            self.inner.transactions()
        }
    }

    #[async_trait]
    impl UnitOfWork for RejectingUpdates {
        type Scope = RejectingScope;

        async fn begin(&self) -> WalletResult<RejectingScope> {
            Ok(RejectingScope {
                inner: self.inner.begin().await?,
            })
        }

        async fn health_check(&self) -> WalletResult<()> {
            Ok(())
        }
    }

    impl RepositoryRegistry for RejectingScope {
        fn wallets(&self) -> &dyn WalletRepository {
            self.inner.wallets()
        }

        fn transactions(&self) -> &dyn WalletTransactionRepository {
            self
        }
    }

    #[async_trait]
    impl TransactionScope for RejectingScope {
        async fn commit(self) -> WalletResult<()> {
            self.inner.commit().await
        }

        async fn rollback(self) -> WalletResult<()> {
            self.inner.rollback().await
        }
    }

    #[async_trait]
    impl WalletTransactionRepository for RejectingScope {
        async fn create(&self, entry: &WalletTransaction) -> WalletResult<()> {
            self.inner.transactions().create(entry).await
        }

        async fn get_by_id(&self, id: &str) -> WalletResult<WalletTransaction> {
            self.inner.transactions().get_by_id(id).await
        }

        async fn list_by_wallet(
            &self,
            wallet_id: &str,
            limit: i64,
            offset: i64,
        ) -> WalletResult<Vec<WalletTransaction>> {
            self.inner
                .transactions()
                .list_by_wallet(wallet_id, limit, offset)
                .await
        }

        async fn count_by_wallet(&self, wallet_id: &str) -> WalletResult<i64> {
            self.inner.transactions().count_by_wallet(wallet_id).await
        }

        async fn update(&self, _entry: &WalletTransaction) -> WalletResult<()> {
            Err(WalletError::StoreUnavailable(sqlx::Error::PoolTimedOut))
        }
    }

    async fn funded(balance: Decimal) -> (RejectingUpdates, Wallet) {
        let store = RejectingUpdates {
            inner: MemoryWalletStore::new(),
        };
        let wallet = Wallet::new("carol", balance, "IDR");
        store.wallets().create(&wallet).await.unwrap();
        (store, wallet)
    }

    fn manager() -> WalletManager<MemoryWalletStore> {
        WalletManager::new(MemoryWalletStore::new(), WalletConfig::default())
    }

    #[test]
    fn test_wallet_state_rejections_are_not_recorded() {
        assert!(!records_attempt(&WalletError::WalletInactive("w".into())));
        assert!(!records_attempt(&WalletError::WalletNotFound("w".into())));
        assert!(records_attempt(&WalletError::InsufficientBalance {
            available: dec!(1),
            required: dec!(2),
        }));
    }

    #[tokio::test]
    async fn test_wallet_created_with_defaults() {
        let manager = manager();
        let wallet = manager.get_or_create_wallet("alice").await.unwrap();

        assert_eq!(wallet.balance, dec!(0));
        assert_eq!(wallet.currency, "IDR");
        assert!(wallet.is_active);

        let again = manager.get_or_create_wallet("alice").await.unwrap();
        assert_eq!(again.id, wallet.id);
    }

    #[tokio::test]
    async fn test_empty_user_rejected() {
        let err = manager().get_balance("").await.unwrap_err();
        assert!(matches!(err, WalletError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn test_history_without_wallet_is_empty() {
        let manager = manager();
        let history = manager
            .get_transaction_history("nobody", None, None)
            .await
            .unwrap();

        assert!(history.entries.is_empty());
        assert_eq!(history.total, 0);
        assert_eq!(history.limit, DEFAULT_HISTORY_LIMIT);

        // Reading history never creates a wallet
        assert!(
            manager
                .store()
                .wallets()
                .get_by_user_id("nobody")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_history_paging_is_validated() {
        let manager = manager();
        let err = manager
            .get_transaction_history("alice", Some(10), Some(-1))
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::ValidationFailed(_)));

        let history = manager
            .get_transaction_history("alice", Some(1000), None)
            .await
            .unwrap();
        assert_eq!(history.limit, MAX_HISTORY_LIMIT);

        let history = manager
            .get_transaction_history("alice", Some(0), None)
            .await
            .unwrap();
        assert_eq!(history.limit, 1);
    }

    #[tokio::test]
    async fn test_unfinalized_journal_rolls_back_debit() {
        let (store, wallet) = funded(dec!(100)).await;
        let entry = WalletTransaction::new_withdrawal(&wallet.id, dec!(40), None);
        let entry_id = entry.id.clone();

        let err = run_in_transaction(&store, move |scope| {
            withdraw_in_scope(scope, entry).boxed()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, WalletError::JournalWriteFailed(_)));

        assert_eq!(
            store.wallets().get_balance(&wallet.id).await.unwrap(),
            dec!(100)
        );
        let err = store.transactions().get_by_id(&entry_id).await.unwrap_err();
        assert!(matches!(err, WalletError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn test_unfinalized_journal_through_manager() {
        let (store, wallet) = funded(dec!(100)).await;
        let manager = WalletManager::new(store, WalletConfig::default());

        let err = manager
            .withdraw(WithdrawRequest {
                user_id: "carol".to_string(),
                amount: dec!(40),
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::JournalWriteFailed(_)));

        let balance = manager.get_balance("carol").await.unwrap();
        assert_eq!(balance.balance, dec!(100));

        let history = manager
            .get_transaction_history("carol", None, None)
            .await
            .unwrap();
        assert_eq!(history.total, 1);
        assert_eq!(history.entries[0].wallet_id, wallet.id);
        assert_eq!(history.entries[0].status, TransactionStatus::Failed);
    }

    #[tokio::test]
    async fn test_failed_mark_error_keeps_ledger_error() {
        let (store, _) = funded(dec!(10)).await;
        let manager = WalletManager::new(store, WalletConfig::default());

        let err = manager
            .withdraw(WithdrawRequest {
                user_id: "carol".to_string(),
                amount: dec!(40),
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));

        let balance = manager.get_balance("carol").await.unwrap();
        assert_eq!(balance.balance, dec!(10));
    }
}
