//! In-process storage backend.
//!
//! Mirrors the PostgreSQL backend's transactional behavior closely enough for
//! the withdrawal protocol to be exercised without a database:
//!
//! - every wallet has a `tokio::sync::Mutex` standing in for its row lock;
//!   a scope keeps the owned guard until it commits, rolls back or is dropped
//! - `withdraw` and `update` both wait on that lock, in or out of a scope
//! - writes made inside a scope are staged and only become visible on commit
//! - the unique user constraint and the journal's wallet reference are
//!   checked again at commit time

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::repository::{
    RepositoryRegistry, TransactionScope, UnitOfWork, WalletRepository,
    WalletTransactionRepository,
};
use crate::wallet::{Wallet, WalletError, WalletResult, WalletTransaction};

type RowLock = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
struct Tables {
    wallets: HashMap<String, Wallet>,
    transactions: HashMap<String, WalletTransaction>,
}

#[derive(Default)]
struct Shared {
    committed: Mutex<Tables>,
    row_locks: Mutex<HashMap<String, RowLock>>,
}

impl Shared {
    fn committed(&self) -> MutexGuard<'_, Tables> {
        self.committed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, wallet_id: &str) -> RowLock {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(wallet_id.to_string()).or_default().clone()
    }

    /// Publish a scope's staged writes in one step
    fn apply(&self, staged: Tables) -> WalletResult<()> {
        let mut committed = self.committed();

        for wallet in staged.wallets.values() {
            if user_taken(&committed.wallets, &wallet.user_id, &wallet.id) {
                return Err(WalletError::WalletAlreadyExists(wallet.user_id.clone()));
            }
        }
        for entry in staged.transactions.values() {
            let wallet_known = committed.wallets.contains_key(&entry.wallet_id)
                || staged.wallets.contains_key(&entry.wallet_id);
            if !wallet_known {
                return Err(WalletError::WalletNotFound(entry.wallet_id.clone()));
            }
        }

        committed.wallets.extend(staged.wallets);
        committed.transactions.extend(staged.transactions);
        Ok(())
    }
}

fn find_by_user<'a>(wallets: &'a HashMap<String, Wallet>, user_id: &str) -> Option<&'a Wallet> {
    wallets
        .values()
        .find(|w| w.user_id == user_id && w.deleted_at.is_none())
}

/// Whether a wallet other than `wallet_id` holds `user_id`
///
/// Soft-deleted wallets still count, as they do for the unique index.
fn user_taken(wallets: &HashMap<String, Wallet>, user_id: &str, wallet_id: &str) -> bool {
    wallets
        .values()
        .any(|w| w.user_id == user_id && w.id != wallet_id)
}

fn debit(current: Option<Wallet>, wallet_id: &str, amount: Decimal) -> WalletResult<Wallet> {
    let mut wallet = current
        .filter(|w| w.deleted_at.is_none())
        .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))?;

    if !wallet.is_active {
        return Err(WalletError::WalletInactive(wallet_id.to_string()));
    }
    if wallet.balance < amount {
        return Err(WalletError::InsufficientBalance {
            available: wallet.balance,
            required: amount,
        });
    }

    wallet.balance -= amount;
    wallet.updated_at = Utc::now();
    Ok(wallet)
}

/// Writes and row locks belonging to one open scope
#[derive(Default)]
struct ScopeState {
    staged: Tables,
    held_locks: HashMap<String, OwnedMutexGuard<()>>,
}

type SharedScope = Arc<AsyncMutex<ScopeState>>;

/// Committed state with a scope's staged writes laid over it
struct View<'a> {
    committed: &'a Tables,
    staged: Option<&'a Tables>,
}

impl View<'_> {
    fn wallet(&self, id: &str) -> Option<Wallet> {
        self.staged
            .and_then(|s| s.wallets.get(id))
            .or_else(|| self.committed.wallets.get(id))
            .filter(|w| w.deleted_at.is_none())
            .cloned()
    }

    fn wallet_by_user(&self, user_id: &str) -> Option<Wallet> {
        self.staged
            .and_then(|s| find_by_user(&s.wallets, user_id))
            .or_else(|| find_by_user(&self.committed.wallets, user_id))
            .cloned()
    }

    fn user_taken(&self, user_id: &str, wallet_id: &str) -> bool {
        self.staged
            .is_some_and(|s| user_taken(&s.wallets, user_id, wallet_id))
            || user_taken(&self.committed.wallets, user_id, wallet_id)
    }

    fn entry(&self, id: &str) -> Option<WalletTransaction> {
        self.staged
            .and_then(|s| s.transactions.get(id))
            .or_else(|| self.committed.transactions.get(id))
            .filter(|e| e.deleted_at.is_none())
            .cloned()
    }

    fn entries_for(&self, wallet_id: &str) -> Vec<WalletTransaction> {
        let mut merged: HashMap<&str, &WalletTransaction> = self
            .committed
            .transactions
            .values()
            .filter(|e| e.wallet_id == wallet_id)
            .map(|e| (e.id.as_str(), e))
            .collect();
        if let Some(staged) = self.staged {
            merged.extend(
                staged
                    .transactions
                    .values()
                    .filter(|e| e.wallet_id == wallet_id)
                    .map(|e| (e.id.as_str(), e)),
            );
        }

        let mut entries: Vec<WalletTransaction> = merged
            .into_values()
            .filter(|e| e.deleted_at.is_none())
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        entries
    }
}

/// Backend handle shared by the ledger and journal of one registry
#[derive(Clone)]
struct MemHandle {
    shared: Arc<Shared>,
    scope: Option<SharedScope>,
}

impl MemHandle {
    /// Run a read against the view this handle sees
    async fn read<T>(&self, f: impl FnOnce(&View<'_>) -> T) -> T {
        match &self.scope {
            Some(scope) => {
                let state = scope.lock().await;
                let committed = self.shared.committed();
                f(&View {
                    committed: &committed,
                    staged: Some(&state.staged),
                })
            }
            None => {
                let committed = self.shared.committed();
                f(&View {
                    committed: &committed,
                    staged: None,
                })
            }
        }
    }

    /// Take the row lock of a wallet
    ///
    /// Inside a scope the guard joins the scope's held locks and `None` is
    /// returned; outside one the caller holds the returned guard.
    async fn lock_row(&self, wallet_id: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = self.shared.row_lock(wallet_id);
        match &self.scope {
            Some(scope) => {
                let mut state = scope.lock().await;
                if !state.held_locks.contains_key(wallet_id) {
                    let guard = lock.lock_owned().await;
                    state.held_locks.insert(wallet_id.to_string(), guard);
                }
                None
            }
            None => Some(lock.lock_owned().await),
        }
    }

    /// Validate a write against the visible state, then store it
    ///
    /// `f` puts the rows to write into its second argument. Inside a scope they
    /// are staged; otherwise they are committed immediately.
    async fn write(
        &self,
        f: impl FnOnce(&View<'_>, &mut Tables) -> WalletResult<()>,
    ) -> WalletResult<()> {
        let mut pending = Tables::default();

        match &self.scope {
            Some(scope) => {
                let mut state = scope.lock().await;
                {
                    let committed = self.shared.committed();
                    f(
                        &View {
                            committed: &committed,
                            staged: Some(&state.staged),
                        },
                        &mut pending,
                    )?;
                }
                state.staged.wallets.extend(pending.wallets);
                state.staged.transactions.extend(pending.transactions);
            }
            None => {
                let mut committed = self.shared.committed();
                f(
                    &View {
                        committed: &committed,
                        staged: None,
                    },
                    &mut pending,
                )?;
                committed.wallets.extend(pending.wallets);
                committed.transactions.extend(pending.transactions);
            }
        }
        Ok(())
    }
}

/// Wallet ledger kept in process memory
#[derive(Clone)]
pub struct MemoryWalletRepository {
    handle: MemHandle,
}

#[async_trait]
impl WalletRepository for MemoryWalletRepository {
    async fn create(&self, wallet: &Wallet) -> WalletResult<()> {
        self.handle
            .write(|view, out| {
                if view.user_taken(&wallet.user_id, &wallet.id) {
                    return Err(WalletError::WalletAlreadyExists(wallet.user_id.clone()));
                }
                if view.wallet(&wallet.id).is_some() {
                    return Err(WalletError::WalletAlreadyExists(wallet.user_id.clone()));
                }
                out.wallets.insert(wallet.id.clone(), wallet.clone());
                Ok(())
            })
            .await
    }

    async fn get_by_id(&self, id: &str) -> WalletResult<Option<Wallet>> {
        Ok(self.handle.read(|view| view.wallet(id)).await)
    }

    async fn get_by_user_id(&self, user_id: &str) -> WalletResult<Option<Wallet>> {
        Ok(self.handle.read(|view| view.wallet_by_user(user_id)).await)
    }

    async fn get_balance(&self, wallet_id: &str) -> WalletResult<Decimal> {
        self.handle
            .read(|view| view.wallet(wallet_id).map(|w| w.balance))
            .await
            .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))
    }

    async fn update(&self, wallet: &Wallet) -> WalletResult<()> {
        if wallet.balance < Decimal::ZERO {
            return Err(WalletError::ValidationFailed(
                "balance must not be negative".to_string(),
            ));
        }

        let _row = self.handle.lock_row(&wallet.id).await;

        self.handle
            .write(|view, out| {
                let mut stored = view
                    .wallet(&wallet.id)
                    .ok_or_else(|| WalletError::WalletNotFound(wallet.id.clone()))?;
                stored.balance = wallet.balance;
                stored.currency = wallet.currency.clone();
                stored.is_active = wallet.is_active;
                stored.updated_at = Utc::now();
                out.wallets.insert(stored.id.clone(), stored);
                Ok(())
            })
            .await
    }

    async fn withdraw(&self, wallet_id: &str, amount: Decimal) -> WalletResult<Wallet> {
        let _row = self.handle.lock_row(wallet_id).await;

        let mut debited = None;
        self.handle
            .write(|view, out| {
                let wallet = debit(view.wallet(wallet_id), wallet_id, amount)?;
                out.wallets.insert(wallet.id.clone(), wallet.clone());
                debited = Some(wallet);
                Ok(())
            })
            .await?;

        debited.ok_or_else(|| WalletError::UpdateFailed(wallet_id.to_string()))
    }
}

/// Transaction journal kept in process memory
#[derive(Clone)]
pub struct MemoryWalletTransactionRepository {
    handle: MemHandle,
}

#[async_trait]
impl WalletTransactionRepository for MemoryWalletTransactionRepository {
    async fn create(&self, entry: &WalletTransaction) -> WalletResult<()> {
        self.handle
            .write(|view, out| {
                if view.wallet(&entry.wallet_id).is_none() {
                    return Err(WalletError::WalletNotFound(entry.wallet_id.clone()));
                }
                if view.entry(&entry.id).is_some() {
                    return Err(WalletError::JournalWriteFailed(format!(
                        "duplicate transaction id {}",
                        entry.id
                    )));
                }
                out.transactions.insert(entry.id.clone(), entry.clone());
                Ok(())
            })
            .await
    }

    async fn get_by_id(&self, id: &str) -> WalletResult<WalletTransaction> {
        self.handle
            .read(|view| view.entry(id))
            .await
            .ok_or_else(|| WalletError::TransactionNotFound(id.to_string()))
    }

    async fn list_by_wallet(
        &self,
        wallet_id: &str,
        limit: i64,
        offset: i64,
    ) -> WalletResult<Vec<WalletTransaction>> {
        let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);

        Ok(self
            .handle
            .read(|view| {
                view.entries_for(wallet_id)
                    .into_iter()
                    .skip(skip)
                    .take(take)
                    .collect()
            })
            .await)
    }

    async fn count_by_wallet(&self, wallet_id: &str) -> WalletResult<i64> {
        let count = self.handle.read(|view| view.entries_for(wallet_id).len()).await;
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn update(&self, entry: &WalletTransaction) -> WalletResult<()> {
        self.handle
            .write(|view, out| {
                let mut stored = view
                    .entry(&entry.id)
                    .ok_or_else(|| WalletError::TransactionNotFound(entry.id.clone()))?;
                if !stored.status.can_transition_to(entry.status) {
                    return Err(WalletError::InvalidStatusTransition {
                        id: entry.id.clone(),
                        from: stored.status.to_string(),
                        to: entry.status.to_string(),
                    });
                }
                stored.status = entry.status;
                stored.description = entry.description.clone();
                stored.metadata = entry.metadata.clone();
                stored.updated_at = entry.updated_at;
                out.transactions.insert(stored.id.clone(), stored);
                Ok(())
            })
            .await
    }
}

/// An open in-memory transaction
///
/// Dropping the scope discards its staged writes and releases its row locks.
pub struct MemoryTransactionScope {
    shared: Arc<Shared>,
    state: SharedScope,
    wallets: MemoryWalletRepository,
    transactions: MemoryWalletTransactionRepository,
}

impl RepositoryRegistry for MemoryTransactionScope {
    fn wallets(&self) -> &dyn WalletRepository {
        &self.wallets
    }

    fn transactions(&self) -> &dyn WalletTransactionRepository {
        &self.transactions
    }
}

#[async_trait]
impl TransactionScope for MemoryTransactionScope {
    async fn commit(self) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        let staged = std::mem::take(&mut state.staged);
        let result = self.shared.apply(staged);
        // Locks are released only after the writes are visible
        state.held_locks.clear();
        result
    }

    async fn rollback(self) -> WalletResult<()> {
        let mut state = self.state.lock().await;
        state.staged = Tables::default();
        state.held_locks.clear();
        Ok(())
    }
}

/// Wallet store kept in process memory
///
/// Clones share the same data.
#[derive(Clone)]
pub struct MemoryWalletStore {
    shared: Arc<Shared>,
    wallets: MemoryWalletRepository,
    transactions: MemoryWalletTransactionRepository,
}

impl MemoryWalletStore {
    pub fn new() -> Self {
        let shared = Arc::new(Shared::default());
        let handle = MemHandle {
            shared: shared.clone(),
            scope: None,
        };
        Self {
            wallets: MemoryWalletRepository {
                handle: handle.clone(),
            },
            transactions: MemoryWalletTransactionRepository { handle },
            shared,
        }
    }
}

impl Default for MemoryWalletStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RepositoryRegistry for MemoryWalletStore {
    fn wallets(&self) -> &dyn WalletRepository {
        &self.wallets
    }

    fn transactions(&self) -> &dyn WalletTransactionRepository {
        &self.transactions
    }
}

#[async_trait]
impl UnitOfWork for MemoryWalletStore {
    type Scope = MemoryTransactionScope;

    async fn begin(&self) -> WalletResult<MemoryTransactionScope> {
        let state: SharedScope = Arc::new(AsyncMutex::new(ScopeState::default()));
        let handle = MemHandle {
            shared: self.shared.clone(),
            scope: Some(state.clone()),
        };
        Ok(MemoryTransactionScope {
            shared: self.shared.clone(),
            state,
            wallets: MemoryWalletRepository {
                handle: handle.clone(),
            },
            transactions: MemoryWalletTransactionRepository { handle },
        })
    }

    async fn health_check(&self) -> WalletResult<()> {
        Ok(())
    }
}
