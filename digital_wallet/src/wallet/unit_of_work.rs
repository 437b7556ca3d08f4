//! Unit-of-work executor.

use futures_util::{FutureExt, future::BoxFuture};
use std::panic::{AssertUnwindSafe, resume_unwind};

use super::errors::WalletResult;
use crate::db::repository::{TransactionScope, UnitOfWork};

/// Run `work` inside one transaction against `store`
///
/// `work` receives the transaction scope and must do all of its reads and
/// writes through it. Exactly one of commit or rollback happens per call:
///
/// - `Ok` commits; a failing commit is returned as the error
/// - `Err` rolls back and returns the original error, even if the rollback
///   itself fails
/// - a panic rolls back and then resumes unwinding with the original payload
///
/// If the returned future is dropped early, dropping the scope rolls back.
///
/// # Examples
///
/// ```
/// use digital_wallet::db::{MemoryWalletStore, RepositoryRegistry};
/// use digital_wallet::wallet::{Wallet, run_in_transaction};
/// use futures_util::FutureExt;
/// use rust_decimal::Decimal;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), digital_wallet::WalletError> {
/// let store = MemoryWalletStore::new();
/// let wallet = Wallet::new("user-1", Decimal::new(5000, 2), "IDR");
///
/// let created = wallet.clone();
/// run_in_transaction(&store, move |scope| {
///     async move { scope.wallets().create(&created).await }.boxed()
/// })
/// .await?;
///
/// assert!(store.wallets().get_by_id(&wallet.id).await?.is_some());
/// # Ok(())
/// # }
/// ```
pub async fn run_in_transaction<U, T, F>(store: &U, work: F) -> WalletResult<T>
where
    U: UnitOfWork + ?Sized,
    F: for<'s> FnOnce(&'s U::Scope) -> BoxFuture<'s, WalletResult<T>>,
{
    let scope = store.begin().await?;
    log::debug!("Transaction started");

    let outcome = AssertUnwindSafe(work(&scope)).catch_unwind().await;

    match outcome {
        Ok(Ok(value)) => {
            if let Err(e) = scope.commit().await {
                log::warn!("Transaction commit failed: {}", e);
                return Err(e);
            }
            log::debug!("Transaction committed");
            Ok(value)
        }
        Ok(Err(e)) => {
            match scope.rollback().await {
                Ok(()) => log::debug!("Transaction rolled back: {}", e),
                Err(rollback_err) => log::warn!(
                    "Rollback failed after error '{}': {}",
                    e,
                    rollback_err
                ),
            }
            Err(e)
        }
        Err(panic) => {
            if let Err(rollback_err) = scope.rollback().await {
                log::warn!("Rollback failed after panic: {}", rollback_err);
            } else {
                log::debug!("Transaction rolled back after panic");
            }
            resume_unwind(panic)
        }
    }
}
