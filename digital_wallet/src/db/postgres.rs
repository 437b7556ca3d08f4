//! PostgreSQL storage backend.
//!
//! Repositories run either against the pool (each statement on its own
//! connection) or against one shared transaction. A [`PgTransactionScope`]
//! hands out repositories of the second kind; they all lock the same
//! `Transaction` so every statement inside a unit of work hits one connection.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{
    Connection, PgConnection, PgPool, Postgres, Row, Transaction, pool::PoolConnection,
    postgres::PgRow,
};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::{
    Database, DatabaseConfig,
    repository::{
        RepositoryRegistry, TransactionScope, UnitOfWork, WalletRepository,
        WalletTransactionRepository,
    },
};
use crate::wallet::{Wallet, WalletError, WalletResult, WalletTransaction};

type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

fn transaction_finished() -> WalletError {
    WalletError::StoreUnavailable(sqlx::Error::Protocol(
        "transaction already finished".to_string(),
    ))
}

/// Where a repository sends its statements
#[derive(Clone)]
enum PgHandle {
    Pool(PgPool),
    Tx(SharedTransaction),
}

/// A connection checked out for one repository call
enum PgConn<'a> {
    Pooled(PoolConnection<Postgres>),
    Tx(MappedMutexGuard<'a, Transaction<'static, Postgres>>),
}

impl PgHandle {
    async fn acquire(&self) -> WalletResult<PgConn<'_>> {
        match self {
            PgHandle::Pool(pool) => Ok(PgConn::Pooled(pool.acquire().await?)),
            PgHandle::Tx(tx) => {
                let guard = tx.lock().await;
                MutexGuard::try_map(guard, |slot| slot.as_mut())
                    .map(PgConn::Tx)
                    .map_err(|_| transaction_finished())
            }
        }
    }
}

impl Deref for PgConn<'_> {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            PgConn::Pooled(conn) => &**conn,
            PgConn::Tx(tx) => &***tx,
        }
    }
}

impl DerefMut for PgConn<'_> {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            PgConn::Pooled(conn) => &mut **conn,
            PgConn::Tx(tx) => &mut ***tx,
        }
    }
}

fn wallet_from_row(row: &PgRow) -> WalletResult<Wallet> {
    Ok(Wallet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        balance: row.try_get("balance")?,
        currency: row.try_get("currency")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> WalletResult<WalletTransaction> {
    Ok(WalletTransaction {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        amount: row.try_get("amount")?,
        transaction_type: row.try_get::<String, _>("type")?.parse()?,
        status: row.try_get::<String, _>("status")?.parse()?,
        description: row.try_get("description")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        deleted_at: row.try_get("deleted_at")?,
    })
}

/// Wallet ledger on PostgreSQL
#[derive(Clone)]
pub struct PgWalletRepository {
    handle: PgHandle,
}

impl PgWalletRepository {
    /// Ledger running each call on its own pooled connection
    pub fn new(pool: PgPool) -> Self {
        Self {
            handle: PgHandle::Pool(pool),
        }
    }
}

#[async_trait]
impl WalletRepository for PgWalletRepository {
    async fn create(&self, wallet: &Wallet) -> WalletResult<()> {
        let mut conn = self.handle.acquire().await?;

        sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance, currency, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&wallet.id)
        .bind(&wallet.user_id)
        .bind(wallet.balance)
        .bind(&wallet.currency)
        .bind(wallet.is_active)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                WalletError::WalletAlreadyExists(wallet.user_id.clone())
            }
            other => WalletError::StoreUnavailable(other),
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> WalletResult<Option<Wallet>> {
        let mut conn = self.handle.acquire().await?;

        sqlx::query(
            r#"
            SELECT id, user_id, balance, currency, is_active, created_at, updated_at, deleted_at
            FROM wallets
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(wallet_from_row)
        .transpose()
    }

    async fn get_by_user_id(&self, user_id: &str) -> WalletResult<Option<Wallet>> {
        let mut conn = self.handle.acquire().await?;

        sqlx::query(
            r#"
            SELECT id, user_id, balance, currency, is_active, created_at, updated_at, deleted_at
            FROM wallets
            WHERE user_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .as_ref()
        .map(wallet_from_row)
        .transpose()
    }

    async fn get_balance(&self, wallet_id: &str) -> WalletResult<Decimal> {
        let mut conn = self.handle.acquire().await?;

        let row = sqlx::query("SELECT balance FROM wallets WHERE id = $1 AND deleted_at IS NULL")
            .bind(wallet_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))?;

        Ok(row.try_get("balance")?)
    }

    async fn update(&self, wallet: &Wallet) -> WalletResult<()> {
        if wallet.balance < Decimal::ZERO {
            return Err(WalletError::ValidationFailed(
                "balance must not be negative".to_string(),
            ));
        }

        let mut conn = self.handle.acquire().await?;

        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2, currency = $3, is_active = $4, updated_at = $5
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(&wallet.id)
        .bind(wallet.balance)
        .bind(&wallet.currency)
        .bind(wallet.is_active)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WalletError::WalletNotFound(wallet.id.clone()));
        }
        Ok(())
    }

    async fn withdraw(&self, wallet_id: &str, amount: Decimal) -> WalletResult<Wallet> {
        let mut conn = self.handle.acquire().await?;

        // Savepoint inside a unit of work, a real transaction on a pooled connection
        let mut tx = Connection::begin(&mut *conn).await?;

        // Row lock is held until the outermost transaction ends
        let row = sqlx::query(
            r#"
            SELECT id, user_id, balance, currency, is_active, created_at, updated_at, deleted_at
            FROM wallets
            WHERE id = $1 AND deleted_at IS NULL
            FOR UPDATE
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| WalletError::WalletNotFound(wallet_id.to_string()))?;

        let wallet = wallet_from_row(&row)?;

        if !wallet.is_active {
            return Err(WalletError::WalletInactive(wallet_id.to_string()));
        }

        if wallet.balance < amount {
            return Err(WalletError::InsufficientBalance {
                available: wallet.balance,
                required: amount,
            });
        }

        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = balance - $1, updated_at = NOW()
            WHERE id = $2 AND balance >= $1 AND deleted_at IS NULL
            "#,
        )
        .bind(amount)
        .bind(wallet_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(WalletError::UpdateFailed(wallet_id.to_string()));
        }

        let row = sqlx::query(
            r#"
            SELECT id, user_id, balance, currency, is_active, created_at, updated_at, deleted_at
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&mut *tx)
        .await?;

        let updated = wallet_from_row(&row)?;
        tx.commit().await?;

        Ok(updated)
    }
}

/// Transaction journal on PostgreSQL
#[derive(Clone)]
pub struct PgWalletTransactionRepository {
    handle: PgHandle,
}

impl PgWalletTransactionRepository {
    /// Journal running each call on its own pooled connection
    pub fn new(pool: PgPool) -> Self {
        Self {
            handle: PgHandle::Pool(pool),
        }
    }
}

#[async_trait]
impl WalletTransactionRepository for PgWalletTransactionRepository {
    async fn create(&self, entry: &WalletTransaction) -> WalletResult<()> {
        let mut conn = self.handle.acquire().await?;

        sqlx::query(
            r#"
            INSERT INTO wallet_transactions
                (id, wallet_id, amount, type, status, description, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.wallet_id)
        .bind(entry.amount)
        .bind(entry.transaction_type.to_string())
        .bind(entry.status.to_string())
        .bind(&entry.description)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                WalletError::WalletNotFound(entry.wallet_id.clone())
            }
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                WalletError::JournalWriteFailed(format!("duplicate transaction id {}", entry.id))
            }
            other => WalletError::StoreUnavailable(other),
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> WalletResult<WalletTransaction> {
        let mut conn = self.handle.acquire().await?;

        let row = sqlx::query(
            r#"
            SELECT id, wallet_id, amount, type, status, description, metadata,
                   created_at, updated_at, deleted_at
            FROM wallet_transactions
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| WalletError::TransactionNotFound(id.to_string()))?;

        entry_from_row(&row)
    }

    async fn list_by_wallet(
        &self,
        wallet_id: &str,
        limit: i64,
        offset: i64,
    ) -> WalletResult<Vec<WalletTransaction>> {
        let mut conn = self.handle.acquire().await?;

        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, amount, type, status, description, metadata,
                   created_at, updated_at, deleted_at
            FROM wallet_transactions
            WHERE wallet_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(wallet_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn count_by_wallet(&self, wallet_id: &str) -> WalletResult<i64> {
        let mut conn = self.handle.acquire().await?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM wallet_transactions
            WHERE wallet_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(wallet_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(row.try_get("count")?)
    }

    async fn update(&self, entry: &WalletTransaction) -> WalletResult<()> {
        let mut conn = self.handle.acquire().await?;

        // Terminal rows only accept a write that keeps their status
        let result = sqlx::query(
            r#"
            UPDATE wallet_transactions
            SET status = $2, description = $3, metadata = $4, updated_at = $5
            WHERE id = $1 AND deleted_at IS NULL
              AND (status = 'PENDING' OR status = $2)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.status.to_string())
        .bind(&entry.description)
        .bind(&entry.metadata)
        .bind(entry.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let current = sqlx::query(
            "SELECT status FROM wallet_transactions WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(&entry.id)
        .fetch_optional(&mut *conn)
        .await?;

        match current {
            Some(row) => Err(WalletError::InvalidStatusTransition {
                id: entry.id.clone(),
                from: row.try_get("status")?,
                to: entry.status.to_string(),
            }),
            None => Err(WalletError::TransactionNotFound(entry.id.clone())),
        }
    }
}

/// An open PostgreSQL transaction
///
/// Dropping the scope drops the inner `Transaction`, which rolls back.
pub struct PgTransactionScope {
    tx: SharedTransaction,
    wallets: PgWalletRepository,
    transactions: PgWalletTransactionRepository,
}

impl RepositoryRegistry for PgTransactionScope {
    fn wallets(&self) -> &dyn WalletRepository {
        &self.wallets
    }

    fn transactions(&self) -> &dyn WalletTransactionRepository {
        &self.transactions
    }
}

#[async_trait]
impl TransactionScope for PgTransactionScope {
    async fn commit(self) -> WalletResult<()> {
        let tx = self.tx.lock().await.take().ok_or_else(transaction_finished)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> WalletResult<()> {
        let tx = self.tx.lock().await.take();
        if let Some(tx) = tx {
            tx.rollback().await?;
        }
        Ok(())
    }
}

/// Wallet store on PostgreSQL
#[derive(Clone)]
pub struct PgWalletStore {
    pool: PgPool,
    wallets: PgWalletRepository,
    transactions: PgWalletTransactionRepository,
    lock_timeout: Option<Duration>,
}

impl PgWalletStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            wallets: PgWalletRepository::new(pool.clone()),
            transactions: PgWalletTransactionRepository::new(pool.clone()),
            pool,
            lock_timeout: None,
        }
    }

    /// Create a store over a connected [`Database`], honoring its lock timeout
    pub fn from_database(db: &Database, config: &DatabaseConfig) -> Self {
        Self::new(db.pool().clone()).with_lock_timeout(config.lock_timeout())
    }

    /// Bound how long a transaction waits for a wallet row lock
    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl RepositoryRegistry for PgWalletStore {
    fn wallets(&self) -> &dyn WalletRepository {
        &self.wallets
    }

    fn transactions(&self) -> &dyn WalletTransactionRepository {
        &self.transactions
    }
}

#[async_trait]
impl UnitOfWork for PgWalletStore {
    type Scope = PgTransactionScope;

    async fn begin(&self) -> WalletResult<PgTransactionScope> {
        let mut tx = self.pool.begin().await?;

        if let Some(limit) = self.lock_timeout {
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(format!("{}ms", limit.as_millis()))
                .execute(&mut *tx)
                .await?;
        }

        let shared: SharedTransaction = Arc::new(Mutex::new(Some(tx)));
        Ok(PgTransactionScope {
            wallets: PgWalletRepository {
                handle: PgHandle::Tx(shared.clone()),
            },
            transactions: PgWalletTransactionRepository {
                handle: PgHandle::Tx(shared.clone()),
            },
            tx: shared,
        })
    }

    async fn health_check(&self) -> WalletResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
