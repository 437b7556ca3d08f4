//! Wallet error types.

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Storage engine or connectivity failure
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Malformed request (non-positive amount, empty user id, ...)
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// Wallet is deactivated and cannot be debited
    #[error("Wallet is not active: {0}")]
    WalletInactive(String),

    /// Insufficient balance
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    /// Balance update touched zero rows while the row lock was held
    #[error("Failed to update wallet balance: {0}")]
    UpdateFailed(String),

    /// Another writer created the wallet for this user first
    #[error("Wallet already exists for user {0}")]
    WalletAlreadyExists(String),

    /// Journal entry not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Journal entry could not be written or finalized
    #[error("Journal write failed: {0}")]
    JournalWriteFailed(String),

    /// Journal status change that would leave a terminal state
    #[error("Invalid status transition for transaction {id}: {from} -> {to}")]
    InvalidStatusTransition {
        id: String,
        from: String,
        to: String,
    },

    /// Stored row could not be mapped back into a model
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Unit of work did not finish in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl WalletError {
    /// Stable error code, suitable for clients to match on
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::ValidationFailed(_) => "40001",
            WalletError::WalletInactive(_) => "40010",
            WalletError::InsufficientBalance { .. } => "40011",
            WalletError::InvalidStatusTransition { .. } => "40012",
            WalletError::WalletNotFound(_) => "40401",
            WalletError::TransactionNotFound(_) => "40402",
            WalletError::WalletAlreadyExists(_) => "40901",
            WalletError::StoreUnavailable(_) => "50000",
            WalletError::UpdateFailed(_) => "50001",
            WalletError::JournalWriteFailed(_) => "50002",
            WalletError::InvalidRecord(_) => "50003",
            WalletError::Timeout(_) => "50300",
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Storage errors are sanitized so SQL details never reach the caller, and
    /// wallet/transaction identifiers are redacted.
    pub fn client_message(&self) -> String {
        match self {
            WalletError::StoreUnavailable(_) | WalletError::InvalidRecord(_) => {
                "Internal server error".to_string()
            }
            WalletError::UpdateFailed(_) => "Failed to update wallet balance".to_string(),
            WalletError::JournalWriteFailed(_) => "Failed to record transaction".to_string(),
            WalletError::WalletNotFound(_) => "Wallet not found".to_string(),
            WalletError::WalletInactive(_) => "Wallet is not active".to_string(),
            WalletError::WalletAlreadyExists(_) => "Wallet already exists".to_string(),
            WalletError::TransactionNotFound(_) => "Transaction not found".to_string(),
            WalletError::InvalidStatusTransition { .. } => {
                "Transaction is already finalized".to_string()
            }
            WalletError::Timeout(_) => "Service temporarily unavailable".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether this error is a business-rule rejection rather than an
    /// infrastructure failure
    pub fn is_business_failure(&self) -> bool {
        matches!(
            self,
            WalletError::ValidationFailed(_)
                | WalletError::WalletNotFound(_)
                | WalletError::WalletInactive(_)
                | WalletError::InsufficientBalance { .. }
                | WalletError::TransactionNotFound(_)
                | WalletError::InvalidStatusTransition { .. }
        )
    }

    /// Re-classify a storage failure that happened while writing the journal
    pub(crate) fn into_journal_failure(self) -> Self {
        match self {
            WalletError::StoreUnavailable(e) => WalletError::JournalWriteFailed(e.to_string()),
            other => other,
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_store_errors_are_sanitized() {
        let err = WalletError::StoreUnavailable(sqlx::Error::PoolTimedOut);
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.code(), "50000");
        assert!(!err.is_business_failure());
    }

    #[test]
    fn test_insufficient_balance_message_is_exposed() {
        let err = WalletError::InsufficientBalance {
            available: dec!(50.00),
            required: dec!(100.00),
        };
        let msg = err.client_message();
        assert!(msg.contains("50.00"));
        assert!(msg.contains("100.00"));
        assert!(err.is_business_failure());
    }

    #[test]
    fn test_identifiers_are_redacted() {
        let err = WalletError::WalletNotFound("3f0c7a9e".to_string());
        assert!(!err.client_message().contains("3f0c7a9e"));
    }

    #[test]
    fn test_journal_failure_reclassification() {
        let err = WalletError::StoreUnavailable(sqlx::Error::RowNotFound).into_journal_failure();
        assert_eq!(err.code(), "50002");

        let err = WalletError::WalletInactive("w".to_string()).into_journal_failure();
        assert_eq!(err.code(), "40010");
    }
}
