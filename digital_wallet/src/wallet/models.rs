//! Wallet data models.

use super::errors::{WalletError, WalletResult};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Longest description accepted on a journal entry
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// Decimal places stored for monetary amounts (`NUMERIC(15, 2)`)
pub const AMOUNT_SCALE: u32 = 2;

/// Largest amount representable in `NUMERIC(15, 2)`
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_319, 232_830, 0, false, 2);

/// Default page size for transaction history
pub const DEFAULT_HISTORY_LIMIT: i64 = 10;

/// Upper bound on transaction history page size
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Wallet model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub user_id: String,
    pub balance: Decimal,
    pub currency: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Wallet {
    /// Build a fresh, active wallet for a user
    pub fn new(user_id: &str, balance: Decimal, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            balance,
            currency: currency.to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Journal entry for one balance-changing attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: String,
    pub wallet_id: String,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WalletTransaction {
    /// Build a pending withdrawal entry
    pub fn new_withdrawal(wallet_id: &str, amount: Decimal, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            wallet_id: wallet_id.to_string(),
            amount,
            transaction_type: TransactionType::Withdrawal,
            status: TransactionStatus::Pending,
            description,
            metadata: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// Journal entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Withdrawal,
    Deposit,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Withdrawal => write!(f, "WITHDRAWAL"),
            TransactionType::Deposit => write!(f, "DEPOSIT"),
        }
    }
}

impl FromStr for TransactionType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            "DEPOSIT" => Ok(TransactionType::Deposit),
            other => Err(WalletError::InvalidRecord(format!(
                "unknown transaction type {other}"
            ))),
        }
    }
}

/// Journal entry status
///
/// `Pending` is the only initial state; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Whether an entry in this status may be persisted with `next`.
    ///
    /// Keeping the same status is allowed so other fields can be amended.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        self == next || (self == TransactionStatus::Pending && next.is_terminal())
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Completed => write!(f, "COMPLETED"),
            TransactionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(WalletError::InvalidRecord(format!(
                "unknown transaction status {other}"
            ))),
        }
    }
}

/// Withdrawal request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub user_id: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl WithdrawRequest {
    /// Reject malformed requests before any storage is touched
    pub fn validate(&self) -> WalletResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(WalletError::ValidationFailed(
                "user_id is required".to_string(),
            ));
        }
        validate_amount(self.amount)?;
        if self
            .description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            return Err(WalletError::ValidationFailed(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }
        Ok(())
    }
}

/// Check that an amount is positive and fits the stored precision
pub fn validate_amount(amount: Decimal) -> WalletResult<()> {
    if amount <= Decimal::ZERO {
        return Err(WalletError::ValidationFailed(
            "amount must be greater than 0".to_string(),
        ));
    }
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(WalletError::ValidationFailed(format!(
            "amount supports at most {AMOUNT_SCALE} decimal places"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(WalletError::ValidationFailed(format!(
            "amount must not exceed {MAX_AMOUNT}"
        )));
    }
    Ok(())
}

/// Result of a completed withdrawal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub transaction_id: String,
    pub wallet_id: String,
    pub amount: Decimal,
    pub new_balance: Decimal,
    pub status: TransactionStatus,
    pub timestamp: DateTime<Utc>,
}

/// Balance lookup result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub wallet_id: String,
    pub balance: Decimal,
    pub currency: String,
    pub is_active: bool,
}

/// One page of a wallet's journal, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionHistory {
    pub entries: Vec<WalletTransaction>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl TransactionHistory {
    pub fn empty(limit: i64, offset: i64) -> Self {
        Self {
            entries: Vec::new(),
            total: 0,
            limit,
            offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request(amount: Decimal) -> WithdrawRequest {
        WithdrawRequest {
            user_id: "user-1".to_string(),
            amount,
            description: None,
        }
    }

    #[test]
    fn test_max_amount_matches_column_precision() {
        assert_eq!(MAX_AMOUNT, dec!(9999999999999.99));
    }

    #[test]
    fn test_status_transitions_are_one_way() {
        use TransactionStatus::*;

        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_validate_rejects_non_positive_amounts() {
        assert!(request(dec!(0)).validate().is_err());
        assert!(request(dec!(-10)).validate().is_err());
        assert!(request(dec!(0.01)).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_sub_cent_amounts() {
        let err = request(dec!(10.005)).validate().unwrap_err();
        assert!(matches!(err, WalletError::ValidationFailed(_)));
        // Trailing zeros are not extra precision
        assert!(request(dec!(10.500)).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_oversized_amounts() {
        assert!(request(dec!(10000000000000)).validate().is_err());
        assert!(request(MAX_AMOUNT).validate().is_ok());
    }

    #[test]
    fn test_validate_requires_user_and_bounded_description() {
        let mut req = request(dec!(5));
        req.user_id = "  ".to_string();
        assert!(req.validate().is_err());

        let mut req = request(dec!(5));
        req.description = Some("x".repeat(MAX_DESCRIPTION_LEN + 1));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_withdrawal_entry_starts_pending() {
        let entry = WalletTransaction::new_withdrawal("w-1", dec!(100), None);
        assert_eq!(entry.status, TransactionStatus::Pending);
        assert_eq!(entry.transaction_type, TransactionType::Withdrawal);
        assert_eq!(entry.created_at, entry.updated_at);
    }

    #[test]
    fn test_entry_serializes_type_field() {
        let entry = WalletTransaction::new_withdrawal("w-1", dec!(1.50), Some("atm".into()));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "WITHDRAWAL");
        assert_eq!(json["status"], "PENDING");
        assert!(json.get("deleted_at").is_none());
    }
}
