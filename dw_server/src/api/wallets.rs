//! Wallet endpoints: balance, withdrawal and transaction history.

use super::{
    AppState,
    request_id::RequestId,
    response::{ApiError, ApiResponse},
};
use crate::logging::log_withdrawal;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use digital_wallet::WalletError;
use digital_wallet::wallet::{
    BalanceResponse, TransactionHistory, WalletTransaction, WithdrawRequest, WithdrawResponse,
};
use serde::Deserialize;
use std::time::Instant;

/// Paging parameters for transaction history
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

/// Get a user's wallet balance.
///
/// Creates the wallet with the configured defaults on first use.
///
/// # Response
///
/// ```json
/// {
///   "code": "20000",
///   "message": "Balance retrieved successfully",
///   "data": {"wallet_id": "…", "balance": "150.00", "currency": "IDR", "is_active": true}
/// }
/// ```
pub async fn get_balance(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(user_id): Path<String>,
) -> ApiResult<BalanceResponse> {
    state
        .wallet_service
        .get_balance(&user_id)
        .await
        .map(|balance| ApiResponse::ok("Balance retrieved successfully", balance))
        .map_err(|e| ApiError::new(e, request_id.as_str()))
}

/// Withdraw from a user's wallet.
///
/// # Request Body
///
/// ```json
/// {"user_id": "user-42", "amount": "100.00", "description": "ATM"}
/// ```
///
/// # Errors
///
/// - `400 Bad Request` (`40001`): Malformed body or invalid amount
/// - `422 Unprocessable Entity` (`40010`, `40011`): Inactive wallet or insufficient balance
/// - `503 Service Unavailable` (`50300`): Withdrawal timed out
pub async fn withdraw(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> ApiResult<WithdrawResponse> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::new(
            WalletError::ValidationFailed(rejection.body_text()),
            request_id.as_str(),
        )
    })?;

    let user_id = request.user_id.clone();
    let amount = request.amount;
    let started = Instant::now();

    let result = state.wallet_service.withdraw(request).await;

    let outcome = match &result {
        Ok(receipt) => receipt.status.to_string(),
        Err(e) => e.code().to_string(),
    };
    log_withdrawal(
        request_id.as_str(),
        &user_id,
        amount,
        &outcome,
        started.elapsed().as_millis() as u64,
    );

    result
        .map(|receipt| ApiResponse::ok("Withdrawal successful", receipt))
        .map_err(|e| ApiError::new(e, request_id.as_str()))
}

/// Get a page of a user's transaction history, newest first.
///
/// # Query Parameters
///
/// - `limit`: Page size, 1-100 (default 10)
/// - `offset`: Entries to skip (default 0)
///
/// A user without a wallet gets an empty page, not an error.
pub async fn get_transaction_history(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(user_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<TransactionHistory> {
    let Query(query) = query.map_err(|rejection| {
        ApiError::new(
            WalletError::ValidationFailed(rejection.body_text()),
            request_id.as_str(),
        )
    })?;

    state
        .wallet_service
        .get_transaction_history(&user_id, query.limit, query.offset)
        .await
        .map(|history| ApiResponse::ok("Transaction history retrieved successfully", history))
        .map_err(|e| ApiError::new(e, request_id.as_str()))
}

/// Get one of a user's transactions.
///
/// # Errors
///
/// - `404 Not Found` (`40402`): No such transaction for this user
pub async fn get_transaction(
    State(state): State<AppState>,
    request_id: RequestId,
    Path((user_id, transaction_id)): Path<(String, String)>,
) -> ApiResult<WalletTransaction> {
    state
        .wallet_service
        .get_transaction(&user_id, &transaction_id)
        .await
        .map(|entry| ApiResponse::ok("Transaction retrieved successfully", entry))
        .map_err(|e| ApiError::new(e, request_id.as_str()))
}
