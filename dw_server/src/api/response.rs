//! JSON response envelopes.
//!
//! Success: `{"code": "20000", "message": ..., "data": ...}`
//!
//! Failure: `{"code": <stable error code>, "message": ..., "request_id": ...}`

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use digital_wallet::WalletError;
use serde::{Deserialize, Serialize};

/// Code carried by every successful response
pub const SUCCESS_CODE: &str = "20000";

/// Successful response envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub message: String,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: &str, data: T) -> Self {
        Self {
            code: SUCCESS_CODE.to_string(),
            message: message.to_string(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: String,
}

/// A wallet error bound to the request it failed
#[derive(Debug)]
pub struct ApiError {
    pub error: WalletError,
    pub request_id: String,
}

impl ApiError {
    pub fn new(error: WalletError, request_id: &str) -> Self {
        Self {
            error,
            request_id: request_id.to_string(),
        }
    }
}

/// HTTP status for a wallet error
pub fn status_for(error: &WalletError) -> StatusCode {
    match error {
        WalletError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        WalletError::WalletInactive(_) | WalletError::InsufficientBalance { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        WalletError::WalletNotFound(_) | WalletError::TransactionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        WalletError::InvalidStatusTransition { .. } | WalletError::WalletAlreadyExists(_) => {
            StatusCode::CONFLICT
        }
        WalletError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        WalletError::StoreUnavailable(_)
        | WalletError::UpdateFailed(_)
        | WalletError::JournalWriteFailed(_)
        | WalletError::InvalidRecord(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        if self.error.is_business_failure() {
            tracing::debug!(
                request_id = %self.request_id,
                code = self.error.code(),
                "Request rejected: {}",
                self.error
            );
        } else {
            tracing::error!(
                request_id = %self.request_id,
                code = self.error.code(),
                "Request failed: {}",
                self.error
            );
        }

        let body = ErrorResponse {
            code: self.error.code().to_string(),
            message: self.error.client_message(),
            request_id: self.request_id,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&WalletError::ValidationFailed("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&WalletError::InsufficientBalance {
                available: dec!(1),
                required: dec!(2)
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&WalletError::TransactionNotFound("t".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&WalletError::Timeout(Duration::from_secs(1))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&WalletError::JournalWriteFailed("j".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_business_failures_are_client_errors() {
        let errors = [
            WalletError::ValidationFailed("x".into()),
            WalletError::WalletNotFound("w".into()),
            WalletError::WalletInactive("w".into()),
            WalletError::InsufficientBalance {
                available: dec!(1),
                required: dec!(2),
            },
            WalletError::TransactionNotFound("t".into()),
            WalletError::InvalidStatusTransition {
                id: "t".into(),
                from: "COMPLETED".into(),
                to: "FAILED".into(),
            },
            WalletError::UpdateFailed("w".into()),
            WalletError::JournalWriteFailed("j".into()),
            WalletError::Timeout(Duration::from_secs(1)),
        ];

        for error in &errors {
            let status = status_for(error);
            assert_eq!(
                error.is_business_failure(),
                status.is_client_error(),
                "{error:?} -> {status}"
            );
        }
    }
}
