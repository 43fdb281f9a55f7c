use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::wallet::TxOutcome;

/// Failures of the wallet, network, balance and purchase operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("No wallet available")]
    NoWalletAvailable,

    #[error("Wallet authorization rejected by the holder")]
    UserRejected,

    #[error("Wrong network: expected chain {expected}, wallet is on {}", display_chain(.actual))]
    WrongNetwork { expected: u64, actual: Option<u64> },

    #[error("Session cannot sign transactions")]
    NoSigner,

    #[error("Stable asset decimals mismatch: configured {configured}, on-chain {on_chain}")]
    DecimalsMismatch { configured: u8, on_chain: u8 },

    #[error("Approval failed: {0}")]
    ApprovalFailed(TxOutcome),

    #[error("Purchase failed: {0}")]
    PurchaseFailed(TxOutcome),

    #[error("Balance read failed: {0}")]
    ReadFailed(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Amount overflows 256 bits")]
    AmountOverflow,
}

fn display_chain(chain: &Option<u64>) -> String {
    match chain {
        Some(id) => id.to_string(),
        None => "an unknown chain".to_string(),
    }
}

/// How a failure is presented to the holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Interrupts the holder until dismissed.
    Blocking,
    /// Shown inline; the holder may simply try again.
    Status,
    /// Logged only.
    Silent,
}

impl FlowError {
    pub fn notice_kind(&self) -> NoticeKind {
        match self {
            Self::NoWalletAvailable
            | Self::UserRejected
            | Self::WrongNetwork { .. }
            | Self::NoSigner
            | Self::DecimalsMismatch { .. } => NoticeKind::Blocking,
            Self::ApprovalFailed(_)
            | Self::PurchaseFailed(_)
            | Self::InvalidAmount(_)
            | Self::AmountOverflow => NoticeKind::Status,
            Self::ReadFailed(_) => NoticeKind::Silent,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NoWalletAvailable => "NO_WALLET_AVAILABLE",
            Self::UserRejected => "USER_REJECTED",
            Self::WrongNetwork { .. } => "WRONG_NETWORK",
            Self::NoSigner => "NO_SIGNER",
            Self::DecimalsMismatch { .. } => "DECIMALS_MISMATCH",
            Self::ApprovalFailed(_) => "APPROVAL_FAILED",
            Self::PurchaseFailed(_) => "PURCHASE_FAILED",
            Self::ReadFailed(_) => "READ_FAILED",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
        }
    }
}

/// Errors returned by the HTTP control surface.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Internal server error")]
    Internal(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Flow(e) => match e {
                FlowError::InvalidAmount(_) | FlowError::AmountOverflow => {
                    StatusCode::BAD_REQUEST
                }
                FlowError::UserRejected => StatusCode::FORBIDDEN,
                FlowError::NoWalletAvailable => StatusCode::SERVICE_UNAVAILABLE,
                FlowError::WrongNetwork { .. }
                | FlowError::NoSigner
                | FlowError::DecimalsMismatch { .. } => StatusCode::CONFLICT,
                FlowError::ApprovalFailed(_)
                | FlowError::PurchaseFailed(_)
                | FlowError::ReadFailed(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Conflict(_) => "CONFLICT",
            Self::Flow(e) => e.code(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            tracing::error!(detail = %detail, "Internal error");
        }
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.error_type().to_string(),
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}
