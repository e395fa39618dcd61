use sea_orm::prelude::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")] Database(#[from] sea_orm::DbErr),

    #[error("Invalid input: {0}")] InvalidInput(String),

    #[error("Not found: {0}")] NotFound(String),

    #[error("Insufficient funds on {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("Stale transition: {0}")] StaleTransition(String),

    #[error("Transaction {transaction_id} is not assigned to agent {agent_id}")]
    NotAssigned {
        transaction_id: Uuid,
        agent_id: Uuid,
    },

    #[error("Payment account not found for agent {agent_id}: {lookup}")]
    PaymentAccountNotFound {
        agent_id: Uuid,
        lookup: String,
    },

    #[error("Receipt upload failed: {0}")] UploadFailed(String),

    #[error(
        "Partial failure in saga {saga_id} for transaction {transaction_id} after step {step}: {message}"
    )]
    PartialFailure {
        saga_id: Uuid,
        transaction_id: Uuid,
        step: i32,
        message: String,
    },

    #[error("Notification error: {0}")] Notification(String),

    #[error("Configuration error: {0}")] Config(String),

    #[error("Internal error: {0}")] Internal(String),
}

#[derive(serde::Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(serde::Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl AppError {
    pub fn insufficient(account: impl Into<String>, required: Decimal, available: Decimal) -> Self {
        AppError::InsufficientFunds {
            account: account.into(),
            required,
            available,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            AppError::StaleTransition(_) => "STALE_TRANSITION",
            AppError::NotAssigned { .. } => "NOT_ASSIGNED",
            AppError::PaymentAccountNotFound { .. } => "PAYMENT_ACCOUNT_NOT_FOUND",
            AppError::UploadFailed(_) => "UPLOAD_FAILED",
            AppError::PartialFailure { .. } => "PARTIAL_FAILURE",
            AppError::Notification(_) => "NOTIFICATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        let (message, field) = match self {
            // Never leak driver details to API callers
            AppError::Database(_) => ("A database error occurred".to_string(), None),
            AppError::InsufficientFunds { account, .. } => (self.to_string(), Some(account.clone())),
            AppError::PaymentAccountNotFound { .. } =>
                (self.to_string(), Some("payment_method".to_string())),
            _ => (self.to_string(), None),
        };

        ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
            },
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            | AppError::InvalidInput(_)
            | AppError::InsufficientFunds { .. }
            | AppError::PaymentAccountNotFound { .. } => StatusCode::BAD_REQUEST,
            AppError::NotAssigned { .. } => StatusCode::FORBIDDEN,
            AppError::StaleTransition(_) => StatusCode::CONFLICT,
            AppError::UploadFailed(_) | AppError::Notification(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(code = self.code(), "request failed: {}", self);
        }

        let response = self.to_error_response();
        (status, axum::Json(response)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
