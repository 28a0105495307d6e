use crate::domain::payment::{ErrorEnvelope, ErrorPayload, PaymentStatus};
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invalid registration set: {0}")]
    InvalidRegistrationSet(String),

    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("gateway initialization failed: {0}")]
    GatewayInitializationFailed(String),

    #[error("webhook signature verification failed")]
    InvalidSignature,

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition { from: PaymentStatus, to: PaymentStatus },

    #[error("invalid refund amount: {0}")]
    InvalidRefundAmount(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden")]
    Forbidden,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::InvalidRegistrationSet(_) => "INVALID_REGISTRATION_SET",
            PaymentError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            PaymentError::GatewayInitializationFailed(_) => "GATEWAY_INITIALIZATION_FAILED",
            PaymentError::InvalidSignature => "INVALID_SIGNATURE",
            PaymentError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            PaymentError::InvalidRefundAmount(_) => "INVALID_REFUND_AMOUNT",
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::Forbidden => "FORBIDDEN",
            PaymentError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::InvalidRegistrationSet(_)
            | PaymentError::GatewayUnavailable(_)
            | PaymentError::InvalidRefundAmount(_)
            | PaymentError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::GatewayInitializationFailed(_) => StatusCode::BAD_GATEWAY,
            PaymentError::InvalidSignature => StatusCode::UNAUTHORIZED,
            PaymentError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Forbidden => StatusCode::FORBIDDEN,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        // Internal detail stays in the logs, not in the response body.
        let message = match self {
            PaymentError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        ErrorEnvelope {
            error: ErrorPayload {
                code: self.code().to_string(),
                message,
                details: None,
            },
        }
    }

    pub fn into_parts(self) -> (StatusCode, ErrorEnvelope) {
        if let PaymentError::Internal(ref e) = self {
            tracing::error!(error = %e, "internal error");
        }
        (self.status_code(), self.envelope())
    }
}

impl From<sqlx::Error> for PaymentError {
    fn from(e: sqlx::Error) -> Self {
        PaymentError::Internal(e.into())
    }
}
