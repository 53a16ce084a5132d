//! Domain error taxonomy and HTTP error response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::database::error::DatabaseError;

/// Result type for payment pipeline operations
pub type PaymentResult<T> = Result<T, PaymentError>;

/// All failure modes of the reconciliation pipeline.
///
/// Webhook handlers catch every variant and still acknowledge with 200;
/// initiate/verify handlers let the `IntoResponse` impl surface them.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// Provider disabled or credentials missing. Not retryable.
    #[error("payment method '{provider}' is unavailable: {message}")]
    GatewayConfig { provider: String, message: String },

    /// The provider's HTTP API rejected or failed the call.
    /// Retryable for verify (network/timeout/5xx), terminal for initiate.
    #[error("{provider} request failed: {message}")]
    ProviderRequest {
        provider: String,
        message: String,
        retryable: bool,
    },

    /// Webhook body could not be attributed to the claimed provider.
    /// Blocks processing of that delivery.
    #[error("invalid webhook signature for {provider}")]
    SignatureMismatch { provider: String },

    /// Reference unknown to the payment record store. Never auto-created.
    #[error("payment '{reference}' not found")]
    NotFound { reference: String },

    /// Settlement dedup check or insert failed; the record must stay
    /// pending so the effect can be retried safely.
    #[error("settlement failed: {message}")]
    Settlement { message: String },

    /// Request payload failed validation.
    #[error("invalid request: {message}")]
    Validation { message: String },

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl PaymentError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        PaymentError::Validation {
            message: message.into(),
        }
    }

    pub fn settlement<S: Into<String>>(message: S) -> Self {
        PaymentError::Settlement {
            message: message.into(),
        }
    }

    /// Whether a later identical attempt may succeed without intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ProviderRequest { retryable, .. } => *retryable,
            PaymentError::Settlement { .. } => true,
            PaymentError::Database(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            PaymentError::GatewayConfig { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "gateway_unavailable",
                "Payment method unavailable".to_string(),
            ),
            PaymentError::ProviderRequest { .. } => (
                StatusCode::BAD_GATEWAY,
                "provider_error",
                "Payment initialization failed. Please try again.".to_string(),
            ),
            PaymentError::SignatureMismatch { .. } => (
                StatusCode::UNAUTHORIZED,
                "signature_mismatch",
                self.to_string(),
            ),
            PaymentError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, "payment_not_found", self.to_string())
            }
            PaymentError::Validation { message } => {
                (StatusCode::BAD_REQUEST, "invalid_request", message.clone())
            }
            PaymentError::Settlement { .. } | PaymentError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_taxonomy() {
        let transient = PaymentError::ProviderRequest {
            provider: "paystack".to_string(),
            message: "timeout".to_string(),
            retryable: true,
        };
        assert!(transient.is_retryable());

        let rejected = PaymentError::ProviderRequest {
            provider: "paystack".to_string(),
            message: "invalid key".to_string(),
            retryable: false,
        };
        assert!(!rejected.is_retryable());

        assert!(PaymentError::settlement("store down").is_retryable());
        assert!(!PaymentError::validation("bad amount").is_retryable());
        assert!(!PaymentError::NotFound {
            reference: "CPY-1".to_string()
        }
        .is_retryable());
    }
}
