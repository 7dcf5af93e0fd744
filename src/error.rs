use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Payment gateway rejected the request: {0}")]
    GatewayRejected(String),
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,
    #[error("Invalid webhook payload: {0}")]
    InvalidWebhookPayload(String),
    #[error("Invalid payout amount: {0}")]
    InvalidPayoutAmount(String),
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: i64, available: i64 },
    #[error(
        "Insufficient funds to refund payment {payment}: needs {required}, wallet holds {available} available and {frozen} frozen"
    )]
    InsufficientFundsForRefund {
        payment: String,
        required: i64,
        available: i64,
        frozen: i64,
    },
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),
    #[error("Payout not found: {0}")]
    PayoutNotFound(String),
    #[error("Pack not found: {0}")]
    PackNotFound(String),
    #[error("Creator not found: {0}")]
    CreatorNotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Duplicate ledger posting: {0}")]
    DuplicatePosting(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// Transient failures the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable(_))
    }

    /// Failures that leave balances untouched but need an operator to look at them.
    pub fn needs_operator(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFundsForRefund { .. } | Self::InvariantViolation(_)
        )
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(e: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}

impl From<csv::Error> for LedgerError {
    fn from(e: csv::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::InternalError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_gateway_outages_are_retryable() {
        assert!(LedgerError::GatewayUnavailable("timeout".into()).is_retryable());
        assert!(!LedgerError::GatewayRejected("bad key".into()).is_retryable());
        assert!(!LedgerError::InvalidWebhookSignature.is_retryable());
    }

    #[test]
    fn test_refund_shortfall_is_reported_to_operators() {
        let err = LedgerError::InsufficientFundsForRefund {
            payment: "p1".into(),
            required: 100,
            available: 10,
            frozen: 0,
        };
        assert!(err.needs_operator());
        assert!(err.to_string().contains("needs 100"));
    }
}
