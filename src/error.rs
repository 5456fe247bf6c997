//! Application error taxonomy
//!
//! Every fallible operation in the payout engine surfaces one of four
//! distinguishable kinds: validation (bad input, nothing happened),
//! precondition (state guard tripped, nothing happened), gateway (external
//! transfer provider; local state may be ambiguous) and infrastructure
//! (database / configuration). Callers branch on the kind, users get the
//! human-readable message.

use crate::database::error::DatabaseError;
use crate::payments::error::GatewayError;
use std::fmt;
use thiserror::Error;

/// Result alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Input validation failures. Always rejected before any state mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Payment details are missing or incomplete")]
    MissingPaymentDetails,

    #[error("Unsupported payment method: {method}")]
    UnsupportedPaymentMethod { method: String },

    #[error("Invalid bank account number: {value}")]
    InvalidAccountNumber { value: String },

    #[error("Invalid bank code: {value}")]
    InvalidBankCode { value: String },

    #[error("Invalid mobile money phone number: {value}")]
    InvalidPhoneNumber { value: String },

    #[error("Unknown mobile money network: {value}")]
    UnknownNetworkCode { value: String },

    #[error("A reason is required for this action")]
    MissingReason,

    #[error("An OTP is required to finalize this transfer")]
    MissingOtp,

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: String },
}

/// State guards. These double as race-condition protection: a request that
/// was mutated by another actor between read and write trips one of these.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Payout request {id} not found")]
    RequestNotFound { id: String },

    #[error("Seller balance for {seller_id} not found")]
    BalanceNotFound { seller_id: String },

    #[error("Payout request is not pending (current status: {status})")]
    NotPending { status: String },

    #[error("Payout request already has a gateway transfer attached")]
    AlreadyLinked,

    #[error("Payout request was cancelled by the seller")]
    Deactivated,

    #[error("Payout request has already been reversed")]
    AlreadyReversed,

    #[error("Payout request is not reversible from status {status}")]
    NotReversible { status: String },

    #[error("Payout request has no gateway transfer to verify")]
    NoTransfer,

    #[error("Payout request is not awaiting confirmation (current status: {status})")]
    NotAwaitingConfirmation { status: String },

    #[error("Payout request status changed concurrently (expected {expected}, found {actual})")]
    StatusChanged { expected: String, actual: String },
}

/// Infrastructure-level failures outside the request/gateway path.
#[derive(Debug, Clone, Error)]
pub enum InfrastructureError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Discriminant for the whole taxonomy.
#[derive(Debug, Error)]
pub enum AppErrorKind {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

/// Crate-wide error carrying the kind plus optional call-site context.
#[derive(Debug)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn precondition(err: PreconditionError) -> Self {
        Self::new(AppErrorKind::Precondition(err))
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: message.into(),
            },
        ))
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Validation and precondition failures are the caller's problem and
    /// map to 4xx responses; everything else is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            AppErrorKind::Validation(_) | AppErrorKind::Precondition(_)
        )
    }

    pub fn is_gateway_error(&self) -> bool {
        matches!(self.kind, AppErrorKind::Gateway(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.kind, context),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::validation(err)
    }
}

impl From<PreconditionError> for AppError {
    fn from(err: PreconditionError) -> Self {
        Self::precondition(err)
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        Self::new(AppErrorKind::Gateway(err))
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        Self::new(AppErrorKind::Database(err))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(AppErrorKind::Database(DatabaseError::from_sqlx(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_client_errors() {
        let err = AppError::validation(ValidationError::MissingPaymentDetails);
        assert!(err.is_client_error());
        assert!(!err.is_gateway_error());
    }

    #[test]
    fn precondition_errors_are_client_errors() {
        let err = AppError::precondition(PreconditionError::NotPending {
            status: "paid".to_string(),
        });
        assert!(err.is_client_error());
    }

    #[test]
    fn gateway_errors_are_not_client_errors() {
        let err = AppError::from(GatewayError::provider("transfer declined", false));
        assert!(!err.is_client_error());
        assert!(err.is_gateway_error());
    }

    #[test]
    fn context_is_appended_to_display() {
        let err = AppError::validation(ValidationError::MissingReason)
            .with_context("reverse payout 1234");
        let rendered = err.to_string();
        assert!(rendered.contains("reason is required"));
        assert!(rendered.contains("reverse payout 1234"));
    }
}
