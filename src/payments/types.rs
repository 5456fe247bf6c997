//! Transfer gateway types
//!
//! Common request/response shapes shared by all transfer providers. The
//! raw `gateway_status` strings are provider vocabulary; they are only
//! interpreted by the central status mapping in the payout engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Instruction to move money to an already-created recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferInstruction {
    /// Amount in major currency units (e.g. cedis); providers convert to
    /// their own minor-unit representation.
    pub amount: Decimal,
    /// ISO currency code (GHS, NGN, ...)
    pub currency: String,
    /// Provider-side payee identifier from `create_recipient`
    pub recipient_code: String,
    /// Unique reference for this transfer (idempotency key on our side;
    /// the engine guarantees at most one initiation per payout request)
    pub reference: String,
    /// Narrative shown on the recipient's statement
    pub reason: Option<String>,
}

/// Provider response to a transfer initiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub transfer_code: String,
    pub reference: String,
    /// Raw provider status string ("pending", "success", "otp", ...)
    pub gateway_status: String,
    /// Provider hint that the transfer needs a second-factor confirmation
    /// before it is final
    pub requires_approval: bool,
}

/// Provider response to a status probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProbe {
    pub gateway_status: String,
    /// True while the provider is still waiting on a second factor
    pub requires_pin: bool,
}
