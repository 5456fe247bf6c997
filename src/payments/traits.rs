//! Transfer gateway trait definition
//!
//! The payout engine talks to the external transfer provider exclusively
//! through this contract.

use crate::payments::error::GatewayResult;
use crate::payments::types::{TransferInstruction, TransferProbe, TransferReceipt};
use crate::payouts::types::PaymentDetails;
use async_trait::async_trait;

/// Contract for transfer provider implementations.
///
/// None of these calls may be assumed idempotent by callers. The engine
/// enforces at most one `initiate_transfer` per payout request by checking
/// that no gateway linkage exists before approval.
#[async_trait]
pub trait TransferGateway: Send + Sync {
    /// Create a provider-side payee record for the given destination.
    ///
    /// # Returns
    /// * The provider's recipient code, to be stored on the payout request
    async fn create_recipient(&self, details: &PaymentDetails) -> GatewayResult<String>;

    /// Initiate a transfer to a previously created recipient.
    ///
    /// # Returns
    /// * `TransferReceipt` - provider identifiers, raw status, and the
    ///   second-factor hint
    async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> GatewayResult<TransferReceipt>;

    /// Probe the provider for the current status of a transfer.
    async fn verify_transfer(&self, transfer_id: &str) -> GatewayResult<TransferProbe>;

    /// Submit the second-factor confirmation (OTP) releasing a held
    /// transfer.
    async fn finalize_transfer(
        &self,
        transfer_code: &str,
        otp: &str,
    ) -> GatewayResult<TransferProbe>;

    /// Validate a webhook signature
    ///
    /// # Arguments
    /// * `payload` - Raw webhook payload body
    /// * `signature` - Signature from webhook header
    ///
    /// # Returns
    /// * `bool` - True if signature is valid, false otherwise
    fn validate_webhook_signature(&self, payload: &[u8], signature: &str) -> bool;
}
