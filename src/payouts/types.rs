//! Domain types for the payout settlement engine
//!
//! The status enum carries the whole state machine: every transition the
//! engine performs is guarded by one of the predicates here, so transition
//! legality lives in exactly one place.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payout request lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    AwaitingGatewayConfirmation,
    Paid,
    Failed,
    Rejected,
    Reversed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::AwaitingGatewayConfirmation => "awaiting_gateway_confirmation",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
            PayoutStatus::Rejected => "rejected",
            PayoutStatus::Reversed => "reversed",
        }
    }

    /// Terminal states are immutable, except for the explicit admin
    /// reversal of a paid request.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Paid
                | PayoutStatus::Failed
                | PayoutStatus::Rejected
                | PayoutStatus::Reversed
        )
    }

    /// Approve and reject are only legal from `pending`.
    pub fn allows_decision(&self) -> bool {
        matches!(self, PayoutStatus::Pending)
    }

    /// States from which an admin-initiated reversal is permitted.
    pub fn is_reversible(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Paid
                | PayoutStatus::Processing
                | PayoutStatus::AwaitingGatewayConfirmation
        )
    }

    /// States the reconciliation sweeper may force-fail after a timeout.
    pub fn is_sweepable(&self) -> bool {
        matches!(
            self,
            PayoutStatus::Processing | PayoutStatus::AwaitingGatewayConfirmation
        )
    }

    /// States an in-flight gateway transfer can still resolve from.
    pub fn awaits_gateway(&self) -> bool {
        self.is_sweepable()
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which historical model a payout request row came from. The engine never
/// branches on this; it is resolved at the repository boundary only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_variant", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutVariant {
    /// Legacy rows migrated from the old payment-request model.
    PaymentRequest,
    /// Current withdrawal-request rows.
    WithdrawalRequest,
}

/// Supported payout channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
    Bank,
    MobileMoney,
}

impl PaymentMethodKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethodKind::Bank => "bank",
            PaymentMethodKind::MobileMoney => "mobile_money",
        }
    }

    pub fn is_mobile_money(&self) -> bool {
        matches!(self, PaymentMethodKind::MobileMoney)
    }
}

impl fmt::Display for PaymentMethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination details for a bank transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BankDetails {
    pub account_name: String,
    pub account_number: String,
    pub bank_code: String,
}

/// Destination details for a mobile money transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MobileMoneyDetails {
    pub account_name: String,
    pub phone_number: String,
    pub network_code: String,
}

/// Method-specific destination, decoded from the stored JSON document
/// according to the request's payment method kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDetails {
    Bank(BankDetails),
    MobileMoney(MobileMoneyDetails),
}

impl PaymentDetails {
    /// Decode the stored details document for the given method kind.
    pub fn from_stored(
        kind: PaymentMethodKind,
        value: &serde_json::Value,
    ) -> Result<Self, ValidationError> {
        match kind {
            PaymentMethodKind::Bank => serde_json::from_value::<BankDetails>(value.clone())
                .map(PaymentDetails::Bank)
                .map_err(|_| ValidationError::MissingPaymentDetails),
            PaymentMethodKind::MobileMoney => {
                serde_json::from_value::<MobileMoneyDetails>(value.clone())
                    .map(PaymentDetails::MobileMoney)
                    .map_err(|_| ValidationError::MissingPaymentDetails)
            }
        }
    }

    pub fn kind(&self) -> PaymentMethodKind {
        match self {
            PaymentDetails::Bank(_) => PaymentMethodKind::Bank,
            PaymentDetails::MobileMoney(_) => PaymentMethodKind::MobileMoney,
        }
    }

    pub fn account_name(&self) -> &str {
        match self {
            PaymentDetails::Bank(details) => &details.account_name,
            PaymentDetails::MobileMoney(details) => &details.account_name,
        }
    }
}

/// Who performed an operation, for the audit trail.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub actor: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ActionContext {
    pub fn admin(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            ip: None,
            user_agent: None,
        }
    }

    pub fn system() -> Self {
        Self {
            actor: "system".to_string(),
            ip: None,
            user_agent: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.actor == "system"
    }
}

/// Actions recorded in the payout audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    ApprovalStarted,
    Approved,
    Rejected,
    Reversed,
    GatewayFailed,
    AutoFailed,
    PinSubmitted,
    Reconciled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ApprovalStarted => "approval_started",
            AuditAction::Approved => "approved",
            AuditAction::Rejected => "rejected",
            AuditAction::Reversed => "reversed",
            AuditAction::GatewayFailed => "gateway_failed",
            AuditAction::AutoFailed => "auto_failed",
            AuditAction::PinSubmitted => "pin_submitted",
            AuditAction::Reconciled => "reconciled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decision_only_from_pending() {
        assert!(PayoutStatus::Pending.allows_decision());
        for status in [
            PayoutStatus::Processing,
            PayoutStatus::AwaitingGatewayConfirmation,
            PayoutStatus::Paid,
            PayoutStatus::Failed,
            PayoutStatus::Rejected,
            PayoutStatus::Reversed,
        ] {
            assert!(!status.allows_decision(), "{status} should not allow decision");
        }
    }

    #[test]
    fn reversible_set_matches_state_machine() {
        assert!(PayoutStatus::Paid.is_reversible());
        assert!(PayoutStatus::Processing.is_reversible());
        assert!(PayoutStatus::AwaitingGatewayConfirmation.is_reversible());
        assert!(!PayoutStatus::Pending.is_reversible());
        assert!(!PayoutStatus::Rejected.is_reversible());
        assert!(!PayoutStatus::Reversed.is_reversible());
        assert!(!PayoutStatus::Failed.is_reversible());
    }

    #[test]
    fn sweepable_set_is_the_nonterminal_gateway_states() {
        assert!(PayoutStatus::Processing.is_sweepable());
        assert!(PayoutStatus::AwaitingGatewayConfirmation.is_sweepable());
        assert!(!PayoutStatus::Pending.is_sweepable());
        assert!(!PayoutStatus::Paid.is_sweepable());
        assert!(!PayoutStatus::Failed.is_sweepable());
    }

    #[test]
    fn terminal_states() {
        assert!(PayoutStatus::Paid.is_terminal());
        assert!(PayoutStatus::Failed.is_terminal());
        assert!(PayoutStatus::Rejected.is_terminal());
        assert!(PayoutStatus::Reversed.is_terminal());
        assert!(!PayoutStatus::Pending.is_terminal());
        assert!(!PayoutStatus::Processing.is_terminal());
    }

    #[test]
    fn bank_details_decode_from_stored_document() {
        let value = json!({
            "account_name": "Ama Mensah",
            "account_number": "0012345678",
            "bank_code": "030100"
        });
        let details = PaymentDetails::from_stored(PaymentMethodKind::Bank, &value).unwrap();
        assert_eq!(details.kind(), PaymentMethodKind::Bank);
        assert_eq!(details.account_name(), "Ama Mensah");
    }

    #[test]
    fn mobile_money_details_decode_from_stored_document() {
        let value = json!({
            "account_name": "Kofi Boateng",
            "phone_number": "0244123456",
            "network_code": "MTN"
        });
        let details =
            PaymentDetails::from_stored(PaymentMethodKind::MobileMoney, &value).unwrap();
        assert!(details.kind().is_mobile_money());
    }

    #[test]
    fn incomplete_details_are_rejected() {
        let value = json!({ "account_number": "0012345678" });
        let result = PaymentDetails::from_stored(PaymentMethodKind::Bank, &value);
        assert_eq!(result, Err(ValidationError::MissingPaymentDetails));
    }
}
