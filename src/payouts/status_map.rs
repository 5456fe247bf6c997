//! Gateway status mapping
//!
//! The transfer provider reports free-form status strings; this module is
//! the single place they are interpreted. Every call site (approval
//! outcome, reconciliation, OTP finalization, webhooks) goes through
//! [`map_gateway_status`], so the second-factor rule cannot drift between
//! them.

use crate::payouts::types::{PaymentMethodKind, PayoutStatus};

/// Map a raw gateway status onto the local state machine.
///
/// `second_factor_pending` is true while the transfer still needs a PIN /
/// OTP confirmation. Callers derive it from the provider's hint, and for
/// mobile money, which always needs a second factor, they keep it true
/// until the PIN has been submitted. A success report while the second
/// factor is pending must never map to `Paid`: the transfer is not final,
/// whatever the status string says.
///
/// Returns `None` for an unrecognized status. The caller logs it and
/// leaves local state unchanged for the sweeper or a manual verify to
/// resolve; an unknown status is never treated as success.
pub fn map_gateway_status(
    gateway_status: &str,
    second_factor_pending: bool,
    method: PaymentMethodKind,
) -> Option<PayoutStatus> {
    let normalized = gateway_status.trim().to_ascii_lowercase();

    let mapped = match normalized.as_str() {
        // The provider is explicitly holding the transfer for a second
        // factor, regardless of what the caller believed.
        "otp" | "pending_otp" | "pending_approval" => PayoutStatus::AwaitingGatewayConfirmation,

        "success" => {
            if second_factor_pending {
                PayoutStatus::AwaitingGatewayConfirmation
            } else {
                PayoutStatus::Paid
            }
        }

        "pending" | "queued" | "processing" | "sent" => {
            if second_factor_pending {
                PayoutStatus::AwaitingGatewayConfirmation
            } else {
                PayoutStatus::Processing
            }
        }

        "failed" | "abandoned" | "rejected" => PayoutStatus::Failed,

        "reversed" => PayoutStatus::Reversed,

        _ => return None,
    };

    // Channel invariant: a mobile money transfer with its second factor
    // outstanding is never paid, whatever the status string said.
    if mapped == PayoutStatus::Paid && method.is_mobile_money() && second_factor_pending {
        return Some(PayoutStatus::AwaitingGatewayConfirmation);
    }

    Some(mapped)
}
