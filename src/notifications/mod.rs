//! Notification collaborator
//!
//! Payout decisions trigger a seller-facing notification. Delivery is a
//! fire-and-forget side effect: it runs after the financial transaction
//! has committed and its failure is logged, never propagated.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
#[error("Notification delivery failed: {message}")]
pub struct NotificationError {
    pub message: String,
}

/// Outcome communicated to the seller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutDecision {
    Approved,
    Rejected,
    Reversed,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutDecisionEvent {
    pub seller_id: Uuid,
    pub payout_request_id: Uuid,
    pub decision: PayoutDecision,
    pub amount: Decimal,
    pub reason: Option<String>,
}

/// Collaborator that delivers payout decision notifications.
#[async_trait]
pub trait PayoutNotifier: Send + Sync {
    async fn notify_decision(&self, event: PayoutDecisionEvent) -> Result<(), NotificationError>;
}

/// Default notifier: records the event in the service log. Actual email
/// delivery is owned by the notification service.
pub struct LogNotifier;

#[async_trait]
impl PayoutNotifier for LogNotifier {
    async fn notify_decision(&self, event: PayoutDecisionEvent) -> Result<(), NotificationError> {
        info!(
            seller_id = %event.seller_id,
            payout_request_id = %event.payout_request_id,
            decision = ?event.decision,
            amount = %event.amount,
            "payout decision notification"
        );
        Ok(())
    }
}

/// Deliver a notification in the background. Errors are logged and
/// swallowed: notification failure must never affect the ledger.
pub fn dispatch(notifier: Arc<dyn PayoutNotifier>, event: PayoutDecisionEvent) {
    tokio::spawn(async move {
        let payout_request_id = event.payout_request_id;
        if let Err(e) = notifier.notify_decision(event).await {
            error!(
                payout_request_id = %payout_request_id,
                "failed to deliver payout notification: {}",
                e
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        let event = PayoutDecisionEvent {
            seller_id: Uuid::new_v4(),
            payout_request_id: Uuid::new_v4(),
            decision: PayoutDecision::Approved,
            amount: Decimal::from(200),
            reason: None,
        };
        assert!(notifier.notify_decision(event).await.is_ok());
    }
}
