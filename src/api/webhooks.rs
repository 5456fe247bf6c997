//! Gateway webhook ingestion
//!
//! Transfer webhooks are authenticated against the provider signature,
//! stored before processing, and resolved through the same reconciliation
//! path as a manual verify. The endpoint acknowledges with 200 once the
//! event is stored; processing failures are recorded on the stored event
//! for redelivery, not surfaced to the provider.

use crate::api::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct TransferWebhook {
    event: String,
    data: TransferWebhookData,
}

#[derive(Debug, Deserialize)]
struct TransferWebhookData {
    reference: String,
}

pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get("x-paystack-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !state.gateway.validate_webhook_signature(&body, signature) {
        warn!("rejected webhook with invalid signature");
        return StatusCode::UNAUTHORIZED;
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("rejected unparseable webhook payload: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    let webhook: TransferWebhook = match serde_json::from_value(payload.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Signed but not a transfer event we understand; store and ack
            // so the provider stops retrying.
            info!("ignoring webhook without transfer shape: {}", e);
            let _ = state
                .webhooks
                .log_event("unknown", "paystack", payload)
                .await;
            return StatusCode::OK;
        }
    };

    let event = match state
        .webhooks
        .log_event(&webhook.event, "paystack", payload)
        .await
    {
        Ok(event) => event,
        Err(e) => {
            warn!("failed to store webhook event: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    match state
        .engine
        .resolve_transfer_event(&webhook.event, &webhook.data.reference)
        .await
    {
        Ok(Some(outcome)) => {
            info!(
                payout_request_id = %outcome.request.id,
                status = %outcome.request.status,
                "webhook resolved payout request"
            );
            let _ = state.webhooks.mark_processed(event.id).await;
        }
        Ok(None) => {
            // Event type the engine does not consume.
            let _ = state.webhooks.mark_processed(event.id).await;
        }
        Err(e) => {
            warn!(
                event_type = %webhook.event,
                reference = %webhook.data.reference,
                "webhook processing failed, left for redelivery: {}",
                e
            );
            let _ = state.webhooks.record_failure(event.id, &e.to_string()).await;
        }
    }

    StatusCode::OK
}
