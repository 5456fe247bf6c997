//! Admin payout endpoints
//!
//! Each mutation returns the updated payout request plus the
//! post-operation seller balance snapshot.

use crate::api::{ApiError, AppState};
use crate::payouts::types::ActionContext;
use crate::payouts::PayoutOutcome;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ApproveBody {
    pub admin_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub admin_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReverseBody {
    pub admin_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeBody {
    pub otp: String,
}

fn context_from(headers: &HeaderMap, actor: impl Into<String>) -> ActionContext {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    ActionContext {
        actor: actor.into(),
        ip: header_str("x-forwarded-for"),
        user_agent: header_str("user-agent"),
    }
}

pub async fn get_payout(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PayoutOutcome>, ApiError> {
    let outcome = state.engine.get_outcome(id).await?;
    Ok(Json(outcome))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ApproveBody>,
) -> Result<Json<PayoutOutcome>, ApiError> {
    let ctx = context_from(&headers, body.admin_id);
    let outcome = state.engine.approve(id, ctx).await?;
    Ok(Json(outcome))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<RejectBody>,
) -> Result<Json<PayoutOutcome>, ApiError> {
    let ctx = context_from(&headers, body.admin_id);
    let outcome = state.engine.reject(id, ctx, body.reason).await?;
    Ok(Json(outcome))
}

pub async fn reverse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<ReverseBody>,
) -> Result<Json<PayoutOutcome>, ApiError> {
    let ctx = context_from(&headers, body.admin_id);
    let outcome = state.engine.reverse(id, ctx, &body.reason).await?;
    Ok(Json(outcome))
}

pub async fn verify(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<PayoutOutcome>, ApiError> {
    let ctx = context_from(&headers, "admin");
    let outcome = state.engine.verify_status(id, ctx).await?;
    Ok(Json(outcome))
}

pub async fn finalize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<FinalizeBody>,
) -> Result<Json<PayoutOutcome>, ApiError> {
    let ctx = context_from(&headers, "admin");
    let outcome = state.engine.submit_transfer_pin(id, &body.otp, ctx).await?;
    Ok(Json(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn context_picks_up_forwarding_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.9"));
        headers.insert("user-agent", HeaderValue::from_static("admin-console/2.1"));

        let ctx = context_from(&headers, "admin-42");
        assert_eq!(ctx.actor, "admin-42");
        assert_eq!(ctx.ip.as_deref(), Some("10.0.0.9"));
        assert_eq!(ctx.user_agent.as_deref(), Some("admin-console/2.1"));
    }

    #[test]
    fn context_tolerates_missing_headers() {
        let ctx = context_from(&HeaderMap::new(), "admin-42");
        assert!(ctx.ip.is_none());
        assert!(ctx.user_agent.is_none());
    }
}
