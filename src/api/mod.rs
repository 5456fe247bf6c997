//! Admin-facing HTTP surface
//!
//! Routing, shared state and the error-to-response mapping for the payout
//! endpoints. Authentication middleware is mounted by the deployment in
//! front of this router.

pub mod health;
pub mod payouts;
pub mod webhooks;

use crate::config::Config;
use crate::database::webhook_repository::WebhookRepository;
use crate::error::{AppError, AppErrorKind, PreconditionError};
use crate::payments::traits::TransferGateway;
use crate::payouts::PayoutEngine;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub engine: Arc<PayoutEngine>,
    pub gateway: Arc<dyn TransferGateway>,
    pub webhooks: Arc<WebhookRepository>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/payouts/:id", get(payouts::get_payout))
        .route("/api/v1/payouts/:id/approve", post(payouts::approve))
        .route("/api/v1/payouts/:id/reject", post(payouts::reject))
        .route("/api/v1/payouts/:id/reverse", post(payouts::reverse))
        .route("/api/v1/payouts/:id/verify", post(payouts::verify))
        .route("/api/v1/payouts/:id/finalize", post(payouts::finalize))
        .route("/api/v1/webhooks/paystack", post(webhooks::paystack_webhook))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP projection of [`AppError`].
///
/// Validation and precondition failures carry their human-readable reason
/// to the caller; gateway failures surface as 502 with the kind preserved;
/// database failures are logged with context and returned as a generic
/// 500 so no internals leak.
pub struct ApiError(pub AppError);

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self.0.kind {
            AppErrorKind::Validation(e) => (StatusCode::BAD_REQUEST, "validation", e.to_string()),
            AppErrorKind::Precondition(e) => {
                let status = match e {
                    PreconditionError::RequestNotFound { .. }
                    | PreconditionError::BalanceNotFound { .. } => StatusCode::NOT_FOUND,
                    _ => StatusCode::CONFLICT,
                };
                (status, "precondition", e.to_string())
            }
            AppErrorKind::Gateway(e) => {
                error!("gateway error surfaced to caller: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "gateway",
                    "Transfer gateway error; verify the payout status before retrying".to_string(),
                )
            }
            AppErrorKind::Database(e) => {
                error!("database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal error".to_string(),
                )
            }
            AppErrorKind::Infrastructure(e) => {
                error!("infrastructure error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorBody {
                error: message,
                kind,
            }),
        )
            .into_response()
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}
