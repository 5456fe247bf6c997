//! Integration tests for the payout settlement engine
//!
//! These tests require a running Postgres instance with the migrations
//! applied. Run with:
//! DATABASE_URL=postgres://... cargo test --test payout_flow_test -- --ignored

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;
use sokoni_backend::config::PayoutConfig;
use sokoni_backend::database::{init_pool, PoolConfig};
use sokoni_backend::notifications::LogNotifier;
use sokoni_backend::payments::error::{GatewayError, GatewayResult};
use sokoni_backend::payments::traits::TransferGateway;
use sokoni_backend::payments::types::{TransferInstruction, TransferProbe, TransferReceipt};
use sokoni_backend::payouts::types::{ActionContext, PaymentDetails, PayoutStatus};
use sokoni_backend::payouts::{PayoutEngine, Sweeper};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Scriptable gateway double. Counts initiations so the no-double-payout
/// property can be asserted directly.
struct MockGateway {
    initiate_status: Mutex<String>,
    initiate_requires_approval: Mutex<bool>,
    verify_status: Mutex<String>,
    finalize_status: Mutex<String>,
    initiate_calls: AtomicUsize,
    fail_initiation: Mutex<bool>,
}

impl MockGateway {
    fn new() -> Self {
        Self {
            initiate_status: Mutex::new("success".to_string()),
            initiate_requires_approval: Mutex::new(false),
            verify_status: Mutex::new("success".to_string()),
            finalize_status: Mutex::new("success".to_string()),
            initiate_calls: AtomicUsize::new(0),
            fail_initiation: Mutex::new(false),
        }
    }

    fn script_initiation(&self, status: &str, requires_approval: bool) {
        *self.initiate_status.lock().unwrap() = status.to_string();
        *self.initiate_requires_approval.lock().unwrap() = requires_approval;
    }

    fn initiations(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferGateway for MockGateway {
    async fn create_recipient(&self, _details: &PaymentDetails) -> GatewayResult<String> {
        Ok(format!("RCP_{}", Uuid::new_v4().simple()))
    }

    async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> GatewayResult<TransferReceipt> {
        if *self.fail_initiation.lock().unwrap() {
            return Err(GatewayError::provider("transfer declined", false));
        }

        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TransferReceipt {
            transfer_id: format!("{}", 100_000 + self.initiations()),
            transfer_code: format!("TRF_{}", Uuid::new_v4().simple()),
            reference: instruction.reference.clone(),
            gateway_status: self.initiate_status.lock().unwrap().clone(),
            requires_approval: *self.initiate_requires_approval.lock().unwrap(),
        })
    }

    async fn verify_transfer(&self, _transfer_id: &str) -> GatewayResult<TransferProbe> {
        let status = self.verify_status.lock().unwrap().clone();
        Ok(TransferProbe {
            requires_pin: status == "otp",
            gateway_status: status,
        })
    }

    async fn finalize_transfer(
        &self,
        _transfer_code: &str,
        _otp: &str,
    ) -> GatewayResult<TransferProbe> {
        let status = self.finalize_status.lock().unwrap().clone();
        Ok(TransferProbe {
            requires_pin: false,
            gateway_status: status,
        })
    }

    fn validate_webhook_signature(&self, _payload: &[u8], _signature: &str) -> bool {
        true
    }
}

fn payout_config() -> PayoutConfig {
    PayoutConfig {
        withholding_tax_rate: Decimal::from_str("7.5").unwrap(),
        withholding_tax_category: "payout_wht".to_string(),
        currency: "GHS".to_string(),
        sweep_interval_secs: 3600,
        stuck_timeout_hours: 24,
        sweep_batch_size: 100,
    }
}

async fn setup() -> (sqlx::PgPool, Arc<MockGateway>, Arc<PayoutEngine>) {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = init_pool(&database_url, Some(PoolConfig::default()))
        .await
        .expect("Failed to init DB pool");

    let gateway = Arc::new(MockGateway::new());
    let engine = Arc::new(PayoutEngine::new(
        pool.clone(),
        gateway.clone(),
        Arc::new(LogNotifier),
        payout_config(),
    ));

    (pool, gateway, engine)
}

/// Seed a seller with balance 1000, pending 200, and a matching pending
/// bank payout request of 200 — the reference scenario.
async fn seed_bank_scenario(pool: &sqlx::PgPool) -> (Uuid, Uuid) {
    let seller_id = Uuid::new_v4();
    let request_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO seller_balances
         (seller_id, balance, locked_balance, pending_balance, withdrawable_balance)
         VALUES ($1, 1000, 0, 200, 800)",
    )
    .bind(seller_id)
    .execute(pool)
    .await
    .expect("seed balance");

    sqlx::query(
        "INSERT INTO payout_requests
         (id, seller_id, variant, amount_requested, payment_method, payment_details, status)
         VALUES ($1, $2, 'withdrawal_request', 200, 'bank', $3, 'pending')",
    )
    .bind(request_id)
    .bind(seller_id)
    .bind(json!({
        "account_name": "Ama Mensah",
        "account_number": "0012345678",
        "bank_code": "030100"
    }))
    .execute(pool)
    .await
    .expect("seed request");

    (seller_id, request_id)
}

async fn seed_momo_scenario(pool: &sqlx::PgPool) -> (Uuid, Uuid) {
    let seller_id = Uuid::new_v4();
    let request_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO seller_balances
         (seller_id, balance, locked_balance, pending_balance, withdrawable_balance)
         VALUES ($1, 1000, 0, 200, 800)",
    )
    .bind(seller_id)
    .execute(pool)
    .await
    .expect("seed balance");

    sqlx::query(
        "INSERT INTO payout_requests
         (id, seller_id, variant, amount_requested, payment_method, payment_details, status)
         VALUES ($1, $2, 'withdrawal_request', 200, 'mobile_money', $3, 'pending')",
    )
    .bind(request_id)
    .bind(seller_id)
    .bind(json!({
        "account_name": "Kofi Boateng",
        "phone_number": "0244123456",
        "network_code": "MTN"
    }))
    .execute(pool)
    .await
    .expect("seed request");

    (seller_id, request_id)
}

#[tokio::test]
#[ignore] // Requires database running
async fn approve_bank_transfer_settles_balances() {
    let (pool, gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_bank_scenario(&pool).await;
    gateway.script_initiation("success", false);

    let outcome = engine
        .approve(request_id, ActionContext::admin("admin-1"))
        .await
        .expect("approve should succeed");

    assert_eq!(outcome.request.status, PayoutStatus::Paid);
    assert_eq!(outcome.request.withholding_tax, Some(Decimal::from(15)));
    assert_eq!(
        outcome.request.amount_paid_to_seller,
        Some(Decimal::from(185))
    );
    assert!(outcome.request.has_gateway_linkage());

    // Reference scenario: 1000/200 pending -> 800/0, withdrawable 800.
    assert_eq!(outcome.balance.total_revenue, Decimal::from(800));
    assert_eq!(outcome.balance.pending_balance, Decimal::ZERO);
    assert_eq!(outcome.balance.available_balance, Decimal::from(800));
}

#[tokio::test]
#[ignore] // Requires database running
async fn reject_returns_reservation_untouched_balance() {
    let (pool, _gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_bank_scenario(&pool).await;

    let outcome = engine
        .reject(
            request_id,
            ActionContext::admin("admin-1"),
            Some("destination account flagged".to_string()),
        )
        .await
        .expect("reject should succeed");

    assert_eq!(outcome.request.status, PayoutStatus::Rejected);
    assert!(!outcome.request.is_active);
    // Balance untouched, reservation fully released.
    assert_eq!(outcome.balance.total_revenue, Decimal::from(1000));
    assert_eq!(outcome.balance.pending_balance, Decimal::ZERO);
    assert_eq!(outcome.balance.available_balance, Decimal::from(1000));
}

#[tokio::test]
#[ignore] // Requires database running
async fn double_approve_initiates_exactly_one_transfer() {
    let (pool, gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_bank_scenario(&pool).await;

    engine
        .approve(request_id, ActionContext::admin("admin-1"))
        .await
        .expect("first approve should succeed");

    let second = engine
        .approve(request_id, ActionContext::admin("admin-2"))
        .await;

    assert!(second.is_err(), "second approve must fail");
    let err = second.unwrap_err();
    assert!(err.is_client_error(), "second approve is a precondition error");
    assert_eq!(gateway.initiations(), 1);
}

#[tokio::test]
#[ignore] // Requires database running
async fn reverse_of_paid_restores_balance_exactly_once() {
    let (pool, gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_bank_scenario(&pool).await;
    gateway.script_initiation("success", false);

    engine
        .approve(request_id, ActionContext::admin("admin-1"))
        .await
        .expect("approve should succeed");

    let outcome = engine
        .reverse(
            request_id,
            ActionContext::admin("admin-2"),
            "chargeback dispute upheld",
        )
        .await
        .expect("reverse should succeed");

    assert_eq!(outcome.request.status, PayoutStatus::Reversed);
    assert!(outcome.request.reversed);
    // Money was disbursed, so the refund target is `balance`.
    assert_eq!(outcome.balance.total_revenue, Decimal::from(1000));
    assert_eq!(outcome.balance.available_balance, Decimal::from(1000));

    let again = engine
        .reverse(
            request_id,
            ActionContext::admin("admin-2"),
            "chargeback dispute upheld",
        )
        .await;
    assert!(again.is_err(), "a request reverses exactly once");
}

#[tokio::test]
#[ignore] // Requires database running
async fn reverse_requires_a_reason() {
    let (pool, _gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_bank_scenario(&pool).await;

    let result = engine
        .reverse(request_id, ActionContext::admin("admin-1"), "  ")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
#[ignore] // Requires database running
async fn momo_otp_holds_in_awaiting_confirmation_then_pin_settles() {
    let (pool, gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_momo_scenario(&pool).await;
    gateway.script_initiation("otp", true);

    let outcome = engine
        .approve(request_id, ActionContext::admin("admin-1"))
        .await
        .expect("approve should succeed");

    // Mobile money never settles without the second factor.
    assert_eq!(
        outcome.request.status,
        PayoutStatus::AwaitingGatewayConfirmation
    );
    assert!(outcome.request.requires_pin);
    assert_eq!(outcome.balance.pending_balance, Decimal::from(200));

    let settled = engine
        .submit_transfer_pin(request_id, "123456", ActionContext::admin("admin-1"))
        .await
        .expect("finalize should succeed");

    assert_eq!(settled.request.status, PayoutStatus::Paid);
    assert!(settled.request.pin_submitted);
    assert_eq!(settled.balance.total_revenue, Decimal::from(800));
    assert_eq!(settled.balance.pending_balance, Decimal::ZERO);
}

#[tokio::test]
#[ignore] // Requires database running
async fn momo_success_status_still_awaits_second_factor() {
    let (pool, gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_momo_scenario(&pool).await;
    // Gateway reports a terminal-looking status with no approval hint;
    // the channel rule must still hold the request.
    gateway.script_initiation("success", false);

    let outcome = engine
        .approve(request_id, ActionContext::admin("admin-1"))
        .await
        .expect("approve should succeed");

    assert_eq!(
        outcome.request.status,
        PayoutStatus::AwaitingGatewayConfirmation
    );
}

#[tokio::test]
#[ignore] // Requires database running
async fn gateway_rejection_refunds_reservation() {
    let (pool, gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_bank_scenario(&pool).await;
    *gateway.fail_initiation.lock().unwrap() = true;

    let result = engine
        .approve(request_id, ActionContext::admin("admin-1"))
        .await;
    assert!(result.is_err(), "approve surfaces the gateway error");

    let outcome = engine.get_outcome(request_id).await.unwrap();
    assert_eq!(outcome.request.status, PayoutStatus::Failed);
    assert_eq!(outcome.balance.pending_balance, Decimal::ZERO);
    assert_eq!(outcome.balance.total_revenue, Decimal::from(1000));
}

#[tokio::test]
#[ignore] // Requires database running
async fn sweeper_refunds_stuck_request_exactly_once() {
    let (pool, gateway, engine) = setup().await;
    let (_seller_id, request_id) = seed_bank_scenario(&pool).await;
    // Park the request in a non-terminal gateway state...
    gateway.script_initiation("pending", false);
    engine
        .approve(request_id, ActionContext::admin("admin-1"))
        .await
        .expect("approve should succeed");

    // ...and age it past the resolution timeout.
    sqlx::query(
        "UPDATE payout_requests SET updated_at = NOW() - INTERVAL '48 hours' WHERE id = $1",
    )
    .bind(request_id)
    .execute(&pool)
    .await
    .expect("backdate request");

    let sweeper = Sweeper::new(engine.clone());
    let first = sweeper.sweep_once().await.expect("first sweep");
    assert!(first.refunded >= 1, "first sweep refunds the stuck request");

    let outcome = engine.get_outcome(request_id).await.unwrap();
    assert_eq!(outcome.request.status, PayoutStatus::Failed);
    assert_eq!(outcome.balance.pending_balance, Decimal::ZERO);
    assert_eq!(outcome.balance.total_revenue, Decimal::from(1000));

    // Second sweep is a no-op for this request: it is already failed.
    let before = outcome.balance.total_revenue;
    sweeper.sweep_once().await.expect("second sweep");
    let after = engine.get_outcome(request_id).await.unwrap();
    assert_eq!(after.balance.total_revenue, before);
    assert_eq!(after.balance.pending_balance, Decimal::ZERO);
}
