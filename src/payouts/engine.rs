//! Payout settlement engine
//!
//! Owns every mutation of a payout request from `pending` onward: the
//! admin decisions (approve, reject, reverse), second-factor finalization,
//! and gateway reconciliation. Each operation is an all-or-nothing
//! database transaction spanning the request, the seller balance, the
//! ledger log and the withholding record.
//!
//! The gateway is never called while a transaction is open. Approval runs
//! in three phases (a local intent transaction, then the gateway calls,
//! then a local outcome transaction guarded by a status re-check) so a
//! slow or ambiguous provider call can never hold
//! row locks, and a request the gateway left unresolved is eventually
//! settled by the reconciliation sweeper.
//!
//! Refund targets are asymmetric: reject, failure and timeout return the
//! `pending_balance` reservation (the money never left the platform),
//! while reversing a confirmed-paid request credits `balance` (the money
//! was already disbursed). `SellerBalance::release_pending` and
//! `SellerBalance::refund_to_balance` are the only two refund paths.

use crate::config::PayoutConfig;
use crate::database::audit_repository::AuditRepository;
use crate::database::balance_repository::{BalanceRepository, BalanceSnapshot, SellerBalance};
use crate::database::ledger_repository::{
    LedgerDirection, LedgerEntryStatus, LedgerRepository,
};
use crate::database::payout_repository::{PayoutRepository, PayoutRequest};
use crate::database::repository::Repository;
use crate::database::transaction::DatabaseTransaction;
use crate::database::tax_repository::TaxRepository;
use crate::error::{AppError, AppResult, PreconditionError, ValidationError};
use crate::notifications::{self, PayoutDecision, PayoutDecisionEvent, PayoutNotifier};
use crate::payments::error::GatewayError;
use crate::payments::traits::TransferGateway;
use crate::payments::types::{TransferInstruction, TransferProbe};
use crate::payouts::status_map::map_gateway_status;
use crate::payouts::types::{ActionContext, AuditAction, PayoutStatus};
use crate::payouts::validation::{validate_payment_details, validate_reason};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of an admin operation: the updated request plus the
/// post-operation seller balance snapshot.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PayoutOutcome {
    pub request: PayoutRequest,
    pub balance: BalanceSnapshot,
}

/// Split an amount into withholding tax and the net paid to the seller.
/// `rate` is a percentage; tax rounds half-away-from-zero to two decimal
/// places so the seller never gains a sub-pesewa from rounding.
pub fn compute_withholding(amount: Decimal, rate: Decimal) -> (Decimal, Decimal) {
    if rate <= Decimal::ZERO {
        return (Decimal::ZERO, amount);
    }

    let tax = (amount * rate / Decimal::from(100))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    (tax, amount - tax)
}

pub struct PayoutEngine {
    pool: PgPool,
    gateway: Arc<dyn TransferGateway>,
    notifier: Arc<dyn PayoutNotifier>,
    config: PayoutConfig,
    payouts: PayoutRepository,
    balances: BalanceRepository,
    ledger: LedgerRepository,
    taxes: TaxRepository,
    audits: AuditRepository,
}

impl PayoutEngine {
    pub fn new(
        pool: PgPool,
        gateway: Arc<dyn TransferGateway>,
        notifier: Arc<dyn PayoutNotifier>,
        config: PayoutConfig,
    ) -> Self {
        Self {
            payouts: PayoutRepository::new(pool.clone()),
            balances: BalanceRepository::new(pool.clone()),
            ledger: LedgerRepository::new(pool.clone()),
            taxes: TaxRepository::new(pool.clone()),
            audits: AuditRepository::new(pool.clone()),
            pool,
            gateway,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &PayoutConfig {
        &self.config
    }

    /// Approve a pending payout request and initiate the gateway transfer.
    ///
    /// Phase 1 marks the request `processing` (the intent), phase 2 talks
    /// to the gateway with no transaction open, phase 3 records the
    /// outcome behind a status re-check. A definitive gateway rejection is
    /// compensated immediately (refund + `failed`); an ambiguous gateway
    /// error leaves the request in `processing` for the sweeper or a
    /// manual verify, because the transfer may or may not exist.
    pub async fn approve(&self, request_id: Uuid, ctx: ActionContext) -> AppResult<PayoutOutcome> {
        // Phase 1: intent
        let request = self.begin_approval(request_id, &ctx).await?;
        let details = request.details()?;
        let net_amount = request
            .amount_paid_to_seller
            .expect("begin_approval sets the net amount");

        // Phase 2: gateway, outside any transaction
        let recipient_code = match self.gateway.create_recipient(&details).await {
            Ok(code) => code,
            Err(e) => {
                self.handle_initiation_failure(request_id, &ctx, &e, "recipient creation failed")
                    .await?;
                return Err(e.into());
            }
        };

        let instruction = TransferInstruction {
            amount: net_amount,
            currency: self.config.currency.clone(),
            recipient_code: recipient_code.clone(),
            reference: format!("po_{}", request_id.simple()),
            reason: Some("Seller payout".to_string()),
        };

        let receipt = match self.gateway.initiate_transfer(&instruction).await {
            Ok(receipt) => receipt,
            Err(e) => {
                self.handle_initiation_failure(request_id, &ctx, &e, "transfer initiation failed")
                    .await?;
                return Err(e.into());
            }
        };

        // Phase 3: outcome
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;
        let mut request = self
            .payouts
            .lock_for_update(tx.tx_mut(), request_id)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: request_id.to_string(),
            })?;

        // Race guard: another actor (reversal, sweeper) may have resolved
        // the request while we were talking to the gateway. The transfer
        // exists but must not be recorded over their outcome; the
        // reconciliation path will pick it up from the gateway side.
        if request.status != PayoutStatus::Processing {
            error!(
                payout_request_id = %request_id,
                transfer_code = %receipt.transfer_code,
                status = %request.status,
                "payout request changed state during gateway call; transfer left to reconciliation"
            );
            tx.rollback().await?;
            return Err(PreconditionError::StatusChanged {
                expected: PayoutStatus::Processing.as_str().to_string(),
                actual: request.status.as_str().to_string(),
            }
            .into());
        }

        let second_factor_pending =
            receipt.requires_approval || request.payment_method.is_mobile_money();

        let mapped = map_gateway_status(
            &receipt.gateway_status,
            second_factor_pending,
            request.payment_method,
        )
        .unwrap_or_else(|| {
            warn!(
                payout_request_id = %request_id,
                gateway_status = %receipt.gateway_status,
                "unrecognized gateway status at initiation; keeping request in processing"
            );
            PayoutStatus::Processing
        });

        request.recipient_code = Some(recipient_code);
        request.transfer_id = Some(receipt.transfer_id.clone());
        request.transfer_code = Some(receipt.transfer_code.clone());
        request.reference = Some(receipt.reference.clone());
        request.requires_pin = second_factor_pending;
        request.status = mapped;
        self.payouts.save_in_tx(tx.tx_mut(), &request).await?;

        if let Some(tax) = request.withholding_tax {
            if tax > Decimal::ZERO {
                self.taxes
                    .insert_in_tx(
                        tx.tx_mut(),
                        request.seller_id,
                        request.id,
                        tax,
                        request.withholding_tax_rate.unwrap_or_default(),
                        &self.config.withholding_tax_category,
                    )
                    .await?;
            }
        }

        let debit_status = match mapped {
            PayoutStatus::Paid => LedgerEntryStatus::Completed,
            PayoutStatus::Failed => LedgerEntryStatus::Failed,
            _ => LedgerEntryStatus::Pending,
        };
        self.ledger
            .insert_in_tx(
                tx.tx_mut(),
                request.seller_id,
                request.id,
                request.amount_requested,
                LedgerDirection::Debit,
                debit_status,
                "payout transfer to seller",
            )
            .await?;

        self.audits
            .append_in_tx(
                tx.tx_mut(),
                request.id,
                AuditAction::Approved,
                &ctx,
                Some(&format!("gateway status: {}", receipt.gateway_status)),
            )
            .await?;
        self.audits
            .record_admin_action_in_tx(
                tx.tx_mut(),
                &ctx.actor,
                AuditAction::Approved,
                request.id,
                request.seller_id,
                request.amount_requested,
                request.amount_paid_to_seller,
                request.withholding_tax,
                Some(serde_json::json!({ "transfer_code": receipt.transfer_code })),
            )
            .await?;

        // The balance record is the most contended row; it is locked and
        // mutated last in every transaction.
        let mut balance = self.lock_balance(&mut tx, request.seller_id).await?;
        match mapped {
            PayoutStatus::Paid => {
                // Confirmed non-PIN success: the money has left the
                // platform in the same breath as the approval.
                balance.settle_payout(request.amount_requested);
            }
            PayoutStatus::Failed => {
                // Instant gateway rejection surfaced through the status
                // string rather than an error.
                balance.release_pending(request.amount_requested);
            }
            _ => {}
        }
        self.balances.save_in_tx(tx.tx_mut(), &balance).await?;
        tx.commit().await?;

        info!(
            payout_request_id = %request_id,
            status = %request.status,
            "payout request approved"
        );

        notifications::dispatch(
            self.notifier.clone(),
            PayoutDecisionEvent {
                seller_id: request.seller_id,
                payout_request_id: request.id,
                decision: PayoutDecision::Approved,
                amount: request.amount_requested,
                reason: None,
            },
        );

        Ok(PayoutOutcome {
            balance: balance.snapshot(),
            request,
        })
    }

    /// Phase 1 of approval: validate and mark the intent.
    async fn begin_approval(
        &self,
        request_id: Uuid,
        ctx: &ActionContext,
    ) -> AppResult<PayoutRequest> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;
        let mut request = self
            .payouts
            .lock_for_update(tx.tx_mut(), request_id)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: request_id.to_string(),
            })?;

        if !request.status.allows_decision() {
            return Err(PreconditionError::NotPending {
                status: request.status.as_str().to_string(),
            }
            .into());
        }
        if !request.is_active {
            return Err(PreconditionError::Deactivated.into());
        }
        if request.has_gateway_linkage() {
            return Err(PreconditionError::AlreadyLinked.into());
        }
        if request.amount_requested <= Decimal::ZERO {
            return Err(ValidationError::InvalidAmount {
                amount: request.amount_requested.to_string(),
            }
            .into());
        }

        let details = request.details()?;
        validate_payment_details(&details)?;

        let rate = self.config.withholding_tax_rate;
        let (tax, net) = compute_withholding(request.amount_requested, rate);
        request.withholding_tax_rate = Some(rate);
        request.withholding_tax = Some(tax);
        request.amount_paid_to_seller = Some(net);
        request.status = PayoutStatus::Processing;

        self.payouts.save_in_tx(tx.tx_mut(), &request).await?;
        self.audits
            .append_in_tx(
                tx.tx_mut(),
                request.id,
                AuditAction::ApprovalStarted,
                ctx,
                None,
            )
            .await?;
        tx.commit().await?;

        Ok(request)
    }

    /// Compensate a failed gateway call during approval.
    ///
    /// A non-retryable provider rejection is definitive: no transfer
    /// exists, so refund the reservation and fail the request now. A
    /// retryable error (timeout, transport) is ambiguous, since the
    /// transfer may have been created, so the request stays in `processing` and
    /// the sweeper or a manual verify resolves it.
    async fn handle_initiation_failure(
        &self,
        request_id: Uuid,
        ctx: &ActionContext,
        gateway_error: &GatewayError,
        note: &str,
    ) -> AppResult<()> {
        if gateway_error.is_retryable() {
            warn!(
                payout_request_id = %request_id,
                "ambiguous gateway failure during approval, leaving request for reconciliation: {}",
                gateway_error
            );
            let mut tx = DatabaseTransaction::begin(&self.pool).await?;
            self.audits
                .append_in_tx(
                    tx.tx_mut(),
                    request_id,
                    AuditAction::GatewayFailed,
                    ctx,
                    Some(&format!("{note}; left for reconciliation")),
                )
                .await?;
            tx.commit().await?;
            return Ok(());
        }

        let mut tx = DatabaseTransaction::begin(&self.pool).await?;
        let Some(mut request) = self.payouts.lock_for_update(tx.tx_mut(), request_id).await?
        else {
            tx.rollback().await?;
            return Ok(());
        };

        if request.status != PayoutStatus::Processing {
            // Someone else already resolved it; nothing to compensate.
            tx.rollback().await?;
            return Ok(());
        }

        request.status = PayoutStatus::Failed;
        self.payouts.save_in_tx(tx.tx_mut(), &request).await?;

        self.ledger
            .insert_in_tx(
                tx.tx_mut(),
                request.seller_id,
                request.id,
                request.amount_requested,
                LedgerDirection::Credit,
                LedgerEntryStatus::Completed,
                "reservation returned after gateway rejection",
            )
            .await?;
        self.audits
            .append_in_tx(
                tx.tx_mut(),
                request.id,
                AuditAction::GatewayFailed,
                ctx,
                Some(note),
            )
            .await?;

        let mut balance = self.lock_balance(&mut tx, request.seller_id).await?;
        balance.release_pending(request.amount_requested);
        self.balances.save_in_tx(tx.tx_mut(), &balance).await?;
        tx.commit().await?;

        info!(
            payout_request_id = %request_id,
            "payout request failed and refunded after gateway rejection"
        );
        Ok(())
    }

    /// Reject a pending payout request, returning the reservation.
    ///
    /// No gateway call occurs: the money never left the platform, so the
    /// full requested amount moves out of `pending_balance` (clamped) and
    /// `balance` is untouched.
    pub async fn reject(
        &self,
        request_id: Uuid,
        ctx: ActionContext,
        reason: Option<String>,
    ) -> AppResult<PayoutOutcome> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;
        let mut request = self
            .payouts
            .lock_for_update(tx.tx_mut(), request_id)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: request_id.to_string(),
            })?;

        if !request.status.allows_decision() {
            return Err(PreconditionError::NotPending {
                status: request.status.as_str().to_string(),
            }
            .into());
        }

        request.status = PayoutStatus::Rejected;
        request.is_active = false;
        self.payouts.save_in_tx(tx.tx_mut(), &request).await?;

        self.ledger
            .insert_in_tx(
                tx.tx_mut(),
                request.seller_id,
                request.id,
                request.amount_requested,
                LedgerDirection::Credit,
                LedgerEntryStatus::Completed,
                "reservation returned after rejection",
            )
            .await?;
        self.audits
            .append_in_tx(
                tx.tx_mut(),
                request.id,
                AuditAction::Rejected,
                &ctx,
                reason.as_deref(),
            )
            .await?;
        self.audits
            .record_admin_action_in_tx(
                tx.tx_mut(),
                &ctx.actor,
                AuditAction::Rejected,
                request.id,
                request.seller_id,
                request.amount_requested,
                None,
                None,
                reason
                    .as_deref()
                    .map(|r| serde_json::json!({ "reason": r })),
            )
            .await?;

        let mut balance = self.lock_balance(&mut tx, request.seller_id).await?;
        balance.release_pending(request.amount_requested);
        self.balances.save_in_tx(tx.tx_mut(), &balance).await?;
        tx.commit().await?;

        info!(payout_request_id = %request_id, "payout request rejected");

        notifications::dispatch(
            self.notifier.clone(),
            PayoutDecisionEvent {
                seller_id: request.seller_id,
                payout_request_id: request.id,
                decision: PayoutDecision::Rejected,
                amount: request.amount_requested,
                reason,
            },
        );

        Ok(PayoutOutcome {
            balance: balance.snapshot(),
            request,
        })
    }

    /// Reverse a payout by explicit admin action.
    ///
    /// Legal from the reversible set only, requires a reason, and is
    /// idempotent-guarded: a request reverses exactly once. The refund
    /// target depends on how far the payout got: a confirmed-paid request
    /// refunds `balance`, anything earlier returns the reservation.
    pub async fn reverse(
        &self,
        request_id: Uuid,
        ctx: ActionContext,
        reason: &str,
    ) -> AppResult<PayoutOutcome> {
        validate_reason(reason)?;

        let mut tx = DatabaseTransaction::begin(&self.pool).await?;
        let mut request = self
            .payouts
            .lock_for_update(tx.tx_mut(), request_id)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: request_id.to_string(),
            })?;

        if request.reversed {
            return Err(PreconditionError::AlreadyReversed.into());
        }
        if !request.status.is_reversible() {
            return Err(PreconditionError::NotReversible {
                status: request.status.as_str().to_string(),
            }
            .into());
        }

        let was_paid = request.status == PayoutStatus::Paid;
        request.reversed = true;
        request.status = PayoutStatus::Reversed;
        self.payouts.save_in_tx(tx.tx_mut(), &request).await?;

        if !was_paid {
            // The in-flight debit never completed.
            self.ledger
                .finalize_pending_debit(tx.tx_mut(), request.id, LedgerEntryStatus::Failed)
                .await?;
        }
        let description = if was_paid {
            "disbursed payout returned by admin reversal"
        } else {
            "reservation returned by admin reversal"
        };
        self.ledger
            .insert_in_tx(
                tx.tx_mut(),
                request.seller_id,
                request.id,
                request.amount_requested,
                LedgerDirection::Credit,
                LedgerEntryStatus::Completed,
                description,
            )
            .await?;
        self.audits
            .append_in_tx(
                tx.tx_mut(),
                request.id,
                AuditAction::Reversed,
                &ctx,
                Some(reason),
            )
            .await?;
        self.audits
            .record_admin_action_in_tx(
                tx.tx_mut(),
                &ctx.actor,
                AuditAction::Reversed,
                request.id,
                request.seller_id,
                request.amount_requested,
                request.amount_paid_to_seller,
                request.withholding_tax,
                Some(serde_json::json!({ "reason": reason, "was_paid": was_paid })),
            )
            .await?;

        let mut balance = self.lock_balance(&mut tx, request.seller_id).await?;
        if was_paid {
            balance.refund_to_balance(request.amount_requested);
        } else {
            balance.release_pending(request.amount_requested);
        }
        self.balances.save_in_tx(tx.tx_mut(), &balance).await?;
        tx.commit().await?;

        info!(
            payout_request_id = %request_id,
            was_paid,
            "payout request reversed"
        );

        notifications::dispatch(
            self.notifier.clone(),
            PayoutDecisionEvent {
                seller_id: request.seller_id,
                payout_request_id: request.id,
                decision: PayoutDecision::Reversed,
                amount: request.amount_requested,
                reason: Some(reason.to_string()),
            },
        );

        Ok(PayoutOutcome {
            balance: balance.snapshot(),
            request,
        })
    }

    /// Probe the gateway for the current transfer status and fold the
    /// result into local state. Triggered by the manual verify endpoint.
    pub async fn verify_status(
        &self,
        request_id: Uuid,
        ctx: ActionContext,
    ) -> AppResult<PayoutOutcome> {
        let request = self
            .payouts
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: request_id.to_string(),
            })?;

        let transfer_id = request
            .transfer_id
            .clone()
            .ok_or(PreconditionError::NoTransfer)?;

        if !request.status.awaits_gateway() {
            // Already resolved; report current state without a probe.
            let balance = self.current_snapshot(request.seller_id).await?;
            return Ok(PayoutOutcome { request, balance });
        }

        let probe = self.gateway.verify_transfer(&transfer_id).await?;
        self.apply_probe(request_id, probe, ctx, AuditAction::Reconciled, false)
            .await
    }

    /// Submit the second-factor confirmation for a held transfer.
    pub async fn submit_transfer_pin(
        &self,
        request_id: Uuid,
        otp: &str,
        ctx: ActionContext,
    ) -> AppResult<PayoutOutcome> {
        if otp.trim().is_empty() {
            return Err(ValidationError::MissingOtp.into());
        }

        let request = self
            .payouts
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: request_id.to_string(),
            })?;

        if request.status != PayoutStatus::AwaitingGatewayConfirmation {
            return Err(PreconditionError::NotAwaitingConfirmation {
                status: request.status.as_str().to_string(),
            }
            .into());
        }
        let transfer_code = request
            .transfer_code
            .clone()
            .ok_or(PreconditionError::NoTransfer)?;

        let probe = self.gateway.finalize_transfer(&transfer_code, otp).await?;
        self.apply_probe(request_id, probe, ctx, AuditAction::PinSubmitted, true)
            .await
    }

    /// Resolve a gateway transfer webhook. Returns `None` for event types
    /// the engine does not consume.
    pub async fn resolve_transfer_event(
        &self,
        event_type: &str,
        reference: &str,
    ) -> AppResult<Option<PayoutOutcome>> {
        let gateway_status = match event_type {
            "transfer.success" => "success",
            "transfer.failed" => "failed",
            "transfer.reversed" => "reversed",
            _ => return Ok(None),
        };

        let request = self
            .payouts
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: reference.to_string(),
            })?;

        let probe = TransferProbe {
            gateway_status: gateway_status.to_string(),
            requires_pin: false,
        };
        self.apply_probe(
            request.id,
            probe,
            ActionContext::system(),
            AuditAction::Reconciled,
            false,
        )
        .await
        .map(Some)
    }

    /// Fold a gateway-reported status into local state.
    ///
    /// The single settlement path: approval outcome checks, the manual
    /// verify, OTP finalization and webhooks all end up here, so the
    /// status-recheck guard and the refund rule are applied uniformly.
    async fn apply_probe(
        &self,
        request_id: Uuid,
        probe: TransferProbe,
        ctx: ActionContext,
        action: AuditAction,
        mark_pin_submitted: bool,
    ) -> AppResult<PayoutOutcome> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;
        let mut request = self
            .payouts
            .lock_for_update(tx.tx_mut(), request_id)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: request_id.to_string(),
            })?;

        // Status re-check under lock: a concurrent reversal or sweep may
        // have resolved the request since the caller read it.
        if !request.status.awaits_gateway() {
            tx.rollback().await?;
            let balance = self.current_snapshot(request.seller_id).await?;
            return Ok(PayoutOutcome { request, balance });
        }

        if mark_pin_submitted {
            request.pin_submitted = true;
        }

        let second_factor_pending = probe.requires_pin
            || (request.payment_method.is_mobile_money() && !request.pin_submitted);

        let Some(mapped) = map_gateway_status(
            &probe.gateway_status,
            second_factor_pending,
            request.payment_method,
        ) else {
            // Reconciliation ambiguity: never guess, never mark paid.
            warn!(
                payout_request_id = %request_id,
                gateway_status = %probe.gateway_status,
                "unrecognized gateway status during reconciliation; state unchanged"
            );
            if mark_pin_submitted {
                self.payouts.save_in_tx(tx.tx_mut(), &request).await?;
            }
            tx.commit().await?;
            let balance = self.current_snapshot(request.seller_id).await?;
            return Ok(PayoutOutcome { request, balance });
        };

        match mapped {
            PayoutStatus::Paid => {
                request.status = PayoutStatus::Paid;
                self.payouts.save_in_tx(tx.tx_mut(), &request).await?;
                self.ledger
                    .finalize_pending_debit(
                        tx.tx_mut(),
                        request.id,
                        LedgerEntryStatus::Completed,
                    )
                    .await?;
                self.audits
                    .append_in_tx(
                        tx.tx_mut(),
                        request.id,
                        action,
                        &ctx,
                        Some("gateway confirmed transfer"),
                    )
                    .await?;
                if !ctx.is_system() {
                    self.audits
                        .record_admin_action_in_tx(
                            tx.tx_mut(),
                            &ctx.actor,
                            action,
                            request.id,
                            request.seller_id,
                            request.amount_requested,
                            request.amount_paid_to_seller,
                            request.withholding_tax,
                            None,
                        )
                        .await?;
                }

                let mut balance = self.lock_balance(&mut tx, request.seller_id).await?;
                balance.settle_payout(request.amount_requested);
                self.balances.save_in_tx(tx.tx_mut(), &balance).await?;
                tx.commit().await?;

                info!(payout_request_id = %request_id, "payout settled as paid");
                notifications::dispatch(
                    self.notifier.clone(),
                    PayoutDecisionEvent {
                        seller_id: request.seller_id,
                        payout_request_id: request.id,
                        decision: PayoutDecision::Paid,
                        amount: request.amount_requested,
                        reason: None,
                    },
                );

                Ok(PayoutOutcome {
                    balance: balance.snapshot(),
                    request,
                })
            }
            PayoutStatus::Failed | PayoutStatus::Reversed => {
                // A gateway-side reversal of an unsettled transfer lands
                // here too: locally the money never left, so the refund
                // target is the reservation either way.
                request.status = PayoutStatus::Failed;
                self.payouts.save_in_tx(tx.tx_mut(), &request).await?;
                self.ledger
                    .finalize_pending_debit(tx.tx_mut(), request.id, LedgerEntryStatus::Failed)
                    .await?;
                self.ledger
                    .insert_in_tx(
                        tx.tx_mut(),
                        request.seller_id,
                        request.id,
                        request.amount_requested,
                        LedgerDirection::Credit,
                        LedgerEntryStatus::Completed,
                        "reservation returned after gateway failure",
                    )
                    .await?;
                self.audits
                    .append_in_tx(
                        tx.tx_mut(),
                        request.id,
                        action,
                        &ctx,
                        Some(&format!("gateway status: {}", probe.gateway_status)),
                    )
                    .await?;
                if !ctx.is_system() {
                    self.audits
                        .record_admin_action_in_tx(
                            tx.tx_mut(),
                            &ctx.actor,
                            action,
                            request.id,
                            request.seller_id,
                            request.amount_requested,
                            request.amount_paid_to_seller,
                            request.withholding_tax,
                            None,
                        )
                        .await?;
                }

                let mut balance = self.lock_balance(&mut tx, request.seller_id).await?;
                balance.release_pending(request.amount_requested);
                self.balances.save_in_tx(tx.tx_mut(), &balance).await?;
                tx.commit().await?;

                info!(payout_request_id = %request_id, "payout failed and refunded");
                notifications::dispatch(
                    self.notifier.clone(),
                    PayoutDecisionEvent {
                        seller_id: request.seller_id,
                        payout_request_id: request.id,
                        decision: PayoutDecision::Failed,
                        amount: request.amount_requested,
                        reason: None,
                    },
                );

                Ok(PayoutOutcome {
                    balance: balance.snapshot(),
                    request,
                })
            }
            other => {
                // Still in flight; record any movement between the two
                // non-terminal states.
                request.status = other;
                self.payouts.save_in_tx(tx.tx_mut(), &request).await?;
                self.audits
                    .append_in_tx(
                        tx.tx_mut(),
                        request.id,
                        action,
                        &ctx,
                        Some(&format!("gateway status: {}", probe.gateway_status)),
                    )
                    .await?;
                tx.commit().await?;

                let balance = self.current_snapshot(request.seller_id).await?;
                Ok(PayoutOutcome { request, balance })
            }
        }
    }

    /// Force-fail one stuck request, refunding its reservation. Used by
    /// the reconciliation sweeper; the conditional claim makes a repeat
    /// call (or a concurrent sweeper) a no-op.
    pub async fn fail_stuck_request(
        &self,
        request_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tx = DatabaseTransaction::begin(&self.pool).await?;
        let Some(request) = self
            .payouts
            .claim_for_timeout(tx.tx_mut(), request_id, cutoff)
            .await?
        else {
            // Lost the claim: already resolved, reversed, or touched since
            // the scan.
            tx.rollback().await?;
            return Ok(false);
        };

        self.ledger
            .finalize_pending_debit(tx.tx_mut(), request.id, LedgerEntryStatus::Failed)
            .await?;
        self.ledger
            .insert_in_tx(
                tx.tx_mut(),
                request.seller_id,
                request.id,
                request.amount_requested,
                LedgerDirection::Credit,
                LedgerEntryStatus::Completed,
                "reservation auto-refunded after resolution timeout",
            )
            .await?;
        self.audits
            .append_in_tx(
                tx.tx_mut(),
                request.id,
                AuditAction::AutoFailed,
                &ActionContext::system(),
                Some("automatically failed and refunded after exceeding the resolution timeout"),
            )
            .await?;

        let mut balance = self.lock_balance(&mut tx, request.seller_id).await?;
        balance.release_pending(request.amount_requested);
        self.balances.save_in_tx(tx.tx_mut(), &balance).await?;
        tx.commit().await?;

        info!(
            payout_request_id = %request_id,
            "stuck payout request auto-failed and refunded"
        );

        notifications::dispatch(
            self.notifier.clone(),
            PayoutDecisionEvent {
                seller_id: request.seller_id,
                payout_request_id: request.id,
                decision: PayoutDecision::Failed,
                amount: request.amount_requested,
                reason: Some("payout timed out and was refunded".to_string()),
            },
        );

        Ok(true)
    }

    /// Fetch a payout request with its seller's balance snapshot.
    pub async fn get_outcome(&self, request_id: Uuid) -> AppResult<PayoutOutcome> {
        let request = self
            .payouts
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| PreconditionError::RequestNotFound {
                id: request_id.to_string(),
            })?;
        let balance = self.current_snapshot(request.seller_id).await?;
        Ok(PayoutOutcome { request, balance })
    }

    pub fn payout_repository(&self) -> &PayoutRepository {
        &self.payouts
    }

    async fn lock_balance(
        &self,
        tx: &mut DatabaseTransaction,
        seller_id: Uuid,
    ) -> AppResult<SellerBalance> {
        self.balances
            .lock_for_update(tx.tx_mut(), seller_id)
            .await?
            .ok_or_else(|| {
                AppError::precondition(PreconditionError::BalanceNotFound {
                    seller_id: seller_id.to_string(),
                })
            })
    }

    async fn current_snapshot(&self, seller_id: Uuid) -> AppResult<BalanceSnapshot> {
        let balance = self
            .balances
            .find_by_seller(seller_id)
            .await?
            .ok_or_else(|| {
                AppError::precondition(PreconditionError::BalanceNotFound {
                    seller_id: seller_id.to_string(),
                })
            })?;
        Ok(balance.snapshot())
    }
}
