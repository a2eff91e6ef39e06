//! Renewal scheduler: charge due subscriptions, enforce grace expiry.
//!
//! One pass scans for accounts whose billing date falls within the lookahead
//! window, applies any pending scheduled downgrade, charges the processor,
//! and then sweeps past-due accounts whose grace window has elapsed down to
//! the free tier. Each account is handled under its own lock, and a failure
//! on one account never stops the pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

use crate::application::locks::{AccountLockMap, TickGuard};
use crate::domain::billing::{
    round_to_cents, BillingAccount, BillingError, Transaction, TransactionStatus,
};
use crate::domain::catalog::PlanCatalog;
use crate::domain::foundation::{AccountId, Timestamp, UserId};
use crate::ports::{
    AccountPatch, AccountStore, EntitlementPatch, PaymentOutcome, PaymentProcessor,
    PaymentRequest, PaymentStatus, ProcessorError, ProcessorErrorKind,
};

/// How one account fared in a renewal pass.
#[derive(Debug, Clone)]
pub enum RenewalOutcome {
    Renewed {
        account_id: AccountId,
        next_billing_date: Timestamp,
    },
    PaymentFailed {
        account_id: AccountId,
        grace_ends_at: Option<Timestamp>,
    },
    DowngradedToFree {
        account_id: AccountId,
    },
    Skipped {
        account_id: AccountId,
        reason: &'static str,
    },
}

/// Counters for one scheduler pass, logged at the end of each tick.
#[derive(Debug, Clone, Default)]
pub struct RenewalPassSummary {
    pub scanned: usize,
    pub renewed: usize,
    pub payment_failures: usize,
    pub downgraded: usize,
    pub skipped: usize,
    pub errors: usize,
    /// True when the tick found the previous pass still running.
    pub overlapped: bool,
}

/// Drives automatic renewals and grace-period downgrades.
pub struct RenewalScheduler {
    store: Arc<dyn AccountStore>,
    processor: Arc<dyn PaymentProcessor>,
    catalog: PlanCatalog,
    locks: Arc<AccountLockMap>,
    tick: TickGuard,
    grace_period_days: u32,
    lookahead_secs: i64,
}

impl RenewalScheduler {
    pub fn new(
        store: Arc<dyn AccountStore>,
        processor: Arc<dyn PaymentProcessor>,
        catalog: PlanCatalog,
        locks: Arc<AccountLockMap>,
        grace_period_days: u32,
        lookahead_secs: i64,
    ) -> Self {
        Self {
            store,
            processor,
            catalog,
            locks,
            tick: TickGuard::new(),
            grace_period_days,
            lookahead_secs,
        }
    }

    /// Run one full scheduler pass: renewals first, then grace expiry.
    pub async fn run_pass(&self) -> RenewalPassSummary {
        let mut summary = RenewalPassSummary::default();

        // A tick that fires while the previous pass is still running skips
        // instead of queueing behind it.
        let Some(_running) = self.tick.try_acquire() else {
            summary.overlapped = true;
            info!("renewal pass still running; skipping tick");
            return summary;
        };

        let now = Timestamp::now();
        self.charge_due_accounts(now, &mut summary).await;
        self.downgrade_expired_grace(now, &mut summary).await;

        info!(
            scanned = summary.scanned,
            renewed = summary.renewed,
            payment_failures = summary.payment_failures,
            downgraded = summary.downgraded,
            skipped = summary.skipped,
            errors = summary.errors,
            "renewal pass complete"
        );
        summary
    }

    async fn charge_due_accounts(&self, now: Timestamp, summary: &mut RenewalPassSummary) {
        let horizon = now.plus_secs(self.lookahead_secs as u64);
        let due = match self.store.find_due_for_renewal(horizon).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "failed to scan for renewal-due accounts");
                summary.errors += 1;
                return;
            }
        };
        summary.scanned = due.len();

        for account in due {
            match self.renew_account(account.id, horizon, now).await {
                Ok(RenewalOutcome::Renewed {
                    account_id,
                    next_billing_date,
                }) => {
                    summary.renewed += 1;
                    info!(
                        account_id = %account_id,
                        next_billing_date = ?next_billing_date,
                        "subscription renewed"
                    );
                }
                Ok(RenewalOutcome::PaymentFailed {
                    account_id,
                    grace_ends_at,
                }) => {
                    summary.payment_failures += 1;
                    warn!(
                        account_id = %account_id,
                        grace_ends_at = ?grace_ends_at,
                        "renewal charge failed; grace window open"
                    );
                }
                Ok(RenewalOutcome::DowngradedToFree { account_id }) => {
                    summary.downgraded += 1;
                    info!(account_id = %account_id, "scheduled downgrade moved account to free tier");
                }
                Ok(RenewalOutcome::Skipped { account_id, reason }) => {
                    summary.skipped += 1;
                    debug!(account_id = %account_id, reason, "renewal skipped");
                }
                // One broken account never stops the pass.
                Err(e) => {
                    summary.errors += 1;
                    error!(
                        account_id = %account.id,
                        error = %e,
                        "renewal failed; account untouched, will retry next pass"
                    );
                }
            }
        }
    }

    async fn renew_account(
        &self,
        account_id: AccountId,
        horizon: Timestamp,
        now: Timestamp,
    ) -> Result<RenewalOutcome, BillingError> {
        let _guard = self.locks.acquire(account_id).await;

        // Re-read under the lock; a webhook or lifecycle call may have
        // renewed or canceled this account since the scan.
        let Some(mut account) = self.store.find_account(&account_id).await? else {
            return Ok(RenewalOutcome::Skipped {
                account_id,
                reason: "account no longer exists",
            });
        };
        if !account.is_due_for_renewal(horizon) {
            return Ok(RenewalOutcome::Skipped {
                account_id,
                reason: "no longer due",
            });
        }

        // A pending downgrade takes effect at the period boundary, before
        // the renewal charge is priced.
        if let Some(downgrade) = account.scheduled_downgrade.clone() {
            let plan = self
                .catalog
                .get(&downgrade.plan_id)
                .ok_or_else(|| BillingError::unknown_plan(downgrade.plan_id.to_string()))?;

            // Dropping to the free tier ends the paid subscription; there
            // is nothing to charge.
            if plan.is_free() {
                self.cancel_provider_subscription(&account).await;
                account.downgrade_to_free(plan, now)?;
                let updated = self.persist(&account).await?;
                self.persist_entitlement(
                    &updated.user_id,
                    EntitlementPatch::revoke(plan.id.clone()),
                )
                .await?;
                return Ok(RenewalOutcome::DowngradedToFree { account_id });
            }

            account.change_plan(plan, downgrade.cycle, now)?;
            account.clear_scheduled_downgrade(now);
            debug!(account_id = %account_id, plan_id = %plan.id, "applied scheduled downgrade");
        }

        let Some(customer_id) = account.processor_customer_id.clone() else {
            return Err(BillingError::validation(
                "processor_customer_id",
                "missing on renewal-due account",
            ));
        };

        let request = PaymentRequest {
            customer_id,
            amount: round_to_cents(account.amount),
            currency: account.currency.clone(),
            description: format!("Subscription renewal ({})", account.plan_id),
            payment_method_id: account.processor_payment_method_id.clone(),
            metadata: HashMap::from([
                ("account_id".to_string(), account.id.to_string()),
                ("reason".to_string(), "renewal".to_string()),
            ]),
        };
        let charge = RetryIf::spawn(
            processor_backoff(),
            || self.processor.process_payment(request.clone()),
            |e: &ProcessorError| e.retryable,
        )
        .await;

        match charge {
            Ok(outcome)
                if outcome.status == PaymentStatus::Succeeded && outcome.redirect_url.is_none() =>
            {
                self.complete_renewal(account, outcome, now).await
            }
            // Pending outcomes and redirects cannot complete unattended.
            Ok(outcome) => {
                self.record_failed_renewal(account, Some(outcome), None, now)
                    .await
            }
            // Declines surface as validation errors from the processor.
            Err(e) if matches!(e.kind, ProcessorErrorKind::Validation | ProcessorErrorKind::NotFound) => {
                self.record_failed_renewal(account, None, Some(e), now).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn complete_renewal(
        &self,
        mut account: BillingAccount,
        outcome: PaymentOutcome,
        now: Timestamp,
    ) -> Result<RenewalOutcome, BillingError> {
        account.record_renewal(now)?;
        let updated = self.persist(&account).await?;

        let mut txn = Transaction::payment(
            updated.id,
            updated.user_id.clone(),
            round_to_cents(updated.amount),
            updated.currency.clone(),
            TransactionStatus::Completed,
            format!("Subscription renewal ({})", updated.plan_id),
            now,
        )
        .with_processor_id(outcome.transaction_id);
        if let Some(fees) = outcome.fee_breakdown {
            txn = txn.with_fees(fees.processor_fee, fees.net_amount);
        }
        self.persist_transaction(&txn).await?;

        self.persist_entitlement(
            &updated.user_id,
            EntitlementPatch::grant(updated.plan_id.clone(), Some(updated.next_billing_date)),
        )
        .await?;

        Ok(RenewalOutcome::Renewed {
            account_id: updated.id,
            next_billing_date: updated.next_billing_date,
        })
    }

    async fn record_failed_renewal(
        &self,
        mut account: BillingAccount,
        outcome: Option<PaymentOutcome>,
        decline: Option<ProcessorError>,
        now: Timestamp,
    ) -> Result<RenewalOutcome, BillingError> {
        account.record_payment_failure(self.grace_period_days, now)?;
        let updated = self.persist(&account).await?;

        let (status, description) = match (&outcome, &decline) {
            (Some(o), _) if o.status == PaymentStatus::Pending || o.redirect_url.is_some() => (
                TransactionStatus::Pending,
                "Subscription renewal awaiting approval; treated as failed".to_string(),
            ),
            (_, Some(e)) => (
                TransactionStatus::Failed,
                format!("Subscription renewal declined: {}", e.message),
            ),
            _ => (
                TransactionStatus::Failed,
                "Subscription renewal declined".to_string(),
            ),
        };
        let mut txn = Transaction::payment(
            updated.id,
            updated.user_id.clone(),
            round_to_cents(updated.amount),
            updated.currency.clone(),
            status,
            description,
            now,
        );
        if let Some(o) = outcome {
            txn = txn.with_processor_id(o.transaction_id);
        }
        self.persist_transaction(&txn).await?;

        Ok(RenewalOutcome::PaymentFailed {
            account_id: updated.id,
            grace_ends_at: updated.grace_ends_at,
        })
    }

    async fn downgrade_expired_grace(&self, now: Timestamp, summary: &mut RenewalPassSummary) {
        let expired = match self.store.find_grace_expired(now).await {
            Ok(expired) => expired,
            Err(e) => {
                error!(error = %e, "failed to scan for expired grace windows");
                summary.errors += 1;
                return;
            }
        };

        for account in expired {
            match self.downgrade_account(account.id, now).await {
                Ok(true) => {
                    summary.downgraded += 1;
                    warn!(account_id = %account.id, "grace window elapsed; downgraded to free tier");
                }
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    summary.errors += 1;
                    error!(
                        account_id = %account.id,
                        error = %e,
                        "grace downgrade failed; will retry next pass"
                    );
                }
            }
        }
    }

    /// Returns `Ok(true)` when the account was downgraded, `Ok(false)` when
    /// it recovered (or vanished) between the scan and the lock.
    async fn downgrade_account(
        &self,
        account_id: AccountId,
        now: Timestamp,
    ) -> Result<bool, BillingError> {
        let _guard = self.locks.acquire(account_id).await;
        let Some(mut account) = self.store.find_account(&account_id).await? else {
            return Ok(false);
        };
        if !account.grace_expired(now) {
            return Ok(false);
        }

        self.cancel_provider_subscription(&account).await;

        let free_plan = self.catalog.free_plan();
        account.downgrade_to_free(free_plan, now)?;
        let updated = self.persist(&account).await?;
        self.persist_entitlement(&updated.user_id, EntitlementPatch::revoke(free_plan.id.clone()))
            .await?;
        Ok(true)
    }

    /// Provider-side cancel ahead of a local downgrade. Best effort: local
    /// bookkeeping proceeds even when the provider call fails, so a dropped
    /// response cannot wedge the account in past_due forever.
    async fn cancel_provider_subscription(&self, account: &BillingAccount) {
        let Some(subscription_id) = account.processor_subscription_id.as_deref() else {
            return;
        };
        match self.processor.cancel_subscription(subscription_id, false).await {
            Ok(_) => {}
            Err(e) if e.kind == ProcessorErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    account_id = %account.id,
                    subscription_id,
                    error = %e,
                    "provider cancel failed during downgrade"
                );
            }
        }
    }

    async fn persist(&self, account: &BillingAccount) -> Result<BillingAccount, BillingError> {
        let patch = AccountPatch::from_account(account);
        RetryIf::spawn(
            write_backoff(),
            || self.store.update_account(&account.id, patch.clone()),
            BillingError::is_retryable,
        )
        .await
    }

    async fn persist_transaction(&self, txn: &Transaction) -> Result<(), BillingError> {
        RetryIf::spawn(
            write_backoff(),
            || self.store.create_transaction(txn),
            BillingError::is_retryable,
        )
        .await
    }

    async fn persist_entitlement(
        &self,
        user_id: &UserId,
        patch: EntitlementPatch,
    ) -> Result<(), BillingError> {
        RetryIf::spawn(
            write_backoff(),
            || self.store.update_user_entitlement(user_id, patch.clone()),
            BillingError::is_retryable,
        )
        .await
    }
}

fn processor_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(50)
        .map(jitter)
        .take(2)
}

fn write_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(25)
        .map(jitter)
        .take(3)
}
