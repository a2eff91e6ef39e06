//! Subscription lifecycle commands: create, change plan, schedule a
//! downgrade, cancel, refund.
//!
//! [`SubscriptionLifecycleManager`] is the application facade. It owns the
//! webhook processor and the renewal scheduler so all three share one
//! per-account lock map, and the worker binary only has to wire stores,
//! processor, and catalog once.
//!
//! Ordering rule for anything that takes money: the processor call happens
//! before the local commit. A declined proration charge leaves the old plan
//! in place; a provider cancel precedes the local cancel so the provider
//! cannot keep charging a subscription we consider dead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, error, info, warn};

use crate::application::locks::AccountLockMap;
use crate::application::renewals::{RenewalPassSummary, RenewalScheduler};
use crate::application::webhooks::{WebhookOutcome, WebhookProcessor};
use crate::config::BillingConfig;
use crate::domain::billing::{
    round_to_cents, AccountStatus, BillingAccount, BillingError, ProrationCalculator,
    ProrationResult, Transaction, TransactionStatus,
};
use crate::domain::catalog::{BillingCycle, PlanCatalog, SubscriptionPlan};
use crate::domain::foundation::{AccountId, PlanId, Timestamp, UserId};
use crate::ports::{
    AccountPatch, AccountStore, CreateCustomerRequest, CreateSubscriptionRequest,
    EntitlementPatch, PaymentProcessor, PaymentRequest, PaymentStatus, ProcessorError,
    ProcessorErrorKind, RefundRequest, SubscriptionDelta, WebhookEventStore,
};

// ════════════════════════════════════════════════════════════════════════════
// Commands & Results
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub plan_id: PlanId,
    pub cycle: BillingCycle,
    /// Caller metadata forwarded to the provider subscription.
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub account_id: AccountId,
    pub subscription_id: Option<String>,
    pub status: AccountStatus,
    pub trial_ends_at: Option<Timestamp>,
    pub next_billing_date: Timestamp,
}

#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub user_id: UserId,
    pub new_plan_id: PlanId,
    /// `None` keeps the account's current cycle.
    pub new_cycle: Option<BillingCycle>,
}

#[derive(Debug, Clone)]
pub struct ChangePlanResult {
    pub account_id: AccountId,
    pub plan_id: PlanId,
    pub cycle: BillingCycle,
    /// Prorated amount actually charged; zero for downgrades.
    pub amount_charged: f64,
    /// Unused value noted on the account for support; never auto-refunded.
    pub downgrade_credit: f64,
    pub next_billing_date: Timestamp,
}

#[derive(Debug, Clone)]
pub struct ScheduleDowngradeCommand {
    pub user_id: UserId,
    pub new_plan_id: PlanId,
    pub new_cycle: Option<BillingCycle>,
}

#[derive(Debug, Clone)]
pub struct ScheduleDowngradeResult {
    pub account_id: AccountId,
    pub plan_id: PlanId,
    /// The renewal at which the downgrade takes effect.
    pub effective_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
    /// `true` forfeits the rest of the paid period.
    pub immediate: bool,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub account_id: AccountId,
    pub access_until: Timestamp,
    pub immediate: bool,
}

#[derive(Debug, Clone)]
pub struct IssueRefundCommand {
    pub user_id: UserId,
    /// Provider transaction id of the payment being refunded.
    pub transaction_id: String,
    /// Major units; `None` refunds the full amount.
    pub amount: Option<f64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssueRefundResult {
    pub refund_id: String,
    pub amount: Option<f64>,
    pub status: String,
}

// ════════════════════════════════════════════════════════════════════════════
// Manager
// ════════════════════════════════════════════════════════════════════════════

pub struct SubscriptionLifecycleManager {
    store: Arc<dyn AccountStore>,
    processor: Arc<dyn PaymentProcessor>,
    catalog: PlanCatalog,
    locks: Arc<AccountLockMap>,
    webhooks: WebhookProcessor,
    renewals: RenewalScheduler,
}

impl SubscriptionLifecycleManager {
    pub fn new(
        store: Arc<dyn AccountStore>,
        processor: Arc<dyn PaymentProcessor>,
        events: Arc<dyn WebhookEventStore>,
        catalog: PlanCatalog,
        billing: &BillingConfig,
    ) -> Self {
        let locks = Arc::new(AccountLockMap::new());
        let webhooks = WebhookProcessor::new(
            processor.clone(),
            store.clone(),
            events,
            locks.clone(),
            billing.grace_period_days,
        );
        let renewals = RenewalScheduler::new(
            store.clone(),
            processor.clone(),
            catalog.clone(),
            locks.clone(),
            billing.grace_period_days,
            billing.renewal_lookahead_secs,
        );
        Self {
            store,
            processor,
            catalog,
            locks,
            webhooks,
            renewals,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Create
    // ════════════════════════════════════════════════════════════════════════════

    /// Creates a subscription for a user, reusing their existing billing
    /// row when one exists: canceled rows reopen in place, free-tier rows
    /// upgrade in place. A live paid subscription cannot be created twice.
    pub async fn create_subscription(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        let now = Timestamp::now();

        // 1. Resolve the plan before touching the provider.
        let plan = self
            .catalog
            .get(&cmd.plan_id)
            .ok_or_else(|| BillingError::unknown_plan(cmd.plan_id.to_string()))?
            .clone();

        let existing = self.store.find_account_by_user(&cmd.user_id).await?;

        // 2. The free tier is a plain row; no provider objects involved.
        if plan.is_free() {
            if existing.is_some() {
                return Err(BillingError::validation(
                    "plan_id",
                    "account already exists; cancel or change plan to move tiers",
                ));
            }
            let account =
                BillingAccount::create_free(AccountId::new(), cmd.user_id.clone(), &plan, now);
            self.persist_new(&account).await?;
            self.persist_entitlement(&account.user_id, EntitlementPatch::revoke(plan.id.clone()))
                .await?;
            info!(account_id = %account.id, user_id = %account.user_id, "free account created");
            return Ok(Self::creation_result(&account));
        }

        match existing {
            // 3a. Fresh user: new row, new provider objects. The store's
            //     uniqueness guard catches a concurrent double-create.
            None => {
                let mut account = BillingAccount::create_paid(
                    AccountId::new(),
                    cmd.user_id.clone(),
                    &plan,
                    cmd.cycle,
                    now,
                );
                self.provision(&mut account, &plan, &cmd, now).await?;
                self.persist_new(&account).await?;
                self.grant_entitlement(&account).await?;
                info!(
                    account_id = %account.id,
                    plan_id = %account.plan_id,
                    status = %account.status.as_str(),
                    "subscription created"
                );
                Ok(Self::creation_result(&account))
            }
            // 3b. Existing row: reopen it rather than minting a second one.
            Some(found) => {
                let _guard = self.locks.acquire(found.id).await;
                let mut account = self.refetch(found.id).await?;

                match account.status {
                    AccountStatus::Canceled => {}
                    // A free-tier row upgrades in place.
                    _ if account.amount <= 0.0 => account.cancel(now)?,
                    _ => {
                        return Err(BillingError::validation(
                            "user_id",
                            "user already has an active subscription",
                        ));
                    }
                }

                account.reopen(&plan, cmd.cycle, now)?;
                self.provision(&mut account, &plan, &cmd, now).await?;
                let updated = self.persist(&account).await?;
                self.grant_entitlement(&updated).await?;
                info!(
                    account_id = %updated.id,
                    plan_id = %updated.plan_id,
                    status = %updated.status.as_str(),
                    "subscription reopened"
                );
                Ok(Self::creation_result(&updated))
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Plan Changes
    // ════════════════════════════════════════════════════════════════════════════

    /// Switches the account to a new plan immediately, charging the
    /// prorated difference for the rest of the current period first.
    ///
    /// A net downgrade leaves a credit note on the account; money only
    /// moves back through [`Self::issue_refund`].
    pub async fn change_plan(&self, cmd: ChangePlanCommand) -> Result<ChangePlanResult, BillingError> {
        let now = Timestamp::now();

        let new_plan = self
            .catalog
            .get(&cmd.new_plan_id)
            .ok_or_else(|| BillingError::unknown_plan(cmd.new_plan_id.to_string()))?
            .clone();
        if new_plan.is_free() {
            return Err(BillingError::validation(
                "new_plan_id",
                "moving to the free tier goes through cancel or a scheduled downgrade",
            ));
        }

        let found = self.locate(&cmd.user_id).await?;
        let _guard = self.locks.acquire(found.id).await;
        let mut account = self.refetch(found.id).await?;

        if account.status == AccountStatus::Canceled {
            return Err(BillingError::invalid_state(account.status.as_str(), "change_plan"));
        }
        if account.amount <= 0.0 {
            return Err(BillingError::validation(
                "user_id",
                "no paid subscription to change; create a subscription first",
            ));
        }

        let current_plan = self
            .catalog
            .get(&account.plan_id)
            .ok_or_else(|| BillingError::unknown_plan(account.plan_id.to_string()))?
            .clone();
        let cycle = cmd.new_cycle.unwrap_or(account.cycle);

        // 1. Price the switch over the remainder of the current period. The
        //    current cycle is the divisor because those are the days the
        //    user already paid for.
        let days_remaining = i64::from(account.days_remaining_in_period(now));
        let proration = ProrationCalculator::compute(
            &current_plan,
            &new_plan,
            account.cycle,
            days_remaining,
            now,
        )?;

        // 2. Charge before committing; a decline leaves the old plan as-is.
        let amount_charged = if proration.is_charge() {
            self.charge_proration(&account, &proration, &new_plan, now)
                .await?
        } else {
            0.0
        };

        let downgrade_credit = proration.downgrade_credit();
        if downgrade_credit > 0.0 {
            account.note_downgrade_credit(downgrade_credit, now);
        }

        // 3. Commit the plan and extend the entitlement snapshot.
        account.change_plan(&new_plan, cycle, now)?;
        let updated = self.persist(&account).await?;
        self.grant_entitlement(&updated).await?;

        // 4. Keep the provider's subscription in step, best effort. Local
        //    state is already committed; failures here are reconciled out
        //    of band, never rolled back.
        self.push_plan_to_provider(&updated, &new_plan, cycle).await;

        info!(
            account_id = %updated.id,
            plan_id = %updated.plan_id,
            amount_charged,
            downgrade_credit,
            "plan changed"
        );
        Ok(ChangePlanResult {
            account_id: updated.id,
            plan_id: updated.plan_id.clone(),
            cycle: updated.cycle,
            amount_charged,
            downgrade_credit,
            next_billing_date: updated.next_billing_date,
        })
    }

    /// Records a downgrade to take effect at the next renewal instead of
    /// charging now. Replaces any previously scheduled downgrade.
    pub async fn schedule_downgrade(
        &self,
        cmd: ScheduleDowngradeCommand,
    ) -> Result<ScheduleDowngradeResult, BillingError> {
        let now = Timestamp::now();

        let plan = self
            .catalog
            .get(&cmd.new_plan_id)
            .ok_or_else(|| BillingError::unknown_plan(cmd.new_plan_id.to_string()))?;

        let found = self.locate(&cmd.user_id).await?;
        let _guard = self.locks.acquire(found.id).await;
        let mut account = self.refetch(found.id).await?;

        let cycle = cmd.new_cycle.unwrap_or(account.cycle);
        account.schedule_downgrade(plan.id.clone(), cycle, now)?;
        let updated = self.persist(&account).await?;

        info!(
            account_id = %updated.id,
            plan_id = %plan.id,
            effective_at = ?updated.next_billing_date,
            "downgrade scheduled for next renewal"
        );
        Ok(ScheduleDowngradeResult {
            account_id: updated.id,
            plan_id: plan.id.clone(),
            effective_at: updated.next_billing_date,
        })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Cancel & Refund
    // ════════════════════════════════════════════════════════════════════════════

    /// Cancels the user's subscription. `immediate` ends access now;
    /// otherwise the provider flags cancel-at-period-end and entitlement
    /// runs until the already-paid `next_billing_date`.
    pub async fn cancel_subscription(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        let now = Timestamp::now();

        let found = self.locate(&cmd.user_id).await?;
        let _guard = self.locks.acquire(found.id).await;
        let mut account = self.refetch(found.id).await?;

        if account.status == AccountStatus::Canceled {
            return Err(BillingError::invalid_state(account.status.as_str(), "cancel"));
        }

        // 1. Provider first: it must stop charging before local state says
        //    the subscription is dead.
        if let Some(subscription_id) = account.processor_subscription_id.clone() {
            let at_period_end = !cmd.immediate;
            let result = RetryIf::spawn(
                processor_backoff(),
                || self.processor.cancel_subscription(&subscription_id, at_period_end),
                |e: &ProcessorError| e.retryable,
            )
            .await;
            match result {
                Ok(_) => {}
                // Already gone on the provider side; the local cancel
                // proceeds.
                Err(e) if e.kind == ProcessorErrorKind::NotFound => {
                    debug!(%subscription_id, "subscription already absent at provider");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // 2. Local cancel. The billing date stops advancing and doubles as
        //    the access-until marker.
        account.cancel(now)?;
        if cmd.immediate {
            account.next_billing_date = now;
        }
        let updated = self.persist(&account).await?;

        if cmd.immediate {
            self.persist_entitlement(
                &updated.user_id,
                EntitlementPatch::revoke(self.catalog.free_plan().id.clone()),
            )
            .await?;
        } else {
            self.persist_entitlement(
                &updated.user_id,
                EntitlementPatch::grant(updated.plan_id.clone(), Some(updated.next_billing_date)),
            )
            .await?;
        }

        info!(
            account_id = %updated.id,
            immediate = cmd.immediate,
            access_until = ?updated.next_billing_date,
            "subscription canceled"
        );
        Ok(CancelSubscriptionResult {
            account_id: updated.id,
            access_until: updated.next_billing_date,
            immediate: cmd.immediate,
        })
    }

    /// Issues an explicit refund through the processor and appends a
    /// refund row to the ledger. Never triggered automatically.
    pub async fn issue_refund(&self, cmd: IssueRefundCommand) -> Result<IssueRefundResult, BillingError> {
        let now = Timestamp::now();

        let found = self.locate(&cmd.user_id).await?;
        let _guard = self.locks.acquire(found.id).await;
        let account = self.refetch(found.id).await?;

        let request = RefundRequest {
            transaction_id: cmd.transaction_id.clone(),
            amount: cmd.amount,
            currency: cmd.amount.is_some().then(|| account.currency.clone()),
            reason: cmd.reason.clone(),
        };
        let refund = RetryIf::spawn(
            processor_backoff(),
            || self.processor.process_refund(request.clone()),
            |e: &ProcessorError| e.retryable,
        )
        .await?;

        let amount = refund.amount.or(cmd.amount).unwrap_or(account.amount);
        let description = match &cmd.reason {
            Some(reason) => format!("Refund: {reason}"),
            None => "Refund".to_string(),
        };
        let txn = Transaction::refund(
            account.id,
            account.user_id.clone(),
            amount,
            account.currency.clone(),
            TransactionStatus::Completed,
            description,
            now,
        )
        .with_processor_id(refund.refund_id.clone())
        .with_metadata("refunded_payment", cmd.transaction_id.clone());
        self.persist_transaction(&txn).await?;

        info!(
            account_id = %account.id,
            refund_id = %refund.refund_id,
            amount,
            "refund issued"
        );
        Ok(IssueRefundResult {
            refund_id: refund.refund_id,
            amount: refund.amount,
            status: refund.status,
        })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Delegations
    // ════════════════════════════════════════════════════════════════════════════

    /// Inbound webhook intake; see [`WebhookProcessor::process`].
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome, BillingError> {
        self.webhooks.process(raw_body, signature_header).await
    }

    /// Runs one renewal pass now. The worker loop calls this on a timer.
    pub async fn process_automatic_renewals(&self) -> RenewalPassSummary {
        self.renewals.run_pass().await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internals
    // ════════════════════════════════════════════════════════════════════════════

    /// Ensures a processor customer exists for this account; the create is
    /// skipped when one is already attached.
    async fn ensure_customer(
        &self,
        account: &mut BillingAccount,
        cmd: &CreateSubscriptionCommand,
        now: Timestamp,
    ) -> Result<String, BillingError> {
        if let Some(id) = account.processor_customer_id.clone() {
            return Ok(id);
        }
        let request = CreateCustomerRequest {
            user_id: cmd.user_id.clone(),
            email: cmd.email.clone(),
            name: cmd.name.clone(),
        };
        let profile = RetryIf::spawn(
            processor_backoff(),
            || self.processor.create_customer(request.clone()),
            |e: &ProcessorError| e.retryable,
        )
        .await?;
        account.connect_customer(profile.id.clone(), now);
        Ok(profile.id)
    }

    /// Creates the provider-side subscription and attaches its id.
    async fn provision(
        &self,
        account: &mut BillingAccount,
        plan: &SubscriptionPlan,
        cmd: &CreateSubscriptionCommand,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        // Resolve the plan reference first so a misconfigured catalog does
        // not leave an orphaned provider customer behind.
        let plan_ref = self.resolve_plan_ref(plan, cmd.cycle)?;
        let customer_id = self.ensure_customer(account, cmd, now).await?;

        // The provider trial must match the local one; a reopened account
        // that already used its trial gets none.
        let trial_days = match account.status {
            AccountStatus::Trialing => plan.trial_days,
            _ => None,
        };
        let mut metadata = cmd.metadata.clone();
        metadata.insert("user_id".to_string(), cmd.user_id.to_string());
        metadata.insert("account_id".to_string(), account.id.to_string());

        let request = CreateSubscriptionRequest {
            customer_id,
            plan_ref,
            trial_days,
            metadata,
        };
        let subscription = RetryIf::spawn(
            processor_backoff(),
            || self.processor.create_subscription(request.clone()),
            |e: &ProcessorError| e.retryable,
        )
        .await?;
        account.connect_subscription(subscription.subscription_id, now);
        Ok(())
    }

    fn resolve_plan_ref(
        &self,
        plan: &SubscriptionPlan,
        cycle: BillingCycle,
    ) -> Result<String, BillingError> {
        let kind = self.processor.kind();
        plan.processor_ref(kind, cycle)
            .map(str::to_string)
            .ok_or_else(|| {
                BillingError::validation(
                    "plan_ref",
                    format!(
                        "plan {} has no {} reference for {} billing",
                        plan.id,
                        kind.as_str(),
                        cycle.as_str()
                    ),
                )
            })
    }

    /// Charges the prorated difference for an upgrade. Returns the amount
    /// charged; any non-settled outcome is an error and the plan change
    /// must not commit.
    async fn charge_proration(
        &self,
        account: &BillingAccount,
        proration: &ProrationResult,
        new_plan: &SubscriptionPlan,
        now: Timestamp,
    ) -> Result<f64, BillingError> {
        let Some(customer_id) = account.processor_customer_id.clone() else {
            return Err(BillingError::validation(
                "processor_customer_id",
                "account has no processor customer for the proration charge",
            ));
        };

        let amount = round_to_cents(proration.amount_due);
        let request = PaymentRequest {
            customer_id,
            amount,
            currency: account.currency.clone(),
            description: format!(
                "Plan change to {} ({} days prorated)",
                new_plan.id, proration.days_remaining
            ),
            payment_method_id: account.processor_payment_method_id.clone(),
            metadata: HashMap::from([
                ("account_id".to_string(), account.id.to_string()),
                ("reason".to_string(), "plan_change_proration".to_string()),
            ]),
        };
        let outcome = RetryIf::spawn(
            processor_backoff(),
            || self.processor.process_payment(request.clone()),
            |e: &ProcessorError| e.retryable,
        )
        .await?;

        if outcome.status == PaymentStatus::Succeeded && outcome.redirect_url.is_none() {
            let mut txn = Transaction::payment(
                account.id,
                account.user_id.clone(),
                amount,
                account.currency.clone(),
                TransactionStatus::Completed,
                format!("Prorated charge for plan change to {}", new_plan.id),
                now,
            )
            .with_processor_id(outcome.transaction_id);
            if let Some(fees) = outcome.fee_breakdown {
                txn = txn.with_fees(fees.processor_fee, fees.net_amount);
            }
            self.persist_transaction(&txn).await?;
            return Ok(amount);
        }

        // Record the attempt; the caller does not commit the plan.
        let (status, message) = if outcome.status == PaymentStatus::Failed {
            (TransactionStatus::Failed, "proration charge declined")
        } else {
            (
                TransactionStatus::Pending,
                "proration charge requires provider-side approval",
            )
        };
        let txn = Transaction::payment(
            account.id,
            account.user_id.clone(),
            amount,
            account.currency.clone(),
            status,
            format!("Prorated charge for plan change to {}", new_plan.id),
            now,
        )
        .with_processor_id(outcome.transaction_id);
        self.persist_transaction(&txn).await?;
        Err(BillingError::processor_validation(message))
    }

    /// Pushes a committed plan change to the provider subscription. Best
    /// effort: local state is already the source of truth here.
    async fn push_plan_to_provider(
        &self,
        account: &BillingAccount,
        plan: &SubscriptionPlan,
        cycle: BillingCycle,
    ) {
        let Some(subscription_id) = account.processor_subscription_id.as_deref() else {
            return;
        };
        let Some(plan_ref) = plan.processor_ref(self.processor.kind(), cycle) else {
            warn!(
                account_id = %account.id,
                plan_id = %plan.id,
                "no provider plan reference; provider subscription left unchanged"
            );
            return;
        };
        let delta = SubscriptionDelta::plan(plan_ref);
        if let Err(e) = self.processor.update_subscription(subscription_id, delta).await {
            error!(
                account_id = %account.id,
                subscription_id,
                error = %e,
                "failed to push plan change to provider"
            );
        }
    }

    async fn locate(&self, user_id: &UserId) -> Result<BillingAccount, BillingError> {
        self.store
            .find_account_by_user(user_id)
            .await?
            .ok_or_else(|| BillingError::account_not_found_for_user(user_id.clone()))
    }

    async fn refetch(&self, id: AccountId) -> Result<BillingAccount, BillingError> {
        self.store
            .find_account(&id)
            .await?
            .ok_or_else(|| BillingError::account_not_found(id))
    }

    fn creation_result(account: &BillingAccount) -> CreateSubscriptionResult {
        let trial_ends_at = match account.status {
            AccountStatus::Trialing => account.trial_ends_at,
            _ => None,
        };
        CreateSubscriptionResult {
            account_id: account.id,
            subscription_id: account.processor_subscription_id.clone(),
            status: account.status,
            trial_ends_at,
            next_billing_date: account.next_billing_date,
        }
    }

    async fn grant_entitlement(&self, account: &BillingAccount) -> Result<(), BillingError> {
        self.persist_entitlement(
            &account.user_id,
            EntitlementPatch::grant(account.plan_id.clone(), Some(account.next_billing_date)),
        )
        .await
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

    async fn persist_new(&self, account: &BillingAccount) -> Result<(), BillingError> {
        RetryIf::spawn(
            write_backoff(),
            || self.store.create_account(account),
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
