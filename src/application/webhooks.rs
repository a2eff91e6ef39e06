//! Webhook intake: verify, normalize, claim, apply.
//!
//! Every processor delivers webhooks at-least-once and out of order. This
//! module turns those deliveries into exactly-once account effects: the
//! adapter verifies the signature and maps the provider payload to a
//! canonical action, then the event id is claimed atomically before any
//! state changes. Redeliveries are acknowledged without reapplying.

use std::sync::Arc;
use std::time::Duration;

use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, info, warn};

use crate::application::locks::AccountLockMap;
use crate::domain::billing::{
    AccountStatus, BillingAccount, BillingError, Transaction, TransactionStatus,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    AccountPatch, AccountStore, CanonicalAction, EntitlementPatch, EventPayload, NormalizedEvent,
    PaymentProcessor, WebhookEventRecord, WebhookEventStore,
};

/// What a webhook delivery amounted to. Echoed back to the caller so the
/// HTTP layer can acknowledge with the processor's expected shape.
///
/// `handled: false` is still an acknowledgement: events we do not recognize
/// or cannot match to an account must not be retried by the provider
/// forever. The only error path out of intake is signature verification.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub handled: bool,
    pub event_id: String,
    pub action: Option<CanonicalAction>,
    pub detail: Option<String>,
}

impl WebhookOutcome {
    fn applied(event: &NormalizedEvent) -> Self {
        Self {
            handled: true,
            event_id: event.event_id.clone(),
            action: event.action,
            detail: None,
        }
    }

    fn duplicate(event: &NormalizedEvent) -> Self {
        Self {
            handled: true,
            event_id: event.event_id.clone(),
            action: event.action,
            detail: Some("duplicate delivery".to_string()),
        }
    }

    fn unhandled(event: &NormalizedEvent, detail: &str) -> Self {
        Self {
            handled: false,
            event_id: event.event_id.clone(),
            action: event.action,
            detail: Some(detail.to_string()),
        }
    }
}

/// Applies normalized webhook events to billing accounts.
pub struct WebhookProcessor {
    processor: Arc<dyn PaymentProcessor>,
    store: Arc<dyn AccountStore>,
    events: Arc<dyn WebhookEventStore>,
    locks: Arc<AccountLockMap>,
    grace_period_days: u32,
}

impl WebhookProcessor {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        store: Arc<dyn AccountStore>,
        events: Arc<dyn WebhookEventStore>,
        locks: Arc<AccountLockMap>,
        grace_period_days: u32,
    ) -> Self {
        Self {
            processor,
            store,
            events,
            locks,
            grace_period_days,
        }
    }

    /// Process one raw webhook delivery.
    pub async fn process(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome, BillingError> {
        // 1. Verify the signature and normalize the provider payload. A bad
        //    signature is the only failure the transport should reject on.
        let event = self
            .processor
            .verify_and_parse_webhook(raw_body, signature_header)
            .await?;

        // 2. Event types with no canonical action are acknowledged as-is.
        let Some(action) = event.action else {
            debug!(
                event_id = %event.event_id,
                raw_type = %event.raw_type,
                "ignoring unrecognized webhook type"
            );
            return Ok(WebhookOutcome::unhandled(&event, "unrecognized event type"));
        };

        // 3. Every action we apply keys off the provider subscription id.
        let Some(subscription_id) = event.payload.subscription_id() else {
            return Ok(WebhookOutcome::unhandled(&event, "no subscription reference"));
        };

        // 4. Locate the account before claiming the event id. An event that
        //    arrives ahead of its account stays unclaimed, so a later
        //    redelivery can still apply.
        let Some(located) = self
            .store
            .find_account_by_subscription(subscription_id)
            .await?
        else {
            warn!(
                event_id = %event.event_id,
                subscription_id,
                "webhook references unknown subscription"
            );
            return Ok(WebhookOutcome::unhandled(&event, "no matching account"));
        };

        // 5. Serialize with other work on this account, then claim the
        //    event id. First writer wins; the loser acknowledges without
        //    touching the account.
        let _guard = self.locks.acquire(located.id).await;
        let now = Timestamp::now();
        let record = WebhookEventRecord::new(
            self.processor.kind(),
            event.event_id.clone(),
            event.raw_type.clone(),
            now,
        );
        if !self.events.claim(record).await?.is_first_delivery() {
            debug!(event_id = %event.event_id, "duplicate webhook delivery");
            return Ok(WebhookOutcome::duplicate(&event));
        }

        // 6. Re-read under the lock so the applied effect sees writes that
        //    slipped in between the lookup and the lock.
        let Some(account) = self.store.find_account(&located.id).await? else {
            return Ok(WebhookOutcome::unhandled(&event, "no matching account"));
        };
        self.apply(action, &event, account, now).await?;

        info!(
            event_id = %event.event_id,
            action = %action,
            account_id = %located.id,
            "webhook applied"
        );
        Ok(WebhookOutcome::applied(&event))
    }

    async fn apply(
        &self,
        action: CanonicalAction,
        event: &NormalizedEvent,
        account: BillingAccount,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        match action {
            CanonicalAction::PaymentSucceeded => {
                self.apply_payment_succeeded(event, account, now).await
            }
            CanonicalAction::PaymentFailed | CanonicalAction::SubscriptionPaymentFailed => {
                self.apply_payment_failed(event, account, now).await
            }
            CanonicalAction::SubscriptionCreated | CanonicalAction::SubscriptionActivated => {
                self.apply_subscription_activated(account, now).await
            }
            CanonicalAction::SubscriptionCanceled => {
                self.apply_subscription_canceled(account, now).await
            }
            CanonicalAction::SubscriptionSuspended => {
                self.apply_subscription_suspended(account, now).await
            }
        }
    }

    /// A confirmed charge either recovers a past-due account or renews an
    /// active one; both advance the billing date by one cycle.
    async fn apply_payment_succeeded(
        &self,
        event: &NormalizedEvent,
        mut account: BillingAccount,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        let (amount, payment_id) = match &event.payload {
            EventPayload::Payment {
                payment_id, amount, ..
            } => (amount.unwrap_or(account.amount), Some(payment_id.clone())),
            _ => (account.amount, None),
        };

        // A charge confirmed after a local cancel goes in the ledger but
        // does not resurrect the subscription.
        if account.status == AccountStatus::Canceled {
            let txn = build_payment_transaction(
                &account,
                amount,
                TransactionStatus::Completed,
                format!("Subscription payment ({})", account.plan_id),
                payment_id,
                event,
                now,
            );
            return self.persist_transaction(&txn).await;
        }

        if account.status == AccountStatus::PastDue {
            account.recover_payment(now)?;
        } else {
            account.record_renewal(now)?;
        }
        let updated = self.persist(&account).await?;

        let txn = build_payment_transaction(
            &updated,
            amount,
            TransactionStatus::Completed,
            format!("Subscription payment ({})", updated.plan_id),
            payment_id,
            event,
            now,
        );
        self.persist_transaction(&txn).await?;

        self.persist_entitlement(
            &updated.user_id,
            EntitlementPatch::grant(updated.plan_id.clone(), Some(updated.next_billing_date)),
        )
        .await
    }

    /// A failed charge opens (or keeps) the grace window. Access is not
    /// revoked here; grace expiry is the scheduler's job.
    async fn apply_payment_failed(
        &self,
        event: &NormalizedEvent,
        mut account: BillingAccount,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        let (amount, payment_id, failure_reason) = match &event.payload {
            EventPayload::Payment {
                payment_id,
                amount,
                failure_reason,
                ..
            } => (
                amount.unwrap_or(account.amount),
                Some(payment_id.clone()),
                failure_reason.clone(),
            ),
            _ => (account.amount, None, None),
        };
        let description = match failure_reason {
            Some(reason) => format!("Subscription payment failed: {reason}"),
            None => "Subscription payment failed".to_string(),
        };
        let txn = build_payment_transaction(
            &account,
            amount,
            TransactionStatus::Failed,
            description,
            payment_id,
            event,
            now,
        );

        // Failures reported after cancellation are ledger-only.
        if account.status != AccountStatus::Canceled {
            account.record_payment_failure(self.grace_period_days, now)?;
            self.persist(&account).await?;
        }
        self.persist_transaction(&txn).await
    }

    async fn apply_subscription_activated(
        &self,
        mut account: BillingAccount,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        match account.status {
            // Stale activation arriving after a local cancel.
            AccountStatus::Canceled => Ok(()),
            // Providers report trial subscriptions as created/active; the
            // trial keeps running locally until its end date.
            AccountStatus::Trialing => Ok(()),
            _ => {
                account.activate(now)?;
                let updated = self.persist(&account).await?;
                self.persist_entitlement(
                    &updated.user_id,
                    EntitlementPatch::grant(
                        updated.plan_id.clone(),
                        Some(updated.next_billing_date),
                    ),
                )
                .await
            }
        }
    }

    async fn apply_subscription_canceled(
        &self,
        mut account: BillingAccount,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if account.status == AccountStatus::Canceled {
            return Ok(());
        }
        account.cancel(now)?;
        let updated = self.persist(&account).await?;
        // Paid-through access survives the cancel until the period ends.
        self.persist_entitlement(
            &updated.user_id,
            EntitlementPatch::grant(updated.plan_id.clone(), Some(updated.next_billing_date)),
        )
        .await
    }

    async fn apply_subscription_suspended(
        &self,
        mut account: BillingAccount,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if account.status == AccountStatus::Canceled {
            return Ok(());
        }
        account.record_payment_failure(self.grace_period_days, now)?;
        self.persist(&account).await?;
        Ok(())
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

fn build_payment_transaction(
    account: &BillingAccount,
    amount: f64,
    status: TransactionStatus,
    description: String,
    processor_payment_id: Option<String>,
    event: &NormalizedEvent,
    now: Timestamp,
) -> Transaction {
    let mut txn = Transaction::payment(
        account.id,
        account.user_id.clone(),
        amount,
        account.currency.clone(),
        status,
        description,
        now,
    )
    .with_metadata("webhook_event_id", event.event_id.clone());
    if let Some(payment_id) = processor_payment_id {
        txn = txn.with_processor_id(payment_id);
    }
    txn
}

fn write_backoff() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(2)
        .factor(25)
        .map(jitter)
        .take(3)
}
