use crate::domain::billing::errors::BillingError;
use crate::domain::billing::status::AccountStatus;
use crate::domain::catalog::{BillingCycle, SubscriptionPlan};
use crate::domain::foundation::{AccountId, PlanId, StateMachine, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A plan change deferred to the end of the current paid period.
///
/// Downgrades are not applied immediately: the subscriber keeps what they
/// paid for, and the scheduler swaps the plan when the period rolls over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDowngrade {
    pub plan_id: PlanId,
    pub cycle: BillingCycle,
    pub requested_at: Timestamp,
}

/// Billing account aggregate.
///
/// One row per user, reused across cancel/re-subscribe cycles. All status
/// changes go through the [`AccountStatus`] state machine; callers that
/// need a different lifecycle path get an `InvalidState` error instead of
/// a silently corrupted account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingAccount {
    pub id: AccountId,
    pub user_id: UserId,
    pub plan_id: PlanId,
    pub cycle: BillingCycle,
    pub status: AccountStatus,
    /// Charge for one billing cycle, in major units. Zero on the free tier.
    pub amount: f64,
    pub currency: String,
    pub processor_customer_id: Option<String>,
    pub processor_payment_method_id: Option<String>,
    pub processor_subscription_id: Option<String>,
    /// Next renewal charge date. After a cancel this stops advancing and
    /// marks the end of paid access instead.
    pub next_billing_date: Timestamp,
    pub trial_ends_at: Option<Timestamp>,
    pub canceled_at: Option<Timestamp>,
    /// End of the post-failure grace window. Durable so a restarted
    /// scheduler still knows when to downgrade.
    pub grace_ends_at: Option<Timestamp>,
    pub scheduled_downgrade: Option<ScheduledDowngrade>,
    pub metadata: HashMap<String, String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl BillingAccount {
    /// Creates a free-tier account. This is the default state for every
    /// user before any checkout.
    pub fn create_free(
        id: AccountId,
        user_id: UserId,
        free_plan: &SubscriptionPlan,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            plan_id: free_plan.id.clone(),
            cycle: BillingCycle::Monthly,
            status: AccountStatus::Active,
            amount: 0.0,
            currency: free_plan.currency.clone(),
            processor_customer_id: None,
            processor_payment_method_id: None,
            processor_subscription_id: None,
            next_billing_date: now.add_days(BillingCycle::Monthly.nominal_days()),
            trial_ends_at: None,
            canceled_at: None,
            grace_ends_at: None,
            scheduled_downgrade: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a paid account. Starts in `Trialing` when the plan carries
    /// a trial, otherwise directly in `Active` with the first period paid.
    pub fn create_paid(
        id: AccountId,
        user_id: UserId,
        plan: &SubscriptionPlan,
        cycle: BillingCycle,
        now: Timestamp,
    ) -> Self {
        let (status, trial_ends_at, next_billing_date) = match plan.trial_days {
            Some(days) => {
                let trial_end = now.add_days(days);
                (AccountStatus::Trialing, Some(trial_end), trial_end)
            }
            None => (AccountStatus::Active, None, now.add_days(cycle.nominal_days())),
        };

        Self {
            id,
            user_id,
            plan_id: plan.id.clone(),
            cycle,
            status,
            amount: plan.price_for(cycle),
            currency: plan.currency.clone(),
            processor_customer_id: None,
            processor_payment_method_id: None,
            processor_subscription_id: None,
            next_billing_date,
            trial_ends_at,
            canceled_at: None,
            grace_ends_at: None,
            scheduled_downgrade: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // ============================================================
    // Processor linkage
    // ============================================================

    pub fn connect_customer(&mut self, customer_id: impl Into<String>, now: Timestamp) {
        self.processor_customer_id = Some(customer_id.into());
        self.updated_at = now;
    }

    pub fn connect_subscription(&mut self, subscription_id: impl Into<String>, now: Timestamp) {
        self.processor_subscription_id = Some(subscription_id.into());
        self.updated_at = now;
    }

    pub fn connect_payment_method(&mut self, payment_method_id: impl Into<String>, now: Timestamp) {
        self.processor_payment_method_id = Some(payment_method_id.into());
        self.updated_at = now;
    }

    // ============================================================
    // Lifecycle transitions
    // ============================================================

    /// Marks the account active without touching billing dates.
    ///
    /// Used when a processor confirms a subscription asynchronously
    /// (e.g. wallet approval flows).
    pub fn activate(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition_status(AccountStatus::Active, "activate")?;
        self.grace_ends_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Records a successful renewal charge: account becomes (or stays)
    /// active and the billing date advances by exactly one nominal cycle
    /// from its previous value.
    pub fn record_renewal(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition_status(AccountStatus::Active, "renew")?;
        self.advance_billing_date();
        self.grace_ends_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Records a recovered payment while past due. The charge that
    /// previously failed has now cleared, so this also advances the
    /// billing date.
    pub fn recover_payment(&mut self, now: Timestamp) -> Result<(), BillingError> {
        if self.status != AccountStatus::PastDue {
            return Err(BillingError::invalid_state(self.status.as_str(), "recover_payment"));
        }
        self.transition_status(AccountStatus::Active, "recover_payment")?;
        self.advance_billing_date();
        self.grace_ends_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Records a failed charge: account enters the grace window. The
    /// billing date is left where it was so a recovery charges for the
    /// same period.
    pub fn record_payment_failure(
        &mut self,
        grace_days: u32,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        // A repeated failure inside the grace window keeps the original deadline.
        if self.status == AccountStatus::PastDue {
            self.updated_at = now;
            return Ok(());
        }
        self.transition_status(AccountStatus::PastDue, "record_payment_failure")?;
        self.grace_ends_at = Some(now.add_days(grace_days));
        self.updated_at = now;
        Ok(())
    }

    /// Cancels the subscription. Entitlement is not revoked here: the
    /// account keeps access until `next_billing_date`, which stops
    /// advancing from this point on.
    pub fn cancel(&mut self, now: Timestamp) -> Result<(), BillingError> {
        if self.status == AccountStatus::Canceled {
            return Err(BillingError::invalid_state(self.status.as_str(), "cancel"));
        }
        self.transition_status(AccountStatus::Canceled, "cancel")?;
        self.canceled_at = Some(now);
        self.grace_ends_at = None;
        self.scheduled_downgrade = None;
        self.updated_at = now;
        Ok(())
    }

    /// Drops the account to the free tier after grace expiry. The
    /// processor-side subscription is assumed gone by the time this runs.
    pub fn downgrade_to_free(
        &mut self,
        free_plan: &SubscriptionPlan,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        self.transition_status(AccountStatus::Canceled, "downgrade_to_free")?;
        self.plan_id = free_plan.id.clone();
        self.amount = 0.0;
        self.processor_subscription_id = None;
        self.canceled_at = Some(now);
        self.grace_ends_at = None;
        self.scheduled_downgrade = None;
        self.updated_at = now;
        Ok(())
    }

    /// Re-subscribes a canceled account in place, reusing the row.
    ///
    /// A trial is granted only if this row never had one, so a
    /// cancel/re-subscribe loop cannot mint unlimited trials.
    pub fn reopen(
        &mut self,
        plan: &SubscriptionPlan,
        cycle: BillingCycle,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        let grant_trial = plan.trial_days.is_some() && self.trial_ends_at.is_none();
        let target = if grant_trial {
            AccountStatus::Trialing
        } else {
            AccountStatus::Active
        };
        self.transition_status(target, "reopen")?;

        self.plan_id = plan.id.clone();
        self.cycle = cycle;
        self.amount = plan.price_for(cycle);
        self.currency = plan.currency.clone();
        self.next_billing_date = match (grant_trial, plan.trial_days) {
            (true, Some(days)) => {
                let trial_end = now.add_days(days);
                self.trial_ends_at = Some(trial_end);
                trial_end
            }
            _ => now.add_days(cycle.nominal_days()),
        };
        self.canceled_at = None;
        self.grace_ends_at = None;
        self.scheduled_downgrade = None;
        self.processor_subscription_id = None;
        self.updated_at = now;
        Ok(())
    }

    // ============================================================
    // Plan changes
    // ============================================================

    /// Applies a plan change that has already been paid for (or needs no
    /// payment). Callers run proration and charge before calling this.
    pub fn change_plan(
        &mut self,
        plan: &SubscriptionPlan,
        cycle: BillingCycle,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if self.status == AccountStatus::Canceled {
            return Err(BillingError::invalid_state(self.status.as_str(), "change_plan"));
        }
        self.plan_id = plan.id.clone();
        self.cycle = cycle;
        self.amount = plan.price_for(cycle);
        self.currency = plan.currency.clone();
        self.updated_at = now;
        Ok(())
    }

    /// Defers a downgrade to the end of the current period.
    pub fn schedule_downgrade(
        &mut self,
        plan_id: PlanId,
        cycle: BillingCycle,
        now: Timestamp,
    ) -> Result<(), BillingError> {
        if self.status == AccountStatus::Canceled {
            return Err(BillingError::invalid_state(self.status.as_str(), "schedule_downgrade"));
        }
        self.scheduled_downgrade = Some(ScheduledDowngrade { plan_id, cycle, requested_at: now });
        self.updated_at = now;
        Ok(())
    }

    pub fn clear_scheduled_downgrade(&mut self, now: Timestamp) {
        self.scheduled_downgrade = None;
        self.updated_at = now;
    }

    /// Records an unapplied downgrade credit in metadata. Credits are
    /// surfaced to support tooling, not auto-refunded.
    pub fn note_downgrade_credit(&mut self, credit: f64, now: Timestamp) {
        self.metadata
            .insert("last_downgrade_credit".to_string(), format!("{:.2}", credit));
        self.updated_at = now;
    }

    // ============================================================
    // Queries
    // ============================================================

    /// Whether the user currently has premium entitlement.
    ///
    /// Canceled accounts keep access until the period they paid for runs
    /// out, which is why this takes `now`.
    pub fn has_premium_access(&self, now: Timestamp) -> bool {
        match self.status {
            AccountStatus::Canceled => now.is_before(&self.next_billing_date),
            status => status.has_premium_access(),
        }
    }

    /// Whether the renewal scheduler should charge this account by
    /// `horizon`. Free-tier rows are never due.
    pub fn is_due_for_renewal(&self, horizon: Timestamp) -> bool {
        self.status.is_renewable() && self.amount > 0.0 && !self.next_billing_date.is_after(&horizon)
    }

    /// Whether the grace window has run out.
    pub fn grace_expired(&self, now: Timestamp) -> bool {
        self.status == AccountStatus::PastDue
            && self.grace_ends_at.is_some_and(|g| !g.is_after(&now))
    }

    /// Whole days left in the current period, for proration.
    pub fn days_remaining_in_period(&self, now: Timestamp) -> u32 {
        now.days_until(&self.next_billing_date)
    }

    fn advance_billing_date(&mut self) {
        self.next_billing_date = self.next_billing_date.add_days(self.cycle.nominal_days());
    }

    fn transition_status(
        &mut self,
        new_status: AccountStatus,
        attempted: &str,
    ) -> Result<(), BillingError> {
        if !self.status.can_transition_to(&new_status) {
            return Err(BillingError::invalid_state(self.status.as_str(), attempted));
        }
        self.status = new_status;
        Ok(())
    }
}
