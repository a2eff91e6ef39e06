//! Billing store port.
//!
//! Defines the contract for persisting billing accounts, the transaction
//! ledger, and user entitlement flags. Implementations handle the actual
//! storage operations.
//!
//! # Design
//!
//! - **Partial updates**: account writes carry only the fields an
//!   operation changed, via [`AccountPatch`]
//! - **Append-only ledger**: transactions are created, never updated
//! - **One account per user**: lookups by user id return at most one row
//!
//! # Failure handling
//!
//! A write that fails after a processor call has already succeeded leaves
//! local state behind the provider's. Callers surface this as a
//! `StoreWrite` error and retry the local write; the provider-side action
//! is never reversed.

use crate::domain::billing::{
    AccountStatus, BillingAccount, BillingError, ScheduledDowngrade, Transaction,
};
use crate::domain::catalog::BillingCycle;
use crate::domain::foundation::{AccountId, PlanId, Timestamp, UserId};
use async_trait::async_trait;
use std::collections::HashMap;

/// Partial update for a billing account. `None` leaves a field untouched;
/// for nullable columns the inner `Option` distinguishes "set" from
/// "clear".
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub plan_id: Option<PlanId>,
    pub cycle: Option<BillingCycle>,
    pub status: Option<AccountStatus>,
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub processor_customer_id: Option<String>,
    pub processor_payment_method_id: Option<String>,
    pub processor_subscription_id: Option<Option<String>>,
    pub next_billing_date: Option<Timestamp>,
    pub trial_ends_at: Option<Option<Timestamp>>,
    pub canceled_at: Option<Option<Timestamp>>,
    pub grace_ends_at: Option<Option<Timestamp>>,
    pub scheduled_downgrade: Option<Option<ScheduledDowngrade>>,
    pub metadata: Option<HashMap<String, String>>,
    pub updated_at: Option<Timestamp>,
}

impl AccountPatch {
    /// Snapshots every mutable field of an aggregate, for persisting the
    /// result of in-memory lifecycle methods.
    pub fn from_account(account: &BillingAccount) -> Self {
        Self {
            plan_id: Some(account.plan_id.clone()),
            cycle: Some(account.cycle),
            status: Some(account.status),
            amount: Some(account.amount),
            currency: Some(account.currency.clone()),
            processor_customer_id: account.processor_customer_id.clone(),
            processor_payment_method_id: account.processor_payment_method_id.clone(),
            processor_subscription_id: Some(account.processor_subscription_id.clone()),
            next_billing_date: Some(account.next_billing_date),
            trial_ends_at: Some(account.trial_ends_at),
            canceled_at: Some(account.canceled_at),
            grace_ends_at: Some(account.grace_ends_at),
            scheduled_downgrade: Some(account.scheduled_downgrade.clone()),
            metadata: Some(account.metadata.clone()),
            updated_at: Some(account.updated_at),
        }
    }

    /// Applies this patch to an account in place.
    pub fn apply(&self, account: &mut BillingAccount) {
        if let Some(plan_id) = &self.plan_id {
            account.plan_id = plan_id.clone();
        }
        if let Some(cycle) = self.cycle {
            account.cycle = cycle;
        }
        if let Some(status) = self.status {
            account.status = status;
        }
        if let Some(amount) = self.amount {
            account.amount = amount;
        }
        if let Some(currency) = &self.currency {
            account.currency = currency.clone();
        }
        if let Some(customer_id) = &self.processor_customer_id {
            account.processor_customer_id = Some(customer_id.clone());
        }
        if let Some(payment_method_id) = &self.processor_payment_method_id {
            account.processor_payment_method_id = Some(payment_method_id.clone());
        }
        if let Some(subscription_id) = &self.processor_subscription_id {
            account.processor_subscription_id = subscription_id.clone();
        }
        if let Some(next_billing_date) = self.next_billing_date {
            account.next_billing_date = next_billing_date;
        }
        if let Some(trial_ends_at) = self.trial_ends_at {
            account.trial_ends_at = trial_ends_at;
        }
        if let Some(canceled_at) = self.canceled_at {
            account.canceled_at = canceled_at;
        }
        if let Some(grace_ends_at) = self.grace_ends_at {
            account.grace_ends_at = grace_ends_at;
        }
        if let Some(scheduled_downgrade) = &self.scheduled_downgrade {
            account.scheduled_downgrade = scheduled_downgrade.clone();
        }
        if let Some(metadata) = &self.metadata {
            account.metadata = metadata.clone();
        }
        if let Some(updated_at) = self.updated_at {
            account.updated_at = updated_at;
        }
    }
}

/// Partial update for the entitlement fields on a user record.
#[derive(Debug, Clone, Default)]
pub struct EntitlementPatch {
    /// Premium feature flag.
    pub premium: Option<bool>,
    /// Plan the user is entitled to.
    pub plan_id: Option<PlanId>,
    /// When premium access lapses. Inner `None` clears the expiry.
    pub expires_at: Option<Option<Timestamp>>,
}

impl EntitlementPatch {
    /// Grants premium entitlement under a plan, with an optional lapse date.
    pub fn grant(plan_id: PlanId, expires_at: Option<Timestamp>) -> Self {
        Self {
            premium: Some(true),
            plan_id: Some(plan_id),
            expires_at: Some(expires_at),
        }
    }

    /// Revokes premium entitlement, resetting to a free plan.
    pub fn revoke(free_plan_id: PlanId) -> Self {
        Self {
            premium: Some(false),
            plan_id: Some(free_plan_id),
            expires_at: Some(None),
        }
    }
}

/// Store port for billing persistence.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Persist a new billing account.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the user already has an account
    /// - `StoreWrite` on persistence failure
    async fn create_account(&self, account: &BillingAccount) -> Result<(), BillingError>;

    /// Find an account by its id. Returns `None` if not found.
    async fn find_account(&self, id: &AccountId) -> Result<Option<BillingAccount>, BillingError>;

    /// Find the account for a user. Returns `None` if the user has never
    /// had one. This is the primary lookup: each user has at most one row.
    async fn find_account_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BillingAccount>, BillingError>;

    /// Find the account holding a provider subscription id. Webhooks carry
    /// provider ids, not ours, so this is how events find their account.
    async fn find_account_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<BillingAccount>, BillingError>;

    /// Apply a partial update and return the updated row.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` if the account doesn't exist
    /// - `StoreWrite` on persistence failure
    async fn update_account(
        &self,
        id: &AccountId,
        patch: AccountPatch,
    ) -> Result<BillingAccount, BillingError>;

    /// Append a transaction to the ledger.
    async fn create_transaction(&self, transaction: &Transaction) -> Result<(), BillingError>;

    /// Update the entitlement fields on a user record.
    async fn update_user_entitlement(
        &self,
        user_id: &UserId,
        patch: EntitlementPatch,
    ) -> Result<(), BillingError>;

    /// Accounts the renewal scheduler should charge: renewable status,
    /// paid plan, billing date at or before `horizon`.
    async fn find_due_for_renewal(
        &self,
        horizon: Timestamp,
    ) -> Result<Vec<BillingAccount>, BillingError>;

    /// Past-due accounts whose grace window ended at or before `now`.
    async fn find_grace_expired(&self, now: Timestamp)
        -> Result<Vec<BillingAccount>, BillingError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::SubscriptionPlan;

    // Trait object safety test
    #[test]
    fn account_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn AccountStore) {}
    }

    fn sample_account() -> BillingAccount {
        BillingAccount::create_paid(
            AccountId::new(),
            UserId::new("user-patch-1").unwrap(),
            &SubscriptionPlan::premium_individual(),
            BillingCycle::Monthly,
            Timestamp::now(),
        )
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let mut account = sample_account();
        let snapshot = account.clone();

        AccountPatch::default().apply(&mut account);

        assert_eq!(account, snapshot);
    }

    #[test]
    fn patch_sets_only_named_fields() {
        let mut account = sample_account();
        let original_plan = account.plan_id.clone();

        let patch = AccountPatch {
            status: Some(AccountStatus::PastDue),
            grace_ends_at: Some(Some(Timestamp::now().add_days(7))),
            ..AccountPatch::default()
        };
        patch.apply(&mut account);

        assert_eq!(account.status, AccountStatus::PastDue);
        assert!(account.grace_ends_at.is_some());
        assert_eq!(account.plan_id, original_plan);
    }

    #[test]
    fn patch_can_clear_nullable_fields() {
        let mut account = sample_account();
        let now = Timestamp::now();
        account.connect_subscription("sub_123", now);
        account.record_payment_failure(7, now).unwrap();

        let patch = AccountPatch {
            processor_subscription_id: Some(None),
            grace_ends_at: Some(None),
            ..AccountPatch::default()
        };
        patch.apply(&mut account);

        assert!(account.processor_subscription_id.is_none());
        assert!(account.grace_ends_at.is_none());
    }

    #[test]
    fn from_account_round_trips_mutations() {
        let now = Timestamp::now();
        let mut mutated = sample_account();
        mutated.connect_customer("cus_9", now);
        mutated.record_payment_failure(7, now.add_days(30)).unwrap();

        let mut stored = sample_account();
        stored.id = mutated.id;
        AccountPatch::from_account(&mutated).apply(&mut stored);

        assert_eq!(stored.status, mutated.status);
        assert_eq!(stored.grace_ends_at, mutated.grace_ends_at);
        assert_eq!(stored.processor_customer_id, mutated.processor_customer_id);
        assert_eq!(stored.updated_at, mutated.updated_at);
    }

    #[test]
    fn entitlement_grant_and_revoke_shapes() {
        let plan_id = PlanId::new("premium_individual").unwrap();
        let grant = EntitlementPatch::grant(plan_id.clone(), Some(Timestamp::now().add_days(30)));
        assert_eq!(grant.premium, Some(true));
        assert!(matches!(grant.expires_at, Some(Some(_))));

        let revoke = EntitlementPatch::revoke(PlanId::new("free").unwrap());
        assert_eq!(revoke.premium, Some(false));
        assert_eq!(revoke.expires_at, Some(None));
    }
}
