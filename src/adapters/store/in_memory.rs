//! In-memory store adapters.
//!
//! Reference implementations of the persistence ports, backed by process
//! memory. Used by the test suites and by single-process local runs; a
//! durable deployment swaps in database-backed implementations.
//!
//! # Durability Note
//!
//! Nothing here survives a restart. Lock operations use `.expect()` and
//! will panic if a lock is poisoned, which is acceptable for the
//! environments these adapters serve.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::domain::billing::{BillingAccount, BillingError, Transaction};
use crate::domain::catalog::ProcessorKind;
use crate::domain::foundation::{AccountId, PlanId, Timestamp, UserId};
use crate::ports::{
    AccountPatch, AccountStore, EntitlementPatch, SaveResult, WebhookEventRecord,
    WebhookEventStore,
};

/// Entitlement flags as the store tracks them per user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitlementRecord {
    pub premium: bool,
    pub plan_id: Option<PlanId>,
    pub expires_at: Option<Timestamp>,
}

/// In-memory implementation of [`AccountStore`].
///
/// # Example
///
/// ```ignore
/// let store = InMemoryAccountStore::new();
/// store.create_account(&account).await?;
/// let found = store.find_account_by_user(&user_id).await?;
/// ```
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<AccountId, BillingAccount>>,
    transactions: RwLock<Vec<Transaction>>,
    entitlements: RwLock<HashMap<UserId, EntitlementRecord>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Seeds an account directly, bypassing the duplicate-user guard.
    pub fn insert_account(&self, account: BillingAccount) {
        self.accounts
            .write()
            .expect("InMemoryAccountStore: accounts write lock poisoned")
            .insert(account.id, account);
    }

    /// Snapshot of the transaction ledger.
    pub fn transactions(&self) -> Vec<Transaction> {
        self.transactions
            .read()
            .expect("InMemoryAccountStore: transactions lock poisoned")
            .clone()
    }

    /// Ledger entries for one account, in insertion order.
    pub fn transactions_for(&self, account_id: &AccountId) -> Vec<Transaction> {
        self.transactions
            .read()
            .expect("InMemoryAccountStore: transactions lock poisoned")
            .iter()
            .filter(|t| t.account_id == *account_id)
            .cloned()
            .collect()
    }

    /// Returns count of ledger entries.
    pub fn transaction_count(&self) -> usize {
        self.transactions
            .read()
            .expect("InMemoryAccountStore: transactions lock poisoned")
            .len()
    }

    /// Entitlement flags for a user, if any were ever written.
    pub fn entitlement(&self, user_id: &UserId) -> Option<EntitlementRecord> {
        self.entitlements
            .read()
            .expect("InMemoryAccountStore: entitlements lock poisoned")
            .get(user_id)
            .cloned()
    }

    /// Returns count of stored accounts.
    pub fn account_count(&self) -> usize {
        self.accounts
            .read()
            .expect("InMemoryAccountStore: accounts lock poisoned")
            .len()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create_account(&self, account: &BillingAccount) -> Result<(), BillingError> {
        let mut accounts = self
            .accounts
            .write()
            .expect("InMemoryAccountStore: accounts write lock poisoned");

        // One account per user, enforced at insert
        if accounts.values().any(|a| a.user_id == account.user_id) {
            return Err(BillingError::validation(
                "user_id",
                "user already has a billing account",
            ));
        }

        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account(&self, id: &AccountId) -> Result<Option<BillingAccount>, BillingError> {
        Ok(self
            .accounts
            .read()
            .expect("InMemoryAccountStore: accounts lock poisoned")
            .get(id)
            .cloned())
    }

    async fn find_account_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<BillingAccount>, BillingError> {
        Ok(self
            .accounts
            .read()
            .expect("InMemoryAccountStore: accounts lock poisoned")
            .values()
            .find(|a| a.user_id == *user_id)
            .cloned())
    }

    async fn find_account_by_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<BillingAccount>, BillingError> {
        Ok(self
            .accounts
            .read()
            .expect("InMemoryAccountStore: accounts lock poisoned")
            .values()
            .find(|a| a.processor_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn update_account(
        &self,
        id: &AccountId,
        patch: AccountPatch,
    ) -> Result<BillingAccount, BillingError> {
        let mut accounts = self
            .accounts
            .write()
            .expect("InMemoryAccountStore: accounts write lock poisoned");

        let account = accounts
            .get_mut(id)
            .ok_or(BillingError::AccountNotFound(*id))?;

        patch.apply(account);
        Ok(account.clone())
    }

    async fn create_transaction(&self, transaction: &Transaction) -> Result<(), BillingError> {
        self.transactions
            .write()
            .expect("InMemoryAccountStore: transactions write lock poisoned")
            .push(transaction.clone());
        Ok(())
    }

    async fn update_user_entitlement(
        &self,
        user_id: &UserId,
        patch: EntitlementPatch,
    ) -> Result<(), BillingError> {
        let mut entitlements = self
            .entitlements
            .write()
            .expect("InMemoryAccountStore: entitlements write lock poisoned");

        let record = entitlements.entry(user_id.clone()).or_default();
        if let Some(premium) = patch.premium {
            record.premium = premium;
        }
        if let Some(plan_id) = patch.plan_id {
            record.plan_id = Some(plan_id);
        }
        if let Some(expires_at) = patch.expires_at {
            record.expires_at = expires_at;
        }

        Ok(())
    }

    async fn find_due_for_renewal(
        &self,
        horizon: Timestamp,
    ) -> Result<Vec<BillingAccount>, BillingError> {
        let mut due: Vec<BillingAccount> = self
            .accounts
            .read()
            .expect("InMemoryAccountStore: accounts lock poisoned")
            .values()
            .filter(|a| a.is_due_for_renewal(horizon))
            .cloned()
            .collect();

        // Most overdue first, so a partial tick makes the right progress
        due.sort_by_key(|a| a.next_billing_date.as_unix_secs());
        Ok(due)
    }

    async fn find_grace_expired(
        &self,
        now: Timestamp,
    ) -> Result<Vec<BillingAccount>, BillingError> {
        let mut expired: Vec<BillingAccount> = self
            .accounts
            .read()
            .expect("InMemoryAccountStore: accounts lock poisoned")
            .values()
            .filter(|a| a.grace_expired(now))
            .cloned()
            .collect();

        expired.sort_by_key(|a| a.grace_ends_at.map(|g| g.as_unix_secs()));
        Ok(expired)
    }
}

/// In-memory implementation of [`WebhookEventStore`].
///
/// Claims live in a map keyed by `(processor, event_id)`; the write lock
/// makes the insert atomic, so exactly one concurrent claimer wins.
#[derive(Default)]
pub struct InMemoryWebhookEventStore {
    claimed: RwLock<HashMap<(ProcessorKind, String), WebhookEventRecord>>,
}

impl InMemoryWebhookEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    /// Whether an event id has been claimed.
    pub fn was_claimed(&self, processor: ProcessorKind, event_id: &str) -> bool {
        self.claimed
            .read()
            .expect("InMemoryWebhookEventStore: claimed lock poisoned")
            .contains_key(&(processor, event_id.to_string()))
    }

    /// Returns count of claimed events.
    pub fn claim_count(&self) -> usize {
        self.claimed
            .read()
            .expect("InMemoryWebhookEventStore: claimed lock poisoned")
            .len()
    }

    /// Clears all claims.
    pub fn clear(&self) {
        self.claimed
            .write()
            .expect("InMemoryWebhookEventStore: claimed write lock poisoned")
            .clear();
    }
}

#[async_trait]
impl WebhookEventStore for InMemoryWebhookEventStore {
    async fn claim(&self, record: WebhookEventRecord) -> Result<SaveResult, BillingError> {
        let mut claimed = self
            .claimed
            .write()
            .expect("InMemoryWebhookEventStore: claimed write lock poisoned");

        let key = (record.processor, record.event_id.clone());
        if claimed.contains_key(&key) {
            return Ok(SaveResult::AlreadyExists);
        }

        claimed.insert(key, record);
        Ok(SaveResult::Inserted)
    }
}
