use crate::domain::foundation::{AccountId, Timestamp, TransactionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What kind of money movement a transaction records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Payment,
    Refund,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Payment => write!(f, "payment"),
            TransactionKind::Refund => write!(f, "refund"),
        }
    }
}

/// Outcome of a transaction as recorded locally.
///
/// `Pending` covers redirect-based flows where the processor has not yet
/// reported a final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    Failed,
    Pending,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
            TransactionStatus::Pending => write!(f, "pending"),
        }
    }
}

/// Processor fee breakdown, when the processor reports one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    /// Fee the processor kept, in major units.
    pub processor_fee: f64,
    /// Amount after fees, in major units.
    pub net_amount: f64,
}

/// An immutable ledger entry for one payment or refund attempt.
///
/// Transactions are append-only: failed attempts are recorded alongside
/// successes, so the ledger doubles as an audit trail of every charge the
/// engine ever tried to make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Processor-side transaction/payment id. Absent when the attempt
    /// failed before the processor assigned one.
    pub processor_transaction_id: Option<String>,
    pub account_id: AccountId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    /// Amount in major currency units (e.g. 29.99).
    pub amount: f64,
    /// ISO 4217 lowercase currency code.
    pub currency: String,
    pub fee_breakdown: Option<FeeBreakdown>,
    pub description: String,
    pub metadata: HashMap<String, String>,
    pub created_at: Timestamp,
}

impl Transaction {
    /// Records a payment attempt.
    pub fn payment(
        account_id: AccountId,
        user_id: UserId,
        amount: f64,
        currency: impl Into<String>,
        status: TransactionStatus,
        description: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            processor_transaction_id: None,
            account_id,
            user_id,
            kind: TransactionKind::Payment,
            status,
            amount,
            currency: currency.into(),
            fee_breakdown: None,
            description: description.into(),
            metadata: HashMap::new(),
            created_at: now,
        }
    }

    /// Records a refund.
    pub fn refund(
        account_id: AccountId,
        user_id: UserId,
        amount: f64,
        currency: impl Into<String>,
        status: TransactionStatus,
        description: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            kind: TransactionKind::Refund,
            ..Self::payment(account_id, user_id, amount, currency, status, description, now)
        }
    }

    /// Attaches the processor-side transaction id.
    pub fn with_processor_id(mut self, processor_transaction_id: impl Into<String>) -> Self {
        self.processor_transaction_id = Some(processor_transaction_id.into());
        self
    }

    /// Attaches a fee breakdown reported by the processor.
    pub fn with_fees(mut self, processor_fee: f64, net_amount: f64) -> Self {
        self.fee_breakdown = Some(FeeBreakdown { processor_fee, net_amount });
        self
    }

    /// Adds one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TransactionStatus::Failed
    }
}
