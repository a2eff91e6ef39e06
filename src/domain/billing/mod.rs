//! Billing domain: account aggregate, transaction ledger, proration math,
//! and the account status state machine.

mod account;
mod errors;
mod proration;
mod status;
mod transaction;

pub use account::{BillingAccount, ScheduledDowngrade};
pub use errors::BillingError;
pub use proration::{round_to_cents, ProrationCalculator, ProrationResult};
pub use status::AccountStatus;
pub use transaction::{FeeBreakdown, Transaction, TransactionKind, TransactionStatus};
