//! Store adapters.
//!
//! Implementations of the persistence ports. The in-memory backend serves
//! the test suites and single-process local runs.

mod in_memory;

pub use in_memory::{EntitlementRecord, InMemoryAccountStore, InMemoryWebhookEventStore};
