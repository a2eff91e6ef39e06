//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Processor Ports
//!
//! - `PaymentProcessor` - Contract every payment processor adapter satisfies
//!
//! ## Persistence Ports
//!
//! - `AccountStore` - Billing accounts, transaction ledger, entitlements
//! - `WebhookEventStore` - Webhook idempotency claims

mod account_store;
mod payment_processor;
mod webhook_event_store;

pub use account_store::{AccountPatch, AccountStore, EntitlementPatch};
pub use payment_processor::{
    CanceledSubscription, CanonicalAction, CreateCustomerRequest, CreateSubscriptionRequest,
    CustomerProfile, EventPayload, NormalizedEvent, PaymentIntentData, PaymentOutcome,
    PaymentProcessor, PaymentRequest, PaymentStatus, ProcessorError, ProcessorErrorKind,
    ProviderSubscription, RefundOutcome, RefundRequest, SubscriptionData, SubscriptionDelta,
    SubscriptionStatus,
};
pub use webhook_event_store::{SaveResult, WebhookEventRecord, WebhookEventStore};
