//! Application layer - lifecycle commands, webhook intake, renewal scheduling.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Everything that mutates a billing account funnels through the per-account
//! locks in [`locks`], so the three entry points (lifecycle commands, webhook
//! deliveries, scheduler passes) can run concurrently without stepping on
//! each other.

pub mod lifecycle;
pub mod locks;
pub mod renewals;
pub mod webhooks;

pub use lifecycle::{
    CancelSubscriptionCommand, CancelSubscriptionResult, ChangePlanCommand, ChangePlanResult,
    CreateSubscriptionCommand, CreateSubscriptionResult, IssueRefundCommand, IssueRefundResult,
    ScheduleDowngradeCommand, ScheduleDowngradeResult, SubscriptionLifecycleManager,
};
pub use locks::{AccountLockMap, TickGuard};
pub use renewals::{RenewalOutcome, RenewalPassSummary, RenewalScheduler};
pub use webhooks::{WebhookOutcome, WebhookProcessor};
