//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `catalog` - Subscription plans, billing cycles, processor plan references
//! - `billing` - Account aggregate, transactions, proration, status machine

pub mod billing;
pub mod catalog;
pub mod foundation;
