//! Harborline Billing - Multi-Processor Subscription Billing Engine
//!
//! This crate owns the subscription lifecycle for the Harborline marketplace
//! (creation, proration, renewal, cancellation, grace periods) behind a
//! processor-agnostic payment contract with interchangeable provider adapters.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
