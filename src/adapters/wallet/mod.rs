//! Wallet provider integration.
//!
//! JSON REST adapter for the wallet payment provider: OAuth
//! client-credentials tokens, redirect-approval payments, and remotely
//! verified webhooks.

mod adapter;
mod token;
mod webhook_types;

pub use adapter::{WalletProviderAdapter, WalletProviderConfig};
pub use webhook_types::{
    WalletAmount, WalletOrderResource, WalletSaleResource, WalletSubscriptionResource,
    WalletTransmission, WalletWebhookEvent,
};
