//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the engine to external systems:
//! - `card` - Card gateway (form-encoded API, HMAC-signed webhooks)
//! - `wallet` - Wallet provider (OAuth tokens, redirect approval flows)
//! - `store` - Persistence backends
//! - `mock_processor` - Scriptable processor double for tests

pub mod card;
pub mod mock_processor;
pub mod store;
pub mod wallet;

pub use card::{CardGatewayAdapter, CardGatewayConfig};
pub use mock_processor::MockProcessor;
pub use store::{InMemoryAccountStore, InMemoryWebhookEventStore};
pub use wallet::{WalletProviderAdapter, WalletProviderConfig};
