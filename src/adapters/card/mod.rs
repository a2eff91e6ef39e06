//! Card gateway integration.
//!
//! REST adapter for the card payment processor: customers, subscriptions,
//! one-off charges, refunds, and HMAC-verified webhooks.

mod adapter;
mod webhook_types;

pub use adapter::{CardGatewayAdapter, CardGatewayConfig};
pub use webhook_types::{
    CardCustomer, CardInvoice, CardPaymentIntent, CardRefund, CardSubscription, CardWebhookEvent,
    SignatureHeader, SignatureParseError,
};
