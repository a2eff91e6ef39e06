//! Card gateway wire types.
//!
//! These types mirror the gateway's JSON objects as they arrive in API
//! responses and webhook payloads. Amounts are minor units (cents) on the
//! wire; the adapter converts at the port boundary.

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the gateway signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty or missing.
    MissingHeader,
    /// Missing timestamp component (t=...).
    MissingTimestamp,
    /// Missing v1 signature component.
    MissingV1Signature,
    /// Invalid timestamp format.
    InvalidTimestamp,
    /// Invalid signature format (not valid hex).
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed gateway signature header components.
///
/// The header format is: `t=timestamp,v1=signature`. Unknown schemes are
/// ignored for forward compatibility.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    /// Unix timestamp when the gateway generated the event.
    pub timestamp: i64,

    /// HMAC-SHA256 signature, hex-decoded.
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parse a signature header into components.
    ///
    /// # Format
    ///
    /// ```text
    /// t=<timestamp>,v1=<hex signature>
    /// ```
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MissingTimestamp)?;

            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signature = Some(
                        hex_decode(value.trim())
                            .ok_or(SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                _ => {
                    // Ignore unknown schemes for forward compatibility
                }
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or(SignatureParseError::MissingTimestamp)?,
            v1_signature: v1_signature.ok_or(SignatureParseError::MissingV1Signature)?,
        })
    }
}

/// Decode a hex string to bytes.
fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }

    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for i in (0..hex.len()).step_by(2) {
        let byte = u8::from_str_radix(&hex[i..i + 2], 16).ok()?;
        bytes.push(byte);
    }
    Some(bytes)
}

/// Encode bytes to hex string.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Gateway Event Types
// ════════════════════════════════════════════════════════════════════════════════

/// Raw gateway webhook event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    /// Event type (e.g., "invoice.payment_failed").
    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    pub created: i64,

    /// Event payload containing the affected object.
    pub data: CardEventData,

    /// Whether this is a live or test event.
    pub livemode: bool,

    /// Gateway API version used for this event.
    pub api_version: Option<String>,

    /// Number of pending deliveries for this event.
    #[serde(default)]
    pub pending_webhooks: i32,
}

/// Event data container.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Gateway Object Types
// ════════════════════════════════════════════════════════════════════════════════

/// Gateway customer object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,

    /// Object type (always "customer").
    pub object: String,

    /// Customer email address.
    pub email: Option<String>,

    /// Customer name.
    pub name: Option<String>,

    /// Unix timestamp of creation.
    pub created: i64,

    /// Custom metadata.
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,

    /// Whether the customer has been deleted.
    #[serde(default)]
    pub deleted: bool,
}

/// Gateway payment intent object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardPaymentIntent {
    /// Unique payment identifier (pi_...).
    pub id: String,

    /// Object type (always "payment_intent").
    pub object: String,

    /// Customer the payment belongs to.
    pub customer: Option<String>,

    /// Amount in minor units (cents).
    pub amount: i64,

    /// Currency (lowercase).
    pub currency: String,

    /// Payment status (succeeded, processing, requires_action, ...).
    pub status: String,

    /// Most recent payment error, if the payment failed.
    pub last_payment_error: Option<CardPaymentError>,

    /// Custom metadata.
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

/// Error detail embedded in a failed payment intent.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardPaymentError {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Gateway subscription object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    /// Object type (always "subscription").
    pub object: String,

    /// Customer ID owning this subscription.
    pub customer: String,

    /// Subscription status.
    pub status: String,

    /// Current period start (Unix timestamp).
    pub current_period_start: i64,

    /// Current period end (Unix timestamp).
    pub current_period_end: i64,

    /// Whether subscription cancels at period end.
    #[serde(default)]
    pub cancel_at_period_end: bool,

    /// When cancellation was requested (Unix timestamp).
    pub canceled_at: Option<i64>,

    /// Custom metadata.
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,

    /// Subscription items (price/quantity pairs).
    #[serde(default)]
    pub items: CardSubscriptionItems,
}

impl CardSubscription {
    /// Price id of the first subscription item, when present.
    pub fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }
}

/// Subscription items container.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CardSubscriptionItems {
    /// Object type (always "list").
    #[serde(default)]
    pub object: String,

    /// List of subscription items.
    #[serde(default)]
    pub data: Vec<CardSubscriptionItem>,
}

/// Single subscription item.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardSubscriptionItem {
    /// Item ID.
    pub id: String,

    /// Price object.
    pub price: CardPrice,

    /// Item quantity.
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// Gateway price object (embedded in subscription items).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardPrice {
    /// Price ID.
    pub id: String,

    /// Unit amount in minor units.
    pub unit_amount: Option<i64>,

    /// Currency (lowercase).
    pub currency: String,
}

/// Gateway invoice object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardInvoice {
    /// Unique invoice identifier (in_...).
    pub id: String,

    /// Object type (always "invoice").
    pub object: String,

    /// Customer ID.
    pub customer: String,

    /// Associated subscription ID.
    pub subscription: Option<String>,

    /// Invoice status (draft, open, paid, void, uncollectible).
    pub status: String,

    /// Amount paid in minor units.
    pub amount_paid: i64,

    /// Amount due in minor units.
    pub amount_due: i64,

    /// Currency (lowercase).
    pub currency: String,

    /// Custom metadata.
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

/// Gateway refund object.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CardRefund {
    /// Unique refund identifier (re_...).
    pub id: String,

    /// Object type (always "refund").
    pub object: String,

    /// Refund status (succeeded, pending, failed).
    pub status: String,

    /// Amount refunded in minor units.
    pub amount: i64,

    /// Currency (lowercase).
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ════════════════════════════════════════════════════════════════════════════
    // SignatureHeader Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parse_signature_header_valid() {
        let header = "t=1704067200,v1=5d41402abc4b2a76b9719d911017c592";
        let parsed = SignatureHeader::parse(header).unwrap();

        assert_eq!(parsed.timestamp, 1704067200);
        assert_eq!(
            hex_encode(&parsed.v1_signature),
            "5d41402abc4b2a76b9719d911017c592"
        );
    }

    #[test]
    fn parse_signature_header_ignores_unknown_schemes() {
        let header = "t=1704067200,v1=aabbccdd,v0=11223344";
        let parsed = SignatureHeader::parse(header).unwrap();

        assert_eq!(parsed.timestamp, 1704067200);
        assert_eq!(hex_encode(&parsed.v1_signature), "aabbccdd");
    }

    #[test]
    fn parse_signature_header_missing_timestamp() {
        let header = "v1=5d41402abc4b2a76b9719d911017c592";
        let result = SignatureHeader::parse(header);
        assert!(matches!(result, Err(SignatureParseError::MissingTimestamp)));
    }

    #[test]
    fn parse_signature_header_missing_v1() {
        let header = "t=1704067200";
        let result = SignatureHeader::parse(header);
        assert!(matches!(result, Err(SignatureParseError::MissingV1Signature)));
    }

    #[test]
    fn parse_signature_header_empty() {
        let result = SignatureHeader::parse("");
        assert!(matches!(result, Err(SignatureParseError::MissingHeader)));
    }

    #[test]
    fn parse_signature_header_invalid_timestamp() {
        let header = "t=not_a_number,v1=5d41402abc4b2a76b9719d911017c592";
        let result = SignatureHeader::parse(header);
        assert!(matches!(result, Err(SignatureParseError::InvalidTimestamp)));
    }

    #[test]
    fn parse_signature_header_invalid_hex() {
        let header = "t=1704067200,v1=not_valid_hex_xyz";
        let result = SignatureHeader::parse(header);
        assert!(matches!(
            result,
            Err(SignatureParseError::InvalidSignatureFormat)
        ));
    }

    #[test]
    fn parse_signature_header_odd_length_hex() {
        let header = "t=1704067200,v1=abc";
        let result = SignatureHeader::parse(header);
        assert!(matches!(
            result,
            Err(SignatureParseError::InvalidSignatureFormat)
        ));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Hex Encoding Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn hex_encode_bytes() {
        assert_eq!(hex_encode(&[0x00, 0xff, 0x10]), "00ff10");
        assert_eq!(hex_encode(&[]), "");
    }

    #[test]
    fn hex_decode_roundtrip() {
        let original = vec![0xde, 0xad, 0xbe, 0xef];
        let encoded = hex_encode(&original);
        let decoded = hex_decode(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Event Parsing Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parse_invoice_payment_failed_event() {
        let json = r#"{
            "id": "evt_invoice_fail",
            "type": "invoice.payment_failed",
            "created": 1704067200,
            "data": {
                "object": {
                    "id": "in_test_123",
                    "object": "invoice",
                    "customer": "cus_test_xyz",
                    "subscription": "sub_test_456",
                    "status": "open",
                    "amount_paid": 0,
                    "amount_due": 2999,
                    "currency": "usd",
                    "metadata": {}
                }
            },
            "livemode": false,
            "pending_webhooks": 0
        }"#;

        let event: CardWebhookEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.id, "evt_invoice_fail");
        assert_eq!(event.event_type, "invoice.payment_failed");
        assert!(!event.livemode);

        let invoice: CardInvoice = serde_json::from_value(event.data.object).unwrap();
        assert_eq!(invoice.amount_due, 2999);
        assert_eq!(invoice.subscription, Some("sub_test_456".to_string()));
    }

    #[test]
    fn parse_subscription_object_with_items() {
        let json = r#"{
            "id": "sub_test_123",
            "object": "subscription",
            "customer": "cus_xyz",
            "status": "active",
            "current_period_start": 1704067200,
            "current_period_end": 1706745600,
            "cancel_at_period_end": false,
            "metadata": {},
            "items": {
                "object": "list",
                "data": [
                    {
                        "id": "si_abc",
                        "price": {
                            "id": "price_ind_monthly",
                            "unit_amount": 2999,
                            "currency": "usd"
                        },
                        "quantity": 1
                    }
                ]
            }
        }"#;

        let sub: CardSubscription = serde_json::from_str(json).unwrap();

        assert_eq!(sub.id, "sub_test_123");
        assert_eq!(sub.status, "active");
        assert_eq!(sub.price_id(), Some("price_ind_monthly"));
        assert_eq!(sub.items.data[0].price.unit_amount, Some(2999));
    }

    #[test]
    fn parse_subscription_without_items_defaults_empty() {
        let json = r#"{
            "id": "sub_minimal",
            "object": "subscription",
            "customer": "cus_123",
            "status": "past_due",
            "current_period_start": 1704067200,
            "current_period_end": 1706745600
        }"#;

        let sub: CardSubscription = serde_json::from_str(json).unwrap();
        assert!(sub.items.data.is_empty());
        assert!(sub.price_id().is_none());
        assert!(!sub.cancel_at_period_end);
    }

    #[test]
    fn parse_payment_intent_with_error() {
        let json = r#"{
            "id": "pi_failed",
            "object": "payment_intent",
            "customer": "cus_123",
            "amount": 3500,
            "currency": "usd",
            "status": "requires_payment_method",
            "last_payment_error": {
                "code": "card_declined",
                "message": "Your card was declined."
            }
        }"#;

        let intent: CardPaymentIntent = serde_json::from_str(json).unwrap();
        assert_eq!(intent.amount, 3500);
        let err = intent.last_payment_error.unwrap();
        assert_eq!(err.code.as_deref(), Some("card_declined"));
    }

    #[test]
    fn parse_refund_object() {
        let json = r#"{
            "id": "re_test_1",
            "object": "refund",
            "status": "succeeded",
            "amount": 1500,
            "currency": "usd"
        }"#;

        let refund: CardRefund = serde_json::from_str(json).unwrap();
        assert_eq!(refund.status, "succeeded");
        assert_eq!(refund.amount, 1500);
    }
}
