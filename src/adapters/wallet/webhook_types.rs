//! Wallet provider wire types.
//!
//! The wallet API speaks JSON with UPPERCASE status vocabulary and
//! decimal-string amounts ("29.99"). Everything optional is parsed
//! defensively; a missing field never fails event delivery.

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Raw wallet webhook event envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletWebhookEvent {
    /// Unique event identifier (WH-...).
    pub id: String,

    /// Event type (e.g., "BILLING.SUBSCRIPTION.CANCELLED").
    pub event_type: String,

    /// RFC 3339 creation time.
    #[serde(default)]
    pub create_time: Option<String>,

    /// Type of the resource in the payload.
    #[serde(default)]
    pub resource_type: Option<String>,

    /// Human-readable event summary.
    #[serde(default)]
    pub summary: Option<String>,

    /// The affected resource, shape depends on `event_type`.
    #[serde(default)]
    pub resource: serde_json::Value,
}

impl WalletWebhookEvent {
    /// Event creation time as Unix seconds, when the provider sent a
    /// parseable one.
    pub fn occurred_at(&self) -> Option<i64> {
        let raw = self.create_time.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.timestamp())
    }
}

/// Transmission metadata the transport collects from the provider's
/// webhook delivery headers, passed through as one JSON-encoded header
/// value.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletTransmission {
    pub transmission_id: String,
    pub transmission_time: String,
    pub transmission_sig: String,
    pub cert_url: String,
    pub auth_algo: String,
}

impl WalletTransmission {
    pub fn parse(header: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(header)
    }
}

/// Request body for the provider's webhook verification endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyWebhookRequest {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
    pub webhook_id: String,
    pub webhook_event: serde_json::Value,
}

/// Response from the provider's webhook verification endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyWebhookResponse {
    /// "SUCCESS" or "FAILURE".
    pub verification_status: String,
}

impl VerifyWebhookResponse {
    pub fn is_verified(&self) -> bool {
        self.verification_status.eq_ignore_ascii_case("success")
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Resource Types
// ════════════════════════════════════════════════════════════════════════════════

/// Decimal-string money amount ("29.99" + "USD").
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletAmount {
    #[serde(alias = "total")]
    pub value: String,

    #[serde(alias = "currency")]
    pub currency_code: String,
}

impl WalletAmount {
    pub fn new(value: f64, currency: &str) -> Self {
        Self {
            value: format!("{:.2}", value),
            currency_code: currency.to_uppercase(),
        }
    }

    /// Amount in major units, when the decimal string parses.
    pub fn as_major_units(&self) -> Option<f64> {
        self.value.parse().ok()
    }
}

/// Sale/capture resource carried by PAYMENT.* events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletSaleResource {
    pub id: String,

    /// Sale state (completed, denied, ...).
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub amount: Option<WalletAmount>,

    /// Subscription the sale belongs to, for recurring payments.
    #[serde(default)]
    pub billing_agreement_id: Option<String>,

    #[serde(default)]
    pub parent_payment: Option<String>,

    /// Provider's reason for a denied or reversed sale.
    #[serde(default)]
    pub reason_code: Option<String>,
}

/// Subscriber block inside a subscription resource.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WalletSubscriber {
    #[serde(default)]
    pub payer_id: Option<String>,

    #[serde(default)]
    pub email_address: Option<String>,
}

/// Billing info block inside a subscription resource.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WalletBillingInfo {
    /// RFC 3339 next charge time.
    #[serde(default)]
    pub next_billing_time: Option<String>,

    #[serde(default)]
    pub failed_payments_count: Option<u32>,
}

impl WalletBillingInfo {
    pub fn next_billing_unix(&self) -> Option<i64> {
        let raw = self.next_billing_time.as_deref()?;
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.timestamp())
    }
}

/// Subscription resource (API responses and BILLING.SUBSCRIPTION.* events).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletSubscriptionResource {
    pub id: String,

    /// UPPERCASE provider status (ACTIVE, APPROVAL_PENDING, SUSPENDED, ...).
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub plan_id: Option<String>,

    #[serde(default)]
    pub subscriber: Option<WalletSubscriber>,

    #[serde(default)]
    pub billing_info: Option<WalletBillingInfo>,

    #[serde(default)]
    pub links: Vec<WalletLink>,
}

impl WalletSubscriptionResource {
    pub fn payer_id(&self) -> Option<&str> {
        self.subscriber.as_ref()?.payer_id.as_deref()
    }

    pub fn next_billing_unix(&self) -> Option<i64> {
        self.billing_info.as_ref()?.next_billing_unix()
    }
}

/// HATEOAS link on provider responses.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletLink {
    pub href: String,
    pub rel: String,
}

/// Find the user-approval link in a link list.
pub fn approval_link(links: &[WalletLink]) -> Option<&str> {
    links
        .iter()
        .find(|link| link.rel == "approve" || link.rel == "payer-action")
        .map(|link| link.href.as_str())
}

// ════════════════════════════════════════════════════════════════════════════════
// Order Types (one-off payments)
// ════════════════════════════════════════════════════════════════════════════════

/// Request body for order creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub intent: String,
    pub purchase_units: Vec<PurchaseUnit>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_context: Option<ApplicationContext>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseUnit {
    pub amount: WalletAmount,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
}

/// Redirect targets for the provider's approval flow.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_url: Option<String>,
}

/// Order resource returned on creation and retrieval.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletOrderResource {
    pub id: String,

    /// UPPERCASE order status (CREATED, APPROVED, COMPLETED, VOIDED).
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub purchase_units: Vec<OrderPurchaseUnit>,

    #[serde(default)]
    pub payer: Option<WalletSubscriber>,

    #[serde(default)]
    pub links: Vec<WalletLink>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrderPurchaseUnit {
    #[serde(default)]
    pub amount: Option<WalletAmount>,
}

impl WalletOrderResource {
    pub fn first_amount(&self) -> Option<&WalletAmount> {
        self.purchase_units.first()?.amount.as_ref()
    }
}

/// Refund resource returned by the refund endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletRefundResource {
    pub id: String,

    /// UPPERCASE refund status (COMPLETED, PENDING, FAILED).
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub amount: Option<WalletAmount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_amount_parses_decimal_string() {
        let amount = WalletAmount {
            value: "29.99".to_string(),
            currency_code: "USD".to_string(),
        };
        assert_eq!(amount.as_major_units(), Some(29.99));
    }

    #[test]
    fn wallet_amount_formats_two_decimals() {
        let amount = WalletAmount::new(35.0, "usd");
        assert_eq!(amount.value, "35.00");
        assert_eq!(amount.currency_code, "USD");
    }

    #[test]
    fn wallet_amount_accepts_legacy_field_names() {
        // Sale resources use total/currency instead of value/currency_code
        let json = r#"{"total": "99.99", "currency": "USD"}"#;
        let amount: WalletAmount = serde_json::from_str(json).unwrap();
        assert_eq!(amount.as_major_units(), Some(99.99));
    }

    #[test]
    fn parse_subscription_cancelled_event() {
        let json = r#"{
            "id": "WH-2WR32451HC0233532-67976317FL4543714",
            "event_type": "BILLING.SUBSCRIPTION.CANCELLED",
            "create_time": "2024-01-15T10:30:00Z",
            "resource_type": "subscription",
            "summary": "A billing subscription was cancelled",
            "resource": {
                "id": "I-BW452GLLEP1G",
                "status": "CANCELLED",
                "plan_id": "P-IND-MONTHLY",
                "subscriber": {
                    "payer_id": "PAYER123",
                    "email_address": "buyer@example.com"
                }
            }
        }"#;

        let event: WalletWebhookEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "BILLING.SUBSCRIPTION.CANCELLED");
        assert!(event.occurred_at().is_some());

        let resource: WalletSubscriptionResource =
            serde_json::from_value(event.resource).unwrap();
        assert_eq!(resource.id, "I-BW452GLLEP1G");
        assert_eq!(resource.status.as_deref(), Some("CANCELLED"));
        assert_eq!(resource.payer_id(), Some("PAYER123"));
    }

    #[test]
    fn parse_sale_completed_event() {
        let json = r#"{
            "id": "WH-SALE-1",
            "event_type": "PAYMENT.SALE.COMPLETED",
            "create_time": "2024-01-15T10:30:00Z",
            "resource": {
                "id": "SALE-789",
                "state": "completed",
                "amount": { "total": "29.99", "currency": "USD" },
                "billing_agreement_id": "I-BW452GLLEP1G"
            }
        }"#;

        let event: WalletWebhookEvent = serde_json::from_str(json).unwrap();
        let sale: WalletSaleResource = serde_json::from_value(event.resource).unwrap();

        assert_eq!(sale.id, "SALE-789");
        assert_eq!(
            sale.billing_agreement_id.as_deref(),
            Some("I-BW452GLLEP1G")
        );
        assert_eq!(sale.amount.unwrap().as_major_units(), Some(29.99));
    }

    #[test]
    fn envelope_tolerates_missing_optional_fields() {
        let json = r#"{"id": "WH-BARE", "event_type": "SOMETHING.NEW"}"#;
        let event: WalletWebhookEvent = serde_json::from_str(json).unwrap();

        assert!(event.create_time.is_none());
        assert!(event.occurred_at().is_none());
        assert!(event.resource.is_null());
    }

    #[test]
    fn invalid_create_time_yields_no_timestamp() {
        let json = r#"{"id": "WH-X", "event_type": "E", "create_time": "yesterday"}"#;
        let event: WalletWebhookEvent = serde_json::from_str(json).unwrap();
        assert!(event.occurred_at().is_none());
    }

    #[test]
    fn approval_link_finds_approve_rel() {
        let links = vec![
            WalletLink {
                href: "https://api.example-wallet.com/self".to_string(),
                rel: "self".to_string(),
            },
            WalletLink {
                href: "https://wallet.example.com/approve?token=abc".to_string(),
                rel: "approve".to_string(),
            },
        ];

        assert_eq!(
            approval_link(&links),
            Some("https://wallet.example.com/approve?token=abc")
        );
        assert!(approval_link(&links[..1]).is_none());
    }

    #[test]
    fn transmission_parses_from_json_header() {
        let header = r#"{
            "transmission_id": "69cd13f0-d67a-11e5",
            "transmission_time": "2024-01-15T10:30:00Z",
            "transmission_sig": "lmI95Jx4Td7wI...",
            "cert_url": "https://api.example-wallet.com/certs/CERT-360",
            "auth_algo": "SHA256withRSA"
        }"#;

        let transmission = WalletTransmission::parse(header).unwrap();
        assert_eq!(transmission.transmission_id, "69cd13f0-d67a-11e5");
        assert_eq!(transmission.auth_algo, "SHA256withRSA");
    }

    #[test]
    fn verification_status_is_case_insensitive() {
        let ok = VerifyWebhookResponse {
            verification_status: "SUCCESS".to_string(),
        };
        let fail = VerifyWebhookResponse {
            verification_status: "FAILURE".to_string(),
        };

        assert!(ok.is_verified());
        assert!(!fail.is_verified());
    }

    #[test]
    fn subscription_resource_next_billing_time() {
        let json = r#"{
            "id": "I-SUB1",
            "status": "ACTIVE",
            "billing_info": { "next_billing_time": "2024-02-15T00:00:00Z" }
        }"#;

        let resource: WalletSubscriptionResource = serde_json::from_str(json).unwrap();
        assert_eq!(resource.next_billing_unix(), Some(1707955200));
    }

    #[test]
    fn order_request_omits_empty_context() {
        let request = CreateOrderRequest {
            intent: "CAPTURE".to_string(),
            purchase_units: vec![PurchaseUnit {
                amount: WalletAmount::new(35.0, "usd"),
                description: Some("plan upgrade".to_string()),
                custom_id: None,
            }],
            application_context: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("application_context").is_none());
        assert_eq!(json["purchase_units"][0]["amount"]["value"], "35.00");
        assert!(json["purchase_units"][0].get("custom_id").is_none());
    }
}
