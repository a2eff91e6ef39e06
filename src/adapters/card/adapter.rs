//! Card gateway adapter.
//!
//! Talks to the card processor's REST API (form-encoded requests, JSON
//! responses, HTTP basic auth with the API key as username). Implements
//! [`PaymentProcessor`] for card-funded subscriptions and one-off charges.
//!
//! Wire amounts are minor units (cents); conversion to the port's major
//! units happens here and nowhere else.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::adapters::card::webhook_types::{
    CardCustomer, CardInvoice, CardPaymentIntent, CardRefund, CardSubscription, CardWebhookEvent,
    SignatureHeader,
};
use crate::config::CardProcessorConfig;
use crate::domain::catalog::ProcessorKind;
use crate::ports::{
    CanceledSubscription, CanonicalAction, CreateCustomerRequest, CreateSubscriptionRequest,
    CustomerProfile, EventPayload, NormalizedEvent, PaymentIntentData, PaymentOutcome,
    PaymentProcessor, PaymentRequest, PaymentStatus, ProcessorError, ProviderSubscription,
    RefundOutcome, RefundRequest, SubscriptionData, SubscriptionDelta, SubscriptionStatus,
};
use async_trait::async_trait;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it is rejected as a replay.
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Tolerance for clock skew on timestamps from the future.
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Bound on any single outbound gateway call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Card gateway connection settings.
#[derive(Debug, Clone)]
pub struct CardGatewayConfig {
    /// API key (sk_test_... or sk_live_...), sent as basic auth username.
    pub api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    pub webhook_secret: SecretString,

    /// Gateway API base URL.
    pub api_base_url: String,

    /// When true, test-mode webhook events are rejected.
    pub require_livemode: bool,
}

impl CardGatewayConfig {
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: api_base_url.into(),
            require_livemode: false,
        }
    }
}

/// Adapter for the card payment gateway.
pub struct CardGatewayAdapter {
    config: CardGatewayConfig,
    client: reqwest::Client,
}

impl CardGatewayAdapter {
    pub fn new(config: CardGatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("HTTP client construction requires a TLS backend");

        Self { config, client }
    }

    /// Build an adapter from the validated application settings.
    pub fn from_settings(settings: &CardProcessorConfig) -> Self {
        Self::new(CardGatewayConfig {
            api_key: SecretString::new(settings.api_key.clone()),
            webhook_secret: SecretString::new(settings.webhook_secret.clone()),
            api_base_url: settings.api_base_url.clone(),
            require_livemode: settings.is_live_mode(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Verify the HMAC-SHA256 signature over `{timestamp}.{body}`.
    ///
    /// Rejects events older than [`MAX_TIMESTAMP_AGE_SECS`] and events
    /// timestamped more than [`MAX_FUTURE_TOLERANCE_SECS`] into the future.
    fn verify_signature(
        &self,
        payload: &[u8],
        header: &SignatureHeader,
    ) -> Result<(), ProcessorError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            return Err(ProcessorError::signature(format!(
                "webhook timestamp too old ({} seconds)",
                age
            )));
        }
        if age < -MAX_FUTURE_TOLERANCE_SECS {
            return Err(ProcessorError::signature(
                "webhook timestamp is in the future",
            ));
        }

        let mut mac =
            HmacSha256::new_from_slice(self.config.webhook_secret.expose_secret().as_bytes())
                .expect("HMAC can take key of any size");
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        if bool::from(expected.as_slice().ct_eq(&header.v1_signature)) {
            Ok(())
        } else {
            Err(ProcessorError::signature("webhook signature mismatch"))
        }
    }

    /// Map the raw event type to our action and extract the typed payload.
    ///
    /// A payload that fails to parse downgrades the whole event to
    /// unrecognized rather than failing delivery.
    fn classify(&self, event: &CardWebhookEvent) -> (Option<CanonicalAction>, EventPayload) {
        match event.event_type.as_str() {
            "payment_intent.succeeded" | "payment_intent.payment_failed" => {
                let intent: CardPaymentIntent =
                    match serde_json::from_value(event.data.object.clone()) {
                        Ok(intent) => intent,
                        Err(err) => return self.unparsed(event, &err),
                    };
                let payload = EventPayload::Payment {
                    payment_id: intent.id,
                    customer_id: intent.customer,
                    subscription_id: None,
                    amount: Some(to_major_units(intent.amount)),
                    currency: Some(intent.currency),
                    failure_reason: intent
                        .last_payment_error
                        .and_then(|e| e.message.or(e.code)),
                };
                (canonical_action_for(&event.event_type), payload)
            }
            "invoice.paid" | "invoice.payment_failed" => {
                let invoice: CardInvoice = match serde_json::from_value(event.data.object.clone()) {
                    Ok(invoice) => invoice,
                    Err(err) => return self.unparsed(event, &err),
                };
                let amount = if invoice.amount_paid > 0 {
                    invoice.amount_paid
                } else {
                    invoice.amount_due
                };
                let payload = EventPayload::Payment {
                    payment_id: invoice.id,
                    customer_id: Some(invoice.customer),
                    subscription_id: invoice.subscription,
                    amount: Some(to_major_units(amount)),
                    currency: Some(invoice.currency),
                    failure_reason: None,
                };
                (canonical_action_for(&event.event_type), payload)
            }
            t if t.starts_with("customer.subscription.") => {
                let sub: CardSubscription = match serde_json::from_value(event.data.object.clone())
                {
                    Ok(sub) => sub,
                    Err(err) => return self.unparsed(event, &err),
                };
                let plan_ref = sub.price_id().map(str::to_string);
                let payload = EventPayload::Subscription {
                    subscription_id: sub.id,
                    customer_id: Some(sub.customer),
                    status: Some(sub.status),
                    current_period_end: Some(sub.current_period_end),
                    plan_ref,
                };
                (canonical_action_for(&event.event_type), payload)
            }
            _ => (None, EventPayload::Unrecognized),
        }
    }

    fn unparsed(
        &self,
        event: &CardWebhookEvent,
        err: &serde_json::Error,
    ) -> (Option<CanonicalAction>, EventPayload) {
        tracing::warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            error = %err,
            "card webhook payload failed to parse, treating as unrecognized"
        );
        (None, EventPayload::Unrecognized)
    }
}

/// Event types we act on, mapped to their canonical meaning.
fn canonical_action_for(event_type: &str) -> Option<CanonicalAction> {
    match event_type {
        "payment_intent.succeeded" => Some(CanonicalAction::PaymentSucceeded),
        "payment_intent.payment_failed" => Some(CanonicalAction::PaymentFailed),
        "invoice.paid" => Some(CanonicalAction::PaymentSucceeded),
        "invoice.payment_failed" => Some(CanonicalAction::SubscriptionPaymentFailed),
        "customer.subscription.created" => Some(CanonicalAction::SubscriptionCreated),
        "customer.subscription.deleted" => Some(CanonicalAction::SubscriptionCanceled),
        "customer.subscription.paused" => Some(CanonicalAction::SubscriptionSuspended),
        "customer.subscription.resumed" => Some(CanonicalAction::SubscriptionActivated),
        _ => None,
    }
}

/// Major units to gateway minor units (cents).
fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Gateway minor units (cents) to major units.
fn to_major_units(minor: i64) -> f64 {
    minor as f64 / 100.0
}

fn map_payment_status(status: &str) -> PaymentStatus {
    match status {
        "succeeded" => PaymentStatus::Succeeded,
        "processing" | "requires_action" | "requires_confirmation" => PaymentStatus::Pending,
        _ => PaymentStatus::Failed,
    }
}

fn map_subscription_status(status: &str) -> SubscriptionStatus {
    match status {
        "active" => SubscriptionStatus::Active,
        "trialing" => SubscriptionStatus::Trialing,
        "past_due" | "unpaid" => SubscriptionStatus::PastDue,
        "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
        "incomplete" => SubscriptionStatus::Incomplete,
        _ => SubscriptionStatus::Unknown,
    }
}

/// Gateway error code from an error response body, when present.
fn provider_error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let code = value.get("error")?.get("code")?.as_str()?;
    Some(code.to_string())
}

/// Classify a non-success gateway response into a processor error.
fn error_from_response(
    operation: &'static str,
    status: reqwest::StatusCode,
    body: String,
) -> ProcessorError {
    tracing::warn!(
        operation = operation,
        status = %status,
        "card gateway returned an error response"
    );

    let message = format!("{} failed with status {}: {}", operation, status, body);
    let err = match status.as_u16() {
        401 | 403 => ProcessorError::authentication(message),
        404 => ProcessorError::new(crate::ports::ProcessorErrorKind::NotFound, message),
        429 => ProcessorError::transient(message),
        code if code >= 500 => ProcessorError::transient(message),
        _ => ProcessorError::validation(message),
    };

    match provider_error_code(&body) {
        Some(code) => err.with_provider_code(code),
        None => err,
    }
}

fn request_failed(operation: &'static str, err: reqwest::Error) -> ProcessorError {
    ProcessorError::transient(format!("{} request failed: {}", operation, err))
}

fn parse_failed(operation: &'static str, err: reqwest::Error) -> ProcessorError {
    ProcessorError::validation(format!("{} response failed to parse: {}", operation, err))
}

#[async_trait]
impl PaymentProcessor for CardGatewayAdapter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Card
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerProfile, ProcessorError> {
        let mut params: Vec<(String, String)> = vec![
            ("email".to_string(), request.email.clone()),
            ("metadata[user_id]".to_string(), request.user_id.to_string()),
        ];
        if let Some(name) = &request.name {
            params.push(("name".to_string(), name.clone()));
        }

        let response = self
            .client
            .post(self.endpoint("/v1/customers"))
            .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| request_failed("create_customer", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(error_from_response("create_customer", status, body));
        }

        let customer: CardCustomer = response
            .json()
            .await
            .map_err(|e| parse_failed("create_customer", e))?;

        Ok(CustomerProfile {
            id: customer.id,
            email: customer.email.unwrap_or(request.email),
            name: customer.name,
            created_at: customer.created,
        })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, ProcessorError> {
        let mut params: Vec<(String, String)> = vec![
            ("customer".to_string(), request.customer_id),
            ("items[0][price]".to_string(), request.plan_ref),
        ];
        if let Some(days) = request.trial_days {
            params.push(("trial_period_days".to_string(), days.to_string()));
        }
        for (key, value) in &request.metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }

        let response = self
            .client
            .post(self.endpoint("/v1/subscriptions"))
            .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| request_failed("create_subscription", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(error_from_response("create_subscription", status, body));
        }

        let sub: CardSubscription = response
            .json()
            .await
            .map_err(|e| parse_failed("create_subscription", e))?;

        Ok(ProviderSubscription {
            subscription_id: sub.id,
            customer_id: Some(sub.customer),
            status: sub.status.to_lowercase(),
            current_period_end: Some(sub.current_period_end),
        })
    }

    async fn process_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome, ProcessorError> {
        if request.amount <= 0.0 {
            return Err(ProcessorError::validation("payment amount must be positive"));
        }

        let mut params: Vec<(String, String)> = vec![
            ("amount".to_string(), to_minor_units(request.amount).to_string()),
            ("currency".to_string(), request.currency),
            ("customer".to_string(), request.customer_id),
            ("description".to_string(), request.description),
            ("confirm".to_string(), "true".to_string()),
            ("off_session".to_string(), "true".to_string()),
        ];
        if let Some(method) = request.payment_method_id {
            params.push(("payment_method".to_string(), method));
        }
        for (key, value) in &request.metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }

        let response = self
            .client
            .post(self.endpoint("/v1/payment_intents"))
            .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| request_failed("process_payment", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(error_from_response("process_payment", status, body));
        }

        let intent: CardPaymentIntent = response
            .json()
            .await
            .map_err(|e| parse_failed("process_payment", e))?;

        Ok(PaymentOutcome {
            transaction_id: intent.id,
            status: map_payment_status(&intent.status),
            // Card charges are merchant-initiated; there is no approval hop.
            redirect_url: None,
            fee_breakdown: None,
        })
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<CanceledSubscription, ProcessorError> {
        let path = format!("/v1/subscriptions/{}", subscription_id);

        let response = if at_period_end {
            self.client
                .post(self.endpoint(&path))
                .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
                .form(&[("cancel_at_period_end", "true")])
                .send()
                .await
        } else {
            self.client
                .delete(self.endpoint(&path))
                .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
                .send()
                .await
        }
        .map_err(|e| request_failed("cancel_subscription", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(error_from_response("cancel_subscription", status, body));
        }

        let sub: CardSubscription = response
            .json()
            .await
            .map_err(|e| parse_failed("cancel_subscription", e))?;

        Ok(CanceledSubscription {
            subscription_id: sub.id,
            status: sub.status.to_lowercase(),
            ends_at: sub.canceled_at.or(Some(sub.current_period_end)),
        })
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        delta: SubscriptionDelta,
    ) -> Result<ProviderSubscription, ProcessorError> {
        if delta.is_empty() {
            return Err(ProcessorError::validation(
                "subscription update has no fields to apply",
            ));
        }

        let mut params: Vec<(String, String)> = Vec::new();
        if let Some(plan_ref) = delta.plan_ref {
            params.push(("items[0][price]".to_string(), plan_ref));
            // Billing-cycle proration is computed on our side and charged
            // separately; the gateway must not prorate on top of it.
            params.push(("proration_behavior".to_string(), "none".to_string()));
        }
        if let Some(quantity) = delta.quantity {
            params.push(("items[0][quantity]".to_string(), quantity.to_string()));
        }
        if let Some(flag) = delta.cancel_at_period_end {
            params.push(("cancel_at_period_end".to_string(), flag.to_string()));
        }

        let response = self
            .client
            .post(self.endpoint(&format!("/v1/subscriptions/{}", subscription_id)))
            .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| request_failed("update_subscription", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(error_from_response("update_subscription", status, body));
        }

        let sub: CardSubscription = response
            .json()
            .await
            .map_err(|e| parse_failed("update_subscription", e))?;

        Ok(ProviderSubscription {
            subscription_id: sub.id,
            customer_id: Some(sub.customer),
            status: sub.status.to_lowercase(),
            current_period_end: Some(sub.current_period_end),
        })
    }

    async fn process_refund(
        &self,
        request: RefundRequest,
    ) -> Result<RefundOutcome, ProcessorError> {
        let mut params: Vec<(String, String)> =
            vec![("payment_intent".to_string(), request.transaction_id)];
        if let Some(amount) = request.amount {
            if amount <= 0.0 {
                return Err(ProcessorError::validation("refund amount must be positive"));
            }
            params.push(("amount".to_string(), to_minor_units(amount).to_string()));
        }
        if let Some(reason) = request.reason {
            params.push(("reason".to_string(), reason));
        }

        let response = self
            .client
            .post(self.endpoint("/v1/refunds"))
            .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
            .form(&params)
            .send()
            .await
            .map_err(|e| request_failed("process_refund", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(error_from_response("process_refund", status, body));
        }

        let refund: CardRefund = response
            .json()
            .await
            .map_err(|e| parse_failed("process_refund", e))?;

        Ok(RefundOutcome {
            refund_id: refund.id,
            status: refund.status.to_lowercase(),
            amount: Some(to_major_units(refund.amount)),
        })
    }

    async fn retrieve_payment_intent(
        &self,
        payment_id: &str,
    ) -> Result<PaymentIntentData, ProcessorError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/v1/payment_intents/{}", payment_id)))
            .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
            .send()
            .await
            .map_err(|e| request_failed("retrieve_payment_intent", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(error_from_response("retrieve_payment_intent", status, body));
        }

        let intent: CardPaymentIntent = response
            .json()
            .await
            .map_err(|e| parse_failed("retrieve_payment_intent", e))?;

        Ok(PaymentIntentData {
            payment_id: intent.id,
            status: map_payment_status(&intent.status),
            amount: to_major_units(intent.amount),
            currency: intent.currency,
            customer_id: intent.customer,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionData, ProcessorError> {
        let response = self
            .client
            .get(self.endpoint(&format!("/v1/subscriptions/{}", subscription_id)))
            .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
            .send()
            .await
            .map_err(|e| request_failed("retrieve_subscription", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error response".to_string());
            return Err(error_from_response("retrieve_subscription", status, body));
        }

        let sub: CardSubscription = response
            .json()
            .await
            .map_err(|e| parse_failed("retrieve_subscription", e))?;

        let plan_ref = sub.price_id().map(str::to_string);

        Ok(SubscriptionData {
            subscription_id: sub.id,
            status: map_subscription_status(&sub.status),
            current_period_start: Some(sub.current_period_start),
            current_period_end: Some(sub.current_period_end),
            cancel_at_period_end: sub.cancel_at_period_end,
            plan_ref,
        })
    }

    async fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<NormalizedEvent, ProcessorError> {
        let header = signature_header
            .ok_or_else(|| ProcessorError::signature("missing card gateway signature header"))?;

        let parsed = SignatureHeader::parse(header)
            .map_err(|e| ProcessorError::signature(format!("malformed signature header: {}", e)))?;

        self.verify_signature(raw_body, &parsed)?;

        let event: CardWebhookEvent = serde_json::from_slice(raw_body).map_err(|e| {
            ProcessorError::validation(format!("webhook body is not a valid gateway event: {}", e))
        })?;

        if self.config.require_livemode && !event.livemode {
            return Err(ProcessorError::validation(
                "test-mode event rejected by live configuration",
            ));
        }

        let (action, payload) = self.classify(&event);

        Ok(NormalizedEvent {
            event_id: event.id,
            raw_type: event.event_type,
            action,
            occurred_at: Some(event.created),
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::card::webhook_types::hex_encode;

    fn test_adapter() -> CardGatewayAdapter {
        CardGatewayAdapter::new(CardGatewayConfig::new(
            "sk_test_abc123",
            "whsec_test_secret",
            "https://gateway.example-cards.com",
        ))
    }

    /// Build a valid signature header for a payload, the way the gateway does.
    fn create_test_signature(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let signature = hex_encode(&mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, signature)
    }

    fn invoice_failed_event_json() -> String {
        r#"{
            "id": "evt_fail_1",
            "type": "invoice.payment_failed",
            "created": 1704067200,
            "data": {
                "object": {
                    "id": "in_123",
                    "object": "invoice",
                    "customer": "cus_abc",
                    "subscription": "sub_xyz",
                    "status": "open",
                    "amount_paid": 0,
                    "amount_due": 2999,
                    "currency": "usd"
                }
            },
            "livemode": false,
            "pending_webhooks": 1
        }"#
        .to_string()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signature Verification Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn verify_signature_accepts_valid_signature() {
        let adapter = test_adapter();
        let payload = b"{\"id\":\"evt_1\"}";
        let now = chrono::Utc::now().timestamp();

        let header_str = create_test_signature("whsec_test_secret", now, payload);
        let header = SignatureHeader::parse(&header_str).unwrap();

        assert!(adapter.verify_signature(payload, &header).is_ok());
    }

    #[test]
    fn verify_signature_rejects_wrong_secret() {
        let adapter = test_adapter();
        let payload = b"{\"id\":\"evt_1\"}";
        let now = chrono::Utc::now().timestamp();

        let header_str = create_test_signature("whsec_other_secret", now, payload);
        let header = SignatureHeader::parse(&header_str).unwrap();

        let err = adapter.verify_signature(payload, &header).unwrap_err();
        assert_eq!(err.kind, crate::ports::ProcessorErrorKind::SignatureVerification);
    }

    #[test]
    fn verify_signature_rejects_tampered_payload() {
        let adapter = test_adapter();
        let now = chrono::Utc::now().timestamp();

        let header_str = create_test_signature("whsec_test_secret", now, b"original payload");
        let header = SignatureHeader::parse(&header_str).unwrap();

        let err = adapter
            .verify_signature(b"tampered payload", &header)
            .unwrap_err();
        assert_eq!(err.kind, crate::ports::ProcessorErrorKind::SignatureVerification);
    }

    #[test]
    fn verify_signature_rejects_expired_timestamp() {
        let adapter = test_adapter();
        let payload = b"{}";
        let old = chrono::Utc::now().timestamp() - MAX_TIMESTAMP_AGE_SECS - 10;

        let header_str = create_test_signature("whsec_test_secret", old, payload);
        let header = SignatureHeader::parse(&header_str).unwrap();

        let err = adapter.verify_signature(payload, &header).unwrap_err();
        assert!(err.message.contains("too old"));
    }

    #[test]
    fn verify_signature_rejects_future_timestamp() {
        let adapter = test_adapter();
        let payload = b"{}";
        let future = chrono::Utc::now().timestamp() + MAX_FUTURE_TOLERANCE_SECS + 30;

        let header_str = create_test_signature("whsec_test_secret", future, payload);
        let header = SignatureHeader::parse(&header_str).unwrap();

        let err = adapter.verify_signature(payload, &header).unwrap_err();
        assert!(err.message.contains("future"));
    }

    #[test]
    fn verify_signature_tolerates_small_clock_skew() {
        let adapter = test_adapter();
        let payload = b"{}";
        let slightly_ahead = chrono::Utc::now().timestamp() + 30;

        let header_str = create_test_signature("whsec_test_secret", slightly_ahead, payload);
        let header = SignatureHeader::parse(&header_str).unwrap();

        assert!(adapter.verify_signature(payload, &header).is_ok());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Parsing Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn verify_and_parse_maps_invoice_failure() {
        let adapter = test_adapter();
        let body = invoice_failed_event_json();
        let now = chrono::Utc::now().timestamp();
        let header = create_test_signature("whsec_test_secret", now, body.as_bytes());

        let event = adapter
            .verify_and_parse_webhook(body.as_bytes(), Some(&header))
            .await
            .unwrap();

        assert_eq!(event.event_id, "evt_fail_1");
        assert_eq!(event.raw_type, "invoice.payment_failed");
        assert_eq!(event.action, Some(CanonicalAction::SubscriptionPaymentFailed));
        assert_eq!(event.occurred_at, Some(1704067200));

        match event.payload {
            EventPayload::Payment {
                payment_id,
                subscription_id,
                amount,
                ..
            } => {
                assert_eq!(payment_id, "in_123");
                assert_eq!(subscription_id.as_deref(), Some("sub_xyz"));
                assert_eq!(amount, Some(29.99));
            }
            other => panic!("expected payment payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn verify_and_parse_rejects_missing_header() {
        let adapter = test_adapter();
        let body = invoice_failed_event_json();

        let err = adapter
            .verify_and_parse_webhook(body.as_bytes(), None)
            .await
            .unwrap_err();

        assert_eq!(err.kind, crate::ports::ProcessorErrorKind::SignatureVerification);
    }

    #[tokio::test]
    async fn verify_and_parse_rejects_bad_signature() {
        let adapter = test_adapter();
        let body = invoice_failed_event_json();
        let now = chrono::Utc::now().timestamp();
        let header = create_test_signature("whsec_wrong", now, body.as_bytes());

        let err = adapter
            .verify_and_parse_webhook(body.as_bytes(), Some(&header))
            .await
            .unwrap_err();

        assert_eq!(err.kind, crate::ports::ProcessorErrorKind::SignatureVerification);
    }

    #[tokio::test]
    async fn verify_and_parse_subscription_deleted() {
        let adapter = test_adapter();
        let body = r#"{
            "id": "evt_sub_del",
            "type": "customer.subscription.deleted",
            "created": 1704067200,
            "data": {
                "object": {
                    "id": "sub_gone",
                    "object": "subscription",
                    "customer": "cus_abc",
                    "status": "canceled",
                    "current_period_start": 1701475200,
                    "current_period_end": 1704067200,
                    "canceled_at": 1704000000
                }
            },
            "livemode": false
        }"#;
        let now = chrono::Utc::now().timestamp();
        let header = create_test_signature("whsec_test_secret", now, body.as_bytes());

        let event = adapter
            .verify_and_parse_webhook(body.as_bytes(), Some(&header))
            .await
            .unwrap();

        assert_eq!(event.action, Some(CanonicalAction::SubscriptionCanceled));
        match event.payload {
            EventPayload::Subscription {
                subscription_id,
                status,
                ..
            } => {
                assert_eq!(subscription_id, "sub_gone");
                assert_eq!(status.as_deref(), Some("canceled"));
            }
            other => panic!("expected subscription payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn verify_and_parse_unknown_type_has_no_action() {
        let adapter = test_adapter();
        let body = r#"{
            "id": "evt_dispute",
            "type": "charge.dispute.created",
            "created": 1704067200,
            "data": { "object": { "id": "dp_1" } },
            "livemode": false
        }"#;
        let now = chrono::Utc::now().timestamp();
        let header = create_test_signature("whsec_test_secret", now, body.as_bytes());

        let event = adapter
            .verify_and_parse_webhook(body.as_bytes(), Some(&header))
            .await
            .unwrap();

        assert!(event.action.is_none());
        assert!(matches!(event.payload, EventPayload::Unrecognized));
        assert_eq!(event.raw_type, "charge.dispute.created");
    }

    #[tokio::test]
    async fn verify_and_parse_subscription_updated_parses_without_action() {
        let adapter = test_adapter();
        let body = r#"{
            "id": "evt_sub_upd",
            "type": "customer.subscription.updated",
            "created": 1704067200,
            "data": {
                "object": {
                    "id": "sub_live",
                    "object": "subscription",
                    "customer": "cus_abc",
                    "status": "active",
                    "current_period_start": 1701475200,
                    "current_period_end": 1704067200
                }
            },
            "livemode": false
        }"#;
        let now = chrono::Utc::now().timestamp();
        let header = create_test_signature("whsec_test_secret", now, body.as_bytes());

        let event = adapter
            .verify_and_parse_webhook(body.as_bytes(), Some(&header))
            .await
            .unwrap();

        assert!(event.action.is_none());
        assert!(matches!(event.payload, EventPayload::Subscription { .. }));
    }

    #[tokio::test]
    async fn verify_and_parse_rejects_test_event_in_live_mode() {
        let mut config = CardGatewayConfig::new(
            "sk_live_abc",
            "whsec_test_secret",
            "https://gateway.example-cards.com",
        );
        config.require_livemode = true;
        let adapter = CardGatewayAdapter::new(config);

        let body = invoice_failed_event_json();
        let now = chrono::Utc::now().timestamp();
        let header = create_test_signature("whsec_test_secret", now, body.as_bytes());

        let err = adapter
            .verify_and_parse_webhook(body.as_bytes(), Some(&header))
            .await
            .unwrap_err();

        assert!(err.message.contains("test-mode"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Mapping Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn canonical_action_mapping_table() {
        assert_eq!(
            canonical_action_for("payment_intent.succeeded"),
            Some(CanonicalAction::PaymentSucceeded)
        );
        assert_eq!(
            canonical_action_for("payment_intent.payment_failed"),
            Some(CanonicalAction::PaymentFailed)
        );
        assert_eq!(
            canonical_action_for("invoice.paid"),
            Some(CanonicalAction::PaymentSucceeded)
        );
        assert_eq!(
            canonical_action_for("invoice.payment_failed"),
            Some(CanonicalAction::SubscriptionPaymentFailed)
        );
        assert_eq!(
            canonical_action_for("customer.subscription.created"),
            Some(CanonicalAction::SubscriptionCreated)
        );
        assert_eq!(
            canonical_action_for("customer.subscription.deleted"),
            Some(CanonicalAction::SubscriptionCanceled)
        );
        assert_eq!(
            canonical_action_for("customer.subscription.paused"),
            Some(CanonicalAction::SubscriptionSuspended)
        );
        assert_eq!(
            canonical_action_for("customer.subscription.resumed"),
            Some(CanonicalAction::SubscriptionActivated)
        );
        assert_eq!(canonical_action_for("customer.subscription.updated"), None);
        assert_eq!(canonical_action_for("charge.refunded"), None);
    }

    #[test]
    fn payment_status_mapping() {
        assert_eq!(map_payment_status("succeeded"), PaymentStatus::Succeeded);
        assert_eq!(map_payment_status("processing"), PaymentStatus::Pending);
        assert_eq!(map_payment_status("requires_action"), PaymentStatus::Pending);
        assert_eq!(
            map_payment_status("requires_payment_method"),
            PaymentStatus::Failed
        );
        assert_eq!(map_payment_status("canceled"), PaymentStatus::Failed);
    }

    #[test]
    fn subscription_status_mapping() {
        assert_eq!(map_subscription_status("active"), SubscriptionStatus::Active);
        assert_eq!(
            map_subscription_status("trialing"),
            SubscriptionStatus::Trialing
        );
        assert_eq!(
            map_subscription_status("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(map_subscription_status("unpaid"), SubscriptionStatus::PastDue);
        assert_eq!(
            map_subscription_status("canceled"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            map_subscription_status("incomplete_expired"),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            map_subscription_status("incomplete"),
            SubscriptionStatus::Incomplete
        );
        assert_eq!(
            map_subscription_status("paused"),
            SubscriptionStatus::Unknown
        );
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Unit Conversion Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn minor_unit_conversion_round_trips() {
        assert_eq!(to_minor_units(29.99), 2999);
        assert_eq!(to_minor_units(35.0), 3500);
        assert_eq!(to_minor_units(0.01), 1);
        assert_eq!(to_major_units(2999), 29.99);
        assert_eq!(to_major_units(100), 1.0);
    }

    #[test]
    fn minor_unit_conversion_rounds_float_noise() {
        // 19.99 * 100 is 1998.9999... in f64
        assert_eq!(to_minor_units(19.99), 1999);
        assert_eq!(to_minor_units(0.1 + 0.2), 30);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Error Classification Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn error_from_response_classifies_by_status() {
        use crate::ports::ProcessorErrorKind;
        use reqwest::StatusCode;

        let auth = error_from_response("op", StatusCode::UNAUTHORIZED, "{}".to_string());
        assert_eq!(auth.kind, ProcessorErrorKind::Authentication);

        let not_found = error_from_response("op", StatusCode::NOT_FOUND, "{}".to_string());
        assert_eq!(not_found.kind, ProcessorErrorKind::NotFound);

        let rate_limited =
            error_from_response("op", StatusCode::TOO_MANY_REQUESTS, "{}".to_string());
        assert_eq!(rate_limited.kind, ProcessorErrorKind::Transient);
        assert!(rate_limited.retryable);

        let server = error_from_response("op", StatusCode::BAD_GATEWAY, "{}".to_string());
        assert_eq!(server.kind, ProcessorErrorKind::Transient);

        let declined = error_from_response(
            "op",
            StatusCode::PAYMENT_REQUIRED,
            r#"{"error":{"code":"card_declined"}}"#.to_string(),
        );
        assert_eq!(declined.kind, ProcessorErrorKind::Validation);
        assert_eq!(declined.provider_code.as_deref(), Some("card_declined"));
        assert!(!declined.retryable);
    }

    #[test]
    fn provider_error_code_extraction() {
        assert_eq!(
            provider_error_code(r#"{"error":{"code":"resource_missing"}}"#),
            Some("resource_missing".to_string())
        );
        assert_eq!(provider_error_code(r#"{"error":{}}"#), None);
        assert_eq!(provider_error_code("not json"), None);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Config Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn from_settings_wires_livemode_from_key_prefix() {
        let mut settings = CardProcessorConfig {
            api_key: "sk_live_real".to_string(),
            webhook_secret: "whsec_real".to_string(),
            api_base_url: "https://gateway.example-cards.com".to_string(),
            individual_monthly_price_id: None,
            individual_yearly_price_id: None,
            dealer_monthly_price_id: None,
            dealer_yearly_price_id: None,
        };

        let live = CardGatewayAdapter::from_settings(&settings);
        assert!(live.config.require_livemode);

        settings.api_key = "sk_test_sandbox".to_string();
        let test = CardGatewayAdapter::from_settings(&settings);
        assert!(!test.config.require_livemode);
    }

    #[test]
    fn adapter_reports_card_kind() {
        assert_eq!(test_adapter().kind(), ProcessorKind::Card);
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let adapter = test_adapter();
        assert_eq!(
            adapter.endpoint("/v1/customers"),
            "https://gateway.example-cards.com/v1/customers"
        );
    }
}
