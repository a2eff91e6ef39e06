//! Wallet provider adapter.
//!
//! Talks to the wallet provider's JSON REST API with OAuth bearer tokens
//! (client-credentials grant, cached by [`TokenSource`]). One-off payments
//! are approval-based: order creation returns a redirect URL the payer must
//! visit, so callers see `PaymentStatus::Pending` plus `redirect_url`.
//!
//! The provider has no customer pre-registration and cannot defer a
//! cancellation; both gaps are bridged locally and documented on the
//! affected methods.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::adapters::wallet::token::TokenSource;
use crate::adapters::wallet::webhook_types::{
    approval_link, ApplicationContext, CreateOrderRequest, PurchaseUnit, VerifyWebhookRequest,
    VerifyWebhookResponse, WalletAmount, WalletBillingInfo, WalletLink, WalletOrderResource,
    WalletRefundResource, WalletSaleResource, WalletSubscriptionResource, WalletTransmission,
    WalletWebhookEvent,
};
use crate::config::WalletProcessorConfig;
use crate::domain::catalog::ProcessorKind;
use crate::ports::{
    CanceledSubscription, CanonicalAction, CreateCustomerRequest, CreateSubscriptionRequest,
    CustomerProfile, EventPayload, NormalizedEvent, PaymentIntentData, PaymentOutcome,
    PaymentProcessor, PaymentRequest, PaymentStatus, ProcessorError, ProviderSubscription,
    RefundOutcome, RefundRequest, SubscriptionData, SubscriptionDelta, SubscriptionStatus,
};
use async_trait::async_trait;

/// Bound on any single outbound provider call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Wallet provider connection settings.
#[derive(Debug, Clone)]
pub struct WalletProviderConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub api_base_url: String,

    /// Provider-registered webhook id. `None` disables remote signature
    /// verification; events are then parsed defensively with a loud log.
    pub webhook_id: Option<String>,

    /// Redirect target after payment approval.
    pub return_url: Option<String>,

    /// Redirect target after payment decline.
    pub cancel_url: Option<String>,
}

impl WalletProviderConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: SecretString::new(client_secret.into()),
            api_base_url: api_base_url.into(),
            webhook_id: None,
            return_url: None,
            cancel_url: None,
        }
    }
}

/// Adapter for the wallet payment provider.
pub struct WalletProviderAdapter {
    config: WalletProviderConfig,
    tokens: TokenSource,
    client: reqwest::Client,
}

// ════════════════════════════════════════════════════════════════════════════════
// Request Bodies
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
struct CreateWalletSubscriptionBody {
    plan_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    custom_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    application_context: Option<ApplicationContext>,
}

#[derive(Debug, Serialize)]
struct CancelSubscriptionBody {
    reason: String,
}

#[derive(Debug, Serialize)]
struct ReviseSubscriptionBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    plan_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<String>,
}

#[derive(Debug, Serialize)]
struct RefundCaptureBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    amount: Option<WalletAmount>,

    #[serde(skip_serializing_if = "Option::is_none")]
    note_to_payer: Option<String>,
}

/// Revise responses report less than the full subscription resource;
/// everything here is optional.
#[derive(Debug, Deserialize)]
struct RevisedSubscription {
    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    status: Option<String>,

    #[serde(default)]
    billing_info: Option<WalletBillingInfo>,

    #[serde(default)]
    links: Vec<WalletLink>,
}

impl WalletProviderAdapter {
    pub fn new(config: WalletProviderConfig) -> Self {
        let tokens = TokenSource::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            &config.api_base_url,
        );
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("HTTP client construction requires a TLS backend");

        Self {
            config,
            tokens,
            client,
        }
    }

    /// Build an adapter from the validated application settings.
    pub fn from_settings(settings: &WalletProcessorConfig) -> Self {
        let mut config = WalletProviderConfig::new(
            settings.client_id.clone(),
            settings.client_secret.clone(),
            settings.api_base_url.clone(),
        );
        config.webhook_id = settings.webhook_id.clone();
        config.return_url = settings.return_url.clone();
        config.cancel_url = settings.cancel_url.clone();
        Self::new(config)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn bearer(&self) -> Result<String, ProcessorError> {
        self.tokens.bearer_token(&self.client).await
    }

    fn application_context(&self) -> Option<ApplicationContext> {
        if self.config.return_url.is_none() && self.config.cancel_url.is_none() {
            return None;
        }
        Some(ApplicationContext {
            return_url: self.config.return_url.clone(),
            cancel_url: self.config.cancel_url.clone(),
        })
    }

    /// Pass through a successful response; classify anything else. A 401
    /// also drops the cached token so the next operation re-authenticates.
    async fn check_response(
        &self,
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProcessorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error response".to_string());

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        Err(error_from_response(operation, status, body))
    }

    async fn verify_remotely(
        &self,
        webhook_id: &str,
        transmission: &WalletTransmission,
        raw_body: &[u8],
    ) -> Result<(), ProcessorError> {
        let webhook_event: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| ProcessorError::validation(format!("webhook body is not JSON: {}", e)))?;

        let request = VerifyWebhookRequest {
            auth_algo: transmission.auth_algo.clone(),
            cert_url: transmission.cert_url.clone(),
            transmission_id: transmission.transmission_id.clone(),
            transmission_sig: transmission.transmission_sig.clone(),
            transmission_time: transmission.transmission_time.clone(),
            webhook_id: webhook_id.to_string(),
            webhook_event,
        };

        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.endpoint("/v1/notifications/verify-webhook-signature"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed("verify_webhook", e))?;

        let response = self.check_response("verify_webhook", response).await?;
        let verdict: VerifyWebhookResponse = response
            .json()
            .await
            .map_err(|e| parse_failed("verify_webhook", e))?;

        if verdict.is_verified() {
            Ok(())
        } else {
            Err(ProcessorError::signature(
                "wallet provider rejected the webhook signature",
            ))
        }
    }

    /// Map the raw event type to our action and extract the typed payload.
    fn classify(&self, event: &WalletWebhookEvent) -> (Option<CanonicalAction>, EventPayload) {
        match event.event_type.as_str() {
            t if t.starts_with("PAYMENT.SALE.") => {
                let sale: WalletSaleResource = match serde_json::from_value(event.resource.clone())
                {
                    Ok(sale) => sale,
                    Err(err) => return self.unparsed(event, &err),
                };
                let amount = sale.amount.as_ref().and_then(WalletAmount::as_major_units);
                let currency = sale
                    .amount
                    .as_ref()
                    .map(|a| a.currency_code.to_lowercase());
                let payload = EventPayload::Payment {
                    payment_id: sale.id,
                    customer_id: None,
                    subscription_id: sale.billing_agreement_id,
                    amount,
                    currency,
                    failure_reason: sale.reason_code,
                };
                (canonical_action_for(&event.event_type), payload)
            }
            t if t.starts_with("BILLING.SUBSCRIPTION.") => {
                let sub: WalletSubscriptionResource =
                    match serde_json::from_value(event.resource.clone()) {
                        Ok(sub) => sub,
                        Err(err) => return self.unparsed(event, &err),
                    };
                let payload = EventPayload::Subscription {
                    customer_id: sub.payer_id().map(str::to_string),
                    current_period_end: sub.next_billing_unix(),
                    subscription_id: sub.id,
                    status: sub.status.map(|s| s.to_lowercase()),
                    plan_ref: sub.plan_id,
                };
                (canonical_action_for(&event.event_type), payload)
            }
            _ => (None, EventPayload::Unrecognized),
        }
    }

    fn unparsed(
        &self,
        event: &WalletWebhookEvent,
        err: &serde_json::Error,
    ) -> (Option<CanonicalAction>, EventPayload) {
        tracing::warn!(
            event_id = %event.id,
            event_type = %event.event_type,
            error = %err,
            "wallet webhook resource failed to parse, treating as unrecognized"
        );
        (None, EventPayload::Unrecognized)
    }
}

/// Event types we act on, mapped to their canonical meaning.
fn canonical_action_for(event_type: &str) -> Option<CanonicalAction> {
    match event_type {
        "PAYMENT.SALE.COMPLETED" => Some(CanonicalAction::PaymentSucceeded),
        "PAYMENT.SALE.DENIED" => Some(CanonicalAction::PaymentFailed),
        "BILLING.SUBSCRIPTION.CREATED" => Some(CanonicalAction::SubscriptionCreated),
        "BILLING.SUBSCRIPTION.ACTIVATED" => Some(CanonicalAction::SubscriptionActivated),
        "BILLING.SUBSCRIPTION.CANCELLED" => Some(CanonicalAction::SubscriptionCanceled),
        "BILLING.SUBSCRIPTION.SUSPENDED" => Some(CanonicalAction::SubscriptionSuspended),
        "BILLING.SUBSCRIPTION.PAYMENT.FAILED" => {
            Some(CanonicalAction::SubscriptionPaymentFailed)
        }
        _ => None,
    }
}

fn map_order_status(status: Option<&str>) -> PaymentStatus {
    match status.unwrap_or("") {
        "COMPLETED" => PaymentStatus::Succeeded,
        "CREATED" | "SAVED" | "APPROVED" | "PAYER_ACTION_REQUIRED" => PaymentStatus::Pending,
        _ => PaymentStatus::Failed,
    }
}

fn map_wallet_subscription_status(status: Option<&str>) -> SubscriptionStatus {
    match status.unwrap_or("") {
        "ACTIVE" => SubscriptionStatus::Active,
        "APPROVAL_PENDING" | "APPROVED" => SubscriptionStatus::Incomplete,
        "SUSPENDED" => SubscriptionStatus::PastDue,
        "CANCELLED" | "EXPIRED" => SubscriptionStatus::Canceled,
        _ => SubscriptionStatus::Unknown,
    }
}

/// Provider error name from an error response body, when present.
fn provider_error_name(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let name = value.get("name")?.as_str()?;
    Some(name.to_string())
}

/// Classify a non-success wallet response into a processor error.
fn error_from_response(
    operation: &'static str,
    status: reqwest::StatusCode,
    body: String,
) -> ProcessorError {
    tracing::warn!(
        operation = operation,
        status = %status,
        "wallet provider returned an error response"
    );

    let message = format!("{} failed with status {}: {}", operation, status, body);
    let err = match status.as_u16() {
        401 | 403 => ProcessorError::authentication(message),
        404 => ProcessorError::new(crate::ports::ProcessorErrorKind::NotFound, message),
        429 => ProcessorError::transient(message),
        code if code >= 500 => ProcessorError::transient(message),
        _ => ProcessorError::validation(message),
    };

    match provider_error_name(&body) {
        Some(name) => err.with_provider_code(name),
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
impl PaymentProcessor for WalletProviderAdapter {
    fn kind(&self) -> ProcessorKind {
        ProcessorKind::Wallet
    }

    /// The wallet provider has no customer pre-registration; the payer
    /// binds to a subscription at approval time. Mint a local reference so
    /// the engine treats both processors uniformly. No outbound call.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerProfile, ProcessorError> {
        Ok(CustomerProfile {
            id: format!("wallet_{}", uuid::Uuid::new_v4()),
            email: request.email,
            name: request.name,
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, ProcessorError> {
        // Trial periods live on the provider-side plan definition, not the
        // subscription request; `trial_days` is handled by the caller's
        // next_billing_date computation.
        let body = CreateWalletSubscriptionBody {
            plan_id: request.plan_ref,
            custom_id: request.metadata.get("user_id").cloned(),
            application_context: self.application_context(),
        };

        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.endpoint("/v1/billing/subscriptions"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed("create_subscription", e))?;

        let response = self.check_response("create_subscription", response).await?;
        let resource: WalletSubscriptionResource = response
            .json()
            .await
            .map_err(|e| parse_failed("create_subscription", e))?;

        Ok(ProviderSubscription {
            customer_id: resource.payer_id().map(str::to_string),
            current_period_end: resource.next_billing_unix(),
            subscription_id: resource.id,
            status: resource
                .status
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| "approval_pending".to_string()),
        })
    }

    async fn process_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome, ProcessorError> {
        if request.amount <= 0.0 {
            return Err(ProcessorError::validation("payment amount must be positive"));
        }

        let body = CreateOrderRequest {
            intent: "CAPTURE".to_string(),
            purchase_units: vec![PurchaseUnit {
                amount: WalletAmount::new(request.amount, &request.currency),
                description: Some(request.description),
                custom_id: request.metadata.get("user_id").cloned(),
            }],
            application_context: self.application_context(),
        };

        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.endpoint("/v2/checkout/orders"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed("process_payment", e))?;

        let response = self.check_response("process_payment", response).await?;
        let order: WalletOrderResource = response
            .json()
            .await
            .map_err(|e| parse_failed("process_payment", e))?;

        Ok(PaymentOutcome {
            transaction_id: order.id.clone(),
            status: map_order_status(order.status.as_deref()),
            redirect_url: approval_link(&order.links).map(str::to_string),
            fee_breakdown: None,
        })
    }

    /// The wallet provider cancels immediately in all cases; period-end
    /// access is enforced locally by the engine's own billing dates.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<CanceledSubscription, ProcessorError> {
        let reason = if at_period_end {
            "cancellation requested, access runs to period end"
        } else {
            "immediate cancellation requested"
        };
        let body = CancelSubscriptionBody {
            reason: reason.to_string(),
        };

        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.endpoint(&format!(
                "/v1/billing/subscriptions/{}/cancel",
                subscription_id
            )))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed("cancel_subscription", e))?;

        // Success is 204 with no body
        self.check_response("cancel_subscription", response).await?;

        Ok(CanceledSubscription {
            subscription_id: subscription_id.to_string(),
            status: "cancelled".to_string(),
            ends_at: None,
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
        if delta.cancel_at_period_end.is_some() {
            return Err(ProcessorError::validation(
                "wallet provider cannot defer cancellation; use cancel_subscription",
            ));
        }

        let body = ReviseSubscriptionBody {
            plan_id: delta.plan_ref,
            quantity: delta.quantity.map(|q| q.to_string()),
        };

        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.endpoint(&format!(
                "/v1/billing/subscriptions/{}/revise",
                subscription_id
            )))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed("update_subscription", e))?;

        let response = self.check_response("update_subscription", response).await?;
        let revised: RevisedSubscription = response
            .json()
            .await
            .map_err(|e| parse_failed("update_subscription", e))?;

        // Revise responses omit status; an approval link means the payer
        // must confirm the change first.
        let status = revised.status.map(|s| s.to_lowercase()).unwrap_or_else(|| {
            if approval_link(&revised.links).is_some() {
                "approval_pending".to_string()
            } else {
                "active".to_string()
            }
        });

        Ok(ProviderSubscription {
            subscription_id: revised.id.unwrap_or_else(|| subscription_id.to_string()),
            customer_id: None,
            status,
            current_period_end: revised.billing_info.as_ref().and_then(|b| b.next_billing_unix()),
        })
    }

    async fn process_refund(
        &self,
        request: RefundRequest,
    ) -> Result<RefundOutcome, ProcessorError> {
        let amount = match (request.amount, request.currency.as_deref()) {
            (Some(value), Some(currency)) => {
                if value <= 0.0 {
                    return Err(ProcessorError::validation("refund amount must be positive"));
                }
                Some(WalletAmount::new(value, currency))
            }
            (Some(_), None) => {
                return Err(ProcessorError::validation(
                    "partial wallet refund requires a currency",
                ));
            }
            (None, _) => None,
        };

        let body = RefundCaptureBody {
            amount,
            note_to_payer: request.reason,
        };

        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.endpoint(&format!(
                "/v2/payments/captures/{}/refund",
                request.transaction_id
            )))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| request_failed("process_refund", e))?;

        let response = self.check_response("process_refund", response).await?;
        let refund: WalletRefundResource = response
            .json()
            .await
            .map_err(|e| parse_failed("process_refund", e))?;

        Ok(RefundOutcome {
            refund_id: refund.id,
            status: refund
                .status
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| "pending".to_string()),
            amount: refund.amount.as_ref().and_then(WalletAmount::as_major_units),
        })
    }

    async fn retrieve_payment_intent(
        &self,
        payment_id: &str,
    ) -> Result<PaymentIntentData, ProcessorError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .get(self.endpoint(&format!("/v2/checkout/orders/{}", payment_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| request_failed("retrieve_payment_intent", e))?;

        let response = self
            .check_response("retrieve_payment_intent", response)
            .await?;
        let order: WalletOrderResource = response
            .json()
            .await
            .map_err(|e| parse_failed("retrieve_payment_intent", e))?;

        let amount = order
            .first_amount()
            .and_then(WalletAmount::as_major_units)
            .unwrap_or(0.0);
        let currency = order
            .first_amount()
            .map(|a| a.currency_code.to_lowercase())
            .unwrap_or_default();

        Ok(PaymentIntentData {
            status: map_order_status(order.status.as_deref()),
            customer_id: order
                .payer
                .as_ref()
                .and_then(|p| p.payer_id.clone()),
            payment_id: order.id,
            amount,
            currency,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionData, ProcessorError> {
        let token = self.bearer().await?;
        let response = self
            .client
            .get(self.endpoint(&format!("/v1/billing/subscriptions/{}", subscription_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| request_failed("retrieve_subscription", e))?;

        let response = self
            .check_response("retrieve_subscription", response)
            .await?;
        let resource: WalletSubscriptionResource = response
            .json()
            .await
            .map_err(|e| parse_failed("retrieve_subscription", e))?;

        Ok(SubscriptionData {
            status: map_wallet_subscription_status(resource.status.as_deref()),
            current_period_start: None,
            current_period_end: resource.next_billing_unix(),
            cancel_at_period_end: false,
            plan_ref: resource.plan_id.clone(),
            subscription_id: resource.id,
        })
    }

    async fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<NormalizedEvent, ProcessorError> {
        let event: WalletWebhookEvent = serde_json::from_slice(raw_body).map_err(|e| {
            ProcessorError::validation(format!("webhook body is not a valid wallet event: {}", e))
        })?;

        match (self.config.webhook_id.as_deref(), signature_header) {
            (Some(webhook_id), Some(header)) => {
                let transmission = WalletTransmission::parse(header).map_err(|e| {
                    ProcessorError::signature(format!("malformed transmission header: {}", e))
                })?;
                self.verify_remotely(webhook_id, &transmission, raw_body)
                    .await?;
            }
            (Some(_), None) => {
                return Err(ProcessorError::signature(
                    "missing wallet transmission header",
                ));
            }
            (None, _) => {
                tracing::warn!(
                    event_id = %event.id,
                    "wallet webhook accepted without signature verification; no webhook id configured"
                );
            }
        }

        let occurred_at = event.occurred_at();
        let (action, payload) = self.classify(&event);

        Ok(NormalizedEvent {
            event_id: event.id,
            raw_type: event.event_type,
            action,
            occurred_at,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_adapter() -> WalletProviderAdapter {
        WalletProviderAdapter::new(WalletProviderConfig::new(
            "client-abc",
            "secret-xyz",
            "https://api.sandbox.example-wallet.com",
        ))
    }

    fn sale_completed_json() -> String {
        r#"{
            "id": "WH-SALE-COMPLETE-1",
            "event_type": "PAYMENT.SALE.COMPLETED",
            "create_time": "2024-01-15T10:30:00Z",
            "resource": {
                "id": "SALE-789",
                "state": "completed",
                "amount": { "total": "29.99", "currency": "USD" },
                "billing_agreement_id": "I-BW452GLLEP1G"
            }
        }"#
        .to_string()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Tests (parse-only path, no webhook id configured)
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn parses_sale_completed_without_verification() {
        let adapter = test_adapter();
        let body = sale_completed_json();

        let event = adapter
            .verify_and_parse_webhook(body.as_bytes(), None)
            .await
            .unwrap();

        assert_eq!(event.event_id, "WH-SALE-COMPLETE-1");
        assert_eq!(event.action, Some(CanonicalAction::PaymentSucceeded));
        assert!(event.occurred_at.is_some());

        match event.payload {
            EventPayload::Payment {
                payment_id,
                subscription_id,
                amount,
                currency,
                ..
            } => {
                assert_eq!(payment_id, "SALE-789");
                assert_eq!(subscription_id.as_deref(), Some("I-BW452GLLEP1G"));
                assert_eq!(amount, Some(29.99));
                assert_eq!(currency.as_deref(), Some("usd"));
            }
            other => panic!("expected payment payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn parses_subscription_suspended() {
        let adapter = test_adapter();
        let body = r#"{
            "id": "WH-SUSPEND-1",
            "event_type": "BILLING.SUBSCRIPTION.SUSPENDED",
            "create_time": "2024-01-15T10:30:00Z",
            "resource": {
                "id": "I-SUSPENDED",
                "status": "SUSPENDED",
                "plan_id": "P-IND-MONTHLY"
            }
        }"#;

        let event = adapter
            .verify_and_parse_webhook(body.as_bytes(), None)
            .await
            .unwrap();

        assert_eq!(event.action, Some(CanonicalAction::SubscriptionSuspended));
        match event.payload {
            EventPayload::Subscription {
                subscription_id,
                status,
                plan_ref,
                ..
            } => {
                assert_eq!(subscription_id, "I-SUSPENDED");
                assert_eq!(status.as_deref(), Some("suspended"));
                assert_eq!(plan_ref.as_deref(), Some("P-IND-MONTHLY"));
            }
            other => panic!("expected subscription payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_event_type_yields_no_action() {
        let adapter = test_adapter();
        let body = r#"{
            "id": "WH-UNKNOWN",
            "event_type": "CUSTOMER.DISPUTE.CREATED",
            "resource": { "id": "D-1" }
        }"#;

        let event = adapter
            .verify_and_parse_webhook(body.as_bytes(), None)
            .await
            .unwrap();

        assert!(event.action.is_none());
        assert!(matches!(event.payload, EventPayload::Unrecognized));
    }

    #[tokio::test]
    async fn malformed_resource_downgrades_to_unrecognized() {
        let adapter = test_adapter();
        // PAYMENT.SALE.* resource missing the required id
        let body = r#"{
            "id": "WH-BROKEN",
            "event_type": "PAYMENT.SALE.COMPLETED",
            "resource": { "state": "completed" }
        }"#;

        let event = adapter
            .verify_and_parse_webhook(body.as_bytes(), None)
            .await
            .unwrap();

        assert!(event.action.is_none());
        assert!(matches!(event.payload, EventPayload::Unrecognized));
    }

    #[tokio::test]
    async fn rejects_invalid_json_body() {
        let adapter = test_adapter();

        let err = adapter
            .verify_and_parse_webhook(b"not json at all", None)
            .await
            .unwrap_err();

        assert_eq!(err.kind, crate::ports::ProcessorErrorKind::Validation);
    }

    #[tokio::test]
    async fn requires_transmission_header_when_webhook_id_configured() {
        let mut config = WalletProviderConfig::new(
            "client-abc",
            "secret-xyz",
            "https://api.sandbox.example-wallet.com",
        );
        config.webhook_id = Some("WH-ID-123".to_string());
        let adapter = WalletProviderAdapter::new(config);

        let err = adapter
            .verify_and_parse_webhook(sale_completed_json().as_bytes(), None)
            .await
            .unwrap_err();

        assert_eq!(
            err.kind,
            crate::ports::ProcessorErrorKind::SignatureVerification
        );
    }

    #[tokio::test]
    async fn rejects_malformed_transmission_header() {
        let mut config = WalletProviderConfig::new(
            "client-abc",
            "secret-xyz",
            "https://api.sandbox.example-wallet.com",
        );
        config.webhook_id = Some("WH-ID-123".to_string());
        let adapter = WalletProviderAdapter::new(config);

        let err = adapter
            .verify_and_parse_webhook(sale_completed_json().as_bytes(), Some("not json"))
            .await
            .unwrap_err();

        assert_eq!(
            err.kind,
            crate::ports::ProcessorErrorKind::SignatureVerification
        );
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Offline Operation Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn create_customer_mints_local_reference() {
        let adapter = test_adapter();
        let profile = adapter
            .create_customer(CreateCustomerRequest {
                user_id: crate::domain::foundation::UserId::new("user-wallet-1").unwrap(),
                email: "buyer@example.com".to_string(),
                name: Some("Buyer".to_string()),
            })
            .await
            .unwrap();

        assert!(profile.id.starts_with("wallet_"));
        assert_eq!(profile.email, "buyer@example.com");
    }

    #[tokio::test]
    async fn process_payment_rejects_non_positive_amount() {
        let adapter = test_adapter();
        let err = adapter
            .process_payment(PaymentRequest {
                customer_id: "wallet_x".to_string(),
                amount: 0.0,
                currency: "usd".to_string(),
                description: "noop".to_string(),
                payment_method_id: None,
                metadata: HashMap::new(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, crate::ports::ProcessorErrorKind::Validation);
    }

    #[tokio::test]
    async fn update_subscription_rejects_empty_delta() {
        let adapter = test_adapter();
        let err = adapter
            .update_subscription("I-SUB", SubscriptionDelta::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind, crate::ports::ProcessorErrorKind::Validation);
    }

    #[tokio::test]
    async fn update_subscription_rejects_deferred_cancel() {
        let adapter = test_adapter();
        let delta = SubscriptionDelta {
            cancel_at_period_end: Some(true),
            ..SubscriptionDelta::default()
        };

        let err = adapter
            .update_subscription("I-SUB", delta)
            .await
            .unwrap_err();

        assert!(err.message.contains("cancel_subscription"));
    }

    #[tokio::test]
    async fn refund_with_amount_requires_currency() {
        let adapter = test_adapter();
        let err = adapter
            .process_refund(RefundRequest {
                transaction_id: "CAP-1".to_string(),
                amount: Some(10.0),
                currency: None,
                reason: None,
            })
            .await
            .unwrap_err();

        assert!(err.message.contains("currency"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Mapping Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn canonical_action_mapping_table() {
        assert_eq!(
            canonical_action_for("PAYMENT.SALE.COMPLETED"),
            Some(CanonicalAction::PaymentSucceeded)
        );
        assert_eq!(
            canonical_action_for("PAYMENT.SALE.DENIED"),
            Some(CanonicalAction::PaymentFailed)
        );
        assert_eq!(
            canonical_action_for("BILLING.SUBSCRIPTION.CREATED"),
            Some(CanonicalAction::SubscriptionCreated)
        );
        assert_eq!(
            canonical_action_for("BILLING.SUBSCRIPTION.ACTIVATED"),
            Some(CanonicalAction::SubscriptionActivated)
        );
        assert_eq!(
            canonical_action_for("BILLING.SUBSCRIPTION.CANCELLED"),
            Some(CanonicalAction::SubscriptionCanceled)
        );
        assert_eq!(
            canonical_action_for("BILLING.SUBSCRIPTION.SUSPENDED"),
            Some(CanonicalAction::SubscriptionSuspended)
        );
        assert_eq!(
            canonical_action_for("BILLING.SUBSCRIPTION.PAYMENT.FAILED"),
            Some(CanonicalAction::SubscriptionPaymentFailed)
        );
        assert_eq!(canonical_action_for("BILLING.PLAN.UPDATED"), None);
    }

    #[test]
    fn order_status_mapping() {
        assert_eq!(map_order_status(Some("COMPLETED")), PaymentStatus::Succeeded);
        assert_eq!(map_order_status(Some("CREATED")), PaymentStatus::Pending);
        assert_eq!(map_order_status(Some("APPROVED")), PaymentStatus::Pending);
        assert_eq!(
            map_order_status(Some("PAYER_ACTION_REQUIRED")),
            PaymentStatus::Pending
        );
        assert_eq!(map_order_status(Some("VOIDED")), PaymentStatus::Failed);
        assert_eq!(map_order_status(None), PaymentStatus::Failed);
    }

    #[test]
    fn subscription_status_mapping() {
        assert_eq!(
            map_wallet_subscription_status(Some("ACTIVE")),
            SubscriptionStatus::Active
        );
        assert_eq!(
            map_wallet_subscription_status(Some("APPROVAL_PENDING")),
            SubscriptionStatus::Incomplete
        );
        assert_eq!(
            map_wallet_subscription_status(Some("SUSPENDED")),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            map_wallet_subscription_status(Some("CANCELLED")),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            map_wallet_subscription_status(Some("EXPIRED")),
            SubscriptionStatus::Canceled
        );
        assert_eq!(
            map_wallet_subscription_status(None),
            SubscriptionStatus::Unknown
        );
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Config Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn application_context_present_only_when_configured() {
        let adapter = test_adapter();
        assert!(adapter.application_context().is_none());

        let mut config = WalletProviderConfig::new(
            "client-abc",
            "secret-xyz",
            "https://api.sandbox.example-wallet.com",
        );
        config.return_url = Some("https://harborline.example.com/billing/return".to_string());
        let adapter = WalletProviderAdapter::new(config);

        let context = adapter.application_context().unwrap();
        assert!(context.return_url.is_some());
        assert!(context.cancel_url.is_none());
    }

    #[test]
    fn from_settings_carries_webhook_and_redirect_urls() {
        let settings = WalletProcessorConfig {
            client_id: "client-abc".to_string(),
            client_secret: "secret-xyz".to_string(),
            api_base_url: "https://api.sandbox.example-wallet.com".to_string(),
            webhook_id: Some("WH-REG-1".to_string()),
            return_url: Some("https://harborline.example.com/billing/return".to_string()),
            cancel_url: Some("https://harborline.example.com/billing/cancel".to_string()),
            ..Default::default()
        };

        let adapter = WalletProviderAdapter::from_settings(&settings);
        assert_eq!(adapter.config.webhook_id.as_deref(), Some("WH-REG-1"));
        assert!(adapter.config.return_url.is_some());
        assert!(adapter.config.cancel_url.is_some());
    }

    #[test]
    fn adapter_reports_wallet_kind() {
        assert_eq!(test_adapter().kind(), ProcessorKind::Wallet);
    }

    #[test]
    fn provider_error_name_extraction() {
        assert_eq!(
            provider_error_name(r#"{"name":"RESOURCE_NOT_FOUND","message":"..."}"#),
            Some("RESOURCE_NOT_FOUND".to_string())
        );
        assert_eq!(provider_error_name("{}"), None);
    }
}
