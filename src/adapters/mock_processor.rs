//! Mock payment processor for testing.
//!
//! Provides a configurable test double for `PaymentProcessor`, used by unit
//! and integration tests. Supports:
//! - Pre-configured responses
//! - Scripted payment outcomes, consumed in order
//! - Error injection
//! - Call tracking
//! - Webhook event simulation

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::catalog::ProcessorKind;
use crate::ports::{
    CanceledSubscription, CanonicalAction, CreateCustomerRequest, CreateSubscriptionRequest,
    CustomerProfile, EventPayload, NormalizedEvent, PaymentIntentData, PaymentOutcome,
    PaymentProcessor, PaymentRequest, PaymentStatus, ProcessorError, ProviderSubscription,
    RefundOutcome, RefundRequest, SubscriptionData, SubscriptionDelta, SubscriptionStatus,
};

/// Mock payment processor for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockProcessor::new();
///
/// // Script outcomes
/// mock.queue_failed_payment("card_declined");
/// mock.queue_succeeded_payment();
///
/// // Inject errors
/// mock.set_error(ProcessorError::transient("simulated outage"));
///
/// // Use in tests
/// let result = mock.process_payment(request).await;
/// ```
pub struct MockProcessor {
    /// Which processor this double stands in for.
    kind: ProcessorKind,

    /// Inner state (thread-safe for async tests).
    inner: Arc<Mutex<MockState>>,
}

/// Internal mutable state.
#[derive(Default)]
struct MockState {
    /// Customers created so far, by provider id.
    customers: HashMap<String, CustomerProfile>,

    /// Subscription "database" by provider id.
    subscriptions: HashMap<String, SubscriptionData>,

    /// Next customer to return from `create_customer`.
    next_customer: Option<CustomerProfile>,

    /// Next subscription to return from `create_subscription` or
    /// `update_subscription`.
    next_subscription: Option<ProviderSubscription>,

    /// Payment outcomes returned by `process_payment`, front first. Empty
    /// queue means a default succeeded outcome.
    queued_payments: VecDeque<PaymentOutcome>,

    /// Next refund to return from `process_refund`.
    next_refund: Option<RefundOutcome>,

    /// Payments processed so far, for `retrieve_payment_intent`.
    payment_intents: HashMap<String, PaymentIntentData>,

    /// Event to return from webhook verification.
    next_event: Option<NormalizedEvent>,

    /// Error to return on next call (consumed).
    next_error: Option<ProcessorError>,

    /// Specific errors by method name (persistent).
    method_errors: HashMap<String, ProcessorError>,

    /// Track method calls for assertions.
    call_log: Vec<MethodCall>,

    /// Webhook verification behavior.
    webhook_verify_mode: WebhookVerifyMode,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

/// How to handle webhook verification.
#[derive(Default, Clone)]
enum WebhookVerifyMode {
    /// Accept any payload and return the configured event.
    #[default]
    AcceptAll,

    /// Always fail verification.
    AlwaysFail,
}

/// Raw provider vocabulary for a canonical status, as a card-flavored
/// provider would report it.
fn raw_status(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Trialing => "trialing",
        SubscriptionStatus::PastDue => "past_due",
        SubscriptionStatus::Canceled => "canceled",
        SubscriptionStatus::Incomplete => "incomplete",
        SubscriptionStatus::Unknown => "unknown",
    }
}

/// Canonical mapping for the raw statuses tests script, covering both
/// card and wallet vocabularies.
fn canonical_status(raw: &str) -> SubscriptionStatus {
    match raw {
        "active" => SubscriptionStatus::Active,
        "trialing" => SubscriptionStatus::Trialing,
        "past_due" | "suspended" => SubscriptionStatus::PastDue,
        "canceled" | "cancelled" => SubscriptionStatus::Canceled,
        "incomplete" | "approval_pending" => SubscriptionStatus::Incomplete,
        _ => SubscriptionStatus::Unknown,
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4()
        .to_string()
        .split('-')
        .next()
        .unwrap()
        .to_string()
}

impl MockProcessor {
    /// Create a new mock standing in for the card processor.
    pub fn new() -> Self {
        Self::for_kind(ProcessorKind::Card)
    }

    /// Create a new mock standing in for a specific processor.
    pub fn for_kind(kind: ProcessorKind) -> Self {
        Self {
            kind,
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock that fails all webhook verifications.
    pub fn rejecting_webhooks() -> Self {
        let mock = Self::new();
        mock.inner.lock().unwrap().webhook_verify_mode = WebhookVerifyMode::AlwaysFail;
        mock
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Set the customer to return on the next `create_customer` call.
    pub fn set_customer(&self, customer: CustomerProfile) {
        self.inner.lock().unwrap().next_customer = Some(customer);
    }

    /// Set the subscription to return on the next `create_subscription` or
    /// `update_subscription` call.
    pub fn set_subscription(&self, subscription: ProviderSubscription) {
        self.inner.lock().unwrap().next_subscription = Some(subscription);
    }

    /// Add a subscription to the "database".
    pub fn add_subscription(&self, subscription: SubscriptionData) {
        let id = subscription.subscription_id.clone();
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .insert(id, subscription);
    }

    /// Queue a payment outcome. Outcomes are consumed front first; an empty
    /// queue yields a default succeeded outcome.
    pub fn queue_payment_outcome(&self, outcome: PaymentOutcome) {
        self.inner.lock().unwrap().queued_payments.push_back(outcome);
    }

    /// Queue a succeeded payment outcome.
    pub fn queue_succeeded_payment(&self) {
        self.queue_payment_outcome(PaymentOutcome {
            transaction_id: format!("pay_mock_{}", short_id()),
            status: PaymentStatus::Succeeded,
            redirect_url: None,
            fee_breakdown: None,
        });
    }

    /// Queue a failed payment outcome.
    pub fn queue_failed_payment(&self) {
        self.queue_payment_outcome(PaymentOutcome {
            transaction_id: format!("pay_mock_{}", short_id()),
            status: PaymentStatus::Failed,
            redirect_url: None,
            fee_breakdown: None,
        });
    }

    /// Set the refund to return on the next `process_refund` call.
    pub fn set_refund(&self, refund: RefundOutcome) {
        self.inner.lock().unwrap().next_refund = Some(refund);
    }

    /// Set the event returned by webhook verification. Returned for every
    /// verification until replaced.
    pub fn set_webhook_event(&self, event: NormalizedEvent) {
        self.inner.lock().unwrap().next_event = Some(event);
    }

    /// Set an error to return on the next call to any method (consumed).
    pub fn set_error(&self, error: ProcessorError) {
        self.inner.lock().unwrap().next_error = Some(error);
    }

    /// Set an error for a specific method (persistent until cleared).
    pub fn set_method_error(&self, method: &str, error: ProcessorError) {
        self.inner
            .lock()
            .unwrap()
            .method_errors
            .insert(method.to_string(), error);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        let mut state = self.inner.lock().unwrap();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    /// Check if a method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .any(|c| c.method == method)
    }

    /// Get count of calls to a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.inner.lock().unwrap().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // State Inspection
    // ════════════════════════════════════════════════════════════════════════════

    /// Customer as the mock currently knows it.
    pub fn customer(&self, customer_id: &str) -> Option<CustomerProfile> {
        self.inner.lock().unwrap().customers.get(customer_id).cloned()
    }

    /// Subscription as the mock currently knows it.
    pub fn subscription(&self, subscription_id: &str) -> Option<SubscriptionData> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .get(subscription_id)
            .cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.inner.lock().unwrap().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), ProcessorError> {
        let mut state = self.inner.lock().unwrap();

        // Check method-specific error first
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        // Check global error (consumes it)
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockProcessor {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    fn kind(&self) -> ProcessorKind {
        self.kind
    }

    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerProfile, ProcessorError> {
        self.record_call(
            "create_customer",
            vec![request.user_id.to_string(), request.email.clone()],
        );
        self.check_error("create_customer")?;

        let mut state = self.inner.lock().unwrap();

        let customer = state.next_customer.take().unwrap_or_else(|| CustomerProfile {
            id: format!("cus_mock_{}", short_id()),
            email: request.email,
            name: request.name,
            created_at: chrono::Utc::now().timestamp(),
        });

        // Store for later inspection
        state.customers.insert(customer.id.clone(), customer.clone());

        Ok(customer)
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, ProcessorError> {
        self.record_call(
            "create_subscription",
            vec![request.customer_id.clone(), request.plan_ref.clone()],
        );
        self.check_error("create_subscription")?;

        let mut state = self.inner.lock().unwrap();

        let now = chrono::Utc::now().timestamp();
        let subscription = state
            .next_subscription
            .take()
            .unwrap_or_else(|| ProviderSubscription {
                subscription_id: format!("sub_mock_{}", short_id()),
                customer_id: Some(request.customer_id.clone()),
                status: "active".to_string(),
                current_period_end: Some(now + 30 * 24 * 60 * 60),
            });

        state.subscriptions.insert(
            subscription.subscription_id.clone(),
            SubscriptionData {
                subscription_id: subscription.subscription_id.clone(),
                status: canonical_status(&subscription.status),
                current_period_start: Some(now),
                current_period_end: subscription.current_period_end,
                cancel_at_period_end: false,
                plan_ref: Some(request.plan_ref),
            },
        );

        Ok(subscription)
    }

    async fn process_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome, ProcessorError> {
        self.record_call(
            "process_payment",
            vec![request.customer_id.clone(), format!("{:.2}", request.amount)],
        );
        self.check_error("process_payment")?;

        let mut state = self.inner.lock().unwrap();

        let outcome = state.queued_payments.pop_front().unwrap_or_else(|| PaymentOutcome {
            transaction_id: format!("pay_mock_{}", short_id()),
            status: PaymentStatus::Succeeded,
            redirect_url: None,
            fee_breakdown: None,
        });

        // Store so reconciliation can fetch it back
        state.payment_intents.insert(
            outcome.transaction_id.clone(),
            PaymentIntentData {
                payment_id: outcome.transaction_id.clone(),
                status: outcome.status,
                amount: request.amount,
                currency: request.currency,
                customer_id: Some(request.customer_id),
            },
        );

        Ok(outcome)
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<CanceledSubscription, ProcessorError> {
        self.record_call(
            "cancel_subscription",
            vec![subscription_id.to_string(), at_period_end.to_string()],
        );
        self.check_error("cancel_subscription")?;

        let mut state = self.inner.lock().unwrap();

        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| ProcessorError::not_found("subscription"))?;

        subscription.cancel_at_period_end = at_period_end;
        if !at_period_end {
            subscription.status = SubscriptionStatus::Canceled;
        }

        Ok(CanceledSubscription {
            subscription_id: subscription_id.to_string(),
            status: raw_status(subscription.status).to_string(),
            ends_at: subscription.current_period_end,
        })
    }

    async fn update_subscription(
        &self,
        subscription_id: &str,
        delta: SubscriptionDelta,
    ) -> Result<ProviderSubscription, ProcessorError> {
        self.record_call(
            "update_subscription",
            vec![subscription_id.to_string(), format!("{:?}", delta)],
        );
        self.check_error("update_subscription")?;

        let mut state = self.inner.lock().unwrap();

        if let Some(next) = state.next_subscription.take() {
            return Ok(next);
        }

        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| ProcessorError::not_found("subscription"))?;

        if let Some(plan_ref) = delta.plan_ref {
            subscription.plan_ref = Some(plan_ref);
        }
        if let Some(cancel) = delta.cancel_at_period_end {
            subscription.cancel_at_period_end = cancel;
        }

        Ok(ProviderSubscription {
            subscription_id: subscription.subscription_id.clone(),
            customer_id: None,
            status: raw_status(subscription.status).to_string(),
            current_period_end: subscription.current_period_end,
        })
    }

    async fn process_refund(
        &self,
        request: RefundRequest,
    ) -> Result<RefundOutcome, ProcessorError> {
        self.record_call(
            "process_refund",
            vec![
                request.transaction_id.clone(),
                request
                    .amount
                    .map(|a| format!("{:.2}", a))
                    .unwrap_or_else(|| "full".to_string()),
            ],
        );
        self.check_error("process_refund")?;

        let mut state = self.inner.lock().unwrap();

        if let Some(refund) = state.next_refund.take() {
            return Ok(refund);
        }

        // A full refund reports the original amount when we know it
        let amount = request
            .amount
            .or_else(|| state.payment_intents.get(&request.transaction_id).map(|p| p.amount));

        Ok(RefundOutcome {
            refund_id: format!("re_mock_{}", short_id()),
            status: "succeeded".to_string(),
            amount,
        })
    }

    async fn retrieve_payment_intent(
        &self,
        payment_id: &str,
    ) -> Result<PaymentIntentData, ProcessorError> {
        self.record_call("retrieve_payment_intent", vec![payment_id.to_string()]);
        self.check_error("retrieve_payment_intent")?;

        let state = self.inner.lock().unwrap();
        state
            .payment_intents
            .get(payment_id)
            .cloned()
            .ok_or_else(|| ProcessorError::not_found("payment"))
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionData, ProcessorError> {
        self.record_call("retrieve_subscription", vec![subscription_id.to_string()]);
        self.check_error("retrieve_subscription")?;

        let state = self.inner.lock().unwrap();
        state
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| ProcessorError::not_found("subscription"))
    }

    async fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<NormalizedEvent, ProcessorError> {
        self.record_call(
            "verify_and_parse_webhook",
            vec![
                String::from_utf8_lossy(raw_body).chars().take(50).collect(),
                signature_header.unwrap_or("").chars().take(20).collect(),
            ],
        );
        self.check_error("verify_and_parse_webhook")?;

        let state = self.inner.lock().unwrap();

        match &state.webhook_verify_mode {
            WebhookVerifyMode::AcceptAll => {}
            WebhookVerifyMode::AlwaysFail => {
                return Err(ProcessorError::signature("verification disabled"));
            }
        }

        // Return configured event or parse from payload
        if let Some(event) = &state.next_event {
            return Ok(event.clone());
        }

        // Build a bare event from the payload
        let parsed: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| ProcessorError::validation(e.to_string()))?;

        let event_id = parsed["id"].as_str().unwrap_or("evt_mock").to_string();
        let raw_type = parsed["type"].as_str().unwrap_or("unknown").to_string();
        let occurred_at = parsed["created"].as_i64();

        let action = match raw_type.as_str() {
            "payment.succeeded" => Some(CanonicalAction::PaymentSucceeded),
            "payment.failed" => Some(CanonicalAction::PaymentFailed),
            "subscription.created" => Some(CanonicalAction::SubscriptionCreated),
            "subscription.canceled" => Some(CanonicalAction::SubscriptionCanceled),
            "subscription.payment_failed" => Some(CanonicalAction::SubscriptionPaymentFailed),
            _ => None,
        };

        Ok(NormalizedEvent {
            event_id,
            raw_type,
            action,
            occurred_at,
            payload: EventPayload::Unrecognized,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Test Helpers
// ════════════════════════════════════════════════════════════════════════════════

impl MockProcessor {
    /// Create a mock with a pre-configured customer and active subscription.
    pub fn with_active_subscription(customer_id: &str, subscription_id: &str) -> Self {
        let mock = Self::new();

        {
            let mut state = mock.inner.lock().unwrap();
            state.customers.insert(
                customer_id.to_string(),
                CustomerProfile {
                    id: customer_id.to_string(),
                    email: "test@example.com".to_string(),
                    name: Some("Test User".to_string()),
                    created_at: chrono::Utc::now().timestamp(),
                },
            );
        }

        mock.add_subscription(SubscriptionData {
            subscription_id: subscription_id.to_string(),
            status: SubscriptionStatus::Active,
            current_period_start: Some(chrono::Utc::now().timestamp()),
            current_period_end: Some(chrono::Utc::now().timestamp() + 30 * 24 * 60 * 60),
            cancel_at_period_end: false,
            plan_ref: Some("price_mock_monthly".to_string()),
        });

        mock
    }

    /// Create a payment succeeded webhook event tied to a subscription.
    pub fn payment_succeeded_event(
        payment_id: &str,
        subscription_id: &str,
        amount: f64,
    ) -> NormalizedEvent {
        NormalizedEvent {
            event_id: format!("evt_pay_{}", uuid::Uuid::new_v4()),
            raw_type: "payment.succeeded".to_string(),
            action: Some(CanonicalAction::PaymentSucceeded),
            occurred_at: Some(chrono::Utc::now().timestamp()),
            payload: EventPayload::Payment {
                payment_id: payment_id.to_string(),
                customer_id: None,
                subscription_id: Some(subscription_id.to_string()),
                amount: Some(amount),
                currency: Some("usd".to_string()),
                failure_reason: None,
            },
        }
    }

    /// Create a recurring payment failed webhook event.
    pub fn subscription_payment_failed_event(subscription_id: &str) -> NormalizedEvent {
        NormalizedEvent {
            event_id: format!("evt_fail_{}", uuid::Uuid::new_v4()),
            raw_type: "subscription.payment_failed".to_string(),
            action: Some(CanonicalAction::SubscriptionPaymentFailed),
            occurred_at: Some(chrono::Utc::now().timestamp()),
            payload: EventPayload::Payment {
                payment_id: format!("pay_{}", uuid::Uuid::new_v4()),
                customer_id: None,
                subscription_id: Some(subscription_id.to_string()),
                amount: None,
                currency: None,
                failure_reason: Some("insufficient_funds".to_string()),
            },
        }
    }

    /// Create a subscription canceled webhook event.
    pub fn subscription_canceled_event(subscription_id: &str) -> NormalizedEvent {
        NormalizedEvent {
            event_id: format!("evt_del_{}", uuid::Uuid::new_v4()),
            raw_type: "subscription.canceled".to_string(),
            action: Some(CanonicalAction::SubscriptionCanceled),
            occurred_at: Some(chrono::Utc::now().timestamp()),
            payload: EventPayload::Subscription {
                subscription_id: subscription_id.to_string(),
                customer_id: None,
                status: Some("canceled".to_string()),
                current_period_end: Some(chrono::Utc::now().timestamp()),
                plan_ref: None,
            },
        }
    }
}
