//! Payment processor port.
//!
//! Defines the contract every payment processor integration (card gateway,
//! wallet provider, test double) must satisfy. The engine routes all money
//! movement through this trait and stays ignorant of wire formats.
//!
//! # Design
//!
//! - **Processor agnostic**: one contract for card and wallet providers
//! - **Thin adapters**: implementations make exactly one outbound call per
//!   operation and never retry internally; retry policy belongs to callers
//! - **Major units**: amounts cross this boundary as major currency units
//!   (e.g. 29.99), adapters convert to whatever their wire wants

use crate::domain::billing::{BillingError, FeeBreakdown};
use crate::domain::catalog::ProcessorKind;
use crate::domain::foundation::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Port for payment processor integrations.
///
/// Note the status asymmetry: [`create_subscription`] reports the
/// provider's status verbatim (lowercased) because callers log and branch
/// on provider-specific detail at creation, while [`retrieve_subscription`]
/// maps to the canonical [`SubscriptionStatus`] for reconciliation.
///
/// [`create_subscription`]: PaymentProcessor::create_subscription
/// [`retrieve_subscription`]: PaymentProcessor::retrieve_subscription
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Which processor this is, for routing and log context.
    fn kind(&self) -> ProcessorKind;

    /// Create a customer in the processor's system.
    ///
    /// The internal user id travels as provider metadata so webhooks can
    /// be tied back to a user.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<CustomerProfile, ProcessorError>;

    /// Create a recurring subscription for an existing customer.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription, ProcessorError>;

    /// Charge a one-off payment (proration charges, manual invoices).
    ///
    /// A `redirect_url` in the outcome means the processor needs user
    /// approval before the payment settles; its absence means the
    /// reported status is final.
    async fn process_payment(
        &self,
        request: PaymentRequest,
    ) -> Result<PaymentOutcome, ProcessorError>;

    /// Cancel a subscription.
    ///
    /// If `at_period_end` is true the provider keeps it active until the
    /// paid period runs out.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> Result<CanceledSubscription, ProcessorError>;

    /// Update an existing subscription in place.
    ///
    /// Only fields set in the delta are sent to the provider; unset
    /// fields are left untouched on the provider side.
    async fn update_subscription(
        &self,
        subscription_id: &str,
        delta: SubscriptionDelta,
    ) -> Result<ProviderSubscription, ProcessorError>;

    /// Refund a settled payment. Omitting `amount` refunds in full.
    async fn process_refund(&self, request: RefundRequest)
        -> Result<RefundOutcome, ProcessorError>;

    /// Fetch the current state of a one-off payment, for reconciliation.
    async fn retrieve_payment_intent(
        &self,
        payment_id: &str,
    ) -> Result<PaymentIntentData, ProcessorError>;

    /// Fetch the current state of a subscription, mapped to canonical
    /// status.
    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionData, ProcessorError>;

    /// Verify a webhook's authenticity and normalize it.
    ///
    /// `signature_header` is the provider's signature header when the
    /// transport delivered one. Implementations without a configured
    /// verification secret may fall back to parsing without verification,
    /// but must say so loudly in their logs.
    async fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> Result<NormalizedEvent, ProcessorError>;
}

/// Request to create a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Internal user id, carried as provider metadata.
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
}

/// Customer as known to the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerProfile {
    /// Provider's customer id.
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    /// Provider-side creation time (Unix seconds).
    pub created_at: i64,
}

/// Request to create a subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// Provider's customer id.
    pub customer_id: String,
    /// Provider-side plan/price reference for the chosen plan and cycle.
    pub plan_ref: String,
    /// Trial length; `None` starts billing immediately.
    pub trial_days: Option<u32>,
    pub metadata: HashMap<String, String>,
}

/// Subscription as reported by the provider on create/update.
///
/// `status` is the provider's own vocabulary, lowercased but otherwise
/// untranslated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    /// Provider's subscription id.
    pub subscription_id: String,
    pub customer_id: Option<String>,
    /// Raw provider status, lowercased (e.g. "active", "approval_pending").
    pub status: String,
    /// Current period end (Unix seconds), when the provider reports one.
    pub current_period_end: Option<i64>,
}

/// Fields that can change on an existing subscription. `None` means
/// "do not touch".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionDelta {
    pub plan_ref: Option<String>,
    pub quantity: Option<u32>,
    pub cancel_at_period_end: Option<bool>,
}

impl SubscriptionDelta {
    pub fn plan(plan_ref: impl Into<String>) -> Self {
        Self { plan_ref: Some(plan_ref.into()), ..Self::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.plan_ref.is_none() && self.quantity.is_none() && self.cancel_at_period_end.is_none()
    }
}

/// Confirmation of a cancellation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanceledSubscription {
    pub subscription_id: String,
    /// Raw provider status after cancellation.
    pub status: String,
    /// When access ends (Unix seconds), if the provider reports it.
    pub ends_at: Option<i64>,
}

/// Request for a one-off charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub customer_id: String,
    /// Major currency units.
    pub amount: f64,
    pub currency: String,
    pub description: String,
    /// Stored payment method to charge; `None` uses the provider default.
    pub payment_method_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Canonical one-off payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Pending,
    Failed,
}

impl PaymentStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded | PaymentStatus::Failed)
    }
}

/// Outcome of a one-off charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    /// Provider's transaction/payment id.
    pub transaction_id: String,
    pub status: PaymentStatus,
    /// Set when the user must approve the payment out-of-band. Absent
    /// means `status` is final.
    pub redirect_url: Option<String>,
    pub fee_breakdown: Option<FeeBreakdown>,
}

/// Request to refund a settled payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Provider transaction id of the payment being refunded.
    pub transaction_id: String,
    /// Major units; `None` refunds the full amount.
    pub amount: Option<f64>,
    /// Currency of `amount`; some providers require it on partial refunds.
    pub currency: Option<String>,
    pub reason: Option<String>,
}

/// Outcome of a refund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundOutcome {
    /// Provider's refund id.
    pub refund_id: String,
    /// Raw provider status.
    pub status: String,
    /// Amount actually refunded in major units, when reported.
    pub amount: Option<f64>,
}

/// One-off payment state, for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntentData {
    pub payment_id: String,
    pub status: PaymentStatus,
    /// Major units.
    pub amount: f64,
    pub currency: String,
    pub customer_id: Option<String>,
}

/// Canonical subscription status across processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    /// Awaiting user approval (wallet flows) or first payment.
    Incomplete,
    /// Provider reported something we do not map.
    Unknown,
}

impl SubscriptionStatus {
    pub fn has_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing | SubscriptionStatus::PastDue
        )
    }
}

/// Subscription state mapped to canonical status, for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionData {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    /// Unix seconds.
    pub current_period_start: Option<i64>,
    /// Unix seconds.
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
    /// Provider-side plan reference currently in effect.
    pub plan_ref: Option<String>,
}

/// Provider-independent meaning of a webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalAction {
    PaymentSucceeded,
    PaymentFailed,
    SubscriptionCreated,
    SubscriptionActivated,
    SubscriptionCanceled,
    SubscriptionSuspended,
    SubscriptionPaymentFailed,
}

impl CanonicalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalAction::PaymentSucceeded => "payment_succeeded",
            CanonicalAction::PaymentFailed => "payment_failed",
            CanonicalAction::SubscriptionCreated => "subscription_created",
            CanonicalAction::SubscriptionActivated => "subscription_activated",
            CanonicalAction::SubscriptionCanceled => "subscription_canceled",
            CanonicalAction::SubscriptionSuspended => "subscription_suspended",
            CanonicalAction::SubscriptionPaymentFailed => "subscription_payment_failed",
        }
    }
}

impl std::fmt::Display for CanonicalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A verified webhook event, normalized for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Provider's event id, used for idempotent processing.
    pub event_id: String,
    /// Provider's own event type string, kept for logging.
    pub raw_type: String,
    /// What the event means to us. `None` for event types we receive but
    /// do not act on.
    pub action: Option<CanonicalAction>,
    /// When the provider says it happened (Unix seconds).
    pub occurred_at: Option<i64>,
    pub payload: EventPayload,
}

/// Typed webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Payment {
        payment_id: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        /// Major units.
        amount: Option<f64>,
        currency: Option<String>,
        failure_reason: Option<String>,
    },
    Subscription {
        subscription_id: String,
        customer_id: Option<String>,
        /// Raw provider status at event time.
        status: Option<String>,
        current_period_end: Option<i64>,
        plan_ref: Option<String>,
    },
    /// Event types we parse but have no structured mapping for.
    Unrecognized,
}

impl EventPayload {
    /// Provider subscription id, wherever the payload carries one.
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            EventPayload::Payment { subscription_id, .. } => subscription_id.as_deref(),
            EventPayload::Subscription { subscription_id, .. } => Some(subscription_id),
            EventPayload::Unrecognized => None,
        }
    }

    /// Provider customer id, wherever the payload carries one.
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            EventPayload::Payment { customer_id, .. }
            | EventPayload::Subscription { customer_id, .. } => customer_id.as_deref(),
            EventPayload::Unrecognized => None,
        }
    }
}

/// Errors from processor operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorError {
    pub kind: ProcessorErrorKind,
    pub message: String,
    /// Provider's own error code, when one was returned.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

/// Processor error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorErrorKind {
    /// Credentials rejected. Fatal until configuration changes.
    Authentication,
    /// Provider rejected the request shape or the charge itself.
    Validation,
    /// Network failure, timeout, rate limit, or provider 5xx.
    Transient,
    /// Webhook signature did not verify.
    SignatureVerification,
    /// Referenced provider object does not exist.
    NotFound,
}

impl ProcessorErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessorErrorKind::Transient)
    }
}

impl std::fmt::Display for ProcessorErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessorErrorKind::Authentication => "authentication",
            ProcessorErrorKind::Validation => "validation",
            ProcessorErrorKind::Transient => "transient",
            ProcessorErrorKind::SignatureVerification => "signature_verification",
            ProcessorErrorKind::NotFound => "not_found",
        };
        write!(f, "{}", s)
    }
}

impl ProcessorError {
    pub fn new(kind: ProcessorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
            provider_code: None,
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorKind::Authentication, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorKind::Validation, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorKind::Transient, message)
    }

    pub fn signature(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorKind::SignatureVerification, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(ProcessorErrorKind::NotFound, format!("{} not found", resource))
    }
}

impl std::fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ProcessorError {}

impl From<ProcessorError> for BillingError {
    fn from(err: ProcessorError) -> Self {
        match err.kind {
            ProcessorErrorKind::Authentication => BillingError::processor_auth(err.message),
            ProcessorErrorKind::Validation | ProcessorErrorKind::NotFound => {
                BillingError::processor_validation(err.message)
            }
            ProcessorErrorKind::Transient => BillingError::processor_transient(err.message),
            ProcessorErrorKind::SignatureVerification => {
                BillingError::webhook_signature(err.message)
            }
        }
    }
}
