//! Billing-specific error types.
//!
//! One taxonomy for processor failures, webhook rejection, proration input
//! problems, and local persistence divergence.
//!
//! # Retry policy
//!
//! | Error | Policy |
//! |-------|--------|
//! | ProcessorAuth | fatal, never retried |
//! | ProcessorValidation | not retried, surfaced to caller |
//! | ProcessorTransient | retried by the caller with bounded backoff |
//! | WebhookSignature | rejected (4xx-equivalent), never processed |
//! | ProrationInput | rejected before any payment attempt |
//! | StoreWrite | reconciliation retry of the local write |

use crate::domain::foundation::{AccountId, UserId, ValidationError};

/// Billing-specific errors.
#[derive(Debug, Clone, PartialEq)]
pub enum BillingError {
    /// Processor rejected our credentials.
    ProcessorAuth { message: String },

    /// Processor rejected the request shape.
    ProcessorValidation { message: String },

    /// Network failure, timeout, or processor 5xx.
    ProcessorTransient { message: String },

    /// Webhook signature verification failed or payload was structurally invalid.
    WebhookSignature { reason: String },

    /// Proration rejected its inputs before any payment was attempted.
    ProrationInput { reason: String },

    /// Local write failed after a provider call already succeeded.
    ///
    /// This is a state-divergence risk: the provider-side action is never
    /// reversed, the local write is retried instead.
    StoreWrite { operation: String, message: String },

    /// Billing account was not found.
    AccountNotFound(AccountId),

    /// No billing account exists for this user.
    AccountNotFoundForUser(UserId),

    /// Plan id is not in the catalog.
    UnknownPlan(String),

    /// Invalid state for the requested operation.
    InvalidState { current: String, attempted: String },

    /// Request-level validation failed.
    ValidationFailed { field: String, message: String },
}

impl BillingError {
    // Constructor functions for cleaner error creation

    pub fn processor_auth(message: impl Into<String>) -> Self {
        BillingError::ProcessorAuth { message: message.into() }
    }

    pub fn processor_validation(message: impl Into<String>) -> Self {
        BillingError::ProcessorValidation { message: message.into() }
    }

    pub fn processor_transient(message: impl Into<String>) -> Self {
        BillingError::ProcessorTransient { message: message.into() }
    }

    pub fn webhook_signature(reason: impl Into<String>) -> Self {
        BillingError::WebhookSignature { reason: reason.into() }
    }

    pub fn proration_input(reason: impl Into<String>) -> Self {
        BillingError::ProrationInput { reason: reason.into() }
    }

    pub fn store_write(operation: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::StoreWrite {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn account_not_found(id: AccountId) -> Self {
        BillingError::AccountNotFound(id)
    }

    pub fn account_not_found_for_user(user_id: UserId) -> Self {
        BillingError::AccountNotFoundForUser(user_id)
    }

    pub fn unknown_plan(plan_id: impl Into<String>) -> Self {
        BillingError::UnknownPlan(plan_id.into())
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        BillingError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::ProcessorAuth { .. } => "PROCESSOR_AUTH_ERROR",
            BillingError::ProcessorValidation { .. } => "PROCESSOR_VALIDATION_ERROR",
            BillingError::ProcessorTransient { .. } => "PROCESSOR_TRANSIENT_ERROR",
            BillingError::WebhookSignature { .. } => "WEBHOOK_SIGNATURE_ERROR",
            BillingError::ProrationInput { .. } => "PRORATION_INPUT_ERROR",
            BillingError::StoreWrite { .. } => "STORE_WRITE_ERROR",
            BillingError::AccountNotFound(_) | BillingError::AccountNotFoundForUser(_) => {
                "ACCOUNT_NOT_FOUND"
            }
            BillingError::UnknownPlan(_) => "UNKNOWN_PLAN",
            BillingError::InvalidState { .. } => "INVALID_STATE_TRANSITION",
            BillingError::ValidationFailed { .. } => "VALIDATION_FAILED",
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            BillingError::ProcessorAuth { message } => {
                format!("Processor authentication failed: {}", message)
            }
            BillingError::ProcessorValidation { message } => {
                format!("Processor rejected request: {}", message)
            }
            BillingError::ProcessorTransient { message } => {
                format!("Processor temporarily unavailable: {}", message)
            }
            BillingError::WebhookSignature { reason } => {
                format!("Webhook rejected: {}", reason)
            }
            BillingError::ProrationInput { reason } => {
                format!("Proration input invalid: {}", reason)
            }
            BillingError::StoreWrite { operation, message } => {
                format!("Store write '{}' failed: {}", operation, message)
            }
            BillingError::AccountNotFound(id) => format!("Billing account not found: {}", id),
            BillingError::AccountNotFoundForUser(user_id) => {
                format!("No billing account for user: {}", user_id)
            }
            BillingError::UnknownPlan(plan_id) => format!("Unknown plan: {}", plan_id),
            BillingError::InvalidState { current, attempted } => {
                format!("Cannot {} account in {} state", attempted, current)
            }
            BillingError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
        }
    }

    /// Returns true if the caller should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BillingError::ProcessorTransient { .. } | BillingError::StoreWrite { .. }
        )
    }

    /// Returns true for credential failures that no retry can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BillingError::ProcessorAuth { .. })
    }
}

impl std::fmt::Display for BillingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for BillingError {}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::EmptyField { field } => BillingError::ValidationFailed {
                field,
                message: "cannot be empty".to_string(),
            },
            ValidationError::OutOfRange { field, min, max, actual } => BillingError::ValidationFailed {
                field,
                message: format!("must be between {} and {}, got {}", min, max, actual),
            },
            ValidationError::InvalidFormat { field, reason } => {
                BillingError::ValidationFailed { field, message: reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_account_id() -> AccountId {
        AccountId::new()
    }

    fn test_user_id() -> UserId {
        UserId::new("user-test-123").unwrap()
    }

    // ============================================================
    // Constructor Tests
    // ============================================================

    #[test]
    fn processor_auth_creates_correctly() {
        let err = BillingError::processor_auth("invalid api key");
        assert!(matches!(err, BillingError::ProcessorAuth { ref message } if message == "invalid api key"));
        assert_eq!(err.code(), "PROCESSOR_AUTH_ERROR");
    }

    #[test]
    fn processor_transient_creates_correctly() {
        let err = BillingError::processor_transient("connection reset");
        assert_eq!(err.code(), "PROCESSOR_TRANSIENT_ERROR");
    }

    #[test]
    fn webhook_signature_creates_correctly() {
        let err = BillingError::webhook_signature("hmac mismatch");
        assert!(matches!(err, BillingError::WebhookSignature { ref reason } if reason == "hmac mismatch"));
        assert_eq!(err.code(), "WEBHOOK_SIGNATURE_ERROR");
    }

    #[test]
    fn store_write_creates_correctly() {
        let err = BillingError::store_write("update_account", "connection lost");
        assert!(matches!(
            err,
            BillingError::StoreWrite { ref operation, ref message }
            if operation == "update_account" && message == "connection lost"
        ));
        assert_eq!(err.code(), "STORE_WRITE_ERROR");
    }

    #[test]
    fn account_not_found_creates_correctly() {
        let id = test_account_id();
        let err = BillingError::account_not_found(id);
        assert!(matches!(err, BillingError::AccountNotFound(i) if i == id));
        assert_eq!(err.code(), "ACCOUNT_NOT_FOUND");
    }

    #[test]
    fn not_found_for_user_creates_correctly() {
        let user_id = test_user_id();
        let err = BillingError::account_not_found_for_user(user_id.clone());
        assert!(matches!(err, BillingError::AccountNotFoundForUser(ref u) if *u == user_id));
        assert_eq!(err.code(), "ACCOUNT_NOT_FOUND");
    }

    #[test]
    fn unknown_plan_creates_correctly() {
        let err = BillingError::unknown_plan("premium_platinum");
        assert!(matches!(err, BillingError::UnknownPlan(ref p) if p == "premium_platinum"));
        assert_eq!(err.code(), "UNKNOWN_PLAN");
    }

    #[test]
    fn invalid_state_creates_correctly() {
        let err = BillingError::invalid_state("canceled", "change_plan");
        assert!(matches!(
            err,
            BillingError::InvalidState { ref current, ref attempted }
            if current == "canceled" && attempted == "change_plan"
        ));
        assert_eq!(err.code(), "INVALID_STATE_TRANSITION");
    }

    // ============================================================
    // Message Tests
    // ============================================================

    #[test]
    fn account_not_found_message_includes_id() {
        let id = test_account_id();
        let err = BillingError::account_not_found(id);
        assert!(err.message().contains(&id.to_string()));
    }

    #[test]
    fn store_write_message_includes_operation() {
        let err = BillingError::store_write("create_transaction", "timeout");
        let msg = err.message();
        assert!(msg.contains("create_transaction"));
        assert!(msg.contains("timeout"));
    }

    // ============================================================
    // Retry Policy Tests
    // ============================================================

    #[test]
    fn transient_errors_are_retryable() {
        assert!(BillingError::processor_transient("timeout").is_retryable());
    }

    #[test]
    fn store_write_errors_are_retryable() {
        assert!(BillingError::store_write("update_account", "timeout").is_retryable());
    }

    #[test]
    fn auth_errors_are_fatal_not_retryable() {
        let err = BillingError::processor_auth("revoked key");
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = BillingError::processor_validation("missing field");
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn proration_input_is_not_retryable() {
        assert!(!BillingError::proration_input("currency mismatch").is_retryable());
    }

    // ============================================================
    // Display & Conversion Tests
    // ============================================================

    #[test]
    fn display_matches_message() {
        let err = BillingError::unknown_plan("gold");
        assert_eq!(format!("{}", err), err.message());
    }

    #[test]
    fn converts_from_validation_error() {
        let err: BillingError = ValidationError::empty_field("plan_id").into();
        assert_eq!(err.code(), "VALIDATION_FAILED");
        assert!(err.message().contains("plan_id"));
    }
}
