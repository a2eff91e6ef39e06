//! Webhook event claim store port.
//!
//! Providers redeliver webhooks; the engine must apply each event exactly
//! once. Before acting on a verified event, the processor claims its id
//! here. First writer wins; a redelivery sees `AlreadyExists` and is
//! acknowledged without side effects.

use crate::domain::billing::BillingError;
use crate::domain::catalog::ProcessorKind;
use crate::domain::foundation::Timestamp;
use async_trait::async_trait;

/// Result of attempting to claim an event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// This is the first delivery; proceed with side effects.
    Inserted,
    /// The event was already claimed; skip side effects.
    AlreadyExists,
}

impl SaveResult {
    pub fn is_first_delivery(&self) -> bool {
        matches!(self, SaveResult::Inserted)
    }
}

/// A claimed webhook event.
///
/// Event ids are only unique per provider, so the claim key is
/// `(processor, event_id)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEventRecord {
    pub processor: ProcessorKind,
    pub event_id: String,
    /// Provider's event type, kept for audit queries.
    pub raw_type: String,
    pub received_at: Timestamp,
}

impl WebhookEventRecord {
    pub fn new(
        processor: ProcessorKind,
        event_id: impl Into<String>,
        raw_type: impl Into<String>,
        received_at: Timestamp,
    ) -> Self {
        Self {
            processor,
            event_id: event_id.into(),
            raw_type: raw_type.into(),
            received_at,
        }
    }
}

/// Store port for webhook idempotency claims.
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    /// Atomically claim an event id. Implementations must guarantee that
    /// exactly one concurrent caller receives [`SaveResult::Inserted`].
    async fn claim(&self, record: WebhookEventRecord) -> Result<SaveResult, BillingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trait object safety test
    #[test]
    fn webhook_event_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn WebhookEventStore) {}
    }

    #[test]
    fn inserted_is_first_delivery() {
        assert!(SaveResult::Inserted.is_first_delivery());
        assert!(!SaveResult::AlreadyExists.is_first_delivery());
    }

    #[test]
    fn record_captures_claim_key() {
        let record = WebhookEventRecord::new(
            ProcessorKind::Card,
            "evt_123",
            "charge.succeeded",
            Timestamp::now(),
        );
        assert_eq!(record.processor, ProcessorKind::Card);
        assert_eq!(record.event_id, "evt_123");
        assert_eq!(record.raw_type, "charge.succeeded");
    }
}
