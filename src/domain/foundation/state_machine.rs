//! State machine trait for status enums.
//!
//! Provides a consistent interface for validating and performing state
//! transitions across entity lifecycle statuses (billing accounts,
//! transactions, provider subscriptions).

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// Implementors define valid state transitions and get validated
/// transition methods for free.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for AccountStatus {
///     fn can_transition_to(&self, target: &Self) -> bool {
///         matches!(
///             (self, target),
///             (Trialing, Active) |
///             (Active, PastDue) |
///             // ... etc
///         )
///     }
///
///     fn valid_transitions(&self) -> Vec<Self> {
///         match self {
///             Trialing => vec![Active, PastDue, Canceled],
///             Active => vec![PastDue, Canceled],
///             // ... etc
///         }
///     }
/// }
///
/// // Usage:
/// let new_status = current_status.transition_to(AccountStatus::Active)?;
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    ///
    /// This is the preferred way to change state, as it ensures
    /// the transition is valid according to the state machine rules.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test enum for StateMachine trait
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum InvoiceStatus {
        Draft,
        Open,
        Paid,
        Void,
    }

    impl StateMachine for InvoiceStatus {
        fn can_transition_to(&self, target: &Self) -> bool {
            use InvoiceStatus::*;
            matches!(
                (self, target),
                (Draft, Open) | (Open, Paid) | (Open, Void) | (Draft, Void)
            )
        }

        fn valid_transitions(&self) -> Vec<Self> {
            use InvoiceStatus::*;
            match self {
                Draft => vec![Open, Void],
                Open => vec![Paid, Void],
                Paid => vec![],
                Void => vec![],
            }
        }
    }

    #[test]
    fn transition_to_succeeds_for_valid_transition() {
        let status = InvoiceStatus::Draft;
        let result = status.transition_to(InvoiceStatus::Open);
        assert_eq!(result.unwrap(), InvoiceStatus::Open);
    }

    #[test]
    fn transition_to_fails_for_invalid_transition() {
        let status = InvoiceStatus::Draft;
        let result = status.transition_to(InvoiceStatus::Paid);
        assert!(result.is_err());
    }

    #[test]
    fn is_terminal_returns_true_for_settled_states() {
        assert!(InvoiceStatus::Paid.is_terminal());
        assert!(InvoiceStatus::Void.is_terminal());
    }

    #[test]
    fn is_terminal_returns_false_for_non_terminal() {
        assert!(!InvoiceStatus::Draft.is_terminal());
        assert!(!InvoiceStatus::Open.is_terminal());
    }

    #[test]
    fn valid_transitions_returns_correct_targets() {
        assert_eq!(
            InvoiceStatus::Draft.valid_transitions(),
            vec![InvoiceStatus::Open, InvoiceStatus::Void]
        );
        assert_eq!(InvoiceStatus::Paid.valid_transitions(), vec![]);
    }

    #[test]
    fn can_transition_to_is_consistent_with_valid_transitions() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Open,
            InvoiceStatus::Paid,
            InvoiceStatus::Void,
        ] {
            for valid_target in status.valid_transitions() {
                assert!(
                    status.can_transition_to(&valid_target),
                    "can_transition_to should return true for {:?} -> {:?}",
                    status,
                    valid_target
                );
            }
        }
    }
}
