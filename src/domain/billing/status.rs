use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};

/// Billing account status.
///
/// ```text
/// Trialing ──▶ Active ──▶ PastDue ──▶ Canceled
///     │           ▲  │        │           │
///     │           │  └────────┘           │
///     └───────────┼──▶ Canceled ◀─────────┘
///                 └────── (re-subscribe)
/// ```
///
/// `Active -> Active` is a valid self-transition: renewal re-enters the
/// state while advancing the billing date. `Canceled` is not terminal,
/// a re-subscribe reuses the account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// In a trial period, no charge has been made yet.
    Trialing,
    /// Paid and current.
    Active,
    /// A charge failed, account is inside the grace window.
    PastDue,
    /// Subscription ended, account is on (or headed to) the free tier.
    Canceled,
}

impl AccountStatus {
    /// Whether this status retains premium entitlement.
    ///
    /// `PastDue` deliberately retains access: the grace window exists so a
    /// recovered payment is invisible to the user. Post-cancel access until
    /// the period end is tracked by the account's billing date, not here.
    pub fn has_premium_access(&self) -> bool {
        matches!(
            self,
            AccountStatus::Trialing | AccountStatus::Active | AccountStatus::PastDue
        )
    }

    /// Whether the renewal scheduler should consider this account chargeable.
    pub fn is_renewable(&self) -> bool {
        matches!(self, AccountStatus::Trialing | AccountStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Trialing => "trialing",
            AccountStatus::Active => "active",
            AccountStatus::PastDue => "past_due",
            AccountStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl StateMachine for AccountStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use AccountStatus::*;
        matches!(
            (self, target),
            // Trial converts, fails its first charge, or is abandoned
            (Trialing, Active) | (Trialing, PastDue) | (Trialing, Canceled)
                // Renewal, failed charge, or cancellation
                | (Active, Active) | (Active, PastDue) | (Active, Canceled)
                // Recovery inside grace, or grace expiry / user cancel
                | (PastDue, Active) | (PastDue, Canceled)
                // Re-subscribe on the same account row
                | (Canceled, Trialing) | (Canceled, Active)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use AccountStatus::*;
        match self {
            Trialing => vec![Active, PastDue, Canceled],
            Active => vec![Active, PastDue, Canceled],
            PastDue => vec![Active, Canceled],
            Canceled => vec![Trialing, Active],
        }
    }
}
