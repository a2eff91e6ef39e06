//! Billing engine configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::catalog::ProcessorKind;

/// Billing engine configuration
///
/// Policy knobs for the renewal scheduler and lifecycle manager. All have
/// production defaults; deployments only override what they must.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Which processor new subscriptions are created on
    #[serde(default = "default_active_processor")]
    pub active_processor: ProcessorKind,

    /// Days a past-due account keeps access before the free-tier downgrade
    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: u32,

    /// How far ahead of `next_billing_date` the scheduler charges, in seconds
    #[serde(default = "default_renewal_lookahead_secs")]
    pub renewal_lookahead_secs: i64,

    /// Scheduler tick interval in seconds
    #[serde(default = "default_renewal_tick_secs")]
    pub renewal_tick_secs: u64,

    /// Currency new accounts are charged in (lowercase ISO 4217)
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

impl BillingConfig {
    /// Validate billing configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.grace_period_days == 0 || self.grace_period_days > 90 {
            return Err(ValidationError::InvalidGracePeriod);
        }
        if self.renewal_lookahead_secs <= 0 {
            return Err(ValidationError::InvalidRenewalLookahead);
        }
        if self.renewal_tick_secs < 60 {
            return Err(ValidationError::InvalidRenewalTick);
        }
        if self.default_currency.len() != 3
            || !self.default_currency.chars().all(|c| c.is_ascii_lowercase())
        {
            return Err(ValidationError::InvalidCurrency);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            active_processor: default_active_processor(),
            grace_period_days: default_grace_period_days(),
            renewal_lookahead_secs: default_renewal_lookahead_secs(),
            renewal_tick_secs: default_renewal_tick_secs(),
            default_currency: default_currency(),
        }
    }
}

fn default_active_processor() -> ProcessorKind {
    ProcessorKind::Card
}

fn default_grace_period_days() -> u32 {
    7
}

fn default_renewal_lookahead_secs() -> i64 {
    3600
}

fn default_renewal_tick_secs() -> u64 {
    3600
}

fn default_currency() -> String {
    "usd".to_string()
}
