//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `HARBORLINE_` prefix and nested values use underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use harborline_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Active processor: {}", config.billing.active_processor);
//! ```

mod billing;
mod error;
mod processors;
mod worker;

pub use billing::BillingConfig;
pub use error::{ConfigError, ValidationError};
pub use processors::{CardProcessorConfig, WalletProcessorConfig};
pub use worker::{Environment, WorkerConfig};

use crate::domain::catalog::{PlanCatalog, ProcessorKind, ProcessorPlanRef, SubscriptionPlan};
use serde::Deserialize;

/// Root application configuration
///
/// Contains all configuration sections for the Harborline billing engine.
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Worker process configuration (environment, logging)
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Billing policy (active processor, grace period, scheduler cadence)
    #[serde(default)]
    pub billing: BillingConfig,

    /// Card gateway configuration
    pub card: CardProcessorConfig,

    /// Wallet provider configuration
    pub wallet: WalletProcessorConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `HARBORLINE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `HARBORLINE__CARD__API_KEY=sk_test_xxx` -> `card.api_key = ...`
    /// - `HARBORLINE__BILLING__GRACE_PERIOD_DAYS=10` -> `billing.grace_period_days = 10`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("HARBORLINE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Performs semantic validation of configuration:
    /// - Policy ranges (grace period, scheduler cadence)
    /// - Required API key prefixes
    /// - URL formats
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.billing.validate()?;
        self.card.validate()?;
        self.wallet.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.worker.is_production()
    }

    /// Build the plan catalog with processor references from configuration.
    ///
    /// A plan is only sellable through a processor when both cycle
    /// references are configured for it; partially configured plans are
    /// left without a reference and rejected at subscription time.
    pub fn build_catalog(&self) -> PlanCatalog {
        let mut catalog = PlanCatalog::standard();

        let individual = SubscriptionPlan::premium_individual().id;
        let dealer = SubscriptionPlan::premium_dealer().id;

        if let (Some(monthly), Some(yearly)) = (
            &self.card.individual_monthly_price_id,
            &self.card.individual_yearly_price_id,
        ) {
            catalog = catalog.with_processor_ref(
                &individual,
                ProcessorKind::Card,
                ProcessorPlanRef::new(monthly, yearly),
            );
        }
        if let (Some(monthly), Some(yearly)) = (
            &self.card.dealer_monthly_price_id,
            &self.card.dealer_yearly_price_id,
        ) {
            catalog = catalog.with_processor_ref(
                &dealer,
                ProcessorKind::Card,
                ProcessorPlanRef::new(monthly, yearly),
            );
        }
        if let (Some(monthly), Some(yearly)) = (
            &self.wallet.individual_monthly_plan_id,
            &self.wallet.individual_yearly_plan_id,
        ) {
            catalog = catalog.with_processor_ref(
                &individual,
                ProcessorKind::Wallet,
                ProcessorPlanRef::new(monthly, yearly),
            );
        }
        if let (Some(monthly), Some(yearly)) = (
            &self.wallet.dealer_monthly_plan_id,
            &self.wallet.dealer_yearly_plan_id,
        ) {
            catalog = catalog.with_processor_ref(
                &dealer,
                ProcessorKind::Wallet,
                ProcessorPlanRef::new(monthly, yearly),
            );
        }

        catalog
    }
}
