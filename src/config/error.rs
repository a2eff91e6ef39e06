//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid card gateway API key format")]
    InvalidCardApiKey,

    #[error("Invalid card webhook secret format")]
    InvalidCardWebhookSecret,

    #[error("API base URL must be http(s): {0}")]
    InvalidApiBaseUrl(&'static str),

    #[error("Grace period must be between 1 and 90 days")]
    InvalidGracePeriod,

    #[error("Renewal lookahead must be positive")]
    InvalidRenewalLookahead,

    #[error("Renewal tick interval must be at least 60 seconds")]
    InvalidRenewalTick,

    #[error("Currency must be a 3-letter ISO code")]
    InvalidCurrency,

    #[error("Unknown active processor (expected 'card' or 'wallet')")]
    UnknownActiveProcessor,
}
