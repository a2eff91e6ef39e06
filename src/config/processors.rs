//! Payment processor configuration

use serde::Deserialize;

use super::error::ValidationError;

/// Card gateway configuration
///
/// The card gateway authenticates with a static secret key and signs
/// webhooks with an HMAC secret.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardProcessorConfig {
    /// Secret API key (sk_live_... or sk_test_...)
    pub api_key: String,

    /// Webhook signing secret (whsec_...)
    pub webhook_secret: String,

    /// Gateway API base URL
    pub api_base_url: String,

    /// Gateway price id, premium individual monthly
    pub individual_monthly_price_id: Option<String>,

    /// Gateway price id, premium individual yearly
    pub individual_yearly_price_id: Option<String>,

    /// Gateway price id, premium dealer monthly
    pub dealer_monthly_price_id: Option<String>,

    /// Gateway price id, premium dealer yearly
    pub dealer_yearly_price_id: Option<String>,
}

impl CardProcessorConfig {
    /// Check if using gateway test mode
    pub fn is_test_mode(&self) -> bool {
        self.api_key.starts_with("sk_test_")
    }

    /// Check if using gateway live mode
    pub fn is_live_mode(&self) -> bool {
        self.api_key.starts_with("sk_live_")
    }

    /// Validate card gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingRequired("CARD__API_KEY"));
        }
        if self.webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("CARD__WEBHOOK_SECRET"));
        }
        if self.api_base_url.is_empty() {
            return Err(ValidationError::MissingRequired("CARD__API_BASE_URL"));
        }

        // Verify key prefixes for safety
        if !self.api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidCardApiKey);
        }
        if !self.webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidCardWebhookSecret);
        }
        if !self.api_base_url.starts_with("http") {
            return Err(ValidationError::InvalidApiBaseUrl("card"));
        }

        Ok(())
    }
}

/// Wallet provider configuration
///
/// The wallet provider authenticates with OAuth client credentials.
/// `webhook_id` enables remote webhook verification; without it the
/// adapter parses webhooks defensively and logs that verification was
/// skipped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletProcessorConfig {
    /// OAuth client id
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Provider API base URL
    pub api_base_url: String,

    /// Provider-registered webhook id, required for remote verification
    pub webhook_id: Option<String>,

    /// Where the provider sends the user after approving a payment
    pub return_url: Option<String>,

    /// Where the provider sends the user after declining a payment
    pub cancel_url: Option<String>,

    /// Provider plan id, premium individual monthly
    pub individual_monthly_plan_id: Option<String>,

    /// Provider plan id, premium individual yearly
    pub individual_yearly_plan_id: Option<String>,

    /// Provider plan id, premium dealer monthly
    pub dealer_monthly_plan_id: Option<String>,

    /// Provider plan id, premium dealer yearly
    pub dealer_yearly_plan_id: Option<String>,
}

impl WalletProcessorConfig {
    /// Check if pointed at the provider sandbox
    pub fn is_sandbox(&self) -> bool {
        self.api_base_url.contains("sandbox")
    }

    /// Whether webhook signatures can be verified remotely
    pub fn can_verify_webhooks(&self) -> bool {
        self.webhook_id.is_some()
    }

    /// Validate wallet provider configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.client_id.is_empty() {
            return Err(ValidationError::MissingRequired("WALLET__CLIENT_ID"));
        }
        if self.client_secret.is_empty() {
            return Err(ValidationError::MissingRequired("WALLET__CLIENT_SECRET"));
        }
        if self.api_base_url.is_empty() {
            return Err(ValidationError::MissingRequired("WALLET__API_BASE_URL"));
        }
        if !self.api_base_url.starts_with("http") {
            return Err(ValidationError::InvalidApiBaseUrl("wallet"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_card() -> CardProcessorConfig {
        CardProcessorConfig {
            api_key: "sk_test_abcd1234".to_string(),
            webhook_secret: "whsec_xyz789".to_string(),
            api_base_url: "https://gateway.example-cards.com".to_string(),
            ..Default::default()
        }
    }

    fn valid_wallet() -> WalletProcessorConfig {
        WalletProcessorConfig {
            client_id: "client-abc".to_string(),
            client_secret: "secret-xyz".to_string(),
            api_base_url: "https://api.sandbox.example-wallet.com".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_card_test_mode() {
        let config = valid_card();
        assert!(config.is_test_mode());
        assert!(!config.is_live_mode());
    }

    #[test]
    fn test_card_live_mode() {
        let config = CardProcessorConfig {
            api_key: "sk_live_xxx".to_string(),
            ..valid_card()
        };
        assert!(config.is_live_mode());
        assert!(!config.is_test_mode());
    }

    #[test]
    fn test_card_validation_missing_api_key() {
        let config = CardProcessorConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_card_validation_invalid_api_key_prefix() {
        let config = CardProcessorConfig {
            api_key: "pk_test_xxx".to_string(), // Wrong prefix
            ..valid_card()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_card_validation_invalid_webhook_secret_prefix() {
        let config = CardProcessorConfig {
            webhook_secret: "secret_xxx".to_string(), // Wrong prefix
            ..valid_card()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_card_validation_valid_config() {
        assert!(valid_card().validate().is_ok());
    }

    #[test]
    fn test_wallet_sandbox_detection() {
        assert!(valid_wallet().is_sandbox());

        let live = WalletProcessorConfig {
            api_base_url: "https://api.example-wallet.com".to_string(),
            ..valid_wallet()
        };
        assert!(!live.is_sandbox());
    }

    #[test]
    fn test_wallet_verification_requires_webhook_id() {
        assert!(!valid_wallet().can_verify_webhooks());

        let with_id = WalletProcessorConfig {
            webhook_id: Some("wh-123".to_string()),
            ..valid_wallet()
        };
        assert!(with_id.can_verify_webhooks());
    }

    #[test]
    fn test_wallet_validation_missing_credentials() {
        let config = WalletProcessorConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wallet_validation_non_http_url() {
        let config = WalletProcessorConfig {
            api_base_url: "ftp://wallet".to_string(),
            ..valid_wallet()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wallet_validation_valid_config() {
        assert!(valid_wallet().validate().is_ok());
    }
}
