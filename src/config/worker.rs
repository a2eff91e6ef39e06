//! Worker process configuration

use serde::Deserialize;

/// Worker process configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Environment name
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Rust log filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Application environment
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl WorkerConfig {
    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
        }
    }
}

fn default_environment() -> Environment {
    Environment::Development
}

fn default_log_level() -> String {
    "info".to_string()
}
