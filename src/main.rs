//! Harborline billing worker.
//!
//! Loads configuration, wires the active payment processor and stores into
//! the lifecycle manager, and drives the renewal scheduler on a fixed tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use harborline_billing::adapters::{
    CardGatewayAdapter, InMemoryAccountStore, InMemoryWebhookEventStore, WalletProviderAdapter,
};
use harborline_billing::application::SubscriptionLifecycleManager;
use harborline_billing::config::AppConfig;
use harborline_billing::domain::catalog::ProcessorKind;
use harborline_billing::ports::PaymentProcessor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.worker.log_level));
    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!(
        environment = ?config.worker.environment,
        processor = %config.billing.active_processor,
        "starting harborline billing worker"
    );

    let processor: Arc<dyn PaymentProcessor> = match config.billing.active_processor {
        ProcessorKind::Card => Arc::new(CardGatewayAdapter::from_settings(&config.card)),
        ProcessorKind::Wallet => Arc::new(WalletProviderAdapter::from_settings(&config.wallet)),
    };

    let store = Arc::new(InMemoryAccountStore::new());
    let events = Arc::new(InMemoryWebhookEventStore::new());
    let catalog = config.build_catalog();

    let manager = SubscriptionLifecycleManager::new(
        store,
        processor,
        events,
        catalog,
        &config.billing,
    );

    let mut tick = tokio::time::interval(Duration::from_secs(config.billing.renewal_tick_secs));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        tick_secs = config.billing.renewal_tick_secs,
        "renewal scheduler started"
    );

    loop {
        tick.tick().await;
        let summary = manager.process_automatic_renewals().await;
        if summary.errors > 0 {
            error!(errors = summary.errors, "renewal pass finished with errors");
        }
    }
}
