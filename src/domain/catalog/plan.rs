//! Subscription plan catalog.
//!
//! Plans are static catalog entries loaded once at process start and never
//! mutated at runtime; a catalog update replaces the whole set. Prices are
//! decimal major units tagged with a lowercase ISO currency code, matching
//! what the processor contract expects.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::domain::foundation::PlanId;

/// Payment processor selector.
///
/// The engine runs against exactly one active processor at a time; plans
/// carry provider-side price references for each processor they are sold
/// through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorKind {
    /// Card-network gateway (static secret key, HMAC-signed webhooks).
    Card,
    /// Wallet-style provider (OAuth client credentials, redirect approval).
    Wallet,
}

impl ProcessorKind {
    /// Stable lowercase name used in configuration and webhook routing.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorKind::Card => "card",
            ProcessorKind::Wallet => "wallet",
        }
    }

    /// Parses a processor name as it appears in configuration.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "card" => Some(ProcessorKind::Card),
            "wallet" => Some(ProcessorKind::Wallet),
            _ => None,
        }
    }
}

impl fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Customer tier a plan is sold to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Individual,
    Dealer,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Individual => "individual",
            PlanTier::Dealer => "dealer",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing cycle for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Fixed nominal day count for this cycle.
    ///
    /// 30 for monthly and 365 for yearly regardless of the calendar month.
    /// Both proration daily rates and renewal advancement use this figure,
    /// so a renewal always advances by exactly one nominal cycle. Changing
    /// these divisors changes dollar amounts charged to real customers.
    pub fn nominal_days(&self) -> u32 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::Yearly => 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }

    /// Parses a cycle name as it appears in configuration or metadata.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "monthly" => Some(BillingCycle::Monthly),
            "yearly" => Some(BillingCycle::Yearly),
            _ => None,
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-side price/plan identifiers for one processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorPlanRef {
    /// Price/plan id charged on the monthly cycle.
    pub monthly: String,
    /// Price/plan id charged on the yearly cycle.
    pub yearly: String,
}

impl ProcessorPlanRef {
    pub fn new(monthly: impl Into<String>, yearly: impl Into<String>) -> Self {
        Self {
            monthly: monthly.into(),
            yearly: yearly.into(),
        }
    }

    /// Returns the provider reference for the given cycle.
    pub fn for_cycle(&self, cycle: BillingCycle) -> &str {
        match cycle {
            BillingCycle::Monthly => &self.monthly,
            BillingCycle::Yearly => &self.yearly,
        }
    }
}

/// Static catalog entry describing one sellable plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: PlanId,
    pub name: String,
    pub tier: PlanTier,
    /// Entitlement feature flags granted by this plan.
    pub features: Vec<String>,
    /// Monthly list price in decimal major units.
    pub monthly_price: f64,
    /// Yearly list price in decimal major units.
    pub yearly_price: f64,
    /// Lowercase ISO 4217 currency code.
    pub currency: String,
    /// Provider-side price references, keyed by processor.
    pub processor_refs: HashMap<ProcessorKind, ProcessorPlanRef>,
    /// Trial length in days, if the plan starts with a trial.
    pub trial_days: Option<u32>,
    /// Inactive plans are kept for existing subscribers but not sold.
    pub active: bool,
}

impl SubscriptionPlan {
    /// Baseline free tier every downgrade lands on.
    pub fn free() -> Self {
        Self {
            id: PlanId::new("free").unwrap(),
            name: "Free".to_string(),
            tier: PlanTier::Individual,
            features: vec!["standard_listings".to_string(), "basic_search".to_string()],
            monthly_price: 0.0,
            yearly_price: 0.0,
            currency: "usd".to_string(),
            processor_refs: HashMap::new(),
            trial_days: None,
            active: true,
        }
    }

    /// Paid plan for individual sellers.
    pub fn premium_individual() -> Self {
        Self {
            id: PlanId::new("premium_individual").unwrap(),
            name: "Premium Individual".to_string(),
            tier: PlanTier::Individual,
            features: vec![
                "featured_listings".to_string(),
                "price_history".to_string(),
                "saved_searches".to_string(),
                "priority_support".to_string(),
            ],
            monthly_price: 29.99,
            yearly_price: 299.99,
            currency: "usd".to_string(),
            processor_refs: HashMap::new(),
            trial_days: None,
            active: true,
        }
    }

    /// Paid plan for dealerships.
    pub fn premium_dealer() -> Self {
        Self {
            id: PlanId::new("premium_dealer").unwrap(),
            name: "Premium Dealer".to_string(),
            tier: PlanTier::Dealer,
            features: vec![
                "bulk_listings".to_string(),
                "dealer_dashboard".to_string(),
                "featured_listings".to_string(),
                "sales_analytics".to_string(),
                "priority_support".to_string(),
            ],
            monthly_price: 99.99,
            yearly_price: 999.99,
            currency: "usd".to_string(),
            processor_refs: HashMap::new(),
            trial_days: None,
            active: true,
        }
    }

    /// Adds a trial period to the plan.
    pub fn with_trial(mut self, days: u32) -> Self {
        self.trial_days = Some(days);
        self
    }

    /// Installs the provider-side references for one processor.
    pub fn with_processor_ref(mut self, kind: ProcessorKind, refs: ProcessorPlanRef) -> Self {
        self.processor_refs.insert(kind, refs);
        self
    }

    /// List price for the given cycle, in decimal major units.
    pub fn price_for(&self, cycle: BillingCycle) -> f64 {
        match cycle {
            BillingCycle::Monthly => self.monthly_price,
            BillingCycle::Yearly => self.yearly_price,
        }
    }

    /// Provider reference for the given processor and cycle, if configured.
    pub fn processor_ref(&self, kind: ProcessorKind, cycle: BillingCycle) -> Option<&str> {
        self.processor_refs.get(&kind).map(|r| r.for_cycle(cycle))
    }

    /// Whether this is the zero-price baseline tier.
    pub fn is_free(&self) -> bool {
        self.monthly_price == 0.0 && self.yearly_price == 0.0
    }
}

/// Immutable plan catalog, loaded once at process start.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: HashMap<PlanId, SubscriptionPlan>,
    free: SubscriptionPlan,
}

impl PlanCatalog {
    /// Builds a catalog from an explicit plan list.
    ///
    /// Later entries with a duplicate id replace earlier ones, matching
    /// the replace-wholesale catalog update model. A free baseline plan is
    /// added when the list does not carry one, so downgrades always have a
    /// landing tier.
    pub fn new(plans: Vec<SubscriptionPlan>) -> Self {
        let mut map: HashMap<PlanId, SubscriptionPlan> =
            plans.into_iter().map(|p| (p.id.clone(), p)).collect();
        let free = map
            .values()
            .find(|p| p.is_free())
            .cloned()
            .unwrap_or_else(SubscriptionPlan::free);
        map.entry(free.id.clone()).or_insert_with(|| free.clone());
        Self { plans: map, free }
    }

    /// The standard Harborline catalog: free baseline plus the two paid tiers.
    pub fn standard() -> Self {
        Self::new(vec![
            SubscriptionPlan::free(),
            SubscriptionPlan::premium_individual(),
            SubscriptionPlan::premium_dealer(),
        ])
    }

    /// Looks up a plan by id.
    pub fn get(&self, id: &PlanId) -> Option<&SubscriptionPlan> {
        self.plans.get(id)
    }

    /// The baseline free plan every grace-period downgrade lands on.
    pub fn free_plan(&self) -> &SubscriptionPlan {
        &self.free
    }

    /// All plans currently sold.
    pub fn active_plans(&self) -> impl Iterator<Item = &SubscriptionPlan> {
        self.plans.values().filter(|p| p.active)
    }

    /// Replaces a plan's processor references, returning the updated catalog.
    pub fn with_processor_ref(
        mut self,
        plan_id: &PlanId,
        kind: ProcessorKind,
        refs: ProcessorPlanRef,
    ) -> Self {
        if let Some(plan) = self.plans.get_mut(plan_id) {
            plan.processor_refs.insert(kind, refs);
        }
        self
    }
}
