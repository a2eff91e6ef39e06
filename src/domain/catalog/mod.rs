//! Plan catalog - static subscription plan definitions.

mod plan;

pub use plan::{
    BillingCycle, PlanCatalog, PlanTier, ProcessorKind, ProcessorPlanRef, SubscriptionPlan,
};
