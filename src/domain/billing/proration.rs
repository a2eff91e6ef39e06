//! Pure proration arithmetic for mid-cycle plan changes.
//!
//! Daily rates divide the cycle price by a fixed nominal divisor (30 for
//! monthly, 365 for yearly) rather than the calendar length of the actual
//! period. Subscribers on the 1st of February and the 1st of March prorate
//! identically, which is the property support teams care about. Changing
//! the divisors changes real dollar amounts.

use crate::domain::billing::errors::BillingError;
use crate::domain::catalog::{BillingCycle, SubscriptionPlan};
use crate::domain::foundation::Timestamp;
use serde::{Deserialize, Serialize};

/// Result of a proration computation. All amounts in major units,
/// unrounded; callers round at charge time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProrationResult {
    /// Value of the unused remainder of the current plan.
    pub refund_equivalent: f64,
    /// Cost of the remainder of the period on the new plan.
    pub charge_equivalent: f64,
    /// What the subscriber owes now: `max(0, charge - refund)`.
    pub amount_due: f64,
    pub days_remaining: u32,
    pub effective_date: Timestamp,
}

impl ProrationResult {
    /// Credit left over on a downgrade: `max(0, refund - charge)`.
    /// Recorded for support tooling, never auto-refunded.
    pub fn downgrade_credit(&self) -> f64 {
        (self.refund_equivalent - self.charge_equivalent).max(0.0)
    }

    pub fn is_charge(&self) -> bool {
        self.amount_due > 0.0
    }
}

/// Stateless proration math. Same inputs, same outputs, no clock and no
/// I/O anywhere in here.
pub struct ProrationCalculator;

impl ProrationCalculator {
    /// Computes the charge for switching `current` -> `new` with
    /// `days_remaining` left in the paid period.
    ///
    /// Negative `days_remaining` is clamped to zero (a change on the
    /// rollover boundary owes nothing). Plans priced in different
    /// currencies cannot be prorated against each other.
    pub fn compute(
        current: &SubscriptionPlan,
        new: &SubscriptionPlan,
        cycle: BillingCycle,
        days_remaining: i64,
        effective_date: Timestamp,
    ) -> Result<ProrationResult, BillingError> {
        if current.currency != new.currency {
            return Err(BillingError::proration_input(format!(
                "currency mismatch: {} vs {}",
                current.currency, new.currency
            )));
        }

        let days = days_remaining.max(0) as u32;
        let divisor = f64::from(cycle.nominal_days());

        let current_daily = current.price_for(cycle) / divisor;
        let new_daily = new.price_for(cycle) / divisor;

        let refund_equivalent = current_daily * f64::from(days);
        let charge_equivalent = new_daily * f64::from(days);
        let amount_due = (charge_equivalent - refund_equivalent).max(0.0);

        Ok(ProrationResult {
            refund_equivalent,
            charge_equivalent,
            amount_due,
            days_remaining: days,
            effective_date,
        })
    }
}

/// Rounds a major-unit amount to cents, for the moment it is charged.
pub fn round_to_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPSILON: f64 = 1e-6;

    fn individual() -> SubscriptionPlan {
        SubscriptionPlan::premium_individual()
    }

    fn dealer() -> SubscriptionPlan {
        SubscriptionPlan::premium_dealer()
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < EPSILON,
            "expected {} to be within {} of {}",
            actual,
            EPSILON,
            expected
        );
    }

    // ============================================================
    // Worked Upgrade Scenario
    // ============================================================

    #[test]
    fn monthly_upgrade_mid_cycle() {
        // 29.99/mo -> 99.99/mo with 15 of 30 days left.
        let result = ProrationCalculator::compute(
            &individual(),
            &dealer(),
            BillingCycle::Monthly,
            15,
            Timestamp::now(),
        )
        .unwrap();

        assert_close(result.refund_equivalent, 14.995);
        assert_close(result.charge_equivalent, 49.995);
        assert_close(result.amount_due, 35.00);
        assert_eq!(result.days_remaining, 15);
        assert!(result.is_charge());
    }

    #[test]
    fn yearly_upgrade_uses_365_divisor() {
        let result = ProrationCalculator::compute(
            &individual(),
            &dealer(),
            BillingCycle::Yearly,
            100,
            Timestamp::now(),
        )
        .unwrap();

        assert_close(result.refund_equivalent, 299.99 / 365.0 * 100.0);
        assert_close(result.charge_equivalent, 999.99 / 365.0 * 100.0);
    }

    // ============================================================
    // Downgrade & Edge Cases
    // ============================================================

    #[test]
    fn downgrade_owes_nothing_and_reports_credit() {
        let result = ProrationCalculator::compute(
            &dealer(),
            &individual(),
            BillingCycle::Monthly,
            15,
            Timestamp::now(),
        )
        .unwrap();

        assert_close(result.amount_due, 0.0);
        assert_close(result.downgrade_credit(), 49.995 - 14.995);
        assert!(!result.is_charge());
    }

    #[test]
    fn same_plan_change_owes_nothing() {
        let result = ProrationCalculator::compute(
            &dealer(),
            &dealer(),
            BillingCycle::Monthly,
            22,
            Timestamp::now(),
        )
        .unwrap();

        assert_close(result.amount_due, 0.0);
        assert_close(result.downgrade_credit(), 0.0);
    }

    #[test]
    fn zero_days_remaining_owes_nothing() {
        let result = ProrationCalculator::compute(
            &individual(),
            &dealer(),
            BillingCycle::Monthly,
            0,
            Timestamp::now(),
        )
        .unwrap();

        assert_close(result.amount_due, 0.0);
        assert_eq!(result.days_remaining, 0);
    }

    #[test]
    fn negative_days_clamped_to_zero() {
        let result = ProrationCalculator::compute(
            &individual(),
            &dealer(),
            BillingCycle::Monthly,
            -3,
            Timestamp::now(),
        )
        .unwrap();

        assert_eq!(result.days_remaining, 0);
        assert_close(result.amount_due, 0.0);
    }

    #[test]
    fn full_period_remaining_charges_full_difference() {
        let result = ProrationCalculator::compute(
            &individual(),
            &dealer(),
            BillingCycle::Monthly,
            30,
            Timestamp::now(),
        )
        .unwrap();

        assert_close(result.amount_due, 99.99 - 29.99);
    }

    #[test]
    fn currency_mismatch_is_rejected() {
        let mut eur_plan = dealer();
        eur_plan.currency = "eur".to_string();

        let err = ProrationCalculator::compute(
            &individual(),
            &eur_plan,
            BillingCycle::Monthly,
            15,
            Timestamp::now(),
        )
        .unwrap_err();

        assert_eq!(err.code(), "PRORATION_INPUT_ERROR");
    }

    #[test]
    fn upgrade_from_free_charges_prorated_new_rate() {
        let result = ProrationCalculator::compute(
            &SubscriptionPlan::free(),
            &individual(),
            BillingCycle::Monthly,
            10,
            Timestamp::now(),
        )
        .unwrap();

        assert_close(result.refund_equivalent, 0.0);
        assert_close(result.amount_due, 29.99 / 30.0 * 10.0);
    }

    // ============================================================
    // Rounding
    // ============================================================

    #[test]
    fn round_to_cents_rounds_half_up() {
        assert_close(round_to_cents(35.004999), 35.00);
        assert_close(round_to_cents(14.995), 15.00);
        assert_close(round_to_cents(0.0), 0.0);
    }

    // ============================================================
    // Properties
    // ============================================================

    proptest! {
        #[test]
        fn amount_due_is_never_negative(days in -40i64..400) {
            let result = ProrationCalculator::compute(
                &dealer(),
                &individual(),
                BillingCycle::Monthly,
                days,
                Timestamp::now(),
            ).unwrap();
            prop_assert!(result.amount_due >= 0.0);
        }

        #[test]
        fn upgrade_cost_grows_with_days_remaining(a in 0i64..=30, b in 0i64..=30) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let due_lo = ProrationCalculator::compute(
                &individual(), &dealer(), BillingCycle::Monthly, lo, Timestamp::now(),
            ).unwrap().amount_due;
            let due_hi = ProrationCalculator::compute(
                &individual(), &dealer(), BillingCycle::Monthly, hi, Timestamp::now(),
            ).unwrap().amount_due;
            prop_assert!(due_lo <= due_hi + EPSILON);
        }

        #[test]
        fn refund_and_charge_scale_linearly(days in 1i64..=30) {
            let result = ProrationCalculator::compute(
                &individual(), &dealer(), BillingCycle::Monthly, days, Timestamp::now(),
            ).unwrap();
            let per_day_refund = result.refund_equivalent / days as f64;
            prop_assert!((per_day_refund - 29.99 / 30.0).abs() < EPSILON);
        }
    }
}
