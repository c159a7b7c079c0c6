//! Account-specific targets derived from resolved rule values.
//!
//! Pure functions over values the resolver and the balance engine have
//! already produced; nothing here touches the store.

use rust_decimal::Decimal;
use serde::Serialize;

/// The rule values targets depend on, already resolved for one account and
/// date. Absent rules stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRules {
    pub profit_target_dollars: Option<Decimal>,
    pub profit_target_percent: Option<Decimal>,
    pub safety_net: Option<Decimal>,
    pub consistency_percent: Option<Decimal>,
    pub min_trading_day_amount: Option<Decimal>,
    pub min_trading_days: Option<i64>,
}

impl ResolvedRules {
    /// Qualification threshold; zero qualifies every traded day.
    pub fn min_trading_day_amount(&self) -> Decimal {
        self.min_trading_day_amount.unwrap_or(Decimal::ZERO)
    }

    pub fn has_conflicting_profit_targets(&self) -> bool {
        self.profit_target_dollars.is_some() && self.profit_target_percent.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Targets {
    pub profit_target: Option<Decimal>,
    pub conflicting_profit_targets: bool,
    pub safety_net_amount: Option<Decimal>,
    pub amount_needed_to_safety_net: Option<Decimal>,
    pub amount_over_safety_net: Option<Decimal>,
    pub consistency_target: Option<Decimal>,
    pub remaining_to_target: Option<Decimal>,
    pub required_trading_days: i64,
    pub trading_days_remaining: i64,
}

impl Targets {
    pub fn compute(
        rules: &ResolvedRules,
        initial_balance: Decimal,
        profit_loss: Decimal,
        best_trading_day: Decimal,
        qualified_days: usize,
    ) -> Self {
        let consistency = consistency_target(rules.consistency_percent, best_trading_day);
        let required = required_trading_days(rules);
        Targets {
            profit_target: profit_target(rules, initial_balance),
            conflicting_profit_targets: rules.has_conflicting_profit_targets(),
            safety_net_amount: rules.safety_net,
            amount_needed_to_safety_net: amount_needed_to_safety_net(rules.safety_net, profit_loss),
            amount_over_safety_net: amount_over_safety_net(rules.safety_net, profit_loss),
            consistency_target: consistency,
            remaining_to_target: consistency.and_then(|target| target.checked_sub(profit_loss)),
            required_trading_days: required,
            trading_days_remaining: trading_days_remaining(required, qualified_days),
        }
    }
}

/// The dollar rule wins; otherwise a percentage of the initial balance.
pub fn profit_target(rules: &ResolvedRules, initial_balance: Decimal) -> Option<Decimal> {
    if let Some(dollars) = rules.profit_target_dollars {
        return Some(dollars);
    }
    rules
        .profit_target_percent
        .and_then(|pct| initial_balance.checked_mul(pct)?.checked_div(Decimal::ONE_HUNDRED))
}

pub fn amount_needed_to_safety_net(safety_net: Option<Decimal>, profit_loss: Decimal) -> Option<Decimal> {
    safety_net.map(|net| (net - profit_loss).max(Decimal::ZERO))
}

pub fn amount_over_safety_net(safety_net: Option<Decimal>, profit_loss: Decimal) -> Option<Decimal> {
    safety_net.map(|net| (profit_loss - net).max(Decimal::ZERO))
}

/// Total profit at which the best day is exactly `percent`% of it. Absent
/// when the percentage is too small to divide by.
pub fn consistency_target(percent: Option<Decimal>, best_trading_day: Decimal) -> Option<Decimal> {
    let percent = percent.filter(|p| *p > Decimal::ZERO)?;
    if best_trading_day <= Decimal::ZERO {
        return None;
    }
    let fraction = percent.checked_div(Decimal::ONE_HUNDRED)?;
    if fraction.is_zero() {
        return None;
    }
    best_trading_day.checked_div(fraction)
}

pub fn required_trading_days(rules: &ResolvedRules) -> i64 {
    rules.min_trading_days.unwrap_or(0)
}

pub fn trading_days_remaining(required: i64, qualified_days: usize) -> i64 {
    let qualified = i64::try_from(qualified_days).unwrap_or(i64::MAX);
    (required - qualified).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn profit_target_prefers_dollars() {
        let rules = ResolvedRules {
            profit_target_dollars: Some(dec!(3000)),
            profit_target_percent: Some(dec!(8)),
            ..Default::default()
        };
        assert_eq!(profit_target(&rules, dec!(50000)), Some(dec!(3000)));
        assert!(rules.has_conflicting_profit_targets());
    }

    #[test]
    fn profit_target_from_percent() {
        let rules = ResolvedRules {
            profit_target_percent: Some(dec!(8)),
            ..Default::default()
        };
        assert_eq!(profit_target(&rules, dec!(50000)), Some(dec!(4000)));
        assert!(!rules.has_conflicting_profit_targets());
        assert_eq!(profit_target(&ResolvedRules::default(), dec!(50000)), None);
    }

    #[test]
    fn safety_net_distances_clamp_at_zero() {
        let net = Some(dec!(2000));
        assert_eq!(amount_needed_to_safety_net(net, dec!(500)), Some(dec!(1500)));
        assert_eq!(amount_over_safety_net(net, dec!(500)), Some(dec!(0)));
        assert_eq!(amount_needed_to_safety_net(net, dec!(2600)), Some(dec!(0)));
        assert_eq!(amount_over_safety_net(net, dec!(2600)), Some(dec!(600)));
        assert_eq!(amount_needed_to_safety_net(None, dec!(500)), None);
        assert_eq!(amount_over_safety_net(None, dec!(500)), None);
    }

    #[test]
    fn consistency_target_needs_positive_best_day() {
        assert_eq!(consistency_target(Some(dec!(40)), dec!(1000)), Some(dec!(2500)));
        assert_eq!(consistency_target(Some(dec!(40)), dec!(0)), None);
        assert_eq!(consistency_target(Some(dec!(40)), dec!(-10)), None);
        assert_eq!(consistency_target(None, dec!(1000)), None);
        assert_eq!(consistency_target(Some(dec!(0)), dec!(1000)), None);
    }

    #[test]
    fn consistency_target_absent_for_vanishing_percent() {
        // Rounds to zero once divided by 100.
        assert_eq!(
            consistency_target(Some(dec!(0.0000000000000000000000000001)), dec!(500)),
            None
        );
        // Representable fraction, but the quotient overflows.
        assert_eq!(
            consistency_target(Some(dec!(0.00000000000000000000000001)), dec!(500)),
            None
        );
    }

    #[test]
    fn profit_target_absent_on_overflow() {
        let rules = ResolvedRules {
            profit_target_percent: Some(dec!(100)),
            ..Default::default()
        };
        assert_eq!(profit_target(&rules, Decimal::MAX), None);
    }

    #[test]
    fn trading_days_remaining_never_negative() {
        assert_eq!(trading_days_remaining(5, 2), 3);
        assert_eq!(trading_days_remaining(5, 9), 0);
        assert_eq!(trading_days_remaining(0, 0), 0);
    }

    #[test]
    fn targets_summary() {
        let rules = ResolvedRules {
            profit_target_percent: Some(dec!(10)),
            safety_net: Some(dec!(2000)),
            consistency_percent: Some(dec!(40)),
            min_trading_days: Some(5),
            ..Default::default()
        };
        let targets = Targets::compute(&rules, dec!(50000), dec!(1200), dec!(1000), 3);
        assert_eq!(targets.profit_target, Some(dec!(5000)));
        assert_eq!(targets.amount_needed_to_safety_net, Some(dec!(800)));
        assert_eq!(targets.consistency_target, Some(dec!(2500)));
        assert_eq!(targets.remaining_to_target, Some(dec!(1300)));
        assert_eq!(targets.required_trading_days, 5);
        assert_eq!(targets.trading_days_remaining, 2);
        assert!(!targets.conflicting_profit_targets);
    }
}
