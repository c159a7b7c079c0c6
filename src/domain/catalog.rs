//! Rule catalog: what a rule is and how its assigned values must be shaped.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::PropdeskError;
use super::ids::{RuleId, SpaceId};

string_enum! {
    pub enum RuleType ("rule_type") {
        RiskManagement => "risk_management",
        TradingBehavior => "trading_behavior",
        PayoutEligibility => "payout_eligibility",
        AccountLifecycle => "account_lifecycle",
    }
}

string_enum! {
    /// How an assigned `rule_value` string is interpreted.
    pub enum DataType ("data_type") {
        Percentage => "percentage",
        CurrencyAmount => "currency_amount",
        IntegerCount => "integer_count",
        BooleanFlag => "boolean_flag",
        TimeDuration => "time_duration",
    }
}

string_enum! {
    pub enum CalculationMethod ("calculation_method") {
        SimpleThreshold => "simple_threshold",
        DailyLoss => "daily_loss",
        TotalDrawdown => "total_drawdown",
        ConsistencyRatio => "consistency_ratio",
        TradingDays => "trading_days",
        PositionSize => "position_size",
        MaxContracts => "max_contracts",
        TrailingDrawdown => "trailing_drawdown",
        DrawdownMode => "drawdown_mode",
    }
}

string_enum! {
    pub enum TimeScope ("time_scope") {
        PerTrade => "per_trade",
        Daily => "daily",
        Lifetime => "lifetime",
        Rolling30 => "rolling_30",
    }
}

string_enum! {
    /// Consequence of breaching the rule.
    pub enum ViolationAction ("violation_action") {
        HardBreach => "hard_breach",
        SoftWarning => "soft_warning",
        PayoutBlock => "payout_block",
    }
}

/// Bounds governing acceptable assigned values, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<bool>>,
}

impl ValidationConfig {
    pub fn min(min: i64) -> Self {
        ValidationConfig {
            min: Some(Decimal::from(min)),
            ..Default::default()
        }
    }

    pub fn range(min: i64, max: i64) -> Self {
        ValidationConfig {
            min: Some(Decimal::from(min)),
            max: Some(Decimal::from(max)),
            allowed_values: None,
        }
    }

    pub fn flag() -> Self {
        ValidationConfig {
            allowed_values: Some(vec![true, false]),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    pub id: RuleId,
    pub space: SpaceId,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub data_type: DataType,
    pub calculation_method: CalculationMethod,
    pub time_scope: TimeScope,
    pub violation_action: ViolationAction,
    pub validation_config: ValidationConfig,
    pub is_active: bool,
    pub sort_order: i32,
}

impl Rule {
    /// The configured upper bound, falling back to the lower bound.
    pub fn threshold_value(&self) -> Option<Decimal> {
        self.validation_config.max.or(self.validation_config.min)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewRule {
    pub name: String,
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub data_type: DataType,
    pub calculation_method: CalculationMethod,
    pub time_scope: TimeScope,
    pub violation_action: ViolationAction,
    pub validation_config: ValidationConfig,
    pub sort_order: i32,
}

impl NewRule {
    pub fn validate(&self) -> Result<(), PropdeskError> {
        if self.name.trim().is_empty() {
            return Err(PropdeskError::validation(
                "name",
                "can't be blank",
            ));
        }
        if let (Some(min), Some(max)) = (self.validation_config.min, self.validation_config.max) {
            if min > max {
                return Err(PropdeskError::validation(
                    "validation_config",
                    format!("min {min} exceeds max {max}"),
                ));
            }
        }
        Ok(())
    }
}

pub const DAILY_LOSS_LIMIT: &str = "Daily Loss Limit ($)";
pub const MAX_TOTAL_LOSS: &str = "Max Total Loss ($)";
pub const PROFIT_TARGET_PERCENT: &str = "Profit Target (%)";
pub const MIN_TRADING_DAYS: &str = "Min Trading Days";
pub const MIN_TRADING_DAY_AMOUNT: &str = "Min Trading Day Amount ($)";
pub const CONSISTENCY_RULE: &str = "Consistency Rule (%)";
pub const SAFETY_NET_PERCENT: &str = "Safety Net (%)";
pub const MAX_POSITION_SIZE: &str = "Max Position Size (%)";
pub const LEVERAGE_LIMIT: &str = "Leverage Limit";
pub const PHASE_ONE_TARGET: &str = "Phase 1 Target (%)";
pub const WEEKEND_HOLDING: &str = "Weekend Holding";
pub const NEWS_TRADING: &str = "News Trading";
pub const SAFETY_NET_DOLLARS: &str = "Safety Net ($)";
pub const PROFIT_TARGET_DOLLARS: &str = "Profit Target ($)";
pub const MINIMUM_PAYOUT: &str = "Minimum Payout ($)";
pub const PAYOUT_FREQUENCY: &str = "Payout Frequency (days)";
pub const PROFIT_SPLIT: &str = "Profit Split (%)";
pub const FIRST_PAYOUT_WAIT: &str = "First Payout Wait (days)";
pub const MIN_TRADING_DAYS_PAYOUT: &str = "Min Trading Days (Payout)";
pub const KYC_REQUIRED: &str = "KYC Required";

#[allow(clippy::too_many_arguments)]
fn entry(
    name: &str,
    rule_type: RuleType,
    data_type: DataType,
    calculation_method: CalculationMethod,
    time_scope: TimeScope,
    validation_config: ValidationConfig,
    sort_order: i32,
    description: &str,
) -> NewRule {
    NewRule {
        name: name.to_string(),
        description: Some(description.to_string()),
        rule_type,
        data_type,
        calculation_method,
        time_scope,
        violation_action: ViolationAction::HardBreach,
        validation_config,
        sort_order,
    }
}

/// The trading and payout rules every space starts with.
pub fn standard_rules() -> Vec<NewRule> {
    use CalculationMethod as M;
    use DataType as D;
    use RuleType as T;
    use TimeScope as S;

    vec![
        entry(DAILY_LOSS_LIMIT, T::RiskManagement, D::CurrencyAmount, M::DailyLoss, S::Daily,
            ValidationConfig::min(0), 1, "Maximum dollar amount that can be lost in a single day"),
        entry(MAX_TOTAL_LOSS, T::RiskManagement, D::CurrencyAmount, M::TotalDrawdown, S::Lifetime,
            ValidationConfig::min(0), 2, "Maximum dollar drawdown allowed on the account"),
        entry(PROFIT_TARGET_PERCENT, T::PayoutEligibility, D::Percentage, M::SimpleThreshold, S::Lifetime,
            ValidationConfig::min(0), 3, "Initial profit target to reach"),
        entry(MIN_TRADING_DAYS, T::TradingBehavior, D::IntegerCount, M::TradingDays, S::Lifetime,
            ValidationConfig::min(0), 4, "Minimum number of trading days required for evaluation"),
        entry(MIN_TRADING_DAY_AMOUNT, T::TradingBehavior, D::CurrencyAmount, M::SimpleThreshold, S::Daily,
            ValidationConfig::min(0), 5, "Minimum dollar amount required for a day to count as a trading day"),
        entry(CONSISTENCY_RULE, T::TradingBehavior, D::Percentage, M::ConsistencyRatio, S::Lifetime,
            ValidationConfig::range(0, 100), 6, "Maximum percentage of profit from a single day"),
        entry(SAFETY_NET_PERCENT, T::RiskManagement, D::Percentage, M::SimpleThreshold, S::Daily,
            ValidationConfig::range(0, 100), 7, "Protection buffer for account"),
        entry(MAX_POSITION_SIZE, T::RiskManagement, D::Percentage, M::PositionSize, S::PerTrade,
            ValidationConfig::range(0, 100), 8, "Maximum position size as percentage of account value"),
        entry(LEVERAGE_LIMIT, T::RiskManagement, D::IntegerCount, M::SimpleThreshold, S::PerTrade,
            ValidationConfig::min(1), 9, "Maximum leverage ratio allowed"),
        entry(PHASE_ONE_TARGET, T::PayoutEligibility, D::Percentage, M::SimpleThreshold, S::Lifetime,
            ValidationConfig::range(0, 100), 10, "Profit target for challenge phase"),
        entry(WEEKEND_HOLDING, T::TradingBehavior, D::BooleanFlag, M::SimpleThreshold, S::PerTrade,
            ValidationConfig::flag(), 11, "Allow positions to be held over weekends"),
        entry(NEWS_TRADING, T::TradingBehavior, D::BooleanFlag, M::SimpleThreshold, S::PerTrade,
            ValidationConfig::flag(), 12, "Allow trading during news events"),
        entry(SAFETY_NET_DOLLARS, T::RiskManagement, D::CurrencyAmount, M::SimpleThreshold, S::Daily,
            ValidationConfig::min(0), 13, "Protection buffer for account in dollars"),
        entry(PROFIT_TARGET_DOLLARS, T::PayoutEligibility, D::CurrencyAmount, M::SimpleThreshold, S::Lifetime,
            ValidationConfig::min(0), 14, "Initial profit target to reach in dollars"),
        entry(MINIMUM_PAYOUT, T::PayoutEligibility, D::CurrencyAmount, M::SimpleThreshold, S::Lifetime,
            ValidationConfig::min(0), 15, "Minimum amount required for payout"),
        entry(PAYOUT_FREQUENCY, T::PayoutEligibility, D::IntegerCount, M::SimpleThreshold, S::Lifetime,
            ValidationConfig::min(1), 16, "How often payouts are processed"),
        entry(PROFIT_SPLIT, T::PayoutEligibility, D::Percentage, M::SimpleThreshold, S::Lifetime,
            ValidationConfig::range(0, 100), 17, "Percentage of profit the trader keeps"),
        entry(FIRST_PAYOUT_WAIT, T::PayoutEligibility, D::IntegerCount, M::SimpleThreshold, S::Lifetime,
            ValidationConfig::min(0), 18, "Waiting period before first payout"),
        entry(MIN_TRADING_DAYS_PAYOUT, T::PayoutEligibility, D::IntegerCount, M::TradingDays, S::Lifetime,
            ValidationConfig::min(0), 19, "Minimum trading days required before payout"),
        entry(KYC_REQUIRED, T::PayoutEligibility, D::BooleanFlag, M::SimpleThreshold, S::Lifetime,
            ValidationConfig::flag(), 20, "Identity verification needed for payout"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn enums_round_trip_through_strings() {
        for dt in DataType::ALL {
            assert_eq!(dt.as_str().parse::<DataType>().unwrap(), *dt);
        }
        for cm in CalculationMethod::ALL {
            assert_eq!(cm.as_str().parse::<CalculationMethod>().unwrap(), *cm);
        }
        assert_eq!("rolling_30".parse::<TimeScope>().unwrap(), TimeScope::Rolling30);
    }

    #[test]
    fn unknown_enum_value_is_a_validation_error() {
        let err = "hourly".parse::<TimeScope>().unwrap_err();
        match err {
            PropdeskError::Validation { field, .. } => {
                assert_eq!(field, "time_scope")
            }
            other => panic!("expected Validation, got {other}"),
        }
    }

    #[test]
    fn validation_config_json_shape() {
        let config: ValidationConfig = serde_json::from_str(r#"{"min": 0, "max": 100}"#).unwrap();
        assert_eq!(config, ValidationConfig::range(0, 100));

        let flag: ValidationConfig =
            serde_json::from_str(r#"{"allowed_values": [true, false]}"#).unwrap();
        assert_eq!(flag, ValidationConfig::flag());

        let json = serde_json::to_string(&ValidationConfig::min(1)).unwrap();
        let back: ValidationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.min, Some(Decimal::from(1)));
        assert!(back.max.is_none());
    }

    #[test]
    fn standard_rules_have_unique_names() {
        let rules = standard_rules();
        let names: HashSet<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), rules.len());
        assert!(rules.iter().all(|r| r.validate().is_ok()));
    }

    #[test]
    fn threshold_prefers_max() {
        let rule = Rule {
            id: RuleId(1),
            space: SpaceId(1),
            name: CONSISTENCY_RULE.into(),
            description: None,
            rule_type: RuleType::TradingBehavior,
            data_type: DataType::Percentage,
            calculation_method: CalculationMethod::ConsistencyRatio,
            time_scope: TimeScope::Lifetime,
            violation_action: ViolationAction::HardBreach,
            validation_config: ValidationConfig::range(0, 100),
            is_active: true,
            sort_order: 6,
        };
        assert_eq!(rule.threshold_value(), Some(Decimal::from(100)));
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut rule = standard_rules().remove(0);
        rule.validation_config = ValidationConfig::range(10, 5);
        assert!(rule.validate().is_err());
    }
}
