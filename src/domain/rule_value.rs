//! Typed interpretation of assigned rule values.
//!
//! One validator per [`DataType`], each a pure function of the raw string and
//! the rule's [`ValidationConfig`].

use rust_decimal::Decimal;
use std::str::FromStr;

use super::catalog::{DataType, ValidationConfig};
use super::error::PropdeskError;

const FIELD: &str = "rule_value";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleValue {
    Percentage(Decimal),
    Currency(Decimal),
    Count(i64),
    Flag(bool),
    /// Whole minutes.
    Duration(i64),
}

impl RuleValue {
    /// Numeric view of the value; flags have none.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match *self {
            RuleValue::Percentage(v) | RuleValue::Currency(v) => Some(v),
            RuleValue::Count(v) | RuleValue::Duration(v) => Some(Decimal::from(v)),
            RuleValue::Flag(_) => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match *self {
            RuleValue::Flag(b) => Some(b),
            _ => None,
        }
    }
}

/// Validate `raw` against the rule's data type and bounds.
pub fn validate(
    data_type: DataType,
    raw: &str,
    config: &ValidationConfig,
) -> Result<RuleValue, PropdeskError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PropdeskError::validation(FIELD, "can't be blank"));
    }
    match data_type {
        DataType::Percentage => validate_percentage(raw, config),
        DataType::CurrencyAmount => validate_currency_amount(raw, config),
        DataType::IntegerCount => validate_integer_count(raw, config),
        DataType::BooleanFlag => validate_boolean(raw, config),
        DataType::TimeDuration => validate_duration(raw, config),
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal, PropdeskError> {
    Decimal::from_str(raw)
        .map_err(|_| PropdeskError::validation(FIELD, format!("'{raw}' is not a number")))
}

fn parse_integer(raw: &str) -> Result<i64, PropdeskError> {
    raw.parse::<i64>()
        .map_err(|_| PropdeskError::validation(FIELD, format!("'{raw}' is not a whole number")))
}

fn validate_percentage(raw: &str, config: &ValidationConfig) -> Result<RuleValue, PropdeskError> {
    let value = parse_decimal(raw)?;
    let min = config.min.unwrap_or(Decimal::ZERO);
    let max = config.max.unwrap_or(Decimal::ONE_HUNDRED);
    if value < min || value > max {
        return Err(PropdeskError::validation(
            FIELD,
            format!("must be between {min} and {max}"),
        ));
    }
    Ok(RuleValue::Percentage(value))
}

fn validate_currency_amount(
    raw: &str,
    config: &ValidationConfig,
) -> Result<RuleValue, PropdeskError> {
    let value = parse_decimal(raw)?;
    check_minimum(value, config)?;
    Ok(RuleValue::Currency(value))
}

fn validate_integer_count(raw: &str, config: &ValidationConfig) -> Result<RuleValue, PropdeskError> {
    let value = parse_integer(raw)?;
    check_minimum(Decimal::from(value), config)?;
    Ok(RuleValue::Count(value))
}

fn validate_duration(raw: &str, config: &ValidationConfig) -> Result<RuleValue, PropdeskError> {
    let value = parse_integer(raw)?;
    if value < 0 {
        return Err(PropdeskError::validation(FIELD, "duration cannot be negative"));
    }
    check_minimum(Decimal::from(value), config)?;
    Ok(RuleValue::Duration(value))
}

fn check_minimum(value: Decimal, config: &ValidationConfig) -> Result<(), PropdeskError> {
    let min = config.min.unwrap_or(Decimal::ZERO);
    if value < min {
        return Err(PropdeskError::validation(
            FIELD,
            format!("must be at least {min}"),
        ));
    }
    Ok(())
}

fn validate_boolean(raw: &str, config: &ValidationConfig) -> Result<RuleValue, PropdeskError> {
    let flag = parse_flag(raw)
        .ok_or_else(|| PropdeskError::validation(FIELD, "must be true or false"))?;
    if let Some(allowed) = &config.allowed_values {
        if !allowed.contains(&flag) {
            return Err(PropdeskError::validation(
                FIELD,
                format!("{flag} is not an allowed value"),
            ));
        }
    }
    Ok(RuleValue::Flag(flag))
}

/// Stored flags accept only `true`/`false`/`1`/`0`. Config files go through
/// the wider [`crate::ports::config_port::parse_bool`] instead, which also
/// takes yes/no and on/off.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
