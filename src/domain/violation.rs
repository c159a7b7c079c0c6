//! Rule violations: detection records and their resolve/ignore lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::PropdeskError;
use super::ids::{AccountId, RuleId, TradeId, ViolationId};

string_enum! {
    pub enum Severity ("severity") {
        Warning => "warning",
        Minor => "minor",
        Major => "major",
        Critical => "critical",
    }
}

string_enum! {
    pub enum ViolationStatus ("status") {
        Active => "active",
        Resolved => "resolved",
        Ignored => "ignored",
    }
}

string_enum! {
    pub enum ComparisonOperator ("comparison_operator") {
        Gt => "gt",
        Gte => "gte",
        Lt => "lt",
        Lte => "lte",
        Eq => "eq",
    }
}

impl ComparisonOperator {
    /// Whether `actual` breaches `threshold` under this operator.
    pub fn is_breached(&self, actual: Decimal, threshold: Decimal) -> bool {
        match self {
            ComparisonOperator::Gt => actual > threshold,
            ComparisonOperator::Gte => actual >= threshold,
            ComparisonOperator::Lt => actual < threshold,
            ComparisonOperator::Lte => actual <= threshold,
            ComparisonOperator::Eq => actual == threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Eq => "==",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleViolation {
    pub id: ViolationId,
    pub account_id: AccountId,
    pub rule_id: RuleId,
    pub trade_id: Option<TradeId>,
    pub violation_type: String,
    pub severity: Severity,
    pub status: ViolationStatus,
    pub threshold_value: Option<Decimal>,
    pub actual_value: Option<Decimal>,
    pub comparison_operator: Option<ComparisonOperator>,
    pub violation_date: Option<NaiveDate>,
    pub details: Option<String>,
    pub action_taken: Option<String>,
    pub account_terminated: bool,
    pub detected_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
}

impl RuleViolation {
    /// `(actual - threshold) / threshold * 100`, two decimal places.
    pub fn violation_percentage(&self) -> Option<Decimal> {
        let threshold = self.threshold_value.filter(|t| !t.is_zero())?;
        let actual = self.actual_value?;
        let ratio = actual.checked_sub(threshold)?.checked_div(threshold)?;
        ratio
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|pct| pct.round_dp(2))
    }

    /// `actual op threshold`, when all three were captured.
    pub fn comparison(&self) -> Option<String> {
        let operator = self.comparison_operator?;
        Some(format!(
            "{} {} {}",
            self.actual_value?,
            operator.symbol(),
            self.threshold_value?
        ))
    }

    fn ensure_active(&self) -> Result<(), PropdeskError> {
        if self.status != ViolationStatus::Active {
            return Err(PropdeskError::validation(
                "status",
                format!("violation {} is already {}", self.id, self.status),
            ));
        }
        Ok(())
    }

    pub fn resolve(
        &mut self,
        now: DateTime<Utc>,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<(), PropdeskError> {
        self.ensure_active()?;
        if resolved_by.trim().is_empty() {
            return Err(PropdeskError::validation("resolved_by", "can't be blank"));
        }
        if now < self.detected_at {
            return Err(PropdeskError::validation(
                "resolved_at",
                "must not be before detected at",
            ));
        }
        self.status = ViolationStatus::Resolved;
        self.resolved_at = Some(now);
        self.resolved_by = Some(resolved_by.to_string());
        self.resolution_notes = notes;
        Ok(())
    }

    pub fn ignore(&mut self, now: DateTime<Utc>, notes: Option<String>) -> Result<(), PropdeskError> {
        self.ensure_active()?;
        if now < self.detected_at {
            return Err(PropdeskError::validation(
                "resolved_at",
                "must not be before detected at",
            ));
        }
        self.status = ViolationStatus::Ignored;
        self.resolved_at = Some(now);
        self.resolution_notes = notes;
        Ok(())
    }
}

/// What a caller supplies when it has found a breach.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub account_id: AccountId,
    pub rule_id: RuleId,
    pub actual_value: Decimal,
    pub threshold_value: Decimal,
    pub comparison_operator: ComparisonOperator,
    pub severity: Severity,
    pub trade_id: Option<TradeId>,
    pub violation_type: Option<String>,
    pub violation_date: Option<NaiveDate>,
    pub details: Option<String>,
    pub action_taken: Option<String>,
    pub terminate_account: bool,
}

impl Detection {
    pub fn new(
        account_id: AccountId,
        rule_id: RuleId,
        actual_value: Decimal,
        threshold_value: Decimal,
        comparison_operator: ComparisonOperator,
        severity: Severity,
    ) -> Self {
        Detection {
            account_id,
            rule_id,
            actual_value,
            threshold_value,
            comparison_operator,
            severity,
            trade_id: None,
            violation_type: None,
            violation_date: None,
            details: None,
            action_taken: None,
            terminate_account: false,
        }
    }
}

/// A violation ready to persist, stamped with its detection time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewViolation {
    pub account_id: AccountId,
    pub rule_id: RuleId,
    pub trade_id: Option<TradeId>,
    pub violation_type: String,
    pub severity: Severity,
    pub threshold_value: Decimal,
    pub actual_value: Decimal,
    pub comparison_operator: ComparisonOperator,
    pub violation_date: Option<NaiveDate>,
    pub details: Option<String>,
    pub action_taken: Option<String>,
    pub account_terminated: bool,
    pub detected_at: DateTime<Utc>,
}

impl NewViolation {
    /// `default_type` is used when the detection names none, normally the
    /// rule's calculation method.
    pub fn from_detection(detection: Detection, default_type: &str, now: DateTime<Utc>) -> Self {
        let violation_type = detection
            .violation_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default_type.to_string());
        NewViolation {
            account_id: detection.account_id,
            rule_id: detection.rule_id,
            trade_id: detection.trade_id,
            violation_type,
            severity: detection.severity,
            threshold_value: detection.threshold_value,
            actual_value: detection.actual_value,
            comparison_operator: detection.comparison_operator,
            violation_date: detection.violation_date.or(Some(now.date_naive())),
            details: detection.details,
            action_taken: detection.action_taken,
            account_terminated: detection.terminate_account,
            detected_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn detected_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 1, 12, 0, 0).unwrap()
    }

    fn violation() -> RuleViolation {
        let detection = Detection::new(
            AccountId(1),
            RuleId(2),
            dec!(1200),
            dec!(1000),
            ComparisonOperator::Gt,
            Severity::Major,
        );
        let new = NewViolation::from_detection(detection, "daily_loss", detected_at());
        RuleViolation {
            id: ViolationId(5),
            account_id: new.account_id,
            rule_id: new.rule_id,
            trade_id: new.trade_id,
            violation_type: new.violation_type,
            severity: new.severity,
            status: ViolationStatus::Active,
            threshold_value: Some(new.threshold_value),
            actual_value: Some(new.actual_value),
            comparison_operator: Some(new.comparison_operator),
            violation_date: new.violation_date,
            details: new.details,
            action_taken: new.action_taken,
            account_terminated: new.account_terminated,
            detected_at: new.detected_at,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        }
    }

    #[test]
    fn detection_defaults() {
        let v = violation();
        assert_eq!(v.violation_type, "daily_loss");
        assert_eq!(v.violation_date, NaiveDate::from_ymd_opt(2025, 4, 1));
        assert!(!v.account_terminated);
    }

    #[test]
    fn percentage_over_threshold() {
        assert_eq!(violation().violation_percentage(), Some(dec!(20)));
        let mut v = violation();
        v.actual_value = Some(dec!(1000.333));
        assert_eq!(v.violation_percentage(), Some(dec!(0.03)));
        v.threshold_value = Some(Decimal::ZERO);
        assert_eq!(v.violation_percentage(), None);
        v.threshold_value = None;
        assert_eq!(v.violation_percentage(), None);
    }

    #[test]
    fn percentage_absent_when_it_overflows() {
        let mut v = violation();
        v.threshold_value = Some(dec!(0.0000000000000000000000000001));
        v.actual_value = Some(dec!(1000000));
        assert_eq!(v.violation_percentage(), None);
    }

    #[test]
    fn comparison_reads_as_breach() {
        assert_eq!(violation().comparison().as_deref(), Some("1200 > 1000"));
        let mut v = violation();
        v.comparison_operator = Some(ComparisonOperator::Lte);
        assert_eq!(v.comparison().as_deref(), Some("1200 <= 1000"));
        v.actual_value = None;
        assert_eq!(v.comparison(), None);
    }

    #[test]
    fn resolve_stamps_fields() {
        let mut v = violation();
        let later = detected_at() + Duration::hours(2);
        v.resolve(later, "risk-desk", Some("reviewed".into())).unwrap();
        assert_eq!(v.status, ViolationStatus::Resolved);
        assert_eq!(v.resolved_at, Some(later));
        assert_eq!(v.resolved_by.as_deref(), Some("risk-desk"));
        assert_eq!(v.resolution_notes.as_deref(), Some("reviewed"));
    }

    #[test]
    fn resolve_before_detection_rejected() {
        let mut v = violation();
        let earlier = detected_at() - Duration::seconds(1);
        assert!(v.resolve(earlier, "risk-desk", None).is_err());
        assert_eq!(v.status, ViolationStatus::Active);
        assert!(v.resolve(detected_at(), "risk-desk", None).is_ok());
    }

    #[test]
    fn terminal_states_do_not_transition() {
        let mut v = violation();
        v.ignore(detected_at(), None).unwrap();
        assert_eq!(v.status, ViolationStatus::Ignored);
        assert!(v.resolve(detected_at(), "risk-desk", None).is_err());
        assert!(v.ignore(detected_at(), None).is_err());
    }

    #[test]
    fn operators() {
        assert!(ComparisonOperator::Gt.is_breached(dec!(2), dec!(1)));
        assert!(!ComparisonOperator::Gt.is_breached(dec!(1), dec!(1)));
        assert!(ComparisonOperator::Gte.is_breached(dec!(1), dec!(1)));
        assert!(ComparisonOperator::Lt.is_breached(dec!(0), dec!(1)));
        assert!(ComparisonOperator::Lte.is_breached(dec!(1), dec!(1)));
        assert!(ComparisonOperator::Eq.is_breached(dec!(1.0), dec!(1)));
        assert_eq!("lte".parse::<ComparisonOperator>().unwrap(), ComparisonOperator::Lte);
    }
}
