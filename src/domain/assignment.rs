//! Temporal rule assignments and their resolution.
//!
//! An assignment binds a rule value to a firm or an account for a half-open
//! validity window `[start, end)`. For a given owner and rule the windows
//! never overlap, so at most one assignment is in effect on any date.

use chrono::NaiveDate;
use serde::Serialize;

use super::error::PropdeskError;
use super::ids::{AccountId, AssignmentId, FirmId, RuleId, SpaceId};

string_enum! {
    pub enum OwnerKind ("owner") {
        Firm => "firm",
        Account => "account",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Owner {
    Firm(FirmId),
    Account(AccountId),
}

impl Owner {
    pub fn kind(&self) -> OwnerKind {
        match self {
            Owner::Firm(_) => OwnerKind::Firm,
            Owner::Account(_) => OwnerKind::Account,
        }
    }

    pub fn raw_id(&self) -> i64 {
        match self {
            Owner::Firm(id) => id.0,
            Owner::Account(id) => id.0,
        }
    }

    pub fn from_parts(kind: OwnerKind, id: i64) -> Self {
        match kind {
            OwnerKind::Firm => Owner::Firm(FirmId(id)),
            OwnerKind::Account => Owner::Account(AccountId(id)),
        }
    }
}

/// Half-open validity window; `end == None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Validity {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl Validity {
    pub fn new(start: NaiveDate, end: Option<NaiveDate>) -> Result<Self, PropdeskError> {
        if let Some(end) = end {
            if end <= start {
                return Err(PropdeskError::validation("end_date", "must be after start date"));
            }
        }
        Ok(Validity { start, end })
    }

    pub fn open_ended(start: NaiveDate) -> Self {
        Validity { start, end: None }
    }

    pub fn is_open_ended(&self) -> bool {
        self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && self.end.is_none_or(|end| end > date)
    }

    pub fn overlaps(&self, other: &Validity) -> bool {
        let starts_before_other_ends = other.end.is_none_or(|end| self.start < end);
        let ends_after_other_starts = self.end.is_none_or(|end| end > other.start);
        starts_before_other_ends && ends_after_other_starts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleAssignment {
    pub id: AssignmentId,
    pub space: SpaceId,
    pub owner: Owner,
    pub rule_id: RuleId,
    pub rule_value: String,
    pub validity: Validity,
    pub is_active: bool,
    /// Account-level only.
    pub is_inherited: bool,
    /// Account-level only.
    pub is_custom_override: bool,
    pub notes: Option<String>,
}

/// An assignment that has not been persisted yet. The owner is supplied by
/// the store call that inserts it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAssignment {
    pub rule_id: RuleId,
    pub rule_value: String,
    pub validity: Validity,
    pub is_active: bool,
    pub is_inherited: bool,
    pub is_custom_override: bool,
    pub notes: Option<String>,
}

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub assignment: RuleAssignment,
    pub level: OwnerKind,
}

impl Resolved {
    pub fn value(&self) -> &str {
        &self.assignment.rule_value
    }
}

/// First existing assignment whose window overlaps `proposed`, skipping the
/// assignment identified by `ignore` (used when an existing row is edited).
pub fn find_overlap<'a>(
    existing: &'a [RuleAssignment],
    proposed: &Validity,
    ignore: Option<AssignmentId>,
) -> Option<&'a RuleAssignment> {
    existing
        .iter()
        .filter(|a| Some(a.id) != ignore)
        .find(|a| a.validity.overlaps(proposed))
}

pub fn ensure_no_overlap(
    existing: &[RuleAssignment],
    proposed: &Validity,
    ignore: Option<AssignmentId>,
) -> Result<(), PropdeskError> {
    match find_overlap(existing, proposed, ignore) {
        Some(conflict) => Err(PropdeskError::validation(
            "start_date",
            format!(
                "overlaps with existing rule period starting {}",
                conflict.validity.start
            ),
        )),
        None => Ok(()),
    }
}

/// The active assignment in effect on `as_of`, if any.
pub fn effective_at(assignments: &[RuleAssignment], as_of: NaiveDate) -> Option<&RuleAssignment> {
    assignments
        .iter()
        .filter(|a| a.is_active)
        .find(|a| a.validity.contains(as_of))
}

/// Account-level assignments take precedence over the firm's.
pub fn resolve(
    account_level: &[RuleAssignment],
    firm_level: &[RuleAssignment],
    as_of: NaiveDate,
) -> Option<Resolved> {
    if let Some(a) = effective_at(account_level, as_of) {
        return Some(Resolved {
            assignment: a.clone(),
            level: OwnerKind::Account,
        });
    }
    effective_at(firm_level, as_of).map(|a| Resolved {
        assignment: a.clone(),
        level: OwnerKind::Firm,
    })
}

/// Copy a template account's rules into assignments for a new account that
/// starts on `start_date`.
///
/// Each rule is copied once: the template period in effect on `start_date`,
/// otherwise the latest-starting one. The copy is open-ended from
/// `start_date`.
pub fn materialize_from_template(
    template_rules: &[RuleAssignment],
    start_date: NaiveDate,
) -> Vec<NewAssignment> {
    let mut picked: Vec<&RuleAssignment> = Vec::new();
    for candidate in template_rules {
        match picked.iter().position(|p| p.rule_id == candidate.rule_id) {
            None => picked.push(candidate),
            Some(idx) => {
                let current = picked[idx];
                let current_in_effect = current.validity.contains(start_date);
                let candidate_in_effect = candidate.validity.contains(start_date);
                let better = (candidate_in_effect && !current_in_effect)
                    || (candidate_in_effect == current_in_effect
                        && candidate.validity.start > current.validity.start);
                if better {
                    picked[idx] = candidate;
                }
            }
        }
    }

    picked
        .into_iter()
        .map(|t| NewAssignment {
            rule_id: t.rule_id,
            rule_value: t.rule_value.clone(),
            validity: Validity::open_ended(start_date),
            is_active: t.is_active,
            is_inherited: true,
            is_custom_override: false,
            notes: None,
        })
        .collect()
}
