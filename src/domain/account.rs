//! Firms and funded/evaluation trading accounts.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::PropdeskError;
use super::ids::{AccountId, FirmId, SpaceId};

string_enum! {
    pub enum Phase ("phase") {
        Evaluation => "evaluation",
        SimFunded => "sim-funded",
        Live => "live",
        StraightToFunded => "straight-to-funded",
    }
}

impl Phase {
    pub fn display_name(&self) -> &'static str {
        match self {
            Phase::Evaluation => "Evaluation",
            Phase::SimFunded => "Sim-Funded",
            Phase::Live => "Live",
            Phase::StraightToFunded => "Straight To Funded (S2F)",
        }
    }
}

string_enum! {
    pub enum AccountStatus ("status") {
        Active => "active",
        Suspended => "suspended",
        Terminated => "terminated",
        Completed => "completed",
    }
}

impl AccountStatus {
    /// Suspended and terminated accounts are "blown": their balance reports
    /// the initial balance and their pnl is not counted.
    pub fn is_blown(&self) -> bool {
        matches!(self, AccountStatus::Suspended | AccountStatus::Terminated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Firm {
    pub id: FirmId,
    pub space: SpaceId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: AccountId,
    pub space: SpaceId,
    pub firm_id: FirmId,
    pub user_id: Option<i64>,
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub phase: Phase,
    pub status: AccountStatus,
    pub initial_balance: Decimal,
    pub currency: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_template: bool,
    /// Cached peak balance; `None` until computed and stored.
    pub peak_balance: Option<Decimal>,
    pub auto_liquidity_threshold: Option<Decimal>,
}

impl Account {
    pub fn is_blown(&self) -> bool {
        self.status.is_blown()
    }

    pub fn label(&self) -> String {
        let name = self.name.clone().unwrap_or_else(|| format!("Account {}", self.id));
        match &self.external_id {
            Some(ext) => format!("{name} ({ext})"),
            None => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub firm_id: FirmId,
    pub user_id: Option<i64>,
    pub external_id: Option<String>,
    pub name: Option<String>,
    pub phase: Phase,
    pub status: AccountStatus,
    pub initial_balance: Decimal,
    pub currency: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_template: bool,
    pub auto_liquidity_threshold: Option<Decimal>,
}

impl NewAccount {
    /// A template account holding a firm's default rules for `phase`.
    pub fn template(firm_id: FirmId, phase: Phase, initial_balance: Decimal) -> Self {
        NewAccount {
            firm_id,
            user_id: None,
            external_id: None,
            name: Some(template_name(phase, initial_balance)),
            phase,
            status: AccountStatus::Active,
            initial_balance,
            currency: "USD".to_string(),
            start_date: None,
            end_date: None,
            is_template: true,
            auto_liquidity_threshold: None,
        }
    }

    pub fn validate(&self) -> Result<(), PropdeskError> {
        if self.initial_balance <= Decimal::ZERO {
            return Err(PropdeskError::validation(
                "initial_balance",
                "must be greater than 0",
            ));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PropdeskError::validation(
                "currency",
                "must be a three-letter code",
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end <= start {
                return Err(PropdeskError::validation("end_date", "must be after start date"));
            }
        }

        if self.is_template {
            if self.user_id.is_some() {
                return Err(PropdeskError::validation("user_id", "templates have no owner"));
            }
            if self.external_id.is_some() {
                return Err(PropdeskError::validation(
                    "external_id",
                    "templates have no external identifier",
                ));
            }
            if self.start_date.is_some() {
                return Err(PropdeskError::validation(
                    "start_date",
                    "templates have no start date",
                ));
            }
        } else {
            if self.user_id.is_none() {
                return Err(PropdeskError::validation("user_id", "can't be blank"));
            }
            if self.external_id.as_deref().is_none_or(|e| e.trim().is_empty()) {
                return Err(PropdeskError::validation("external_id", "can't be blank"));
            }
            if self.start_date.is_none() {
                return Err(PropdeskError::validation("start_date", "can't be blank"));
            }
        }
        Ok(())
    }
}

/// "Evaluation - 50K" style default name for templates.
pub fn template_name(phase: Phase, initial_balance: Decimal) -> String {
    let thousand = Decimal::from(1_000);
    let million = Decimal::from(1_000_000);
    let size = if initial_balance >= million {
        format!("{}M", (initial_balance / million).round())
    } else if initial_balance >= thousand {
        format!("{}K", (initial_balance / thousand).round())
    } else {
        initial_balance.round().to_string()
    };
    format!("{} - {}", phase.display_name(), size)
}
