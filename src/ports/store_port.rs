//! Persistence port traits.
//!
//! Every call takes the tenant [`SpaceId`] explicitly; an id that exists in
//! another space is reported as `NotFound`. Implementations must back the
//! advisory overlap and numbering checks with storage constraints and report
//! their violations as `PropdeskError::Consistency`.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::account::{Account, AccountStatus, Firm, NewAccount, Phase};
use crate::domain::assignment::{NewAssignment, Owner, RuleAssignment};
use crate::domain::balance::{AccountBalance, LedgerMark};
use crate::domain::catalog::{NewRule, Rule};
use crate::domain::error::PropdeskError;
use crate::domain::ids::{
    AccountId, AssignmentId, FirmId, PayoutId, RuleId, SpaceId, TradeId, ViolationId,
};
use crate::domain::payout::{NewPayout, Payout};
use crate::domain::trade::{NewTrade, Trade};
use crate::domain::violation::{NewViolation, RuleViolation};

pub trait CatalogStore {
    fn insert_rule(&self, space: SpaceId, rule: &NewRule) -> Result<Rule, PropdeskError>;
    fn get_rule(&self, space: SpaceId, id: RuleId) -> Result<Rule, PropdeskError>;
    fn find_rule_by_name(&self, space: SpaceId, name: &str) -> Result<Option<Rule>, PropdeskError>;
    fn list_rules(&self, space: SpaceId) -> Result<Vec<Rule>, PropdeskError>;
}

pub trait AccountStore {
    fn insert_firm(&self, space: SpaceId, name: &str) -> Result<Firm, PropdeskError>;
    fn get_firm(&self, space: SpaceId, id: FirmId) -> Result<Firm, PropdeskError>;

    /// Insert the account and its inherited assignments in one transaction.
    fn insert_account(
        &self,
        space: SpaceId,
        account: &NewAccount,
        inherited: &[NewAssignment],
    ) -> Result<Account, PropdeskError>;
    fn get_account(&self, space: SpaceId, id: AccountId) -> Result<Account, PropdeskError>;
    fn find_template(
        &self,
        space: SpaceId,
        firm: FirmId,
        phase: Phase,
    ) -> Result<Option<Account>, PropdeskError>;
    fn list_accounts(
        &self,
        space: SpaceId,
        include_templates: bool,
    ) -> Result<Vec<Account>, PropdeskError>;
    fn update_account_status(
        &self,
        space: SpaceId,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, PropdeskError>;
    /// Cache `peak` only while the cache is empty and the stored ledger still
    /// matches `basis`, the read it was computed from. Returns whether the
    /// value was stored.
    fn store_peak_balance(
        &self,
        space: SpaceId,
        id: AccountId,
        peak: Decimal,
        basis: LedgerMark,
    ) -> Result<bool, PropdeskError>;
    /// Removes the account and everything that hangs off it.
    fn delete_account(&self, space: SpaceId, id: AccountId) -> Result<(), PropdeskError>;
}

pub trait AssignmentStore {
    /// All assignments for `(owner, rule)`, ordered by start date.
    fn assignments_for(
        &self,
        space: SpaceId,
        owner: Owner,
        rule: RuleId,
    ) -> Result<Vec<RuleAssignment>, PropdeskError>;
    fn assignments_of(&self, space: SpaceId, owner: Owner)
    -> Result<Vec<RuleAssignment>, PropdeskError>;
    fn insert_assignment(
        &self,
        space: SpaceId,
        owner: Owner,
        assignment: &NewAssignment,
    ) -> Result<RuleAssignment, PropdeskError>;
    fn get_assignment(
        &self,
        space: SpaceId,
        id: AssignmentId,
    ) -> Result<RuleAssignment, PropdeskError>;
    fn update_assignment_end(
        &self,
        space: SpaceId,
        id: AssignmentId,
        end_date: NaiveDate,
    ) -> Result<RuleAssignment, PropdeskError>;
}

pub trait TradeStore {
    /// Persist the trade with its derived fields and drop the account's
    /// cached peak balance.
    fn insert_trade(
        &self,
        space: SpaceId,
        account: AccountId,
        trade: &NewTrade,
    ) -> Result<Trade, PropdeskError>;
    /// Persist a batch in one transaction, dropping the cached peak once.
    /// Nothing is written if any row fails.
    fn insert_trades(
        &self,
        space: SpaceId,
        account: AccountId,
        trades: &[NewTrade],
    ) -> Result<Vec<Trade>, PropdeskError>;
    /// Ledger order: `(trade_date, id)`.
    fn trades_for(&self, space: SpaceId, account: AccountId) -> Result<Vec<Trade>, PropdeskError>;
    fn get_trade(&self, space: SpaceId, id: TradeId) -> Result<Trade, PropdeskError>;

    fn insert_daily_balance(
        &self,
        space: SpaceId,
        balance: &AccountBalance,
    ) -> Result<(), PropdeskError>;
    fn get_daily_balance(
        &self,
        space: SpaceId,
        account: AccountId,
        date: NaiveDate,
    ) -> Result<Option<AccountBalance>, PropdeskError>;
}

pub trait PayoutStore {
    /// Number the payout `max + 1` under the writer lock and insert it.
    fn insert_payout(
        &self,
        space: SpaceId,
        account: AccountId,
        payout: &NewPayout,
    ) -> Result<Payout, PropdeskError>;
    fn get_payout(&self, space: SpaceId, id: PayoutId) -> Result<Payout, PropdeskError>;
    /// Ordered by payout number.
    fn payouts_for(&self, space: SpaceId, account: AccountId) -> Result<Vec<Payout>, PropdeskError>;
    /// Re-read the ledger, check the available balance and approve, all in
    /// one transaction.
    fn approve_payout(
        &self,
        space: SpaceId,
        id: PayoutId,
        amount_paid: Decimal,
        received_date: Option<NaiveDate>,
    ) -> Result<Payout, PropdeskError>;
    fn decline_payout(&self, space: SpaceId, id: PayoutId) -> Result<Payout, PropdeskError>;
}

pub trait ViolationStore {
    /// Insert the violation; when it is flagged `account_terminated` the
    /// account moves to `terminated` in the same transaction.
    fn insert_violation(
        &self,
        space: SpaceId,
        violation: &NewViolation,
    ) -> Result<RuleViolation, PropdeskError>;
    fn get_violation(&self, space: SpaceId, id: ViolationId)
    -> Result<RuleViolation, PropdeskError>;
    /// Persist the lifecycle fields (status, resolution stamps).
    fn update_violation(
        &self,
        space: SpaceId,
        violation: &RuleViolation,
    ) -> Result<(), PropdeskError>;
    fn violations_for(
        &self,
        space: SpaceId,
        account: AccountId,
    ) -> Result<Vec<RuleViolation>, PropdeskError>;
}

/// Everything the compliance engine needs from storage.
pub trait StorePort:
    CatalogStore + AccountStore + AssignmentStore + TradeStore + PayoutStore + ViolationStore
{
}

impl<T> StorePort for T where
    T: CatalogStore + AccountStore + AssignmentStore + TradeStore + PayoutStore + ViolationStore
{
}
