//! The compliance engine: the operations callers invoke.
//!
//! Holds no state of its own beyond settings. Storage and time come in
//! through [`StorePort`] and [`ClockPort`]; the tenant is an explicit
//! argument on every call.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use super::account::{Account, AccountStatus, Firm, NewAccount};
use super::assignment::{
    self, ensure_no_overlap, materialize_from_template, NewAssignment, Owner, Resolved,
    RuleAssignment, Validity,
};
use super::balance::{
    self, daily_aggregates, qualified_trading_days, AccountBalance, DailyAggregate,
    LedgerMark, LedgerMetrics, PeakBalance, PeakSource,
};
use super::catalog::{self, NewRule, Rule};
use super::error::PropdeskError;
use super::ids::{AccountId, AssignmentId, FirmId, PayoutId, RuleId, SpaceId, ViolationId};
use super::payout::{self, NewPayout, Payout, PayoutStatus};
use super::rule_value::{self, RuleValue};
use super::targets::{ResolvedRules, Targets};
use super::trade::{NewTrade, Trade};
use super::violation::{Detection, NewViolation, RuleViolation};
use crate::ports::clock_port::ClockPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::StorePort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Store computed peak balances back on the account.
    pub cache_peak_balance: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            cache_peak_balance: true,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        EngineSettings {
            cache_peak_balance: config.get_bool("engine", "cache_peak_balance", true),
        }
    }
}

/// Rule assignment request.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignRequest {
    pub owner: Owner,
    pub rule_id: RuleId,
    pub value: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Everything reported for one account on one date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountMetrics {
    pub account_id: AccountId,
    pub as_of: NaiveDate,
    pub status: AccountStatus,
    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub peak_balance: Decimal,
    pub peak_source: PeakSource,
    pub drawdown_from_peak: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percentage: Decimal,
    pub balance_at_start_of_day: Decimal,
    pub available_drawdown: Option<Decimal>,
    pub qualified_trading_days: usize,
    pub non_qualified_trading_days: usize,
    pub total_trading_days: usize,
    pub trading_days_last_30: usize,
    pub best_trading_day: Decimal,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_payouts_paid: Decimal,
    pub approved_payouts: usize,
    pub targets: Targets,
    pub daily: Vec<DailyAggregate>,
}

pub struct ComplianceEngine<'a> {
    store: &'a dyn StorePort,
    clock: &'a dyn ClockPort,
    settings: EngineSettings,
}

impl<'a> ComplianceEngine<'a> {
    pub fn new(store: &'a dyn StorePort, clock: &'a dyn ClockPort) -> Self {
        Self::with_settings(store, clock, EngineSettings::default())
    }

    pub fn with_settings(
        store: &'a dyn StorePort,
        clock: &'a dyn ClockPort,
        settings: EngineSettings,
    ) -> Self {
        ComplianceEngine {
            store,
            clock,
            settings,
        }
    }

    // ---- catalog ----

    pub fn create_rule(&self, space: SpaceId, rule: &NewRule) -> Result<Rule, PropdeskError> {
        rule.validate()?;
        if self.store.find_rule_by_name(space, rule.name.trim())?.is_some() {
            return Err(PropdeskError::validation("name", "has already been taken"));
        }
        let created = self
            .store
            .insert_rule(space, rule)
            .map_err(|e| conflict_as_validation(e, "name", "has already been taken"))?;
        tracing::info!(space = %space, rule = %created.id, name = %created.name, "rule created");
        Ok(created)
    }

    /// Create whichever standard rules the space is missing.
    pub fn seed_standard_catalog(&self, space: SpaceId) -> Result<Vec<Rule>, PropdeskError> {
        let mut rules = Vec::new();
        for standard in catalog::standard_rules() {
            match self.store.find_rule_by_name(space, &standard.name)? {
                Some(existing) => rules.push(existing),
                None => rules.push(self.create_rule(space, &standard)?),
            }
        }
        Ok(rules)
    }

    pub fn rules(&self, space: SpaceId) -> Result<Vec<Rule>, PropdeskError> {
        self.store.list_rules(space)
    }

    // ---- firms and accounts ----

    pub fn create_firm(&self, space: SpaceId, name: &str) -> Result<Firm, PropdeskError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PropdeskError::validation("name", "can't be blank"));
        }
        let firm = self
            .store
            .insert_firm(space, name)
            .map_err(|e| conflict_as_validation(e, "name", "has already been taken"))?;
        tracing::info!(space = %space, firm = %firm.id, "firm created");
        Ok(firm)
    }

    /// Create an account. Real accounts receive open-ended copies of the
    /// matching template's rules starting on their start date.
    pub fn create_account(
        &self,
        space: SpaceId,
        account: &NewAccount,
    ) -> Result<Account, PropdeskError> {
        account.validate()?;
        self.store.get_firm(space, account.firm_id)?;

        let inherited = match account.start_date {
            Some(start) if !account.is_template => {
                self.materialize_template(space, account, start)?
            }
            _ => Vec::new(),
        };

        let created = self
            .store
            .insert_account(space, account, &inherited)
            .map_err(|e| conflict_as_validation(e, "external_id", "has already been taken"))?;
        tracing::info!(
            space = %space,
            account = %created.id,
            template = created.is_template,
            inherited = inherited.len(),
            "account created"
        );
        Ok(created)
    }

    /// Assignments a new account would inherit from its firm's template for
    /// the same phase. No template means no inherited rules.
    pub fn materialize_template(
        &self,
        space: SpaceId,
        account: &NewAccount,
        start_date: NaiveDate,
    ) -> Result<Vec<NewAssignment>, PropdeskError> {
        let Some(template) = self
            .store
            .find_template(space, account.firm_id, account.phase)?
        else {
            tracing::debug!(firm = %account.firm_id, phase = %account.phase, "no template account");
            return Ok(Vec::new());
        };
        let template_rules = self
            .store
            .assignments_of(space, Owner::Account(template.id))?;
        Ok(materialize_from_template(&template_rules, start_date))
    }

    pub fn account(&self, space: SpaceId, id: AccountId) -> Result<Account, PropdeskError> {
        self.store.get_account(space, id)
    }

    pub fn accounts(&self, space: SpaceId) -> Result<Vec<Account>, PropdeskError> {
        self.store.list_accounts(space, false)
    }

    pub fn set_account_status(
        &self,
        space: SpaceId,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, PropdeskError> {
        let account = self.store.update_account_status(space, id, status)?;
        tracing::info!(space = %space, account = %id, status = %status, "account status changed");
        Ok(account)
    }

    pub fn delete_account(&self, space: SpaceId, id: AccountId) -> Result<(), PropdeskError> {
        self.store.delete_account(space, id)?;
        tracing::info!(space = %space, account = %id, "account deleted");
        Ok(())
    }

    // ---- assignments ----

    /// The value in effect for `(owner, rule)` on `as_of`. Accounts fall
    /// back to their firm's assignment when they hold none themselves.
    pub fn resolve_rule_value(
        &self,
        space: SpaceId,
        owner: Owner,
        rule: RuleId,
        as_of: NaiveDate,
    ) -> Result<Option<Resolved>, PropdeskError> {
        self.store.get_rule(space, rule)?;
        match owner {
            Owner::Account(id) => {
                let account = self.store.get_account(space, id)?;
                self.resolve_for_account(space, &account, rule, as_of)
            }
            Owner::Firm(id) => {
                self.store.get_firm(space, id)?;
                let firm_level = self.store.assignments_for(space, owner, rule)?;
                Ok(assignment::resolve(&[], &firm_level, as_of))
            }
        }
    }

    fn resolve_for_account(
        &self,
        space: SpaceId,
        account: &Account,
        rule: RuleId,
        as_of: NaiveDate,
    ) -> Result<Option<Resolved>, PropdeskError> {
        let account_level = self
            .store
            .assignments_for(space, Owner::Account(account.id), rule)?;
        let firm_level = self
            .store
            .assignments_for(space, Owner::Firm(account.firm_id), rule)?;
        Ok(assignment::resolve(&account_level, &firm_level, as_of))
    }

    pub fn assign_rule(
        &self,
        space: SpaceId,
        request: &AssignRequest,
    ) -> Result<RuleAssignment, PropdeskError> {
        let rule = self.store.get_rule(space, request.rule_id)?;
        let custom_override = match request.owner {
            Owner::Firm(id) => {
                self.store.get_firm(space, id)?;
                false
            }
            Owner::Account(id) => !self.store.get_account(space, id)?.is_template,
        };

        rule_value::validate(rule.data_type, &request.value, &rule.validation_config)?;
        let validity = Validity::new(request.start_date, request.end_date)?;
        let new = NewAssignment {
            rule_id: rule.id,
            rule_value: request.value.trim().to_string(),
            validity,
            is_active: true,
            is_inherited: false,
            is_custom_override: custom_override,
            notes: request.notes.clone(),
        };

        let created = retry_on_conflict("assign_rule", "start_date", || {
            let existing = self.store.assignments_for(space, request.owner, rule.id)?;
            ensure_no_overlap(&existing, &validity, None)?;
            self.store.insert_assignment(space, request.owner, &new)
        })?;
        tracing::info!(
            space = %space,
            assignment = %created.id,
            rule = %rule.name,
            start = %validity.start,
            "rule assigned"
        );
        Ok(created)
    }

    /// End an assignment on `end_date` so a successor can take over.
    pub fn close_assignment(
        &self,
        space: SpaceId,
        id: AssignmentId,
        end_date: NaiveDate,
    ) -> Result<RuleAssignment, PropdeskError> {
        let current = self.store.get_assignment(space, id)?;
        let validity = Validity::new(current.validity.start, Some(end_date))?;
        let closed = retry_on_conflict("close_assignment", "end_date", || {
            let existing = self
                .store
                .assignments_for(space, current.owner, current.rule_id)?;
            ensure_no_overlap(&existing, &validity, Some(id))?;
            self.store.update_assignment_end(space, id, end_date)
        })?;
        tracing::info!(space = %space, assignment = %id, end = %end_date, "assignment closed");
        Ok(closed)
    }

    pub fn assignments(
        &self,
        space: SpaceId,
        owner: Owner,
    ) -> Result<Vec<RuleAssignment>, PropdeskError> {
        self.store.assignments_of(space, owner)
    }

    // ---- trades ----

    pub fn record_trade(
        &self,
        space: SpaceId,
        account: AccountId,
        trade: &NewTrade,
    ) -> Result<Trade, PropdeskError> {
        self.tradeable_account(space, account)?;
        trade.validate()?;
        let saved = self.store.insert_trade(space, account, trade)?;
        tracing::debug!(space = %space, account = %account, trade = %saved.id, pnl = %saved.pnl, "trade recorded");
        Ok(saved)
    }

    /// Record a batch of trades. Every trade is validated before any is
    /// written, and the batch commits as a whole.
    pub fn record_trades(
        &self,
        space: SpaceId,
        account: AccountId,
        trades: &[NewTrade],
    ) -> Result<Vec<Trade>, PropdeskError> {
        self.tradeable_account(space, account)?;
        for trade in trades {
            trade.validate()?;
        }
        let saved = self.store.insert_trades(space, account, trades)?;
        tracing::info!(space = %space, account = %account, count = saved.len(), "trades imported");
        Ok(saved)
    }

    pub fn trades(&self, space: SpaceId, account: AccountId) -> Result<Vec<Trade>, PropdeskError> {
        self.store.trades_for(space, account)
    }

    fn tradeable_account(&self, space: SpaceId, id: AccountId) -> Result<Account, PropdeskError> {
        let account = self.store.get_account(space, id)?;
        if account.is_template {
            return Err(PropdeskError::validation(
                "account_id",
                "template accounts do not hold trades",
            ));
        }
        Ok(account)
    }

    // ---- balance and metrics ----

    /// Balance, peak, trading-day and target figures. With an explicit
    /// `as_of` only trades and payouts up to that date count and the peak is
    /// replayed rather than read from the cache.
    pub fn account_metrics(
        &self,
        space: SpaceId,
        id: AccountId,
        as_of: Option<NaiveDate>,
    ) -> Result<AccountMetrics, PropdeskError> {
        let account = self.store.get_account(space, id)?;
        let date = as_of.unwrap_or_else(|| self.clock.today());

        let mut trades = self.store.trades_for(space, id)?;
        let mut payouts = self.store.payouts_for(space, id)?;
        if as_of.is_some() {
            trades = balance::trades_through(&trades, date);
            payouts = balance::payouts_through(&payouts, date);
        }

        let peak = self.peak_balance(space, &account, &trades, as_of.is_none())?;
        let rules = self.resolved_rules(space, &account, date)?;
        let days = daily_aggregates(&trades);
        let ledger = LedgerMetrics::compute(&account, &trades, &payouts, &days, date);
        let qualified = qualified_trading_days(&days, rules.min_trading_day_amount());
        let targets = Targets::compute(
            &rules,
            account.initial_balance,
            ledger.profit_loss,
            ledger.best_trading_day,
            qualified,
        );
        if targets.conflicting_profit_targets {
            tracing::warn!(
                space = %space,
                account = %id,
                "both {} and {} are configured; using the dollar target",
                catalog::PROFIT_TARGET_DOLLARS,
                catalog::PROFIT_TARGET_PERCENT
            );
        }

        Ok(AccountMetrics {
            account_id: account.id,
            as_of: date,
            status: account.status,
            initial_balance: account.initial_balance,
            current_balance: ledger.current_balance,
            peak_balance: peak.value,
            peak_source: peak.source,
            drawdown_from_peak: (peak.value - ledger.current_balance).max(Decimal::ZERO),
            profit_loss: ledger.profit_loss,
            profit_loss_percentage: ledger.profit_loss_percentage,
            balance_at_start_of_day: ledger.balance_at_start_of_day,
            available_drawdown: ledger.available_drawdown,
            qualified_trading_days: qualified,
            non_qualified_trading_days: days.len() - qualified,
            total_trading_days: ledger.total_trading_days,
            trading_days_last_30: ledger.trading_days_last_30,
            best_trading_day: ledger.best_trading_day,
            winning_trades: ledger.winning_trades,
            losing_trades: ledger.losing_trades,
            total_payouts_paid: ledger.total_payouts_paid,
            approved_payouts: ledger.approved_payouts,
            targets,
            daily: days,
        })
    }

    fn peak_balance(
        &self,
        space: SpaceId,
        account: &Account,
        trades: &[Trade],
        use_cache: bool,
    ) -> Result<PeakBalance, PropdeskError> {
        let cached = if use_cache && self.settings.cache_peak_balance {
            account.peak_balance
        } else {
            None
        };
        let peak = PeakBalance::cached_or_compute(cached, account.initial_balance, trades);
        if use_cache && self.settings.cache_peak_balance && peak.needs_store() {
            let basis = LedgerMark::of(trades);
            if self.store.store_peak_balance(space, account.id, peak.value, basis)? {
                tracing::debug!(account = %account.id, peak = %peak.value, "peak balance cached");
            } else {
                tracing::debug!(account = %account.id, "ledger changed; peak balance not cached");
            }
        }
        Ok(peak)
    }

    /// Resolve the named catalog rules targets depend on. A missing rule or
    /// an unparseable stored value counts as absent.
    fn resolved_rules(
        &self,
        space: SpaceId,
        account: &Account,
        as_of: NaiveDate,
    ) -> Result<ResolvedRules, PropdeskError> {
        let decimal = |name: &str| -> Result<Option<Decimal>, PropdeskError> {
            Ok(self
                .typed_value(space, account, name, as_of)?
                .and_then(|v| v.as_decimal()))
        };
        let count = match self.typed_value(space, account, catalog::MIN_TRADING_DAYS, as_of)? {
            Some(RuleValue::Count(n)) => Some(n),
            _ => None,
        };
        Ok(ResolvedRules {
            profit_target_dollars: decimal(catalog::PROFIT_TARGET_DOLLARS)?,
            profit_target_percent: decimal(catalog::PROFIT_TARGET_PERCENT)?,
            safety_net: decimal(catalog::SAFETY_NET_DOLLARS)?,
            consistency_percent: decimal(catalog::CONSISTENCY_RULE)?,
            min_trading_day_amount: decimal(catalog::MIN_TRADING_DAY_AMOUNT)?,
            min_trading_days: count,
        })
    }

    fn typed_value(
        &self,
        space: SpaceId,
        account: &Account,
        rule_name: &str,
        as_of: NaiveDate,
    ) -> Result<Option<RuleValue>, PropdeskError> {
        let Some(rule) = self.store.find_rule_by_name(space, rule_name)? else {
            return Ok(None);
        };
        let Some(resolved) = self.resolve_for_account(space, account, rule.id, as_of)? else {
            return Ok(None);
        };
        match rule_value::validate(rule.data_type, resolved.value(), &rule.validation_config) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                tracing::warn!(
                    account = %account.id,
                    rule = %rule.name,
                    error = %err,
                    "ignoring unusable rule value"
                );
                Ok(None)
            }
        }
    }

    /// Materialize the end-of-day snapshot for `date`. A date can only be
    /// recorded once.
    pub fn record_daily_balance(
        &self,
        space: SpaceId,
        id: AccountId,
        date: NaiveDate,
    ) -> Result<AccountBalance, PropdeskError> {
        let account = self.tradeable_account(space, id)?;
        let trades = self.store.trades_for(space, id)?;
        let snapshot = AccountBalance::build(&account, &trades, date);
        snapshot.validate()?;

        retry_on_conflict("record_daily_balance", "balance_date", || {
            if self.store.get_daily_balance(space, id, date)?.is_some() {
                return Err(PropdeskError::validation(
                    "balance_date",
                    format!("snapshot already recorded for {date}"),
                ));
            }
            self.store.insert_daily_balance(space, &snapshot)
        })?;
        tracing::info!(space = %space, account = %id, date = %date, closing = %snapshot.closing_balance, "daily balance recorded");
        Ok(snapshot)
    }

    pub fn daily_balance(
        &self,
        space: SpaceId,
        id: AccountId,
        date: NaiveDate,
    ) -> Result<Option<AccountBalance>, PropdeskError> {
        self.store.get_daily_balance(space, id, date)
    }

    // ---- payouts ----

    pub fn request_payout(
        &self,
        space: SpaceId,
        account: AccountId,
        amount_requested: Decimal,
        requested_date: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Result<Payout, PropdeskError> {
        self.tradeable_account(space, account)?;
        let request = NewPayout {
            amount_requested,
            requested_date: requested_date.unwrap_or_else(|| self.clock.today()),
            notes,
        };
        request.validate()?;
        let payout = retry_on_conflict("request_payout", "payout_number", || {
            self.store.insert_payout(space, account, &request)
        })?;
        tracing::info!(
            space = %space,
            account = %account,
            payout = %payout.id,
            number = payout.payout_number,
            amount = %payout.amount_requested,
            "payout requested"
        );
        Ok(payout)
    }

    /// Approve with `amount_paid`, checked against the available balance as
    /// it stands at approval time.
    pub fn approve_payout(
        &self,
        space: SpaceId,
        id: PayoutId,
        amount_paid: Decimal,
        received_date: Option<NaiveDate>,
    ) -> Result<Payout, PropdeskError> {
        let payout = self
            .store
            .approve_payout(space, id, amount_paid, received_date)?;
        tracing::info!(space = %space, payout = %id, paid = %amount_paid, "payout approved");
        Ok(payout)
    }

    pub fn decline_payout(&self, space: SpaceId, id: PayoutId) -> Result<Payout, PropdeskError> {
        let payout = self.store.decline_payout(space, id)?;
        tracing::info!(space = %space, payout = %id, "payout declined");
        Ok(payout)
    }

    pub fn payouts(&self, space: SpaceId, account: AccountId) -> Result<Vec<Payout>, PropdeskError> {
        self.store.get_account(space, account)?;
        self.store.payouts_for(space, account)
    }

    /// Most recent approved payout; pending and declined requests never count.
    pub fn last_payout(
        &self,
        space: SpaceId,
        account: AccountId,
    ) -> Result<Option<Payout>, PropdeskError> {
        let payouts = self.payouts(space, account)?;
        Ok(payout::last_approved(&payouts).cloned())
    }

    pub fn last_payout_date(
        &self,
        space: SpaceId,
        account: AccountId,
    ) -> Result<Option<NaiveDate>, PropdeskError> {
        Ok(self
            .last_payout(space, account)?
            .map(|p| p.effective_date()))
    }

    /// Number of approved payouts.
    pub fn total_payouts_count(
        &self,
        space: SpaceId,
        account: AccountId,
    ) -> Result<usize, PropdeskError> {
        Ok(self
            .payouts(space, account)?
            .iter()
            .filter(|p| p.status == PayoutStatus::Approved)
            .count())
    }

    // ---- violations ----

    pub fn detect_violation(
        &self,
        space: SpaceId,
        detection: Detection,
    ) -> Result<RuleViolation, PropdeskError> {
        self.store.get_account(space, detection.account_id)?;
        let rule = self.store.get_rule(space, detection.rule_id)?;
        if let Some(trade_id) = detection.trade_id {
            let trade = self.store.get_trade(space, trade_id)?;
            if trade.account_id != detection.account_id {
                return Err(PropdeskError::validation(
                    "trade_id",
                    "belongs to a different account",
                ));
            }
        }

        let new = NewViolation::from_detection(
            detection,
            rule.calculation_method.as_str(),
            self.clock.now(),
        );
        let violation = self.store.insert_violation(space, &new)?;
        tracing::warn!(
            space = %space,
            account = %violation.account_id,
            rule = %rule.name,
            severity = %violation.severity,
            actual = ?violation.actual_value,
            threshold = ?violation.threshold_value,
            terminated = violation.account_terminated,
            "rule violation detected"
        );
        Ok(violation)
    }

    pub fn resolve_violation(
        &self,
        space: SpaceId,
        id: ViolationId,
        resolved_by: &str,
        notes: Option<String>,
    ) -> Result<RuleViolation, PropdeskError> {
        let mut violation = self.store.get_violation(space, id)?;
        violation.resolve(self.clock.now(), resolved_by, notes)?;
        self.store.update_violation(space, &violation)?;
        tracing::info!(space = %space, violation = %id, by = resolved_by, "violation resolved");
        Ok(violation)
    }

    pub fn ignore_violation(
        &self,
        space: SpaceId,
        id: ViolationId,
        notes: Option<String>,
    ) -> Result<RuleViolation, PropdeskError> {
        let mut violation = self.store.get_violation(space, id)?;
        violation.ignore(self.clock.now(), notes)?;
        self.store.update_violation(space, &violation)?;
        tracing::info!(space = %space, violation = %id, "violation ignored");
        Ok(violation)
    }

    pub fn violations(
        &self,
        space: SpaceId,
        account: AccountId,
    ) -> Result<Vec<RuleViolation>, PropdeskError> {
        self.store.get_account(space, account)?;
        self.store.violations_for(space, account)
    }

    pub fn firm(&self, space: SpaceId, id: FirmId) -> Result<Firm, PropdeskError> {
        self.store.get_firm(space, id)
    }
}

/// Run `attempt`; if storage rejects it with a constraint violation, run it
/// once more from scratch. A second rejection is reported against `field`.
fn retry_on_conflict<T>(
    operation: &str,
    field: &str,
    mut attempt: impl FnMut() -> Result<T, PropdeskError>,
) -> Result<T, PropdeskError> {
    match attempt() {
        Err(err) if err.is_consistency() => {
            tracing::warn!(operation, error = %err, "write rejected by storage constraint; retrying");
            attempt().map_err(|e| {
                conflict_as_validation(e, field, "conflicts with a concurrent change")
            })
        }
        other => other,
    }
}

fn conflict_as_validation(err: PropdeskError, field: &str, reason: &str) -> PropdeskError {
    if err.is_consistency() {
        PropdeskError::validation(field, reason)
    } else {
        err
    }
}
