//! Balance and metrics derived from the trade ledger.
//!
//! Everything here is a pure function of an [`Account`], its trades and its
//! payouts. Missing data degrades to zero or `None` rather than failing.
//! Trade slices are expected in ledger order `(trade_date, id)`, which is how
//! the store returns them.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

use super::account::Account;
use super::error::PropdeskError;
use super::ids::{AccountId, TradeId};
use super::payout::{Payout, PayoutStatus};
use super::trade::Trade;

/// Default window for rolling trading-day counts.
pub const ROLLING_WINDOW_DAYS: i64 = 30;

const SNAPSHOT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Sum of trade pnl regardless of account status.
pub fn raw_pnl(trades: &[Trade]) -> Decimal {
    trades.iter().map(|t| t.pnl).sum()
}

/// Amount paid out through approved payouts; zero for blown accounts.
pub fn total_payouts_paid(account: &Account, payouts: &[Payout]) -> Decimal {
    if account.is_blown() {
        return Decimal::ZERO;
    }
    paid_out(payouts)
}

pub fn paid_out(payouts: &[Payout]) -> Decimal {
    payouts
        .iter()
        .filter(|p| p.status == PayoutStatus::Approved)
        .filter_map(|p| p.amount_paid)
        .sum()
}

/// `initial + pnl - payouts`, or exactly the initial balance for a blown
/// account.
pub fn current_balance(account: &Account, trades: &[Trade], payouts: &[Payout]) -> Decimal {
    if account.is_blown() {
        return account.initial_balance;
    }
    account.initial_balance + raw_pnl(trades) - paid_out(payouts)
}

pub fn profit_loss(account: &Account, current_balance: Decimal) -> Decimal {
    if account.is_blown() {
        return Decimal::ZERO;
    }
    current_balance - account.initial_balance
}

/// `part / whole * 100` rounded to `dp`; `None` for a zero whole or when the
/// quotient does not fit.
fn percent_of(part: Decimal, whole: Decimal, dp: u32) -> Option<Decimal> {
    part.checked_div(whole)?
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|pct| pct.round_dp(dp))
}

pub fn profit_loss_percentage(account: &Account, profit_loss: Decimal) -> Decimal {
    if account.initial_balance.is_zero() || account.is_blown() {
        return Decimal::ZERO;
    }
    percent_of(profit_loss, account.initial_balance, 2).unwrap_or(Decimal::ZERO)
}

/// Highest running balance reached while replaying trades from the initial
/// balance.
pub fn compute_peak_balance(initial_balance: Decimal, trades: &[Trade]) -> Decimal {
    let mut running = initial_balance;
    let mut peak = initial_balance;
    for trade in trades {
        running += trade.pnl;
        if running > peak {
            peak = running;
        }
    }
    peak
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PeakSource {
    Cached,
    Computed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakBalance {
    pub value: Decimal,
    pub source: PeakSource,
}

impl PeakBalance {
    /// Use the cached value when present, otherwise replay the ledger. A
    /// `Computed` result is what the caller may choose to store as the cache.
    pub fn cached_or_compute(cached: Option<Decimal>, initial: Decimal, trades: &[Trade]) -> Self {
        match cached {
            Some(value) => PeakBalance {
                value,
                source: PeakSource::Cached,
            },
            None => PeakBalance {
                value: compute_peak_balance(initial, trades),
                source: PeakSource::Computed,
            },
        }
    }

    pub fn needs_store(&self) -> bool {
        self.source == PeakSource::Computed
    }
}

/// The shape of a ledger read: how many trades it held and the newest id.
/// Any later insert changes it, so a peak computed from one read can only be
/// cached while the stored ledger still matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerMark {
    pub trade_count: i64,
    pub last_trade_id: Option<TradeId>,
}

impl LedgerMark {
    pub fn of(trades: &[Trade]) -> Self {
        LedgerMark {
            trade_count: i64::try_from(trades.len()).unwrap_or(i64::MAX),
            last_trade_id: trades.iter().map(|t| t.id).max(),
        }
    }
}

/// `initial + pnl of trades strictly before date`.
pub fn balance_at_start_of_day(account: &Account, trades: &[Trade], date: NaiveDate) -> Decimal {
    account.initial_balance
        + trades
            .iter()
            .filter(|t| t.trade_date < date)
            .map(|t| t.pnl)
            .sum::<Decimal>()
}

/// Headroom above the auto-liquidation threshold, when one is set.
pub fn available_drawdown(account: &Account, current_balance: Decimal) -> Option<Decimal> {
    let threshold = account.auto_liquidity_threshold?;
    if account.is_blown() {
        return Some(Decimal::ZERO);
    }
    Some(current_balance - threshold)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub pnl: Decimal,
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
}

impl DailyAggregate {
    fn empty(date: NaiveDate) -> Self {
        DailyAggregate {
            date,
            pnl: Decimal::ZERO,
            trade_count: 0,
            winning_trades: 0,
            losing_trades: 0,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
        }
    }

    fn add(&mut self, trade: &Trade) {
        self.pnl += trade.pnl;
        self.trade_count += 1;
        if trade.pnl > Decimal::ZERO {
            self.winning_trades += 1;
            self.gross_profit += trade.pnl;
        } else if trade.pnl < Decimal::ZERO {
            self.losing_trades += 1;
            self.gross_loss += trade.pnl.abs();
        }
    }

    pub fn is_qualified(&self, min_amount: Decimal) -> bool {
        self.pnl.abs() >= min_amount
    }
}

/// Per-date pnl and counts, ascending by date.
pub fn daily_aggregates(trades: &[Trade]) -> Vec<DailyAggregate> {
    let mut days: Vec<DailyAggregate> = Vec::new();
    for trade in trades {
        match days.iter_mut().find(|d| d.date == trade.trade_date) {
            Some(day) => day.add(trade),
            None => {
                let mut day = DailyAggregate::empty(trade.trade_date);
                day.add(trade);
                days.push(day);
            }
        }
    }
    days.sort_by_key(|d| d.date);
    days
}

/// Days whose absolute summed pnl reaches `min_amount`. A zero minimum
/// qualifies every traded day.
pub fn qualified_trading_days(days: &[DailyAggregate], min_amount: Decimal) -> usize {
    days.iter().filter(|d| d.is_qualified(min_amount)).count()
}

/// Largest single-day summed pnl, or zero when there are no trades.
pub fn best_trading_day(days: &[DailyAggregate]) -> Decimal {
    days.iter().map(|d| d.pnl).max().unwrap_or(Decimal::ZERO)
}

/// Distinct traded dates in `[as_of - window_days, as_of]`, both ends
/// inclusive.
pub fn trading_days_in_window(days: &[DailyAggregate], as_of: NaiveDate, window_days: i64) -> usize {
    let from = as_of - Duration::days(window_days);
    days.iter()
        .filter(|d| d.date >= from && d.date <= as_of)
        .count()
}

/// Trades on or before `as_of`.
pub fn trades_through(trades: &[Trade], as_of: NaiveDate) -> Vec<Trade> {
    trades
        .iter()
        .filter(|t| t.trade_date <= as_of)
        .cloned()
        .collect()
}

/// Payouts requested on or before `as_of`.
pub fn payouts_through(payouts: &[Payout], as_of: NaiveDate) -> Vec<Payout> {
    payouts
        .iter()
        .filter(|p| p.requested_date <= as_of)
        .cloned()
        .collect()
}

/// Figures derived purely from the ledger, before any rule is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerMetrics {
    pub current_balance: Decimal,
    pub profit_loss: Decimal,
    pub profit_loss_percentage: Decimal,
    pub balance_at_start_of_day: Decimal,
    pub available_drawdown: Option<Decimal>,
    pub total_trading_days: usize,
    pub trading_days_last_30: usize,
    pub best_trading_day: Decimal,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub total_payouts_paid: Decimal,
    pub approved_payouts: usize,
}

impl LedgerMetrics {
    pub fn compute(
        account: &Account,
        trades: &[Trade],
        payouts: &[Payout],
        days: &[DailyAggregate],
        as_of: NaiveDate,
    ) -> Self {
        let current = current_balance(account, trades, payouts);
        let pl = profit_loss(account, current);
        LedgerMetrics {
            current_balance: current,
            profit_loss: pl,
            profit_loss_percentage: profit_loss_percentage(account, pl),
            balance_at_start_of_day: balance_at_start_of_day(account, trades, as_of),
            available_drawdown: available_drawdown(account, current),
            total_trading_days: days.len(),
            trading_days_last_30: trading_days_in_window(days, as_of, ROLLING_WINDOW_DAYS),
            best_trading_day: best_trading_day(days),
            winning_trades: trades.iter().filter(|t| t.pnl > Decimal::ZERO).count(),
            losing_trades: trades.iter().filter(|t| t.is_losing()).count(),
            total_payouts_paid: total_payouts_paid(account, payouts),
            approved_payouts: payouts
                .iter()
                .filter(|p| p.status == PayoutStatus::Approved)
                .count(),
        }
    }
}

/// Immutable end-of-day ledger entry for one account and date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub balance_date: NaiveDate,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub daily_pnl: Decimal,
    pub daily_high: Decimal,
    pub daily_low: Decimal,
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub drawdown_from_high: Decimal,
    pub daily_return_percent: Option<Decimal>,
}

impl AccountBalance {
    /// Build the snapshot for `date` by replaying the ledger.
    pub fn build(account: &Account, trades: &[Trade], date: NaiveDate) -> Self {
        let opening = balance_at_start_of_day(account, trades, date);
        let high_before = compute_peak_balance(
            account.initial_balance,
            &trades
                .iter()
                .filter(|t| t.trade_date < date)
                .cloned()
                .collect::<Vec<_>>(),
        );

        let mut day = DailyAggregate::empty(date);
        let mut running = opening;
        let mut daily_high = opening;
        let mut daily_low = opening;
        for trade in trades.iter().filter(|t| t.trade_date == date) {
            day.add(trade);
            running += trade.pnl;
            daily_high = daily_high.max(running);
            daily_low = daily_low.min(running);
        }

        let closing = opening + day.pnl;
        let high_water = high_before.max(daily_high);
        let daily_return_percent = percent_of(day.pnl, opening, 5);

        AccountBalance {
            account_id: account.id,
            balance_date: date,
            opening_balance: opening,
            closing_balance: closing,
            daily_pnl: day.pnl,
            daily_high,
            daily_low,
            trade_count: day.trade_count,
            winning_trades: day.winning_trades,
            losing_trades: day.losing_trades,
            gross_profit: day.gross_profit,
            gross_loss: day.gross_loss,
            drawdown_from_high: high_water - closing,
            daily_return_percent,
        }
    }

    /// `closing == opening + daily_pnl` within one cent.
    pub fn validate(&self) -> Result<(), PropdeskError> {
        let expected = self.opening_balance + self.daily_pnl;
        if (self.closing_balance - expected).abs() >= SNAPSHOT_TOLERANCE {
            return Err(PropdeskError::validation(
                "closing_balance",
                "must equal opening balance plus daily P&L",
            ));
        }
        if self.winning_trades + self.losing_trades > self.trade_count {
            return Err(PropdeskError::validation(
                "trade_count",
                "is less than winning plus losing trades",
            ));
        }
        Ok(())
    }

    pub fn win_rate(&self) -> Decimal {
        if self.trade_count == 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(self.winning_trades) / Decimal::from(self.trade_count)
            * Decimal::ONE_HUNDRED)
            .round_dp(2)
    }
}
