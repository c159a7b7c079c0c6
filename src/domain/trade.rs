//! Trade ledger entries.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::error::PropdeskError;
use super::ids::{AccountId, TradeId};

string_enum! {
    pub enum TradeSide ("side") {
        Buy => "buy",
        Sell => "sell",
    }
}

/// Raw trade inputs as supplied by the caller or an import.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewTrade {
    pub trade_date: NaiveDate,
    pub pnl: Decimal,
    pub symbol: Option<String>,
    pub side: Option<TradeSide>,
    pub entry_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Fields recomputed from the raw inputs every time a trade is saved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedFields {
    pub is_winning_trade: bool,
    pub duration_minutes: Option<i64>,
    pub risk_reward_ratio: Option<Decimal>,
}

impl NewTrade {
    pub fn new(trade_date: NaiveDate, pnl: Decimal) -> Self {
        NewTrade {
            trade_date,
            pnl,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), PropdeskError> {
        if let (Some(entry), Some(exit)) = (self.entry_time, self.exit_time) {
            if exit < entry {
                return Err(PropdeskError::validation(
                    "exit_time",
                    "must not be before entry time",
                ));
            }
        }
        Ok(())
    }

    pub fn derived(&self) -> DerivedFields {
        DerivedFields {
            is_winning_trade: self.pnl > Decimal::ZERO,
            duration_minutes: self.duration_minutes(),
            risk_reward_ratio: self.risk_reward_ratio(),
        }
    }

    fn duration_minutes(&self) -> Option<i64> {
        let (entry, exit) = (self.entry_time?, self.exit_time?);
        let seconds = (exit - entry).num_seconds();
        // Round half up; seconds is never negative for a validated trade.
        Some((seconds + 30).div_euclid(60))
    }

    fn risk_reward_ratio(&self) -> Option<Decimal> {
        let (entry, exit, stop) = (self.entry_price?, self.exit_price?, self.stop_loss?);
        let risk = entry.checked_sub(stop)?.abs();
        if risk.is_zero() {
            return None;
        }
        let reward = exit.checked_sub(entry)?.abs();
        reward.checked_div(risk).map(|ratio| ratio.round_dp(3))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub id: TradeId,
    pub account_id: AccountId,
    pub trade_date: NaiveDate,
    pub pnl: Decimal,
    pub symbol: Option<String>,
    pub side: Option<TradeSide>,
    pub entry_price: Option<Decimal>,
    pub exit_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub is_winning_trade: bool,
    pub duration_minutes: Option<i64>,
    pub risk_reward_ratio: Option<Decimal>,
    pub notes: Option<String>,
}

impl Trade {
    pub fn is_losing(&self) -> bool {
        self.pnl < Decimal::ZERO
    }

    pub fn is_break_even(&self) -> bool {
        self.pnl.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, m, s).unwrap()
    }

    #[test]
    fn winning_flag_follows_pnl() {
        assert!(NewTrade::new(day(), dec!(0.01)).derived().is_winning_trade);
        assert!(!NewTrade::new(day(), dec!(0)).derived().is_winning_trade);
        assert!(!NewTrade::new(day(), dec!(-5)).derived().is_winning_trade);
    }

    #[test]
    fn duration_rounds_to_nearest_minute() {
        let mut trade = NewTrade::new(day(), dec!(10));
        trade.entry_time = Some(at(9, 30, 0));
        trade.exit_time = Some(at(10, 15, 29));
        assert_eq!(trade.derived().duration_minutes, Some(45));
        trade.exit_time = Some(at(10, 15, 30));
        assert_eq!(trade.derived().duration_minutes, Some(46));
    }

    #[test]
    fn duration_absent_without_both_times() {
        let mut trade = NewTrade::new(day(), dec!(10));
        trade.entry_time = Some(at(9, 30, 0));
        assert_eq!(trade.derived().duration_minutes, None);
    }

    #[test]
    fn exit_before_entry_rejected() {
        let mut trade = NewTrade::new(day(), dec!(10));
        trade.entry_time = Some(at(10, 0, 0));
        trade.exit_time = Some(at(9, 59, 59));
        assert!(trade.validate().is_err());
        trade.exit_time = Some(at(10, 0, 0));
        assert!(trade.validate().is_ok());
    }

    #[test]
    fn risk_reward_ratio() {
        let mut trade = NewTrade::new(day(), dec!(300));
        trade.entry_price = Some(dec!(100));
        trade.exit_price = Some(dec!(103));
        trade.stop_loss = Some(dec!(98.5));
        assert_eq!(trade.derived().risk_reward_ratio, Some(dec!(2.000)));

        trade.stop_loss = Some(dec!(100));
        assert_eq!(trade.derived().risk_reward_ratio, None);

        trade.stop_loss = None;
        assert_eq!(trade.derived().risk_reward_ratio, None);
    }

    #[test]
    fn risk_reward_ratio_absent_when_it_overflows() {
        let mut trade = NewTrade::new(day(), dec!(999));
        trade.entry_price = Some(dec!(1));
        trade.exit_price = Some(dec!(1000));
        trade.stop_loss = Some(dec!(0.999999999999999999999999999));
        assert_eq!(trade.derived().risk_reward_ratio, None);
    }
}
