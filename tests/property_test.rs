//! Property tests for the ledger and rule-period invariants.

mod common;

use chrono::{Duration, NaiveDate};
use common::*;
use propdesk::domain::account::{Account, AccountStatus, Phase};
use propdesk::domain::assignment::{Owner, Validity};
use propdesk::domain::balance::{compute_peak_balance, current_balance, AccountBalance};
use propdesk::domain::catalog::DAILY_LOSS_LIMIT;
use propdesk::domain::engine::AssignRequest;
use propdesk::domain::ids::{AccountId, FirmId, PayoutId, SpaceId, TradeId};
use propdesk::domain::payout::{Payout, PayoutStatus};
use propdesk::domain::trade::{NewTrade, Trade};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn base() -> NaiveDate {
    date("2025-01-01")
}

fn account(status: AccountStatus, initial: Decimal) -> Account {
    Account {
        id: AccountId(1),
        space: SpaceId(1),
        firm_id: FirmId(1),
        user_id: Some(1),
        external_id: Some("P-1".into()),
        name: None,
        phase: Phase::Evaluation,
        status,
        initial_balance: initial,
        currency: "USD".into(),
        start_date: Some(base()),
        end_date: None,
        is_template: false,
        peak_balance: None,
        auto_liquidity_threshold: None,
    }
}

/// Cents to a two-decimal amount.
fn cents(c: i64) -> Decimal {
    Decimal::new(c, 2)
}

fn ledger(entries: &[(i64, i64)]) -> Vec<Trade> {
    let mut trades: Vec<Trade> = entries
        .iter()
        .enumerate()
        .map(|(i, &(day, pnl))| Trade {
            id: TradeId(i as i64 + 1),
            account_id: AccountId(1),
            trade_date: base() + Duration::days(day),
            pnl: cents(pnl),
            symbol: None,
            side: None,
            entry_price: None,
            exit_price: None,
            stop_loss: None,
            entry_time: None,
            exit_time: None,
            is_winning_trade: pnl > 0,
            duration_minutes: None,
            risk_reward_ratio: None,
            notes: None,
        })
        .collect();
    trades.sort_by_key(|t| (t.trade_date, t.id));
    trades
}

fn paid(amounts: &[i64]) -> Vec<Payout> {
    amounts
        .iter()
        .enumerate()
        .map(|(i, &amount)| Payout {
            id: PayoutId(i as i64 + 1),
            account_id: AccountId(1),
            payout_number: i as i64 + 1,
            requested_date: base(),
            received_date: None,
            amount_requested: cents(amount),
            amount_paid: Some(cents(amount)),
            status: PayoutStatus::Approved,
            notes: None,
        })
        .collect()
}

fn trade_entries() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((0i64..20, -500_000i64..500_000), 0..30)
}

proptest! {
    #[test]
    fn blown_accounts_report_initial_balance(
        entries in trade_entries(),
        payouts in prop::collection::vec(1i64..100_000, 0..5),
        initial in 1_000_000i64..20_000_000,
        suspended in any::<bool>(),
    ) {
        let status = if suspended { AccountStatus::Suspended } else { AccountStatus::Terminated };
        let acct = account(status, cents(initial));
        let balance = current_balance(&acct, &ledger(&entries), &paid(&payouts));
        prop_assert_eq!(balance, cents(initial));
    }

    #[test]
    fn peak_never_below_initial_or_final(
        entries in trade_entries(),
        initial in 1_000_000i64..20_000_000,
    ) {
        let acct = account(AccountStatus::Active, cents(initial));
        let trades = ledger(&entries);
        let peak = compute_peak_balance(acct.initial_balance, &trades);
        prop_assert!(peak >= acct.initial_balance);
        prop_assert!(peak >= current_balance(&acct, &trades, &[]));
    }

    #[test]
    fn snapshots_always_balance(
        entries in trade_entries(),
        initial in 1_000_000i64..20_000_000,
        day in 0i64..20,
    ) {
        let acct = account(AccountStatus::Active, cents(initial));
        let trades = ledger(&entries);
        let snapshot = AccountBalance::build(&acct, &trades, base() + Duration::days(day));
        prop_assert!(snapshot.validate().is_ok());
        prop_assert_eq!(snapshot.closing_balance, snapshot.opening_balance + snapshot.daily_pnl);
        prop_assert!(snapshot.daily_low <= snapshot.closing_balance);
        prop_assert!(snapshot.daily_high >= snapshot.closing_balance);
        prop_assert!(snapshot.winning_trades + snapshot.losing_trades <= snapshot.trade_count);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn stored_periods_never_overlap(
        attempts in prop::collection::vec((0i64..120, prop::option::of(1i64..60)), 1..12),
    ) {
        let fx = Fixture::new();
        let firm = fx.firm(SPACE, "Apex");
        let rule = fx.rule(SPACE, DAILY_LOSS_LIMIT);
        let owner = Owner::Firm(firm.id);

        for (offset, length) in attempts {
            let start = base() + Duration::days(offset);
            let before = fx.engine().assignments(SPACE, owner).unwrap().len();
            let result = fx.engine().assign_rule(SPACE, &AssignRequest {
                owner,
                rule_id: rule.id,
                value: "1000".into(),
                start_date: start,
                end_date: length.map(|l| start + Duration::days(l)),
                notes: None,
            });
            let after = fx.engine().assignments(SPACE, owner).unwrap().len();
            match result {
                Ok(_) => prop_assert_eq!(after, before + 1),
                Err(_) => prop_assert_eq!(after, before),
            }
        }

        let stored: Vec<Validity> = fx
            .engine()
            .assignments(SPACE, owner)
            .unwrap()
            .into_iter()
            .map(|a| a.validity)
            .collect();
        for (i, a) in stored.iter().enumerate() {
            for b in &stored[i + 1..] {
                prop_assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }

    #[test]
    fn payouts_never_overdraw(
        pnls in prop::collection::vec(-200_000i64..400_000, 1..6),
        requests in prop::collection::vec(1i64..800_000, 1..6),
    ) {
        let fx = Fixture::new();
        let firm = fx.firm(SPACE, "Apex");
        let acct = fx.account(SPACE, &firm, "APX-1", cents(1_000_000));
        for (i, pnl) in pnls.iter().enumerate() {
            fx.engine()
                .record_trade(SPACE, acct.id, &NewTrade::new(base() + Duration::days(i as i64), cents(*pnl)))
                .unwrap();
        }
        let funds = acct.initial_balance + pnls.iter().map(|p| cents(*p)).sum::<Decimal>();

        for amount in requests {
            let payout = fx
                .engine()
                .request_payout(SPACE, acct.id, cents(amount), None, None)
                .unwrap();
            let _ = fx.engine().approve_payout(SPACE, payout.id, cents(amount), None);

            let paid_total: Decimal = fx
                .engine()
                .payouts(SPACE, acct.id)
                .unwrap()
                .iter()
                .filter(|p| p.status == PayoutStatus::Approved)
                .filter_map(|p| p.amount_paid)
                .sum();
            prop_assert!(paid_total <= funds);
        }
    }
}
