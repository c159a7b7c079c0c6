//! CLI definition and dispatch.

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvTradeImporter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::adapters::system_clock::SystemClock;
use crate::domain::account::{AccountStatus, NewAccount, Phase};
use crate::domain::assignment::{Owner, Validity};
use crate::domain::config_validation::{validate_engine_config, validate_sqlite_config};
use crate::domain::engine::{AccountMetrics, AssignRequest, ComplianceEngine, EngineSettings};
use crate::domain::error::PropdeskError;
use crate::domain::ids::{
    AccountId, AssignmentId, FirmId, PayoutId, RuleId, SpaceId, TradeId, ViolationId,
};
use crate::domain::trade::{NewTrade, TradeSide};
use crate::domain::violation::{ComparisonOperator, Detection, Severity};
use crate::ports::clock_port::ClockPort;
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "propdesk", about = "Prop firm rule resolution and account compliance")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct Target {
    #[arg(short, long)]
    pub config: PathBuf,
    /// Overrides `[engine] space_id`
    #[arg(long)]
    pub space: Option<i64>,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct OwnerArgs {
    #[arg(long)]
    pub firm: Option<i64>,
    #[arg(long)]
    pub account: Option<i64>,
}

impl OwnerArgs {
    fn owner(&self) -> Result<Owner, PropdeskError> {
        match (self.firm, self.account) {
            (Some(firm), None) => Ok(Owner::Firm(FirmId(firm))),
            (None, Some(account)) => Ok(Owner::Account(AccountId(account))),
            _ => Err(PropdeskError::validation(
                "owner",
                "exactly one of --firm or --account is required",
            )),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the schema and seed the standard rule catalog
    Init {
        #[command(flatten)]
        target: Target,
    },
    /// Create a prop firm
    CreateFirm {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        name: String,
    },
    /// Create a trading account or a firm template
    CreateAccount {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        firm: i64,
        #[arg(long)]
        phase: Phase,
        #[arg(long)]
        initial_balance: Decimal,
        #[arg(long)]
        user: Option<i64>,
        #[arg(long)]
        external_id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        start_date: Option<NaiveDate>,
        #[arg(long)]
        end_date: Option<NaiveDate>,
        #[arg(long)]
        template: bool,
    },
    /// Assign a rule value to a firm or account for a period
    Assign {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long)]
        rule: i64,
        #[arg(long)]
        value: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// End an open rule period
    CloseAssignment {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Show the rule value in effect on a date
    Resolve {
        #[command(flatten)]
        target: Target,
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long)]
        rule: i64,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Record a single closed trade
    RecordTrade {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        account: i64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, allow_hyphen_values = true)]
        pnl: Decimal,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        side: Option<TradeSide>,
        #[arg(long)]
        entry_price: Option<Decimal>,
        #[arg(long)]
        exit_price: Option<Decimal>,
        #[arg(long)]
        stop_loss: Option<Decimal>,
        #[arg(long)]
        entry_time: Option<DateTime<Utc>>,
        #[arg(long)]
        exit_time: Option<DateTime<Utc>>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Import trades from a CSV ledger
    ImportTrades {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        account: i64,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Balance, trading-day and target metrics for an account
    Metrics {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        account: i64,
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        json: bool,
    },
    /// Record the end-of-day balance snapshot
    Snapshot {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        account: i64,
        #[arg(long)]
        date: NaiveDate,
    },
    RequestPayout {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        account: i64,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    ApprovePayout {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        received: Option<NaiveDate>,
    },
    DeclinePayout {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: i64,
    },
    /// Record a detected rule violation
    Detect {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        account: i64,
        #[arg(long)]
        rule: i64,
        #[arg(long, allow_hyphen_values = true)]
        actual: Decimal,
        #[arg(long, allow_hyphen_values = true)]
        threshold: Decimal,
        #[arg(long)]
        operator: ComparisonOperator,
        #[arg(long)]
        severity: Severity,
        #[arg(long)]
        trade: Option<i64>,
        #[arg(long = "type")]
        violation_type: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        details: Option<String>,
        #[arg(long)]
        action: Option<String>,
        #[arg(long)]
        terminate: bool,
    },
    ResolveViolation {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        by: String,
        #[arg(long)]
        notes: Option<String>,
    },
    IgnoreViolation {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        id: i64,
        #[arg(long)]
        notes: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    finish(dispatch(cli.command))
}

fn finish(result: Result<(), PropdeskError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn dispatch(command: Command) -> Result<(), PropdeskError> {
    match command {
        Command::Init { target } => {
            let session = Session::open(&target)?;
            let rules = session.engine().seed_standard_catalog(session.space)?;
            println!("initialized space {} with {} rules", session.space, rules.len());
            Ok(())
        }
        Command::CreateFirm { target, name } => {
            let session = Session::open(&target)?;
            let firm = session.engine().create_firm(session.space, &name)?;
            println!("firm {} created: {}", firm.id, firm.name);
            Ok(())
        }
        Command::CreateAccount {
            target,
            firm,
            phase,
            initial_balance,
            user,
            external_id,
            name,
            currency,
            start_date,
            end_date,
            template,
        } => {
            let session = Session::open(&target)?;
            let account = session.engine().create_account(
                session.space,
                &NewAccount {
                    firm_id: FirmId(firm),
                    user_id: user,
                    external_id,
                    name,
                    phase,
                    status: AccountStatus::Active,
                    initial_balance,
                    currency,
                    start_date,
                    end_date,
                    is_template: template,
                    auto_liquidity_threshold: None,
                },
            )?;
            let kind = if account.is_template { "template" } else { "account" };
            println!("{kind} {} created: {}", account.id, account.label());
            Ok(())
        }
        Command::Assign {
            target,
            owner,
            rule,
            value,
            start,
            end,
            notes,
        } => {
            let session = Session::open(&target)?;
            let assignment = session.engine().assign_rule(
                session.space,
                &AssignRequest {
                    owner: owner.owner()?,
                    rule_id: RuleId(rule),
                    value,
                    start_date: start,
                    end_date: end,
                    notes,
                },
            )?;
            println!(
                "assignment {} created: {} from {}{}",
                assignment.id,
                assignment.rule_value,
                assignment.validity.start,
                until(&assignment.validity)
            );
            Ok(())
        }
        Command::CloseAssignment { target, id, end } => {
            let session = Session::open(&target)?;
            let closed = session
                .engine()
                .close_assignment(session.space, AssignmentId(id), end)?;
            println!("assignment {} ends {}", closed.id, end);
            Ok(())
        }
        Command::Resolve {
            target,
            owner,
            rule,
            date,
        } => {
            let session = Session::open(&target)?;
            let as_of = date.unwrap_or_else(|| session.clock.today());
            match session.engine().resolve_rule_value(
                session.space,
                owner.owner()?,
                RuleId(rule),
                as_of,
            )? {
                Some(resolved) => println!(
                    "{} ({} level, assignment {}, from {}{})",
                    resolved.value(),
                    resolved.level,
                    resolved.assignment.id,
                    resolved.assignment.validity.start,
                    until(&resolved.assignment.validity)
                ),
                None => println!("no value in effect on {as_of}"),
            }
            Ok(())
        }
        Command::RecordTrade {
            target,
            account,
            date,
            pnl,
            symbol,
            side,
            entry_price,
            exit_price,
            stop_loss,
            entry_time,
            exit_time,
            notes,
        } => {
            let session = Session::open(&target)?;
            let trade = session.engine().record_trade(
                session.space,
                AccountId(account),
                &NewTrade {
                    trade_date: date,
                    pnl,
                    symbol,
                    side,
                    entry_price,
                    exit_price,
                    stop_loss,
                    entry_time,
                    exit_time,
                    notes,
                },
            )?;
            println!("trade {} recorded: {} on {}", trade.id, trade.pnl, trade.trade_date);
            Ok(())
        }
        Command::ImportTrades {
            target,
            account,
            file,
        } => run_import(&target, AccountId(account), &file),
        Command::Metrics {
            target,
            account,
            as_of,
            json,
        } => {
            let session = Session::open(&target)?;
            let metrics = session
                .engine()
                .account_metrics(session.space, AccountId(account), as_of)?;
            if json {
                let rendered =
                    serde_json::to_string_pretty(&metrics).map_err(std::io::Error::from)?;
                println!("{rendered}");
            } else {
                print_metrics(&metrics);
            }
            Ok(())
        }
        Command::Snapshot {
            target,
            account,
            date,
        } => {
            let session = Session::open(&target)?;
            let snapshot =
                session
                    .engine()
                    .record_daily_balance(session.space, AccountId(account), date)?;
            println!(
                "{}: open {} close {} pnl {} ({} trades)",
                snapshot.balance_date,
                snapshot.opening_balance,
                snapshot.closing_balance,
                snapshot.daily_pnl,
                snapshot.trade_count
            );
            Ok(())
        }
        Command::RequestPayout {
            target,
            account,
            amount,
            date,
            notes,
        } => {
            let session = Session::open(&target)?;
            let payout = session.engine().request_payout(
                session.space,
                AccountId(account),
                amount,
                date,
                notes,
            )?;
            println!(
                "payout {} requested: #{} for {}",
                payout.id, payout.payout_number, payout.amount_requested
            );
            Ok(())
        }
        Command::ApprovePayout {
            target,
            id,
            amount,
            received,
        } => {
            let session = Session::open(&target)?;
            let payout =
                session
                    .engine()
                    .approve_payout(session.space, PayoutId(id), amount, received)?;
            println!("payout {} approved: paid {amount}", payout.id);
            Ok(())
        }
        Command::DeclinePayout { target, id } => {
            let session = Session::open(&target)?;
            let payout = session.engine().decline_payout(session.space, PayoutId(id))?;
            println!("payout {} declined", payout.id);
            Ok(())
        }
        Command::Detect {
            target,
            account,
            rule,
            actual,
            threshold,
            operator,
            severity,
            trade,
            violation_type,
            date,
            details,
            action,
            terminate,
        } => {
            let session = Session::open(&target)?;
            let mut detection = Detection::new(
                AccountId(account),
                RuleId(rule),
                actual,
                threshold,
                operator,
                severity,
            );
            detection.trade_id = trade.map(TradeId);
            detection.violation_type = violation_type;
            detection.violation_date = date;
            detection.details = details;
            detection.action_taken = action;
            detection.terminate_account = terminate;

            let violation = session.engine().detect_violation(session.space, detection)?;
            println!(
                "violation {} recorded: {} {} ({}){}",
                violation.id,
                violation.violation_type,
                violation.severity,
                violation.comparison().unwrap_or_default(),
                if violation.account_terminated {
                    " (account terminated)"
                } else {
                    ""
                }
            );
            Ok(())
        }
        Command::ResolveViolation {
            target,
            id,
            by,
            notes,
        } => {
            let session = Session::open(&target)?;
            let violation =
                session
                    .engine()
                    .resolve_violation(session.space, ViolationId(id), &by, notes)?;
            println!("violation {} resolved", violation.id);
            Ok(())
        }
        Command::IgnoreViolation { target, id, notes } => {
            let session = Session::open(&target)?;
            let violation = session
                .engine()
                .ignore_violation(session.space, ViolationId(id), notes)?;
            println!("violation {} ignored", violation.id);
            Ok(())
        }
    }
}

/// An opened store plus the settings every command shares.
struct Session {
    store: SqliteAdapter,
    clock: SystemClock,
    settings: EngineSettings,
    space: SpaceId,
}

impl Session {
    fn open(target: &Target) -> Result<Self, PropdeskError> {
        let config = load_config(&target.config)?;
        validate_sqlite_config(&config)?;
        validate_engine_config(&config)?;

        let space = match target.space {
            Some(id) if id < 1 => {
                return Err(PropdeskError::validation("space", "must be at least 1"));
            }
            Some(id) => SpaceId(id),
            None => SpaceId(config.get_int("engine", "space_id", 1)),
        };

        let store = SqliteAdapter::from_config(&config)?;
        store.initialize_schema()?;
        Ok(Session {
            store,
            clock: SystemClock,
            settings: EngineSettings::from_config(&config),
            space,
        })
    }

    fn engine(&self) -> ComplianceEngine<'_> {
        ComplianceEngine::with_settings(&self.store, &self.clock, self.settings)
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, PropdeskError> {
    tracing::debug!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

fn run_import(target: &Target, account: AccountId, file: &Path) -> Result<(), PropdeskError> {
    let trades = CsvTradeImporter::from_path(file)?;
    let session = Session::open(target)?;
    let saved = session.engine().record_trades(session.space, account, &trades)?;
    println!("imported {} trades into account {account}", saved.len());
    Ok(())
}

fn until(validity: &Validity) -> String {
    if validity.is_open_ended() {
        return " (open-ended)".to_string();
    }
    validity
        .end
        .map(|end| format!(" until {end}"))
        .unwrap_or_default()
}

fn opt(value: Option<Decimal>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn print_metrics(m: &AccountMetrics) {
    println!("Account {} as of {} ({})", m.account_id, m.as_of, m.status);
    println!("  initial balance        {}", m.initial_balance);
    println!("  current balance        {}", m.current_balance);
    println!("  peak balance           {} ({:?})", m.peak_balance, m.peak_source);
    println!("  drawdown from peak     {}", m.drawdown_from_peak);
    println!(
        "  profit/loss            {} ({}%)",
        m.profit_loss, m.profit_loss_percentage
    );
    println!("  start-of-day balance   {}", m.balance_at_start_of_day);
    println!("  available drawdown     {}", opt(m.available_drawdown));
    println!(
        "  trading days           {} ({} qualified, {} in last 30)",
        m.total_trading_days, m.qualified_trading_days, m.trading_days_last_30
    );
    println!("  best trading day       {}", m.best_trading_day);
    println!(
        "  trades won/lost        {}/{}",
        m.winning_trades, m.losing_trades
    );
    println!(
        "  payouts paid           {} ({} approved)",
        m.total_payouts_paid, m.approved_payouts
    );

    let t = &m.targets;
    println!("Targets");
    println!("  profit target          {}", opt(t.profit_target));
    println!("  remaining to target    {}", opt(t.remaining_to_target));
    println!("  safety net             {}", opt(t.safety_net_amount));
    println!("  needed to safety net   {}", opt(t.amount_needed_to_safety_net));
    println!("  over safety net        {}", opt(t.amount_over_safety_net));
    println!("  consistency target     {}", opt(t.consistency_target));
    println!(
        "  trading days remaining {} of {}",
        t.trading_days_remaining, t.required_trading_days
    );
    if t.conflicting_profit_targets {
        println!("  warning: both dollar and percent profit targets are set");
    }
}
