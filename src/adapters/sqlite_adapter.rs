//! SQLite store adapter.
//!
//! Decimals are stored as TEXT and summed in Rust so no precision is lost to
//! SQLite's REAL affinity. Dates are `YYYY-MM-DD` and timestamps fixed-width
//! RFC 3339, so both compare correctly as strings inside SQL.

use crate::domain::account::{Account, AccountStatus, Firm, NewAccount, Phase};
use crate::domain::assignment::{NewAssignment, Owner, OwnerKind, RuleAssignment, Validity};
use crate::domain::balance::{AccountBalance, LedgerMark};
use crate::domain::catalog::{NewRule, Rule, ValidationConfig};
use crate::domain::config_validation::{DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_POOL_SIZE};
use crate::domain::error::PropdeskError;
use crate::domain::ids::{
    AccountId, AssignmentId, FirmId, PayoutId, RuleId, SpaceId, TradeId, ViolationId,
};
use crate::domain::payout::{check_approval, next_payout_number, ApprovalContext, NewPayout, Payout};
use crate::domain::trade::{NewTrade, Trade};
use crate::domain::violation::{NewViolation, RuleViolation};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{
    AccountStore, AssignmentStore, CatalogStore, PayoutStore, TradeStore, ViolationStore,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{ffi, params, Connection, OptionalExtension, Params, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    rule_type TEXT NOT NULL,
    data_type TEXT NOT NULL,
    calculation_method TEXT NOT NULL,
    time_scope TEXT NOT NULL,
    violation_action TEXT NOT NULL,
    validation_config TEXT NOT NULL DEFAULT '{}',
    is_active INTEGER NOT NULL DEFAULT 1,
    sort_order INTEGER NOT NULL DEFAULT 0,
    UNIQUE (space_id, name)
);

CREATE TABLE IF NOT EXISTS firms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (space_id, name)
);

CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL,
    firm_id INTEGER NOT NULL REFERENCES firms(id) ON DELETE CASCADE,
    user_id INTEGER,
    external_id TEXT,
    name TEXT,
    phase TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    initial_balance TEXT NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    start_date TEXT,
    end_date TEXT,
    is_template INTEGER NOT NULL DEFAULT 0,
    peak_balance TEXT,
    auto_liquidity_threshold TEXT,
    CHECK (CAST(initial_balance AS REAL) > 0),
    CHECK (end_date IS NULL OR start_date IS NULL OR end_date > start_date),
    CHECK (is_template = 0 OR (user_id IS NULL AND external_id IS NULL AND start_date IS NULL))
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_accounts_external_id
    ON accounts(space_id, external_id) WHERE external_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_accounts_template ON accounts(space_id, firm_id, phase, is_template);

CREATE TABLE IF NOT EXISTS rule_assignments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL,
    owner_kind TEXT NOT NULL CHECK (owner_kind IN ('firm', 'account')),
    owner_id INTEGER NOT NULL,
    rule_id INTEGER NOT NULL REFERENCES rules(id) ON DELETE CASCADE,
    rule_value TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_inherited INTEGER NOT NULL DEFAULT 0,
    is_custom_override INTEGER NOT NULL DEFAULT 0,
    notes TEXT,
    CHECK (end_date IS NULL OR end_date > start_date)
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_assignments_start
    ON rule_assignments(owner_kind, owner_id, rule_id, start_date);
CREATE UNIQUE INDEX IF NOT EXISTS ux_assignments_open_ended
    ON rule_assignments(owner_kind, owner_id, rule_id) WHERE end_date IS NULL;

CREATE TRIGGER IF NOT EXISTS trg_assignments_no_overlap_insert
BEFORE INSERT ON rule_assignments
WHEN EXISTS (
    SELECT 1 FROM rule_assignments r
    WHERE r.owner_kind = NEW.owner_kind AND r.owner_id = NEW.owner_id AND r.rule_id = NEW.rule_id
      AND (NEW.end_date IS NULL OR r.start_date < NEW.end_date)
      AND (r.end_date IS NULL OR r.end_date > NEW.start_date)
)
BEGIN
    SELECT RAISE(ABORT, 'overlapping rule period');
END;

CREATE TRIGGER IF NOT EXISTS trg_assignments_no_overlap_update
BEFORE UPDATE OF start_date, end_date ON rule_assignments
WHEN EXISTS (
    SELECT 1 FROM rule_assignments r
    WHERE r.id <> NEW.id
      AND r.owner_kind = NEW.owner_kind AND r.owner_id = NEW.owner_id AND r.rule_id = NEW.rule_id
      AND (NEW.end_date IS NULL OR r.start_date < NEW.end_date)
      AND (r.end_date IS NULL OR r.end_date > NEW.start_date)
)
BEGIN
    SELECT RAISE(ABORT, 'overlapping rule period');
END;

CREATE TRIGGER IF NOT EXISTS trg_accounts_delete_assignments
AFTER DELETE ON accounts
BEGIN
    DELETE FROM rule_assignments WHERE owner_kind = 'account' AND owner_id = OLD.id;
END;

CREATE TRIGGER IF NOT EXISTS trg_firms_delete_assignments
AFTER DELETE ON firms
BEGIN
    DELETE FROM rule_assignments WHERE owner_kind = 'firm' AND owner_id = OLD.id;
END;

CREATE TABLE IF NOT EXISTS trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL,
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    trade_date TEXT NOT NULL,
    pnl TEXT NOT NULL,
    symbol TEXT,
    side TEXT,
    entry_price TEXT,
    exit_price TEXT,
    stop_loss TEXT,
    entry_time TEXT,
    exit_time TEXT,
    is_winning_trade INTEGER NOT NULL DEFAULT 0,
    duration_minutes INTEGER,
    risk_reward_ratio TEXT,
    notes TEXT,
    CHECK (exit_time IS NULL OR entry_time IS NULL OR exit_time >= entry_time)
);
CREATE INDEX IF NOT EXISTS idx_trades_account_date ON trades(account_id, trade_date, id);

CREATE TABLE IF NOT EXISTS account_balances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL,
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    balance_date TEXT NOT NULL,
    opening_balance TEXT NOT NULL,
    closing_balance TEXT NOT NULL,
    daily_pnl TEXT NOT NULL,
    daily_high TEXT NOT NULL,
    daily_low TEXT NOT NULL,
    trade_count INTEGER NOT NULL DEFAULT 0,
    winning_trades INTEGER NOT NULL DEFAULT 0,
    losing_trades INTEGER NOT NULL DEFAULT 0,
    gross_profit TEXT NOT NULL,
    gross_loss TEXT NOT NULL,
    drawdown_from_high TEXT NOT NULL,
    daily_return_percent TEXT,
    UNIQUE (account_id, balance_date),
    CHECK (winning_trades + losing_trades <= trade_count)
);

CREATE TABLE IF NOT EXISTS payouts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL,
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    payout_number INTEGER NOT NULL,
    requested_date TEXT NOT NULL,
    received_date TEXT,
    amount_requested TEXT NOT NULL,
    amount_paid TEXT,
    request_status TEXT NOT NULL DEFAULT 'pending'
        CHECK (request_status IN ('pending', 'approved', 'declined')),
    notes TEXT,
    UNIQUE (account_id, payout_number),
    CHECK (CAST(amount_requested AS REAL) > 0),
    CHECK (amount_paid IS NULL OR CAST(amount_paid AS REAL) > 0)
);

CREATE TABLE IF NOT EXISTS rule_violations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_id INTEGER NOT NULL,
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    rule_id INTEGER NOT NULL REFERENCES rules(id) ON DELETE CASCADE,
    trade_id INTEGER REFERENCES trades(id) ON DELETE SET NULL,
    violation_type TEXT NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'resolved', 'ignored')),
    threshold_value TEXT,
    actual_value TEXT,
    comparison_operator TEXT,
    violation_date TEXT,
    details TEXT,
    action_taken TEXT,
    account_terminated INTEGER NOT NULL DEFAULT 0,
    detected_at TEXT NOT NULL,
    resolved_at TEXT,
    resolved_by TEXT,
    resolution_notes TEXT,
    CHECK (resolved_at IS NULL OR resolved_at >= detected_at)
);
CREATE INDEX IF NOT EXISTS idx_violations_account_status ON rule_violations(account_id, status);
";

const RULE_COLUMNS: &str = "id, space_id, name, description, rule_type, data_type, \
     calculation_method, time_scope, violation_action, validation_config, is_active, sort_order";
const ACCOUNT_COLUMNS: &str = "id, space_id, firm_id, user_id, external_id, name, phase, status, \
     initial_balance, currency, start_date, end_date, is_template, peak_balance, \
     auto_liquidity_threshold";
const ASSIGNMENT_COLUMNS: &str = "id, space_id, owner_kind, owner_id, rule_id, rule_value, \
     start_date, end_date, is_active, is_inherited, is_custom_override, notes";
const TRADE_COLUMNS: &str = "id, account_id, trade_date, pnl, symbol, side, entry_price, \
     exit_price, stop_loss, entry_time, exit_time, is_winning_trade, duration_minutes, \
     risk_reward_ratio, notes";
const BALANCE_COLUMNS: &str = "account_id, balance_date, opening_balance, closing_balance, \
     daily_pnl, daily_high, daily_low, trade_count, winning_trades, losing_trades, gross_profit, \
     gross_loss, drawdown_from_high, daily_return_percent";
const PAYOUT_COLUMNS: &str = "id, account_id, payout_number, requested_date, received_date, \
     amount_requested, amount_paid, request_status, notes";
const VIOLATION_COLUMNS: &str = "id, account_id, rule_id, trade_id, violation_type, severity, \
     status, threshold_value, actual_value, comparison_operator, violation_date, details, \
     action_taken, account_terminated, detected_at, resolved_at, resolved_by, resolution_notes";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PropdeskError> {
        let db_path = config.require_string("sqlite", "path")?;
        let pool_size = config
            .get_int("sqlite", "pool_size", DEFAULT_POOL_SIZE)
            .clamp(1, 64) as u32;
        let busy_timeout = config
            .get_int("sqlite", "busy_timeout_ms", DEFAULT_BUSY_TIMEOUT_MS)
            .max(0) as u64;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_init(move |conn| configure_connection(conn, busy_timeout));
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| PropdeskError::Database {
                    reason: e.to_string(),
                })?;

        tracing::debug!(path = %db_path, pool_size, "sqlite pool opened");
        Ok(Self { pool })
    }

    /// A private in-memory database. The pool holds exactly one connection
    /// that is never recycled, since each connection would otherwise see its
    /// own empty database.
    pub fn in_memory() -> Result<Self, PropdeskError> {
        let manager =
            SqliteConnectionManager::memory().with_init(|conn| {
            configure_connection(conn, DEFAULT_BUSY_TIMEOUT_MS as u64)
        });
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)
            .map_err(|e: r2d2::Error| PropdeskError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn initialize_schema(&self) -> Result<(), PropdeskError> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA).map_err(query_error)?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, PropdeskError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| PropdeskError::Database {
                reason: e.to_string(),
            })
    }
}

fn configure_connection(conn: &mut Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(busy_timeout_ms))
}

// ---- error mapping ----

/// Unique-index and trigger aborts become `Consistency`; everything else is
/// a plain query failure.
fn query_error(e: rusqlite::Error) -> PropdeskError {
    if let rusqlite::Error::SqliteFailure(err, msg) = &e {
        if matches!(
            err.extended_code,
            ffi::SQLITE_CONSTRAINT_UNIQUE
                | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                | ffi::SQLITE_CONSTRAINT_TRIGGER
        ) {
            return PropdeskError::Consistency {
                reason: msg.clone().unwrap_or_else(|| err.to_string()),
            };
        }
    }
    PropdeskError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn not_found_if_unchanged(
    changed: usize,
    entity: &'static str,
    id: impl ToString,
) -> Result<(), PropdeskError> {
    if changed == 0 {
        return Err(PropdeskError::not_found(entity, id));
    }
    Ok(())
}

// ---- value conversion ----

fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn time_text(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

// ---- row mapping ----

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let config_json: String = row.get(9)?;
    let validation_config: ValidationConfig = serde_json::from_str(&config_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;
    Ok(Rule {
        id: RuleId(row.get(0)?),
        space: SpaceId(row.get(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        rule_type: parse_col(row, 4)?,
        data_type: parse_col(row, 5)?,
        calculation_method: parse_col(row, 6)?,
        time_scope: parse_col(row, 7)?,
        violation_action: parse_col(row, 8)?,
        validation_config,
        is_active: row.get(10)?,
        sort_order: row.get(11)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: AccountId(row.get(0)?),
        space: SpaceId(row.get(1)?),
        firm_id: FirmId(row.get(2)?),
        user_id: row.get(3)?,
        external_id: row.get(4)?,
        name: row.get(5)?,
        phase: parse_col(row, 6)?,
        status: parse_col(row, 7)?,
        initial_balance: parse_col(row, 8)?,
        currency: row.get(9)?,
        start_date: parse_opt_col(row, 10)?,
        end_date: parse_opt_col(row, 11)?,
        is_template: row.get(12)?,
        peak_balance: parse_opt_col(row, 13)?,
        auto_liquidity_threshold: parse_opt_col(row, 14)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<RuleAssignment> {
    let kind: OwnerKind = parse_col(row, 2)?;
    Ok(RuleAssignment {
        id: AssignmentId(row.get(0)?),
        space: SpaceId(row.get(1)?),
        owner: Owner::from_parts(kind, row.get(3)?),
        rule_id: RuleId(row.get(4)?),
        rule_value: row.get(5)?,
        validity: Validity {
            start: parse_col(row, 6)?,
            end: parse_opt_col(row, 7)?,
        },
        is_active: row.get(8)?,
        is_inherited: row.get(9)?,
        is_custom_override: row.get(10)?,
        notes: row.get(11)?,
    })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: TradeId(row.get(0)?),
        account_id: AccountId(row.get(1)?),
        trade_date: parse_col(row, 2)?,
        pnl: parse_col(row, 3)?,
        symbol: row.get(4)?,
        side: parse_opt_col(row, 5)?,
        entry_price: parse_opt_col(row, 6)?,
        exit_price: parse_opt_col(row, 7)?,
        stop_loss: parse_opt_col(row, 8)?,
        entry_time: parse_opt_col(row, 9)?,
        exit_time: parse_opt_col(row, 10)?,
        is_winning_trade: row.get(11)?,
        duration_minutes: row.get(12)?,
        risk_reward_ratio: parse_opt_col(row, 13)?,
        notes: row.get(14)?,
    })
}

fn balance_from_row(row: &Row<'_>) -> rusqlite::Result<AccountBalance> {
    Ok(AccountBalance {
        account_id: AccountId(row.get(0)?),
        balance_date: parse_col(row, 1)?,
        opening_balance: parse_col(row, 2)?,
        closing_balance: parse_col(row, 3)?,
        daily_pnl: parse_col(row, 4)?,
        daily_high: parse_col(row, 5)?,
        daily_low: parse_col(row, 6)?,
        trade_count: row.get(7)?,
        winning_trades: row.get(8)?,
        losing_trades: row.get(9)?,
        gross_profit: parse_col(row, 10)?,
        gross_loss: parse_col(row, 11)?,
        drawdown_from_high: parse_col(row, 12)?,
        daily_return_percent: parse_opt_col(row, 13)?,
    })
}

fn payout_from_row(row: &Row<'_>) -> rusqlite::Result<Payout> {
    Ok(Payout {
        id: PayoutId(row.get(0)?),
        account_id: AccountId(row.get(1)?),
        payout_number: row.get(2)?,
        requested_date: parse_col(row, 3)?,
        received_date: parse_opt_col(row, 4)?,
        amount_requested: parse_col(row, 5)?,
        amount_paid: parse_opt_col(row, 6)?,
        status: parse_col(row, 7)?,
        notes: row.get(8)?,
    })
}

fn violation_from_row(row: &Row<'_>) -> rusqlite::Result<RuleViolation> {
    Ok(RuleViolation {
        id: ViolationId(row.get(0)?),
        account_id: AccountId(row.get(1)?),
        rule_id: RuleId(row.get(2)?),
        trade_id: row.get::<_, Option<i64>>(3)?.map(TradeId),
        violation_type: row.get(4)?,
        severity: parse_col(row, 5)?,
        status: parse_col(row, 6)?,
        threshold_value: parse_opt_col(row, 7)?,
        actual_value: parse_opt_col(row, 8)?,
        comparison_operator: parse_opt_col(row, 9)?,
        violation_date: parse_opt_col(row, 10)?,
        details: row.get(11)?,
        action_taken: row.get(12)?,
        account_terminated: row.get(13)?,
        detected_at: parse_col(row, 14)?,
        resolved_at: parse_opt_col(row, 15)?,
        resolved_by: row.get(16)?,
        resolution_notes: row.get(17)?,
    })
}

// ---- connection-level helpers ----
//
// These take a `&Connection` so they work inside a transaction and never
// check a second connection out of the pool.

fn query_one<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Option<T>, PropdeskError> {
    conn.query_row(sql, params, map).optional().map_err(query_error)
}

fn query_all<T, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, PropdeskError> {
    let mut stmt = conn.prepare(sql).map_err(query_error)?;
    let rows = stmt.query_map(params, map).map_err(query_error)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(query_error)
}

fn load_rule(conn: &Connection, space: SpaceId, id: RuleId) -> Result<Rule, PropdeskError> {
    let sql = format!("SELECT {RULE_COLUMNS} FROM rules WHERE id = ?1 AND space_id = ?2");
    query_one(conn, &sql, params![id.0, space.0], rule_from_row)?
        .ok_or_else(|| PropdeskError::not_found("rule", id))
}

fn load_firm(conn: &Connection, space: SpaceId, id: FirmId) -> Result<Firm, PropdeskError> {
    query_one(
        conn,
        "SELECT id, space_id, name FROM firms WHERE id = ?1 AND space_id = ?2",
        params![id.0, space.0],
        |row| {
            Ok(Firm {
                id: FirmId(row.get(0)?),
                space: SpaceId(row.get(1)?),
                name: row.get(2)?,
            })
        },
    )?
    .ok_or_else(|| PropdeskError::not_found("firm", id))
}

fn load_account(conn: &Connection, space: SpaceId, id: AccountId) -> Result<Account, PropdeskError> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1 AND space_id = ?2");
    query_one(conn, &sql, params![id.0, space.0], account_from_row)?
        .ok_or_else(|| PropdeskError::not_found("account", id))
}

fn load_assignment(
    conn: &Connection,
    space: SpaceId,
    id: AssignmentId,
) -> Result<RuleAssignment, PropdeskError> {
    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM rule_assignments WHERE id = ?1 AND space_id = ?2"
    );
    query_one(conn, &sql, params![id.0, space.0], assignment_from_row)?
        .ok_or_else(|| PropdeskError::not_found("rule assignment", id))
}

fn load_trade(conn: &Connection, space: SpaceId, id: TradeId) -> Result<Trade, PropdeskError> {
    let sql = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1 AND space_id = ?2");
    query_one(conn, &sql, params![id.0, space.0], trade_from_row)?
        .ok_or_else(|| PropdeskError::not_found("trade", id))
}

fn load_payout(conn: &Connection, space: SpaceId, id: PayoutId) -> Result<Payout, PropdeskError> {
    let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payouts WHERE id = ?1 AND space_id = ?2");
    query_one(conn, &sql, params![id.0, space.0], payout_from_row)?
        .ok_or_else(|| PropdeskError::not_found("payout", id))
}

fn load_violation(
    conn: &Connection,
    space: SpaceId,
    id: ViolationId,
) -> Result<RuleViolation, PropdeskError> {
    let sql =
        format!("SELECT {VIOLATION_COLUMNS} FROM rule_violations WHERE id = ?1 AND space_id = ?2");
    query_one(conn, &sql, params![id.0, space.0], violation_from_row)?
        .ok_or_else(|| PropdeskError::not_found("rule violation", id))
}

fn insert_assignment_row(
    conn: &Connection,
    space: SpaceId,
    owner: Owner,
    assignment: &NewAssignment,
) -> Result<AssignmentId, PropdeskError> {
    conn.execute(
        "INSERT INTO rule_assignments (space_id, owner_kind, owner_id, rule_id, rule_value,
             start_date, end_date, is_active, is_inherited, is_custom_override, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            space.0,
            owner.kind().as_str(),
            owner.raw_id(),
            assignment.rule_id.0,
            assignment.rule_value,
            date_text(assignment.validity.start),
            assignment.validity.end.map(date_text),
            assignment.is_active,
            assignment.is_inherited,
            assignment.is_custom_override,
            assignment.notes,
        ],
    )
    .map_err(query_error)?;
    Ok(AssignmentId(conn.last_insert_rowid()))
}

fn decimals(
    conn: &Connection,
    sql: &str,
    params: impl Params,
) -> Result<Vec<Decimal>, PropdeskError> {
    query_all(conn, sql, params, |row| parse_col::<Decimal>(row, 0))
}

fn insert_trade_row(
    conn: &Connection,
    space: SpaceId,
    account: AccountId,
    trade: &NewTrade,
) -> Result<TradeId, PropdeskError> {
    let derived = trade.derived();
    conn.execute(
        "INSERT INTO trades (space_id, account_id, trade_date, pnl, symbol, side,
             entry_price, exit_price, stop_loss, entry_time, exit_time,
             is_winning_trade, duration_minutes, risk_reward_ratio, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            space.0,
            account.0,
            date_text(trade.trade_date),
            decimal_text(trade.pnl),
            trade.symbol,
            trade.side.map(|s| s.as_str()),
            trade.entry_price.map(decimal_text),
            trade.exit_price.map(decimal_text),
            trade.stop_loss.map(decimal_text),
            trade.entry_time.map(time_text),
            trade.exit_time.map(time_text),
            derived.is_winning_trade,
            derived.duration_minutes,
            derived.risk_reward_ratio.map(decimal_text),
            trade.notes,
        ],
    )
    .map_err(query_error)?;
    Ok(TradeId(conn.last_insert_rowid()))
}

fn sum_trade_pnl(conn: &Connection, space: SpaceId, account: AccountId) -> Result<Decimal, PropdeskError> {
    Ok(decimals(
        conn,
        "SELECT pnl FROM trades WHERE account_id = ?1 AND space_id = ?2",
        params![account.0, space.0],
    )?
    .into_iter()
    .sum())
}

fn paid_by_other_payouts(
    conn: &Connection,
    space: SpaceId,
    account: AccountId,
    exclude: PayoutId,
) -> Result<Decimal, PropdeskError> {
    Ok(decimals(
        conn,
        "SELECT amount_paid FROM payouts
         WHERE account_id = ?1 AND space_id = ?2 AND id <> ?3
           AND request_status = 'approved' AND amount_paid IS NOT NULL",
        params![account.0, space.0, exclude.0],
    )?
    .into_iter()
    .sum())
}

impl CatalogStore for SqliteAdapter {
    fn insert_rule(&self, space: SpaceId, rule: &NewRule) -> Result<Rule, PropdeskError> {
        let conn = self.conn()?;
        let config = serde_json::to_string(&rule.validation_config).map_err(|e| {
            PropdeskError::DatabaseQuery {
                reason: e.to_string(),
            }
        })?;
        conn.execute(
            "INSERT INTO rules (space_id, name, description, rule_type, data_type,
                 calculation_method, time_scope, violation_action, validation_config, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                space.0,
                rule.name.trim(),
                rule.description,
                rule.rule_type.as_str(),
                rule.data_type.as_str(),
                rule.calculation_method.as_str(),
                rule.time_scope.as_str(),
                rule.violation_action.as_str(),
                config,
                rule.sort_order,
            ],
        )
        .map_err(query_error)?;
        load_rule(&conn, space, RuleId(conn.last_insert_rowid()))
    }

    fn get_rule(&self, space: SpaceId, id: RuleId) -> Result<Rule, PropdeskError> {
        let conn = self.conn()?;
        load_rule(&conn, space, id)
    }

    fn find_rule_by_name(&self, space: SpaceId, name: &str) -> Result<Option<Rule>, PropdeskError> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM rules WHERE space_id = ?1 AND name = ?2");
        let conn = self.conn()?;
        query_one(&conn, &sql, params![space.0, name], rule_from_row)
    }

    fn list_rules(&self, space: SpaceId) -> Result<Vec<Rule>, PropdeskError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM rules WHERE space_id = ?1 ORDER BY sort_order, name"
        );
        let conn = self.conn()?;
        query_all(&conn, &sql, params![space.0], rule_from_row)
    }
}

impl AccountStore for SqliteAdapter {
    fn insert_firm(&self, space: SpaceId, name: &str) -> Result<Firm, PropdeskError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO firms (space_id, name) VALUES (?1, ?2)",
            params![space.0, name],
        )
        .map_err(query_error)?;
        load_firm(&conn, space, FirmId(conn.last_insert_rowid()))
    }

    fn get_firm(&self, space: SpaceId, id: FirmId) -> Result<Firm, PropdeskError> {
        let conn = self.conn()?;
        load_firm(&conn, space, id)
    }

    fn insert_account(
        &self,
        space: SpaceId,
        account: &NewAccount,
        inherited: &[NewAssignment],
    ) -> Result<Account, PropdeskError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        load_firm(&tx, space, account.firm_id)?;

        tx.execute(
            "INSERT INTO accounts (space_id, firm_id, user_id, external_id, name, phase, status,
                 initial_balance, currency, start_date, end_date, is_template,
                 auto_liquidity_threshold)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                space.0,
                account.firm_id.0,
                account.user_id,
                account.external_id,
                account.name,
                account.phase.as_str(),
                account.status.as_str(),
                decimal_text(account.initial_balance),
                account.currency.to_uppercase(),
                account.start_date.map(date_text),
                account.end_date.map(date_text),
                account.is_template,
                account.auto_liquidity_threshold.map(decimal_text),
            ],
        )
        .map_err(query_error)?;
        let id = AccountId(tx.last_insert_rowid());

        for assignment in inherited {
            insert_assignment_row(&tx, space, Owner::Account(id), assignment)?;
        }

        let created = load_account(&tx, space, id)?;
        tx.commit().map_err(query_error)?;
        Ok(created)
    }

    fn get_account(&self, space: SpaceId, id: AccountId) -> Result<Account, PropdeskError> {
        let conn = self.conn()?;
        load_account(&conn, space, id)
    }

    fn find_template(
        &self,
        space: SpaceId,
        firm: FirmId,
        phase: Phase,
    ) -> Result<Option<Account>, PropdeskError> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE space_id = ?1 AND firm_id = ?2 AND phase = ?3 AND is_template = 1
             ORDER BY id LIMIT 1"
        );
        let conn = self.conn()?;
        query_one(
            &conn,
            &sql,
            params![space.0, firm.0, phase.as_str()],
            account_from_row,
        )
    }

    fn list_accounts(
        &self,
        space: SpaceId,
        include_templates: bool,
    ) -> Result<Vec<Account>, PropdeskError> {
        let sql = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE space_id = ?1 AND (?2 OR is_template = 0)
             ORDER BY id"
        );
        let conn = self.conn()?;
        query_all(
            &conn,
            &sql,
            params![space.0, include_templates],
            account_from_row,
        )
    }

    fn update_account_status(
        &self,
        space: SpaceId,
        id: AccountId,
        status: AccountStatus,
    ) -> Result<Account, PropdeskError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE accounts SET status = ?1 WHERE id = ?2 AND space_id = ?3",
                params![status.as_str(), id.0, space.0],
            )
            .map_err(query_error)?;
        not_found_if_unchanged(changed, "account", id)?;
        load_account(&conn, space, id)
    }

    fn store_peak_balance(
        &self,
        space: SpaceId,
        id: AccountId,
        peak: Decimal,
        basis: LedgerMark,
    ) -> Result<bool, PropdeskError> {
        let conn = self.conn()?;
        load_account(&conn, space, id)?;
        // One statement, so a trade committed after `basis` was read makes
        // the guard fail instead of caching a stale peak.
        let changed = conn
            .execute(
                "UPDATE accounts SET peak_balance = ?1
                 WHERE id = ?2 AND space_id = ?3 AND peak_balance IS NULL
                   AND (SELECT COUNT(*) FROM trades WHERE account_id = ?2) = ?4
                   AND (SELECT MAX(id) FROM trades WHERE account_id = ?2) IS ?5",
                params![
                    decimal_text(peak),
                    id.0,
                    space.0,
                    basis.trade_count,
                    basis.last_trade_id.map(|t| t.0),
                ],
            )
            .map_err(query_error)?;
        Ok(changed > 0)
    }

    fn delete_account(&self, space: SpaceId, id: AccountId) -> Result<(), PropdeskError> {
        let changed = self
            .conn()?
            .execute(
                "DELETE FROM accounts WHERE id = ?1 AND space_id = ?2",
                params![id.0, space.0],
            )
            .map_err(query_error)?;
        not_found_if_unchanged(changed, "account", id)
    }
}

impl AssignmentStore for SqliteAdapter {
    fn assignments_for(
        &self,
        space: SpaceId,
        owner: Owner,
        rule: RuleId,
    ) -> Result<Vec<RuleAssignment>, PropdeskError> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM rule_assignments
             WHERE space_id = ?1 AND owner_kind = ?2 AND owner_id = ?3 AND rule_id = ?4
             ORDER BY start_date"
        );
        let conn = self.conn()?;
        query_all(
            &conn,
            &sql,
            params![space.0, owner.kind().as_str(), owner.raw_id(), rule.0],
            assignment_from_row,
        )
    }

    fn assignments_of(
        &self,
        space: SpaceId,
        owner: Owner,
    ) -> Result<Vec<RuleAssignment>, PropdeskError> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM rule_assignments
             WHERE space_id = ?1 AND owner_kind = ?2 AND owner_id = ?3
             ORDER BY rule_id, start_date"
        );
        let conn = self.conn()?;
        query_all(
            &conn,
            &sql,
            params![space.0, owner.kind().as_str(), owner.raw_id()],
            assignment_from_row,
        )
    }

    fn insert_assignment(
        &self,
        space: SpaceId,
        owner: Owner,
        assignment: &NewAssignment,
    ) -> Result<RuleAssignment, PropdeskError> {
        let conn = self.conn()?;
        let id = insert_assignment_row(&conn, space, owner, assignment)?;
        load_assignment(&conn, space, id)
    }

    fn get_assignment(
        &self,
        space: SpaceId,
        id: AssignmentId,
    ) -> Result<RuleAssignment, PropdeskError> {
        let conn = self.conn()?;
        load_assignment(&conn, space, id)
    }

    fn update_assignment_end(
        &self,
        space: SpaceId,
        id: AssignmentId,
        end_date: NaiveDate,
    ) -> Result<RuleAssignment, PropdeskError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE rule_assignments SET end_date = ?1 WHERE id = ?2 AND space_id = ?3",
                params![date_text(end_date), id.0, space.0],
            )
            .map_err(query_error)?;
        not_found_if_unchanged(changed, "rule assignment", id)?;
        load_assignment(&conn, space, id)
    }
}

impl TradeStore for SqliteAdapter {
    fn insert_trade(
        &self,
        space: SpaceId,
        account: AccountId,
        trade: &NewTrade,
    ) -> Result<Trade, PropdeskError> {
        let mut saved = self.insert_trades(space, account, std::slice::from_ref(trade))?;
        saved.pop().ok_or_else(|| PropdeskError::DatabaseQuery {
            reason: "trade insert returned no row".into(),
        })
    }

    fn insert_trades(
        &self,
        space: SpaceId,
        account: AccountId,
        trades: &[NewTrade],
    ) -> Result<Vec<Trade>, PropdeskError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        load_account(&tx, space, account)?;

        let mut ids = Vec::with_capacity(trades.len());
        for trade in trades {
            ids.push(insert_trade_row(&tx, space, account, trade)?);
        }
        tx.execute(
            "UPDATE accounts SET peak_balance = NULL WHERE id = ?1 AND space_id = ?2",
            params![account.0, space.0],
        )
        .map_err(query_error)?;

        let saved = ids
            .into_iter()
            .map(|id| load_trade(&tx, space, id))
            .collect::<Result<Vec<_>, _>>()?;
        tx.commit().map_err(query_error)?;
        Ok(saved)
    }

    fn trades_for(&self, space: SpaceId, account: AccountId) -> Result<Vec<Trade>, PropdeskError> {
        let sql = format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             WHERE account_id = ?1 AND space_id = ?2
             ORDER BY trade_date, id"
        );
        let conn = self.conn()?;
        query_all(
            &conn,
            &sql,
            params![account.0, space.0],
            trade_from_row,
        )
    }

    fn get_trade(&self, space: SpaceId, id: TradeId) -> Result<Trade, PropdeskError> {
        let conn = self.conn()?;
        load_trade(&conn, space, id)
    }

    fn insert_daily_balance(
        &self,
        space: SpaceId,
        balance: &AccountBalance,
    ) -> Result<(), PropdeskError> {
        let conn = self.conn()?;
        load_account(&conn, space, balance.account_id)?;
        conn.execute(
            "INSERT INTO account_balances (space_id, account_id, balance_date, opening_balance,
                 closing_balance, daily_pnl, daily_high, daily_low, trade_count, winning_trades,
                 losing_trades, gross_profit, gross_loss, drawdown_from_high, daily_return_percent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                space.0,
                balance.account_id.0,
                date_text(balance.balance_date),
                decimal_text(balance.opening_balance),
                decimal_text(balance.closing_balance),
                decimal_text(balance.daily_pnl),
                decimal_text(balance.daily_high),
                decimal_text(balance.daily_low),
                balance.trade_count,
                balance.winning_trades,
                balance.losing_trades,
                decimal_text(balance.gross_profit),
                decimal_text(balance.gross_loss),
                decimal_text(balance.drawdown_from_high),
                balance.daily_return_percent.map(decimal_text),
            ],
        )
        .map_err(query_error)?;
        Ok(())
    }

    fn get_daily_balance(
        &self,
        space: SpaceId,
        account: AccountId,
        date: NaiveDate,
    ) -> Result<Option<AccountBalance>, PropdeskError> {
        let sql = format!(
            "SELECT {BALANCE_COLUMNS} FROM account_balances
             WHERE account_id = ?1 AND space_id = ?2 AND balance_date = ?3"
        );
        let conn = self.conn()?;
        query_one(
            &conn,
            &sql,
            params![account.0, space.0, date_text(date)],
            balance_from_row,
        )
    }
}

impl PayoutStore for SqliteAdapter {
    fn insert_payout(
        &self,
        space: SpaceId,
        account: AccountId,
        payout: &NewPayout,
    ) -> Result<Payout, PropdeskError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_error)?;
        load_account(&tx, space, account)?;

        let numbers: Vec<i64> = query_all(
            &tx,
            "SELECT payout_number FROM payouts WHERE account_id = ?1 AND space_id = ?2",
            params![account.0, space.0],
            |row| row.get(0),
        )?;
        let number = next_payout_number(&numbers);

        tx.execute(
            "INSERT INTO payouts (space_id, account_id, payout_number, requested_date,
                 amount_requested, request_status, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
            params![
                space.0,
                account.0,
                number,
                date_text(payout.requested_date),
                decimal_text(payout.amount_requested),
                payout.notes,
            ],
        )
        .map_err(query_error)?;

        let saved = load_payout(&tx, space, PayoutId(tx.last_insert_rowid()))?;
        tx.commit().map_err(query_error)?;
        Ok(saved)
    }

    fn get_payout(&self, space: SpaceId, id: PayoutId) -> Result<Payout, PropdeskError> {
        let conn = self.conn()?;
        load_payout(&conn, space, id)
    }

    fn payouts_for(&self, space: SpaceId, account: AccountId) -> Result<Vec<Payout>, PropdeskError> {
        let sql = format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts
             WHERE account_id = ?1 AND space_id = ?2
             ORDER BY payout_number"
        );
        let conn = self.conn()?;
        query_all(
            &conn,
            &sql,
            params![account.0, space.0],
            payout_from_row,
        )
    }

    fn approve_payout(
        &self,
        space: SpaceId,
        id: PayoutId,
        amount_paid: Decimal,
        received_date: Option<NaiveDate>,
    ) -> Result<Payout, PropdeskError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_error)?;

        let mut payout = load_payout(&tx, space, id)?;
        let account = load_account(&tx, space, payout.account_id)?;
        let ctx = ApprovalContext {
            initial_balance: account.initial_balance,
            trades_pnl: sum_trade_pnl(&tx, space, account.id)?,
            other_paid: paid_by_other_payouts(&tx, space, account.id, id)?,
        };
        payout.approve(amount_paid, received_date)?;
        check_approval(&ctx, amount_paid)?;

        tx.execute(
            "UPDATE payouts SET request_status = ?1, amount_paid = ?2, received_date = ?3
             WHERE id = ?4 AND space_id = ?5",
            params![
                payout.status.as_str(),
                payout.amount_paid.map(decimal_text),
                payout.received_date.map(date_text),
                id.0,
                space.0,
            ],
        )
        .map_err(query_error)?;
        tx.commit().map_err(query_error)?;
        Ok(payout)
    }

    fn decline_payout(&self, space: SpaceId, id: PayoutId) -> Result<Payout, PropdeskError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_error)?;
        let mut payout = load_payout(&tx, space, id)?;
        payout.decline()?;
        tx.execute(
            "UPDATE payouts SET request_status = ?1 WHERE id = ?2 AND space_id = ?3",
            params![payout.status.as_str(), id.0, space.0],
        )
        .map_err(query_error)?;
        tx.commit().map_err(query_error)?;
        Ok(payout)
    }
}

impl ViolationStore for SqliteAdapter {
    fn insert_violation(
        &self,
        space: SpaceId,
        violation: &NewViolation,
    ) -> Result<RuleViolation, PropdeskError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        load_account(&tx, space, violation.account_id)?;
        load_rule(&tx, space, violation.rule_id)?;

        tx.execute(
            "INSERT INTO rule_violations (space_id, account_id, rule_id, trade_id,
                 violation_type, severity, status, threshold_value, actual_value,
                 comparison_operator, violation_date, details, action_taken,
                 account_terminated, detected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                space.0,
                violation.account_id.0,
                violation.rule_id.0,
                violation.trade_id.map(|t| t.0),
                violation.violation_type,
                violation.severity.as_str(),
                decimal_text(violation.threshold_value),
                decimal_text(violation.actual_value),
                violation.comparison_operator.as_str(),
                violation.violation_date.map(date_text),
                violation.details,
                violation.action_taken,
                violation.account_terminated,
                time_text(violation.detected_at),
            ],
        )
        .map_err(query_error)?;
        let id = ViolationId(tx.last_insert_rowid());

        if violation.account_terminated {
            tx.execute(
                "UPDATE accounts SET status = ?1 WHERE id = ?2 AND space_id = ?3",
                params![
                    AccountStatus::Terminated.as_str(),
                    violation.account_id.0,
                    space.0
                ],
            )
            .map_err(query_error)?;
        }

        let saved = load_violation(&tx, space, id)?;
        tx.commit().map_err(query_error)?;
        Ok(saved)
    }

    fn get_violation(
        &self,
        space: SpaceId,
        id: ViolationId,
    ) -> Result<RuleViolation, PropdeskError> {
        let conn = self.conn()?;
        load_violation(&conn, space, id)
    }

    fn update_violation(
        &self,
        space: SpaceId,
        violation: &RuleViolation,
    ) -> Result<(), PropdeskError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE rule_violations
                 SET status = ?1, resolved_at = ?2, resolved_by = ?3, resolution_notes = ?4
                 WHERE id = ?5 AND space_id = ?6",
                params![
                    violation.status.as_str(),
                    violation.resolved_at.map(time_text),
                    violation.resolved_by,
                    violation.resolution_notes,
                    violation.id.0,
                    space.0,
                ],
            )
            .map_err(query_error)?;
        not_found_if_unchanged(changed, "rule violation", violation.id)
    }

    fn violations_for(
        &self,
        space: SpaceId,
        account: AccountId,
    ) -> Result<Vec<RuleViolation>, PropdeskError> {
        let sql = format!(
            "SELECT {VIOLATION_COLUMNS} FROM rule_violations
             WHERE account_id = ?1 AND space_id = ?2
             ORDER BY detected_at, id"
        );
        let conn = self.conn()?;
        query_all(
            &conn,
            &sql,
            params![account.0, space.0],
            violation_from_row,
        )
    }
}
