//! CSV trade import.
//!
//! Expects a header row. Only `trade_date` and `pnl` are required; the other
//! columns (`symbol`, `side`, `entry_price`, `exit_price`, `stop_loss`,
//! `entry_time`, `exit_time`, `notes`) may be absent or left empty.

use crate::domain::error::PropdeskError;
use crate::domain::trade::{NewTrade, TradeSide};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize)]
struct TradeRow {
    trade_date: NaiveDate,
    pnl: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    side: Option<String>,
    #[serde(default)]
    entry_price: Option<String>,
    #[serde(default)]
    exit_price: Option<String>,
    #[serde(default)]
    stop_loss: Option<String>,
    #[serde(default)]
    entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    exit_time: Option<DateTime<Utc>>,
    #[serde(default)]
    notes: Option<String>,
}

impl TradeRow {
    fn into_trade(self) -> Result<NewTrade, PropdeskError> {
        let side = self
            .side
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase().parse::<TradeSide>())
            .transpose()?;
        let trade = NewTrade {
            trade_date: self.trade_date,
            pnl: decimal("pnl", &self.pnl)?,
            symbol: non_blank(self.symbol),
            side,
            entry_price: optional_decimal("entry_price", self.entry_price)?,
            exit_price: optional_decimal("exit_price", self.exit_price)?,
            stop_loss: optional_decimal("stop_loss", self.stop_loss)?,
            entry_time: self.entry_time,
            exit_time: self.exit_time,
            notes: non_blank(self.notes),
        };
        trade.validate()?;
        Ok(trade)
    }
}

// Decimal columns are read as text so no value passes through a float.
fn decimal(field: &str, raw: &str) -> Result<Decimal, PropdeskError> {
    Decimal::from_str(raw.trim())
        .map_err(|e| PropdeskError::validation(field, format!("'{raw}' is not a number: {e}")))
}

fn optional_decimal(field: &str, raw: Option<String>) -> Result<Option<Decimal>, PropdeskError> {
    non_blank(raw).map(|s| decimal(field, &s)).transpose()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub struct CsvTradeImporter;

impl CsvTradeImporter {
    pub fn from_path(path: &Path) -> Result<Vec<NewTrade>, PropdeskError> {
        let file = File::open(path)?;
        Self::read(file)
    }

    /// Parse every row, failing on the first bad one with its line number.
    pub fn read<R: Read>(reader: R) -> Result<Vec<NewTrade>, PropdeskError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = rdr
            .headers()
            .map_err(|e| import_error(1, e.to_string()))?
            .clone();

        let mut trades = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                import_error(line, e.to_string())
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let row: TradeRow = record
                .deserialize(Some(&headers))
                .map_err(|e| import_error(line, e.to_string()))?;
            let trade = row
                .into_trade()
                .map_err(|e| import_error(line, e.to_string()))?;
            trades.push(trade);
        }

        tracing::debug!(rows = trades.len(), "parsed trade csv");
        Ok(trades)
    }
}

fn import_error(line: u64, reason: String) -> PropdeskError {
    PropdeskError::Import { line, reason }
}
