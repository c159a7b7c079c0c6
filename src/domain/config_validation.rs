//! Configuration validation.
//!
//! Both sections are checked before a store is opened so a bad file fails
//! fast with the offending key named.

use crate::domain::error::PropdeskError;
use crate::ports::config_port::{parse_bool, ConfigPort};

pub const DEFAULT_POOL_SIZE: i64 = 4;
pub const DEFAULT_BUSY_TIMEOUT_MS: i64 = 5000;
const MAX_POOL_SIZE: i64 = 64;

pub fn validate_sqlite_config(config: &dyn ConfigPort) -> Result<(), PropdeskError> {
    config.require_string("sqlite", "path")?;
    validate_integer(config, "sqlite", "pool_size", 1, MAX_POOL_SIZE)?;
    validate_integer(config, "sqlite", "busy_timeout_ms", 0, i64::MAX)?;
    Ok(())
}

pub fn validate_engine_config(config: &dyn ConfigPort) -> Result<(), PropdeskError> {
    validate_integer(config, "engine", "space_id", 1, i64::MAX)?;
    validate_flag(config, "engine", "cache_peak_balance")?;
    Ok(())
}

/// An absent key is fine; a present one must be an integer in `[min, max]`.
fn validate_integer(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    min: i64,
    max: i64,
) -> Result<(), PropdeskError> {
    let Some(raw) = config.get_string(section, key) else {
        return Ok(());
    };
    let value: i64 = raw.trim().parse().map_err(|_| PropdeskError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: format!("'{raw}' is not an integer"),
    })?;
    if value < min || value > max {
        let reason = if max == i64::MAX {
            format!("{key} must be at least {min}")
        } else {
            format!("{key} must be between {min} and {max}")
        };
        return Err(PropdeskError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason,
        });
    }
    Ok(())
}

fn validate_flag(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), PropdeskError> {
    match config.get_string(section, key) {
        Some(raw) if parse_bool(&raw).is_none() => Err(PropdeskError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("'{raw}' is not a boolean"),
        }),
        _ => Ok(()),
    }
}
