#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use propdesk::adapters::sqlite_adapter::SqliteAdapter;
use propdesk::domain::account::{Account, AccountStatus, Firm, NewAccount, Phase};
use propdesk::domain::catalog::Rule;
use propdesk::domain::engine::{ComplianceEngine, EngineSettings};
use propdesk::domain::ids::SpaceId;
use propdesk::ports::clock_port::ClockPort;
use rust_decimal::Decimal;
use std::cell::Cell;

pub const SPACE: SpaceId = SpaceId(1);
pub const OTHER_SPACE: SpaceId = SpaceId(2);

/// Clock pinned to a settable instant.
pub struct FixedClock {
    now: Cell<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.now.set(now);
    }
}

impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn noon(s: &str) -> DateTime<Utc> {
    let d = date(s);
    Utc.from_utc_datetime(&d.and_hms_opt(12, 0, 0).unwrap())
}

/// In-memory store with the standard catalog seeded in [`SPACE`].
pub struct Fixture {
    pub store: SqliteAdapter,
    pub clock: FixedClock,
    pub settings: EngineSettings,
}

impl Fixture {
    pub fn new() -> Self {
        let store = SqliteAdapter::in_memory().unwrap();
        store.initialize_schema().unwrap();
        let fixture = Self {
            store,
            clock: FixedClock::at(noon("2025-06-30")),
            settings: EngineSettings::default(),
        };
        fixture.engine().seed_standard_catalog(SPACE).unwrap();
        fixture
    }

    pub fn without_peak_cache() -> Self {
        let mut fixture = Self::new();
        fixture.settings.cache_peak_balance = false;
        fixture
    }

    pub fn engine(&self) -> ComplianceEngine<'_> {
        ComplianceEngine::with_settings(&self.store, &self.clock, self.settings)
    }

    pub fn rule(&self, space: SpaceId, name: &str) -> Rule {
        self.engine()
            .rules(space)
            .unwrap()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap_or_else(|| panic!("rule {name} not seeded"))
    }

    pub fn firm(&self, space: SpaceId, name: &str) -> Firm {
        self.engine().create_firm(space, name).unwrap()
    }

    pub fn account(&self, space: SpaceId, firm: &Firm, external_id: &str, initial: Decimal) -> Account {
        self.engine()
            .create_account(space, &new_account(firm, external_id, initial, date("2025-01-01")))
            .unwrap()
    }
}

pub fn new_account(firm: &Firm, external_id: &str, initial: Decimal, start: NaiveDate) -> NewAccount {
    NewAccount {
        firm_id: firm.id,
        user_id: Some(7),
        external_id: Some(external_id.to_string()),
        name: None,
        phase: Phase::Evaluation,
        status: AccountStatus::Active,
        initial_balance: initial,
        currency: "USD".to_string(),
        start_date: Some(start),
        end_date: None,
        is_template: false,
        auto_liquidity_threshold: None,
    }
}
