//! `HolidayResolver`/`SolarOracle` collaborators (§6). Pure date-arithmetic
//! oracles used only inside `IntentNormalizer` step 2 to hard-resolve
//! symbolic timing in sub-events; the symbolic token itself is retained
//! verbatim in `identity.timing` and in the sub-event payload's
//! `SymbolicCompanion` (§4.C step 2).

use chrono::{NaiveDate, NaiveTime};

use crate::timing::SolarKind;

pub trait HolidayResolver {
    fn resolve(&self, name: &str, year: i32) -> Option<NaiveDate>;
}

pub trait SolarOracle {
    fn resolve(&self, date: NaiveDate, lat: f64, lon: f64, kind: SolarKind, offset_min: i32) -> NaiveTime;
}

/// A resolver over a fixed table, useful for tests and for deployments that
/// want to pin holiday dates explicitly rather than compute them.
#[derive(Debug, Clone, Default)]
pub struct TableHolidayResolver {
    table: std::collections::HashMap<(String, i32), NaiveDate>,
}

impl TableHolidayResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, year: i32, date: NaiveDate) -> Self {
        self.table.insert((name.into(), year), date);
        self
    }
}

impl HolidayResolver for TableHolidayResolver {
    fn resolve(&self, name: &str, year: i32) -> Option<NaiveDate> {
        self.table.get(&(name.to_string(), year)).copied()
    }
}

/// A fixed-offset oracle useful for tests: ignores `lat`/`lon` and returns
/// `base + offset_min` for every `kind`. Real deployments should supply a
/// proper astronomical calculation; that calculation is explicitly out of
/// scope for the core (§1), this is a stand-in collaborator.
#[derive(Debug, Clone, Copy)]
pub struct FixedSolarOracle {
    pub dawn: NaiveTime,
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
    pub dusk: NaiveTime,
}

impl Default for FixedSolarOracle {
    fn default() -> Self {
        FixedSolarOracle {
            dawn: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            sunrise: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            sunset: NaiveTime::from_hms_opt(18, 30, 0).unwrap(),
            dusk: NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        }
    }
}

impl SolarOracle for FixedSolarOracle {
    fn resolve(
        &self,
        _date: NaiveDate,
        _lat: f64,
        _lon: f64,
        kind: SolarKind,
        offset_min: i32,
    ) -> NaiveTime {
        let base = match kind {
            SolarKind::Dawn => self.dawn,
            SolarKind::SunRise => self.sunrise,
            SolarKind::SunSet => self.sunset,
            SolarKind::Dusk => self.dusk,
        };
        base + chrono::Duration::minutes(offset_min as i64)
    }
}
