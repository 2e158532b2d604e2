//! Claim windows: calendar months in the operational time zone.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Zone used when the configured one is missing or unknown.
pub const DEFAULT_OPERATIONAL_ZONE: Tz = chrono_tz::Europe::Berlin;

/// A calendar year-month, rendered and persisted as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(MonthKey { year, month })
    }

    /// The month containing `instant`, as seen from the operational zone.
    pub fn containing(instant: DateTime<Utc>, zone: Tz) -> Self {
        let local = instant.with_timezone(&zone);
        MonthKey {
            year: local.year(),
            month: local.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn minus_months(&self, months: u32) -> Self {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) - months as i64;
        MonthKey {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            MonthKey {
                year: self.year + 1,
                month: 1,
            }
        } else {
            MonthKey {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First instant of this month in the operational zone.
    pub fn start(&self, zone: Tz) -> Option<DateTime<Utc>> {
        zone.with_ymd_and_hms(self.year, self.month, 1, 0, 0, 0)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid month key '{0}', expected YYYY-MM")]
pub struct MonthKeyParseError(pub String);

impl FromStr for MonthKey {
    type Err = MonthKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MonthKeyParseError(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(err)?;
        let year: i32 = year.parse().map_err(|_| err())?;
        let month: u32 = month.parse().map_err(|_| err())?;
        MonthKey::new(year, month).ok_or_else(err)
    }
}

impl Serialize for MonthKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MonthKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Resolve an IANA zone name such as `Europe/Berlin`.
pub fn parse_zone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// The operational zone for `name`, falling back to Europe/Berlin.
pub fn operational_zone(name: &str) -> Tz {
    parse_zone(name).unwrap_or_else(|| {
        warn!(zone = name, "Unknown operational time zone, using Europe/Berlin");
        DEFAULT_OPERATIONAL_ZONE
    })
}
