use std::fmt;

use chrono::NaiveDate;

mod coded;
mod route_types;

pub use coded::{
    Availability, BikesAllowed, CodedValue, ExactTimes, ExceptionType, LocationType, PathwayMode,
    PickupDropOffType, Timepoint, TransferType, WheelchairAccessible, WheelchairBoarding,
};
pub use route_types::{RouteTypeInfo, RouteTypesScheme, BASIC_ROUTE_TYPES};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GtfsParseError {
    #[error("invalid date format: {0}")]
    InvalidDateFormat(String),
    #[error("invalid date value: {0}")]
    InvalidDateValue(String),
    #[error("invalid time format: {0}")]
    InvalidTimeFormat(String),
    #[error("invalid time value: {0}")]
    InvalidTimeValue(String),
    #[error("unknown {field} code: {value}")]
    UnknownCode { field: &'static str, value: String },
}

/// A GTFS service date (`YYYYMMDD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GtfsDate(NaiveDate);

impl GtfsDate {
    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let digits = value.trim();
        if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(GtfsParseError::InvalidDateFormat(value.to_string()));
        }
        NaiveDate::parse_from_str(digits, "%Y%m%d")
            .map(Self)
            .map_err(|_| GtfsParseError::InvalidDateValue(value.to_string()))
    }

    pub fn naive(self) -> NaiveDate {
        self.0
    }

    /// ISO 8601 calendar date, the literal form both target databases accept.
    pub fn to_iso(self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for GtfsDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d"))
    }
}

/// A GTFS time of day relative to "noon minus 12h" of the service date.
/// Hours may exceed 23 for trips running past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GtfsTime(u32);

impl GtfsTime {
    pub fn from_seconds(seconds: u32) -> Self {
        Self(seconds)
    }

    pub fn parse(value: &str) -> Result<Self, GtfsParseError> {
        let format_err = || GtfsParseError::InvalidTimeFormat(value.to_string());
        let value_err = || GtfsParseError::InvalidTimeValue(value.to_string());

        let (h, rest) = value.trim().split_once(':').ok_or_else(format_err)?;
        let (m, s) = rest.split_once(':').ok_or_else(format_err)?;
        let is_number = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !is_number(h) || m.len() != 2 || s.len() != 2 || !is_number(m) || !is_number(s) {
            return Err(format_err());
        }

        let hours: u32 = h.parse().map_err(|_| value_err())?;
        let minutes: u32 = m.parse().map_err(|_| value_err())?;
        let seconds: u32 = s.parse().map_err(|_| value_err())?;
        if minutes >= 60 || seconds >= 60 {
            return Err(value_err());
        }
        hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(minutes * 60 + seconds))
            .map(Self)
            .ok_or_else(value_err)
    }

    pub fn total_seconds(self) -> u32 {
        self.0
    }
}

/// `HH:MM:SS`, with hours past 23 kept as is; valid interval text.
impl fmt::Display for GtfsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (hours, rest) = (self.0 / 3600, self.0 % 3600);
        write!(f, "{hours:02}:{:02}:{:02}", rest / 60, rest % 60)
    }
}
