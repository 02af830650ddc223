//! Timeframes and period alignment.
//!
//! Every candle opens on an aligned boundary:
//! - minute frames floor the minute to a multiple of the frame length
//! - hour frames floor the hour the same way
//! - `1d` aligns to midnight, `3d` to a 3-day block counted from the unix epoch
//! - `1w` aligns to the most recent Monday, `1M` to the first of the month
//!
//! All times are UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("unknown timeframe '{0}'")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
}

impl Timeframe {
    pub const ALL: [Timeframe; 15] = [
        Timeframe::OneMinute,
        Timeframe::ThreeMinutes,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::TwoHours,
        Timeframe::FourHours,
        Timeframe::SixHours,
        Timeframe::EightHours,
        Timeframe::TwelveHours,
        Timeframe::OneDay,
        Timeframe::ThreeDays,
        Timeframe::OneWeek,
        Timeframe::OneMonth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::ThreeMinutes => "3m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
            Timeframe::ThirtyMinutes => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::TwoHours => "2h",
            Timeframe::FourHours => "4h",
            Timeframe::SixHours => "6h",
            Timeframe::EightHours => "8h",
            Timeframe::TwelveHours => "12h",
            Timeframe::OneDay => "1d",
            Timeframe::ThreeDays => "3d",
            Timeframe::OneWeek => "1w",
            Timeframe::OneMonth => "1M",
        }
    }

    /// Nominal length in seconds. `1M` is nominally 30 days; candle close
    /// times use the calendar month instead (see [`Timeframe::close_time`]).
    pub fn to_seconds(&self) -> i64 {
        match self {
            Timeframe::OneMinute => 60,
            Timeframe::ThreeMinutes => 180,
            Timeframe::FiveMinutes => 300,
            Timeframe::FifteenMinutes => 900,
            Timeframe::ThirtyMinutes => 1_800,
            Timeframe::OneHour => 3_600,
            Timeframe::TwoHours => 7_200,
            Timeframe::FourHours => 14_400,
            Timeframe::SixHours => 21_600,
            Timeframe::EightHours => 28_800,
            Timeframe::TwelveHours => 43_200,
            Timeframe::OneDay => 86_400,
            Timeframe::ThreeDays => 259_200,
            Timeframe::OneWeek => 604_800,
            Timeframe::OneMonth => 2_592_000,
        }
    }

    /// Floor `date` to the start of the period containing it.
    pub fn align(&self, date: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Timeframe::OneMinute
            | Timeframe::ThreeMinutes
            | Timeframe::FiveMinutes
            | Timeframe::FifteenMinutes
            | Timeframe::ThirtyMinutes => {
                let step = (self.to_seconds() / 60) as u32;
                let minute = date.minute() - date.minute() % step;
                at(date.date_naive(), date.hour(), minute)
            }
            Timeframe::OneHour
            | Timeframe::TwoHours
            | Timeframe::FourHours
            | Timeframe::SixHours
            | Timeframe::EightHours
            | Timeframe::TwelveHours => {
                let step = (self.to_seconds() / 3_600) as u32;
                let hour = date.hour() - date.hour() % step;
                at(date.date_naive(), hour, 0)
            }
            Timeframe::OneDay => at(date.date_naive(), 0, 0),
            Timeframe::ThreeDays => {
                let block = self.to_seconds();
                let seconds = date.timestamp();
                let floored = seconds - seconds.rem_euclid(block);
                DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(date)
            }
            Timeframe::OneWeek => {
                let offset = date.weekday().num_days_from_monday() as i64;
                at(date.date_naive() - Duration::days(offset), 0, 0)
            }
            Timeframe::OneMonth => {
                let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
                    .unwrap_or(date.date_naive());
                at(first, 0, 0)
            }
        }
    }

    /// Close time of the candle opened at `open_time` (an aligned boundary).
    pub fn close_time(&self, open_time: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Timeframe::OneMonth => {
                let (year, month) = if open_time.month() == 12 {
                    (open_time.year() + 1, 1)
                } else {
                    (open_time.year(), open_time.month() + 1)
                };
                match NaiveDate::from_ymd_opt(year, month, 1) {
                    Some(next) => at(next, 0, 0),
                    None => open_time + Duration::seconds(self.to_seconds()),
                }
            }
            _ => open_time + Duration::seconds(self.to_seconds()),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str() == s)
            .ok_or_else(|| TimeframeError::Unknown(s.to_string()))
    }
}

/// Calendar boundaries a strategy can subscribe to, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeriodKind {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl PeriodKind {
    pub const ALL: [PeriodKind; 5] = [
        PeriodKind::Minute,
        PeriodKind::Hour,
        PeriodKind::Day,
        PeriodKind::Week,
        PeriodKind::Month,
    ];

    pub fn timeframe(&self) -> Timeframe {
        match self {
            PeriodKind::Minute => Timeframe::OneMinute,
            PeriodKind::Hour => Timeframe::OneHour,
            PeriodKind::Day => Timeframe::OneDay,
            PeriodKind::Week => Timeframe::OneWeek,
            PeriodKind::Month => Timeframe::OneMonth,
        }
    }

    /// Aligned period marker for `date`.
    pub fn align(&self, date: DateTime<Utc>) -> DateTime<Utc> {
        self.timeframe().align(date)
    }
}

fn at(day: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    let naive = day.and_hms_opt(hour, minute, 0).unwrap_or_default();
    Utc.from_utc_datetime(&naive)
}
