//! Cadence descriptors attached to validations.
//!
//! A schedule is an open mapping, either `{"every": {<unit>: <n>}}` or
//! `{"at": {<moment>: "HH:MM"}}`. Only the first key of the inner mapping is
//! considered. Anything this module cannot interpret is reported as a
//! [`CadenceIssue`]; callers skip such validations instead of failing.

use std::fmt;

use chrono::{NaiveTime, Weekday};
use serde_json::Value;

/// Unit of an `every` cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    /// `seconds`
    Seconds,
    /// `minutes`
    Minutes,
    /// `hours`
    Hours,
    /// `days`
    Days,
    /// `weeks`
    Weeks,
    /// Once a week on the given day.
    Weekday(Weekday),
}

/// Moment of an `at` cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moment {
    /// `second`; the time is ignored.
    Second,
    /// `minute`, at `:SS`.
    Minute,
    /// `hour`, at `MM:SS` or `:MM`.
    Hour,
    /// `day`, at a clock time.
    Day,
    /// `week`, at a clock time.
    Week,
    /// A day of the week, at a clock time.
    Weekday(Weekday),
}

/// Time component of an `at` cadence, interpreted per moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtTime {
    /// `HH:MM` or `HH:MM:SS`, for daily and weekly moments.
    Clock(NaiveTime),
    /// `MM:SS` or `:MM`, for hourly moments.
    MinuteSecond { minute: u32, second: u32 },
    /// `:SS`, for minutely moments.
    Second(u32),
    /// Moments where a time of day carries no meaning.
    Ignored,
}

/// A parsed, supported cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval of `amount` units.
    Every { unit: IntervalUnit, amount: u64 },
    /// Aligned to a moment of the clock or calendar.
    At { moment: Moment, time: AtTime },
}

/// Why a schedule did not produce a cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CadenceIssue {
    /// Neither `every` nor `at`, or an empty mapping.
    Missing,
    /// Unit outside [`INTERVAL_UNITS`].
    UnsupportedUnit(String),
    /// Moment outside [`MOMENTS`].
    UnsupportedMoment(String),
    /// Amount that is not a positive integer.
    InvalidAmount(String),
    /// Time string not valid for the moment.
    InvalidTime { moment: String, time: String },
    /// Weekday units only support an amount of 1.
    WeekdayNeedsSingleWeek { unit: String, amount: u64 },
    /// The cadence parsed but its runs fall outside the representable calendar.
    OutOfRange,
}

impl fmt::Display for CadenceIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CadenceIssue::Missing => write!(f, "schedule has neither 'every' nor 'at'"),
            CadenceIssue::UnsupportedUnit(u) => write!(f, "unsupported time period '{u}'"),
            CadenceIssue::UnsupportedMoment(m) => write!(f, "unsupported moment '{m}'"),
            CadenceIssue::InvalidAmount(v) => write!(f, "invalid interval amount {v}"),
            CadenceIssue::InvalidTime { moment, time } => {
                write!(f, "invalid time '{time}' for moment '{moment}'")
            }
            CadenceIssue::WeekdayNeedsSingleWeek { unit, amount } => {
                write!(f, "'{unit}' jobs only run weekly, got every {amount}")
            }
            CadenceIssue::OutOfRange => write!(f, "next run falls outside the supported date range"),
        }
    }
}

/// Units accepted under `every`.
pub const INTERVAL_UNITS: [&str; 12] = [
    "seconds", "minutes", "hours", "days", "weeks", "monday", "tuesday", "wednesday", "thursday",
    "friday", "saturday", "sunday",
];

/// Moments accepted under `at`.
pub const MOMENTS: [&str; 12] = [
    "second", "minute", "hour", "day", "week", "monday", "tuesday", "wednesday", "thursday",
    "friday", "saturday", "sunday",
];

fn weekday(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

impl IntervalUnit {
    /// Unit named `name`, if supported.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "seconds" => Some(IntervalUnit::Seconds),
            "minutes" => Some(IntervalUnit::Minutes),
            "hours" => Some(IntervalUnit::Hours),
            "days" => Some(IntervalUnit::Days),
            "weeks" => Some(IntervalUnit::Weeks),
            other => weekday(other).map(IntervalUnit::Weekday),
        }
    }
}

impl Moment {
    /// Moment named `name`, if supported.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "second" => Some(Moment::Second),
            "minute" => Some(Moment::Minute),
            "hour" => Some(Moment::Hour),
            "day" => Some(Moment::Day),
            "week" => Some(Moment::Week),
            other => weekday(other).map(Moment::Weekday),
        }
    }
}

impl Cadence {
    /// Interprets a schedule mapping. `every` takes precedence over `at`.
    pub fn parse(schedule: &Value) -> Result<Cadence, CadenceIssue> {
        if let Some(every) = schedule.get("every") {
            return parse_every(every);
        }
        if let Some(at) = schedule.get("at") {
            return parse_at(at);
        }
        Err(CadenceIssue::Missing)
    }

    /// True when a schedule names both `every` and `at`; only `every` is honoured.
    pub fn has_ignored_at(schedule: &Value) -> bool {
        schedule.get("every").is_some() && schedule.get("at").is_some()
    }
}

fn first_entry(v: &Value) -> Option<(&String, &Value)> {
    v.as_object().and_then(|m| m.iter().next())
}

fn parse_every(every: &Value) -> Result<Cadence, CadenceIssue> {
    let (key, amount) = first_entry(every).ok_or(CadenceIssue::Missing)?;
    let unit = IntervalUnit::parse(key).ok_or_else(|| CadenceIssue::UnsupportedUnit(key.clone()))?;
    let amount = amount
        .as_u64()
        .filter(|n| *n > 0)
        .ok_or_else(|| CadenceIssue::InvalidAmount(amount.to_string()))?;
    if matches!(unit, IntervalUnit::Weekday(_)) && amount != 1 {
        return Err(CadenceIssue::WeekdayNeedsSingleWeek {
            unit: key.clone(),
            amount,
        });
    }
    Ok(Cadence::Every { unit, amount })
}

fn parse_at(at: &Value) -> Result<Cadence, CadenceIssue> {
    let (key, time) = first_entry(at).ok_or(CadenceIssue::Missing)?;
    let moment = Moment::parse(key).ok_or_else(|| CadenceIssue::UnsupportedMoment(key.clone()))?;
    let raw = time.as_str().unwrap_or_default();
    let invalid = || CadenceIssue::InvalidTime {
        moment: key.clone(),
        time: time.to_string(),
    };
    let time = match moment {
        Moment::Second => AtTime::Ignored,
        Moment::Minute => {
            let second = raw.strip_prefix(':').and_then(parse_two_digits).ok_or_else(invalid)?;
            AtTime::Second(second)
        }
        Moment::Hour => parse_minute_second(raw).ok_or_else(invalid)?,
        Moment::Day | Moment::Week | Moment::Weekday(_) => {
            let clock = NaiveTime::parse_from_str(raw, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
                .map_err(|_| invalid())?;
            AtTime::Clock(clock)
        }
    };
    Ok(Cadence::At { moment, time })
}

fn parse_two_digits(s: &str) -> Option<u32> {
    if s.len() != 2 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|n| *n < 60)
}

fn parse_minute_second(raw: &str) -> Option<AtTime> {
    if let Some(minute) = raw.strip_prefix(':') {
        return parse_two_digits(minute).map(|minute| AtTime::MinuteSecond { minute, second: 0 });
    }
    let (minute, second) = raw.split_once(':')?;
    Some(AtTime::MinuteSecond {
        minute: parse_two_digits(minute)?,
        second: parse_two_digits(second)?,
    })
}
