//! Date math expressions
//!
//! Evaluates expressions such as `now-6h`, `now/d`, `now-1w/w` or
//! `2024-01-31||+1M/d` against a reference instant.
//!
//! # Grammar
//!
//! ```text
//! expr      := anchor operation*
//! anchor    := "now" | timestamp "||" | timestamp
//! operation := ("+" | "-") [digits] unit | "/" unit
//! unit      := "y" | "M" | "w" | "d" | "h" | "H" | "m" | "s" | "ms"
//! ```
//!
//! Rounding (`/unit`) truncates to the start of the unit, or to its last
//! millisecond when the options ask to round up.

use chrono::{
    DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, Offset, TimeDelta,
    TimeZone, Timelike, Utc, Weekday,
};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, map, map_res, opt, value},
    multi::many0,
    sequence::preceded,
    IResult, Parser,
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateMathError {
    #[error("empty date math expression")]
    Empty,

    #[error("invalid anchor date {0:?}")]
    InvalidAnchor(String),

    #[error("invalid date math operations {0:?}")]
    InvalidOperations(String),

    #[error("date math result out of range")]
    OutOfRange,
}

/// Calendar unit usable in offsets and rounding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Shift(i64, Unit),
    Round(Unit),
}

/// Evaluation options
#[derive(Debug, Clone, Copy)]
pub struct DateMathOptions {
    /// Reference instant for the `now` anchor
    pub now: DateTime<Utc>,
    /// Location used for calendar arithmetic and anchors without offset
    pub location: FixedOffset,
    /// First day of the week for `/w` rounding
    pub week_start: Weekday,
    /// Round to the end of a unit instead of its start
    pub round_up: bool,
}

impl DateMathOptions {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            location: Utc.fix(),
            week_start: Weekday::Mon,
            round_up: false,
        }
    }

    pub fn with_location(mut self, location: FixedOffset) -> Self {
        self.location = location;
        self
    }

    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self
    }

    pub fn with_round_up(mut self, round_up: bool) -> Self {
        self.round_up = round_up;
        self
    }
}

/// Parse and evaluate a date math expression
pub fn parse_and_evaluate(
    expr: &str,
    options: &DateMathOptions,
) -> Result<DateTime<Utc>, DateMathError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(DateMathError::Empty);
    }

    let (anchor, ops) = if let Some(rest) = expr.strip_prefix("now") {
        (options.now.with_timezone(&options.location), rest)
    } else if let Some((date, rest)) = expr.split_once("||") {
        (parse_anchor(date, options.location)?, rest)
    } else {
        (parse_anchor(expr, options.location)?, "")
    };

    let (_, operations) = all_consuming(many0(operation))
        .parse(ops)
        .map_err(|_| DateMathError::InvalidOperations(ops.to_string()))?;

    let mut t = anchor;
    for op in operations {
        t = match op {
            Operation::Shift(n, unit) => shift(t, n, unit),
            Operation::Round(unit) => round(t, unit, options.week_start, options.round_up),
        }
        .ok_or(DateMathError::OutOfRange)?;
    }

    Ok(t.with_timezone(&Utc))
}

fn parse_anchor(date: &str, location: FixedOffset) -> Result<DateTime<FixedOffset>, DateMathError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(date) {
        return Ok(t);
    }

    let naive = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(date, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| DateMathError::InvalidAnchor(date.to_string()))?;

    location
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| DateMathError::InvalidAnchor(date.to_string()))
}

fn unit(input: &str) -> IResult<&str, Unit> {
    alt((
        value(Unit::Millisecond, tag("ms")),
        value(Unit::Year, char('y')),
        value(Unit::Month, char('M')),
        value(Unit::Week, char('w')),
        value(Unit::Day, char('d')),
        value(Unit::Hour, one_of("hH")),
        value(Unit::Minute, char('m')),
        value(Unit::Second, char('s')),
    ))
    .parse(input)
}

fn operation(input: &str) -> IResult<&str, Operation> {
    alt((
        map(
            (
                one_of("+-"),
                opt(map_res(digit1, |digits: &str| digits.parse::<i64>())),
                unit,
            ),
            |(sign, amount, unit)| {
                let amount = amount.unwrap_or(1);
                Operation::Shift(if sign == '-' { -amount } else { amount }, unit)
            },
        ),
        map(preceded(char('/'), unit), Operation::Round),
    ))
    .parse(input)
}

fn shift(t: DateTime<FixedOffset>, n: i64, unit: Unit) -> Option<DateTime<FixedOffset>> {
    let delta = match unit {
        Unit::Year => return add_months(t, n.checked_mul(12)?),
        Unit::Month => return add_months(t, n),
        Unit::Week => TimeDelta::try_weeks(n)?,
        Unit::Day => TimeDelta::try_days(n)?,
        Unit::Hour => TimeDelta::try_hours(n)?,
        Unit::Minute => TimeDelta::try_minutes(n)?,
        Unit::Second => TimeDelta::try_seconds(n)?,
        Unit::Millisecond => TimeDelta::try_milliseconds(n)?,
    };
    t.checked_add_signed(delta)
}

fn add_months(t: DateTime<FixedOffset>, n: i64) -> Option<DateTime<FixedOffset>> {
    let months = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
    if n >= 0 {
        t.checked_add_months(months)
    } else {
        t.checked_sub_months(months)
    }
}

fn round(
    t: DateTime<FixedOffset>,
    unit: Unit,
    week_start: Weekday,
    round_up: bool,
) -> Option<DateTime<FixedOffset>> {
    let start = truncate(t, unit, week_start)?;
    if round_up {
        shift(start, 1, unit)?.checked_sub_signed(TimeDelta::try_milliseconds(1)?)
    } else {
        Some(start)
    }
}

fn truncate(t: DateTime<FixedOffset>, unit: Unit, week_start: Weekday) -> Option<DateTime<FixedOffset>> {
    let date = t.date_naive();
    let naive = match unit {
        Unit::Year => NaiveDate::from_ymd_opt(t.year(), 1, 1)?.and_hms_opt(0, 0, 0)?,
        Unit::Month => NaiveDate::from_ymd_opt(t.year(), t.month(), 1)?.and_hms_opt(0, 0, 0)?,
        Unit::Week => {
            let back = (t.weekday().num_days_from_monday() + 7
                - week_start.num_days_from_monday())
                % 7;
            date.checked_sub_signed(TimeDelta::try_days(back as i64)?)?
                .and_hms_opt(0, 0, 0)?
        }
        Unit::Day => date.and_hms_opt(0, 0, 0)?,
        Unit::Hour => date.and_hms_opt(t.hour(), 0, 0)?,
        Unit::Minute => date.and_hms_opt(t.hour(), t.minute(), 0)?,
        Unit::Second => date.and_hms_opt(t.hour(), t.minute(), t.second())?,
        Unit::Millisecond => date.and_hms_milli_opt(
            t.hour(),
            t.minute(),
            t.second(),
            t.timestamp_subsec_millis(),
        )?,
    };
    t.offset().from_local_datetime(&naive).single()
}
