//! Time expression resolution
//!
//! Converts the flexible `from`/`to` bounds of a request into absolute UTC
//! instants. A bound is tried, in order, as epoch milliseconds, as a duration
//! relative to now (`"1h"` means one hour ago) and finally as a date math
//! expression (`"now-1h/h"`).

use crate::datemath::{self, DateMathError, DateMathOptions};
use crate::models::TimeRange;
use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc, Weekday};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, one_of},
    combinator::{all_consuming, map, opt, recognize, value, verify},
    multi::many1,
    IResult, Parser,
};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("epoch milliseconds out of range: {0}")]
    EpochOutOfRange(i64),

    #[error(transparent)]
    DateMath(#[from] DateMathError),
}

/// A request time window together with the single `now` it is evaluated against
#[derive(Debug, Clone)]
pub struct DataTimeRange {
    pub from: String,
    pub to: String,
    pub now: DateTime<Utc>,
    location: Option<FixedOffset>,
    week_start: Option<Weekday>,
}

impl DataTimeRange {
    /// Capture `now` once; every bound of this range resolves against it
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::with_now(from, to, Utc::now())
    }

    pub fn with_now(from: impl Into<String>, to: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            now,
            location: None,
            week_start: None,
        }
    }

    pub fn with_location(mut self, location: FixedOffset) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = Some(week_start);
        self
    }

    pub fn parse_from(&self) -> Result<DateTime<Utc>, TimeParseError> {
        self.parsable(&self.from, false).parse()
    }

    pub fn parse_to(&self) -> Result<DateTime<Utc>, TimeParseError> {
        self.parsable(&self.to, true).parse()
    }

    /// `from` as UTC, the Unix epoch when the bound cannot be parsed
    pub fn from_utc(&self) -> DateTime<Utc> {
        self.parse_from().unwrap_or_else(|e| {
            warn!(bound = %self.from, error = %e, "unparseable time bound, using epoch");
            DateTime::<Utc>::UNIX_EPOCH
        })
    }

    /// `to` as UTC, the Unix epoch when the bound cannot be parsed
    pub fn to_utc(&self) -> DateTime<Utc> {
        self.parse_to().unwrap_or_else(|e| {
            warn!(bound = %self.to, error = %e, "unparseable time bound, using epoch");
            DateTime::<Utc>::UNIX_EPOCH
        })
    }

    /// Resolve both bounds
    pub fn resolve(&self) -> TimeRange {
        TimeRange {
            from: self.from_utc(),
            to: self.to_utc(),
        }
    }

    fn parsable<'a>(&self, time: &'a str, round_up: bool) -> ParsableTime<'a> {
        ParsableTime {
            time,
            now: self.now,
            location: self.location,
            week_start: self.week_start,
            round_up,
        }
    }
}

struct ParsableTime<'a> {
    time: &'a str,
    now: DateTime<Utc>,
    location: Option<FixedOffset>,
    week_start: Option<Weekday>,
    round_up: bool,
}

impl ParsableTime<'_> {
    fn parse(&self) -> Result<DateTime<Utc>, TimeParseError> {
        // Milliseconds since Unix epoch
        if let Ok(millis) = self.time.parse::<i64>() {
            return Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or(TimeParseError::EpochOutOfRange(millis));
        }

        // Duration relative to now
        if let Some(ago) = parse_duration(self.time) {
            if let Some(t) = self.now.checked_sub_signed(ago) {
                return Ok(t);
            }
        }

        Ok(datemath::parse_and_evaluate(self.time, &self.datemath_options())?)
    }

    fn datemath_options(&self) -> DateMathOptions {
        let mut options = DateMathOptions::new(self.now).with_round_up(self.round_up);
        if let Some(location) = self.location {
            options = options.with_location(location);
        }
        if let Some(week_start) = self.week_start {
            options = options.with_week_start(week_start);
        }
        options
    }
}

/// Signed duration such as `1h`, `1.5h`, `-90s` or `1h30m`
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`; calendar units and
/// whitespace are rejected so those bounds fall through to date math.
fn parse_duration(s: &str) -> Option<TimeDelta> {
    let (_, (sign, parts)) = all_consuming((opt(one_of("+-")), many1(duration_component)))
        .parse(s)
        .ok()?;

    let nanos = parts
        .into_iter()
        .try_fold(0i64, |total, part| total.checked_add(part?))?;
    let nanos = if sign == Some('-') { -nanos } else { nanos };
    Some(TimeDelta::nanoseconds(nanos))
}

/// One `<number><unit>` element, in nanoseconds; `None` on overflow
fn duration_component(input: &str) -> IResult<&str, Option<i64>> {
    map(
        (
            verify(
                recognize((digit0, opt((char('.'), digit0)))),
                |number: &str| number.bytes().any(|b| b.is_ascii_digit()),
            ),
            duration_unit,
        ),
        |(number, unit)| component_nanos(number, unit),
    )
    .parse(input)
}

fn duration_unit(input: &str) -> IResult<&str, i64> {
    alt((
        value(1, tag("ns")),
        value(1_000, alt((tag("us"), tag("µs"), tag("μs")))),
        value(1_000_000, tag("ms")),
        value(1_000_000_000, tag("s")),
        value(60_000_000_000, tag("m")),
        value(3_600_000_000_000, tag("h")),
    ))
    .parse(input)
}

fn component_nanos(number: &str, unit: i64) -> Option<i64> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit)?;

    if !fraction.is_empty() {
        let (mut digits, mut scale) = (0i128, 1i128);
        for b in fraction.bytes().take(18) {
            digits = digits * 10 + i128::from(b - b'0');
            scale *= 10;
        }
        let fractional = i64::try_from(digits * i128::from(unit) / scale).ok()?;
        nanos = nanos.checked_add(fractional)?;
    }
    Some(nanos)
}
