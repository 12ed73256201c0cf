//! Partial-precision date, datetime, and time values.
//!
//! FHIRPath date/time literals may carry less precision than a full
//! calendar date (`@2014`, `@2014-01`, `@2014-01-25`); comparisons and
//! equality only consider the fields both operands actually specify.

use chrono::{NaiveDate, NaiveTime};
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

/// A FHIRPath `Date`, preserving how much of the calendar date was specified.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DateValue {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub precision: DatePrecision,
}

impl DateValue {
    pub fn year(year: i32) -> Self {
        Self { year, month: 1, day: 1, precision: DatePrecision::Year }
    }

    pub fn year_month(year: i32, month: u32) -> Self {
        Self { year, month, day: 1, precision: DatePrecision::Month }
    }

    pub fn full(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            precision: DatePrecision::Day,
        }
    }

    /// Parse the body of an `@YYYY[-MM[-DD]]` literal (the `@` already stripped).
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.splitn(3, '-');
        let year: i32 = parts.next()?.parse().ok()?;
        let month = parts.next();
        let day = parts.next();
        match (month, day) {
            (None, _) => Some(Self::year(year)),
            (Some(m), None) => Some(Self::year_month(year, m.parse().ok()?)),
            (Some(m), Some(d)) => {
                let date = NaiveDate::from_ymd_opt(year, m.parse().ok()?, d.parse().ok()?)?;
                Some(Self::full(date))
            }
        }
    }

    fn shared_fields(&self, other: &Self) -> DatePrecision {
        self.precision.min(other.precision)
    }

    pub fn partial_eq(&self, other: &Self) -> Option<bool> {
        if self.precision != other.precision {
            return None;
        }
        Some(self.year == other.year && self.month == other.month && self.day == other.day)
    }

    pub fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let precision = self.shared_fields(other);
        let mut ord = self.year.cmp(&other.year);
        if ord == Ordering::Equal && precision >= DatePrecision::Month {
            ord = self.month.cmp(&other.month);
        }
        if ord == Ordering::Equal && precision >= DatePrecision::Day {
            ord = self.day.cmp(&other.day);
        }
        if ord == Ordering::Equal && self.precision != other.precision {
            return None;
        }
        Some(ord)
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            DatePrecision::Year => write!(f, "{:04}", self.year),
            DatePrecision::Month => write!(f, "{:04}-{:02}", self.year, self.month),
            DatePrecision::Day => write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimePrecision {
    Hour,
    Minute,
    Second,
    Millisecond,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimeValue {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millisecond: u32,
    pub precision: TimePrecision,
}

impl TimeValue {
    /// Parse the body of a `@THH[:MM[:SS[.sss]]]` literal (the `@T` already stripped).
    pub fn parse(text: &str) -> Option<Self> {
        let mut hour = 0u32;
        let mut minute = 0u32;
        let mut second = 0u32;
        let mut millisecond = 0u32;
        let mut precision = TimePrecision::Hour;

        let mut parts = text.splitn(3, ':');
        hour = parts.next()?.parse().ok()?;
        if let Some(m) = parts.next() {
            minute = m.parse().ok()?;
            precision = TimePrecision::Minute;
            if let Some(s) = parts.next() {
                precision = TimePrecision::Second;
                if let Some((sec, ms)) = s.split_once('.') {
                    second = sec.parse().ok()?;
                    millisecond = format!("{ms:0<3}")[..3].parse().ok()?;
                    precision = TimePrecision::Millisecond;
                } else {
                    second = s.parse().ok()?;
                }
            }
        }
        let _ = NaiveTime::from_hms_milli_opt(hour, minute, second, millisecond)?;
        Some(Self { hour, minute, second, millisecond, precision })
    }

    fn shared_precision(&self, other: &Self) -> TimePrecision {
        self.precision.min(other.precision)
    }

    pub fn partial_eq(&self, other: &Self) -> Option<bool> {
        if self.precision != other.precision {
            return None;
        }
        Some(
            self.hour == other.hour
                && self.minute == other.minute
                && self.second == other.second
                && self.millisecond == other.millisecond,
        )
    }

    pub fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let precision = self.shared_precision(other);
        let mut ord = self.hour.cmp(&other.hour);
        if ord == Ordering::Equal && precision >= TimePrecision::Minute {
            ord = self.minute.cmp(&other.minute);
        }
        if ord == Ordering::Equal && precision >= TimePrecision::Second {
            ord = self.second.cmp(&other.second);
        }
        if ord == Ordering::Equal && precision >= TimePrecision::Millisecond {
            ord = self.millisecond.cmp(&other.millisecond);
        }
        if ord == Ordering::Equal && self.precision != other.precision {
            return None;
        }
        Some(ord)
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)?;
        if self.precision == TimePrecision::Millisecond {
            write!(f, ".{:03}", self.millisecond)?;
        }
        Ok(())
    }
}

/// A FHIRPath `DateTime`: a [`DateValue`], an optional [`TimeValue`], and an
/// optional UTC offset.
#[derive(Clone, Debug, PartialEq, Hash, Eq)]
pub struct DateTimeValue {
    pub date: DateValue,
    pub time: Option<TimeValue>,
    pub offset: Option<i32>, // minutes east of UTC
}

impl DateTimeValue {
    /// Parse the body of an `@YYYY-MM-DDTHH:MM:SS[.sss][Z|+HH:MM]` literal
    /// (the leading `@` already stripped).
    pub fn parse(text: &str) -> Option<Self> {
        let (date_part, rest) = text.split_once('T')?;
        let date = DateValue::parse(date_part)?;
        if rest.is_empty() {
            return Some(Self { date, time: None, offset: None });
        }
        let (time_part, offset) = split_offset(rest);
        let time = if time_part.is_empty() { None } else { Some(TimeValue::parse(time_part)?) };
        Some(Self { date, time, offset })
    }

    pub fn partial_eq(&self, other: &Self) -> Option<bool> {
        if self.offset != other.offset {
            return None;
        }
        let date_eq = self.date.partial_eq(&other.date)?;
        let time_eq = match (&self.time, &other.time) {
            (None, None) => true,
            (Some(a), Some(b)) => a.partial_eq(b)?,
            _ => return None,
        };
        Some(date_eq && time_eq)
    }

    pub fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.offset != other.offset {
            return None;
        }
        match self.date.partial_cmp(&other.date)? {
            Ordering::Equal => match (&self.time, &other.time) {
                (None, None) => Some(Ordering::Equal),
                (Some(a), Some(b)) => a.partial_cmp(b),
                _ => None,
            },
            ord => Some(ord),
        }
    }
}

impl fmt::Display for DateTimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date)?;
        if let Some(time) = &self.time {
            write!(f, "T{time}")?;
            match self.offset {
                Some(0) => write!(f, "Z")?,
                Some(off) => write!(f, "{}{:02}:{:02}", if off < 0 { '-' } else { '+' }, off.abs() / 60, off.abs() % 60)?,
                None => {}
            }
        }
        Ok(())
    }
}

fn split_offset(rest: &str) -> (&str, Option<i32>) {
    if let Some(stripped) = rest.strip_suffix('Z') {
        return (stripped, Some(0));
    }
    // An offset is a trailing `+HH:MM` or `-HH:MM`; a bare `-` inside the time
    // part never occurs, so the last `+`/`-` (if not at index 0) is the offset.
    if let Some(pos) = rest.rfind(['+', '-']) {
        if pos > 0 {
            let (time_part, off) = rest.split_at(pos);
            if let Some(offset) = parse_offset(off) {
                return (time_part, Some(offset));
            }
        }
    }
    (rest, None)
}

fn parse_offset(text: &str) -> Option<i32> {
    let sign = if text.starts_with('-') { -1 } else { 1 };
    let body = &text[1..];
    let (h, m) = body.split_once(':')?;
    let minutes = h.parse::<i32>().ok()? * 60 + m.parse::<i32>().ok()?;
    Some(sign * minutes)
}
