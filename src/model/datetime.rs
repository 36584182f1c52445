//! Partial-precision Date/DateTime/Time (spec §3, §4.3, §4.4).
//!
//! Precision is modeled as an enum tag carried alongside the value, never as
//! sentinel zeros — every comparison, arithmetic op, and component accessor
//! consults it (spec §9).

use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DateTimePrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimePrecision {
    Hour,
    Minute,
    Second,
    Millis,
}

/// A year/month/day value where only a precision-determined prefix is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub precision: DatePrecision,
}

impl PartialDate {
    pub fn new_year(year: i32) -> Self {
        Self { year, month: 1, day: 1, precision: DatePrecision::Year }
    }
    pub fn new_month(year: i32, month: u32) -> Self {
        Self { year, month, day: 1, precision: DatePrecision::Month }
    }
    pub fn new_day(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day, precision: DatePrecision::Day }
    }

    pub fn from_naive(d: NaiveDate) -> Self {
        Self::new_day(d.year(), d.month(), d.day())
    }

    pub fn to_naive(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month.max(1), self.day.max(1))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(self.year, 1, 1).unwrap())
    }

    /// Range `[start, end)` this partial value could represent at full precision.
    fn range(self) -> (NaiveDate, NaiveDate) {
        match self.precision {
            DatePrecision::Day => {
                let start = self.to_naive();
                (start, start.succ_opt().unwrap_or(start))
            }
            DatePrecision::Month => {
                let start = NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap();
                let end = if self.month == 12 {
                    NaiveDate::from_ymd_opt(self.year + 1, 1, 1).unwrap()
                } else {
                    NaiveDate::from_ymd_opt(self.year, self.month + 1, 1).unwrap()
                };
                (start, end)
            }
            DatePrecision::Year => {
                let start = NaiveDate::from_ymd_opt(self.year, 1, 1).unwrap();
                let end = NaiveDate::from_ymd_opt(self.year + 1, 1, 1).unwrap();
                (start, end)
            }
        }
    }

    /// Compares two partial dates honoring spec ambiguity rule: if
    /// precisions differ and ranges neither clearly overlap nor separate,
    /// returns `None` (ambiguous => empty collection at the call site).
    pub fn compare(a: PartialDate, b: PartialDate) -> Option<Ordering> {
        if a.precision == b.precision {
            return Some((a.year, a.month, a.day).cmp(&(b.year, b.month, b.day)));
        }
        let (a_start, a_end) = a.range();
        let (b_start, b_end) = b.range();
        if a_end <= b_start {
            Some(Ordering::Less)
        } else if b_end <= a_start {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    pub fn add_duration(self, unit: TemporalUnit, amount: i64) -> Self {
        let naive = self.to_naive();
        let shifted = shift_date(naive, unit, amount);
        match self.precision {
            DatePrecision::Day => Self::new_day(shifted.year(), shifted.month(), shifted.day()),
            DatePrecision::Month => Self::new_month(shifted.year(), shifted.month()),
            DatePrecision::Year => Self::new_year(shifted.year()),
        }
    }
}

impl fmt::Display for PartialDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            DatePrecision::Year => write!(f, "{:04}", self.year),
            DatePrecision::Month => write!(f, "{:04}-{:02}", self.year, self.month),
            DatePrecision::Day => write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialDateTime {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millis: u32,
    pub offset: Option<FixedOffset>,
    pub precision: DateTimePrecision,
}

impl PartialDateTime {
    pub fn to_naive(self) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(self.year, self.month.max(1), self.day.max(1))
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(self.year, 1, 1).unwrap())
            .and_hms_milli_opt(self.hour, self.minute, self.second, self.millis)
            .unwrap_or_else(|| {
                NaiveDate::from_ymd_opt(self.year, self.month.max(1), self.day.max(1))
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            })
    }

    /// Instant to compare by: normalizes to UTC when an offset is present so
    /// that differently-zoned, same-precision values compare correctly.
    fn comparison_instant(self) -> chrono::NaiveDateTime {
        match self.offset {
            Some(off) => {
                use chrono::TimeZone;
                let local = off.from_local_datetime(&self.to_naive()).single();
                local.map(|dt| dt.naive_utc()).unwrap_or_else(|| self.to_naive())
            }
            None => self.to_naive(),
        }
    }

    fn range(self) -> (chrono::NaiveDateTime, chrono::NaiveDateTime) {
        use chrono::Duration;
        let start = self.comparison_instant();
        let span = match self.precision {
            DateTimePrecision::Millis => Duration::milliseconds(1),
            DateTimePrecision::Second => Duration::seconds(1),
            DateTimePrecision::Minute => Duration::minutes(1),
            DateTimePrecision::Hour => Duration::hours(1),
            DateTimePrecision::Day => Duration::days(1),
            DateTimePrecision::Month => {
                let nd = self.to_naive().date();
                let next = if nd.month() == 12 {
                    NaiveDate::from_ymd_opt(nd.year() + 1, 1, 1).unwrap()
                } else {
                    NaiveDate::from_ymd_opt(nd.year(), nd.month() + 1, 1).unwrap()
                };
                next.and_hms_opt(0, 0, 0).unwrap() - nd.and_hms_opt(0, 0, 0).unwrap()
            }
            DateTimePrecision::Year => {
                let nd = self.to_naive().date();
                let next = NaiveDate::from_ymd_opt(nd.year() + 1, 1, 1).unwrap();
                next.and_hms_opt(0, 0, 0).unwrap() - nd.and_hms_opt(0, 0, 0).unwrap()
            }
        };
        (start, start + span)
    }

    pub fn compare(a: PartialDateTime, b: PartialDateTime) -> Option<Ordering> {
        if a.precision == b.precision {
            return Some(a.comparison_instant().cmp(&b.comparison_instant()));
        }
        let (a_start, a_end) = a.range();
        let (b_start, b_end) = b.range();
        if a_end <= b_start {
            Some(Ordering::Less)
        } else if b_end <= a_start {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    pub fn add_duration(self, unit: TemporalUnit, amount: i64) -> Self {
        let shifted = shift_datetime(self.to_naive(), unit, amount);
        let mut out = self;
        out.year = shifted.year();
        out.month = shifted.month();
        out.day = shifted.day();
        out.hour = shifted.hour();
        out.minute = shifted.minute();
        out.second = shifted.second();
        out.millis = shifted.and_utc().timestamp_subsec_millis();
        out
    }
}

impl fmt::Display for PartialDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        if self.precision >= DateTimePrecision::Month {
            write!(f, "-{:02}", self.month)?;
        }
        if self.precision >= DateTimePrecision::Day {
            write!(f, "-{:02}", self.day)?;
        }
        if self.precision >= DateTimePrecision::Hour {
            write!(f, "T{:02}", self.hour)?;
        }
        if self.precision >= DateTimePrecision::Minute {
            write!(f, ":{:02}", self.minute)?;
        }
        if self.precision >= DateTimePrecision::Second {
            write!(f, ":{:02}", self.second)?;
        }
        if self.precision >= DateTimePrecision::Millis {
            write!(f, ".{:03}", self.millis)?;
        }
        if let Some(off) = self.offset {
            write!(f, "{}", off)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub millis: u32,
    pub precision: TimePrecision,
}

impl PartialTime {
    pub fn to_naive(self) -> NaiveTime {
        NaiveTime::from_hms_milli_opt(self.hour, self.minute, self.second, self.millis)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap())
    }

    pub fn compare(a: PartialTime, b: PartialTime) -> Option<Ordering> {
        if a.precision == b.precision {
            return Some(a.to_naive().cmp(&b.to_naive()));
        }
        // Coarser precision truncates; ambiguous only if the common prefix matches
        // but the finer value's sub-precision is unknown in the other - for Time
        // truncating always yields a definite order or equality-at-prefix, which
        // per spec is still ambiguous since the missing component could differ.
        let prec = a.precision.min(b.precision);
        let ta = truncate_time(a, prec);
        let tb = truncate_time(b, prec);
        if ta == tb { None } else { Some(ta.cmp(&tb)) }
    }

    pub fn add_duration(self, unit: TemporalUnit, amount: i64) -> Self {
        use chrono::Duration;
        let dur = match unit {
            TemporalUnit::Hour => Duration::hours(amount),
            TemporalUnit::Minute => Duration::minutes(amount),
            TemporalUnit::Second => Duration::seconds(amount),
            TemporalUnit::Millisecond => Duration::milliseconds(amount),
            _ => Duration::zero(),
        };
        let (naive, _) = self.to_naive().overflowing_add_signed(dur);
        Self {
            hour: naive.hour(),
            minute: naive.minute(),
            second: naive.second(),
            millis: naive.nanosecond() / 1_000_000,
            precision: self.precision,
        }
    }
}

fn truncate_time(t: PartialTime, prec: TimePrecision) -> NaiveTime {
    match prec {
        TimePrecision::Hour => NaiveTime::from_hms_opt(t.hour, 0, 0).unwrap(),
        TimePrecision::Minute => NaiveTime::from_hms_opt(t.hour, t.minute, 0).unwrap(),
        TimePrecision::Second => NaiveTime::from_hms_opt(t.hour, t.minute, t.second).unwrap(),
        TimePrecision::Millis => t.to_naive(),
    }
}

impl fmt::Display for PartialTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.hour)?;
        if self.precision >= TimePrecision::Minute {
            write!(f, ":{:02}", self.minute)?;
        }
        if self.precision >= TimePrecision::Second {
            write!(f, ":{:02}", self.second)?;
        }
        if self.precision >= TimePrecision::Millis {
            write!(f, ".{:03}", self.millis)?;
        }
        Ok(())
    }
}

/// Units accepted by temporal +/- Quantity arithmetic (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalUnit {
    pub fn from_ucum_or_name(s: &str) -> Option<Self> {
        Some(match s {
            "year" | "years" | "a" => TemporalUnit::Year,
            "month" | "months" | "mo" => TemporalUnit::Month,
            "week" | "weeks" | "wk" => TemporalUnit::Week,
            "day" | "days" | "d" => TemporalUnit::Day,
            "hour" | "hours" | "h" => TemporalUnit::Hour,
            "minute" | "minutes" | "min" => TemporalUnit::Minute,
            "second" | "seconds" | "s" => TemporalUnit::Second,
            "millisecond" | "milliseconds" | "ms" => TemporalUnit::Millisecond,
            _ => return None,
        })
    }
}

fn shift_date(d: NaiveDate, unit: TemporalUnit, amount: i64) -> NaiveDate {
    use chrono::Duration;
    match unit {
        TemporalUnit::Year => add_months(d, amount * 12),
        TemporalUnit::Month => add_months(d, amount),
        TemporalUnit::Week => d + Duration::weeks(amount),
        TemporalUnit::Day => d + Duration::days(amount),
        // Coarser-than-precision units on a bare date: run at day resolution.
        TemporalUnit::Hour => d + Duration::hours(amount),
        TemporalUnit::Minute => d + Duration::minutes(amount),
        TemporalUnit::Second => d + Duration::seconds(amount),
        TemporalUnit::Millisecond => d + Duration::milliseconds(amount),
    }
}

fn add_months(d: NaiveDate, months: i64) -> NaiveDate {
    let total = d.year() as i64 * 12 + (d.month() as i64 - 1) + months;
    let year = total.div_euclid(12) as i32;
    let month = (total.rem_euclid(12) + 1) as u32;
    let max_day = days_in_month(year, month);
    NaiveDate::from_ymd_opt(year, month, d.day().min(max_day)).unwrap()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .unwrap();
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    (next - first).num_days() as u32
}

fn shift_datetime(
    dt: chrono::NaiveDateTime,
    unit: TemporalUnit,
    amount: i64,
) -> chrono::NaiveDateTime {
    use chrono::Duration;
    match unit {
        TemporalUnit::Year | TemporalUnit::Month => {
            let date = shift_date(dt.date(), unit, amount);
            date.and_time(dt.time())
        }
        TemporalUnit::Week => dt + Duration::weeks(amount),
        TemporalUnit::Day => dt + Duration::days(amount),
        TemporalUnit::Hour => dt + Duration::hours(amount),
        TemporalUnit::Minute => dt + Duration::minutes(amount),
        TemporalUnit::Second => dt + Duration::seconds(amount),
        TemporalUnit::Millisecond => dt + Duration::milliseconds(amount),
    }
}
