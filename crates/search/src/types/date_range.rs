//! Partial date parsing.
//!
//! FHIR dates may be truncated (`2024`, `2024-01`) and date-times may stop at
//! any time component. A partial value covers every instant it could denote,
//! so it is normalized to an inclusive `[start, end]` range in UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Precision of a parsed date or date-time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatePrecision {
    /// Year only (e.g., "2024")
    Year,
    /// Year and month (e.g., "2024-01")
    Month,
    /// Full date (e.g., "2024-01-15")
    Day,
    /// Date and time to hours (e.g., "2024-01-15T10")
    Hour,
    /// Date and time to minutes (e.g., "2024-01-15T10:30")
    Minute,
    /// Date and time to seconds (e.g., "2024-01-15T10:30:00")
    Second,
    /// Fractional seconds; denotes a single instant.
    Fraction,
}

/// The inclusive instant range covered by a partial date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First instant covered.
    pub start: DateTime<Utc>,
    /// Last instant covered.
    pub end: DateTime<Utc>,
    /// Precision of the source text.
    pub precision: DatePrecision,
}

impl DateRange {
    /// Parses a FHIR date, dateTime or instant string.
    ///
    /// Values without a time zone are read as UTC.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (date_part, time_part) = match s.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (s, None),
        };

        let mut fields = date_part.split('-');
        let year: i32 = parse_fixed(fields.next()?, 4)?;
        let month: Option<u32> = parse_optional(fields.next(), 2)?;
        let day: Option<u32> = parse_optional(fields.next(), 2)?;
        if fields.next().is_some() {
            return None;
        }

        match (month, day, time_part) {
            (None, None, None) => {
                let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
                let next = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
                Some(Self::from_dates(start, next, DatePrecision::Year))
            }
            (Some(m), None, None) => {
                let start = NaiveDate::from_ymd_opt(year, m, 1)?;
                let next = if m == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(year, m + 1, 1)?
                };
                Some(Self::from_dates(start, next, DatePrecision::Month))
            }
            (Some(m), Some(d), None) => {
                let start = NaiveDate::from_ymd_opt(year, m, d)?;
                let next = start.succ_opt()?;
                Some(Self::from_dates(start, next, DatePrecision::Day))
            }
            (Some(m), Some(d), Some(time)) => {
                let date = NaiveDate::from_ymd_opt(year, m, d)?;
                Self::parse_time(date, time)
            }
            _ => None,
        }
    }

    /// Returns true if `other` lies entirely within this range.
    pub fn contains(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    fn from_dates(start: NaiveDate, next: NaiveDate, precision: DatePrecision) -> Self {
        let start = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
        let next = Utc.from_utc_datetime(&next.and_time(NaiveTime::MIN));
        Self {
            start,
            end: next - TimeDelta::microseconds(1),
            precision,
        }
    }

    fn parse_time(date: NaiveDate, time: &str) -> Option<Self> {
        let (clock, offset) = split_offset(time)?;

        let mut parts = clock.split(':');
        let hour: u32 = parse_fixed(parts.next()?, 2)?;
        let minute: Option<u32> = parse_optional(parts.next(), 2)?;
        let seconds = parts.next();
        if parts.next().is_some() {
            return None;
        }

        let (second, nanos, precision) = match (minute, seconds) {
            (None, None) => (0, 0, DatePrecision::Hour),
            (Some(_), None) => (0, 0, DatePrecision::Minute),
            (Some(_), Some(sec)) => match sec.split_once('.') {
                Some((whole, frac)) => (parse_fixed(whole, 2)?, parse_fraction(frac)?, DatePrecision::Fraction),
                None => (parse_fixed(sec, 2)?, 0, DatePrecision::Second),
            },
            (None, Some(_)) => return None,
        };

        let naive = NaiveDateTime::new(
            date,
            NaiveTime::from_hms_nano_opt(hour, minute.unwrap_or(0), second, nanos)?,
        );
        let start = offset
            .from_local_datetime(&naive)
            .single()?
            .with_timezone(&Utc);

        let span = match precision {
            DatePrecision::Hour => TimeDelta::hours(1),
            DatePrecision::Minute => TimeDelta::minutes(1),
            DatePrecision::Second => TimeDelta::seconds(1),
            _ => TimeDelta::zero(),
        };
        let end = if span.is_zero() {
            start
        } else {
            start + span - TimeDelta::microseconds(1)
        };

        Some(Self {
            start,
            end,
            precision,
        })
    }
}

fn parse_fixed<T: std::str::FromStr>(s: &str, width: usize) -> Option<T> {
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// `Some(None)` for an absent field, `None` for a malformed one.
fn parse_optional<T: std::str::FromStr>(s: Option<&str>, width: usize) -> Option<Option<T>> {
    match s {
        Some(s) => Some(Some(parse_fixed(s, width)?)),
        None => Some(None),
    }
}

fn parse_fraction(frac: &str) -> Option<u32> {
    if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{:0<9}", frac);
    padded.parse().ok()
}

/// Splits a time string into the clock part and its UTC offset.
fn split_offset(time: &str) -> Option<(&str, FixedOffset)> {
    if let Some(clock) = time.strip_suffix('Z') {
        return Some((clock, FixedOffset::east_opt(0)?));
    }
    match time.rfind(['+', '-']) {
        Some(pos) => {
            let (clock, zone) = time.split_at(pos);
            let sign = if zone.starts_with('-') { -1 } else { 1 };
            let (h, m) = zone[1..].split_once(':')?;
            let h: i32 = parse_fixed(h, 2)?;
            let m: i32 = parse_fixed(m, 2)?;
            Some((clock, FixedOffset::east_opt(sign * (h * 3600 + m * 60))?))
        }
        None => Some((time, FixedOffset::east_opt(0)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_year_range() {
        let range = DateRange::parse("2024").unwrap();
        assert_eq!(range.precision, DatePrecision::Year);
        assert_eq!(range.start, utc("2024-01-01T00:00:00Z"));
        assert_eq!(range.end, utc("2024-12-31T23:59:59.999999Z"));
    }

    #[test]
    fn test_december_month_range() {
        let range = DateRange::parse("2023-12").unwrap();
        assert_eq!(range.precision, DatePrecision::Month);
        assert_eq!(range.end, utc("2023-12-31T23:59:59.999999Z"));
    }

    #[test]
    fn test_day_range() {
        let range = DateRange::parse("2024-02-29").unwrap();
        assert_eq!(range.start, utc("2024-02-29T00:00:00Z"));
        assert_eq!(range.end, utc("2024-02-29T23:59:59.999999Z"));
        assert!(DateRange::parse("2023-02-29").is_none());
    }

    #[test]
    fn test_datetime_with_offset() {
        let range = DateRange::parse("2024-01-15T10:30:00+02:00").unwrap();
        assert_eq!(range.precision, DatePrecision::Second);
        assert_eq!(range.start, utc("2024-01-15T08:30:00Z"));
        assert_eq!(range.end, utc("2024-01-15T08:30:00.999999Z"));
    }

    #[test]
    fn test_fractional_instant() {
        let range = DateRange::parse("2024-01-15T10:30:00.123Z").unwrap();
        assert_eq!(range.precision, DatePrecision::Fraction);
        assert_eq!(range.start, range.end);
    }

    #[test]
    fn test_minute_precision() {
        let range = DateRange::parse("2024-01-15T10:30Z").unwrap();
        assert_eq!(range.precision, DatePrecision::Minute);
        assert!(range.contains(&DateRange::parse("2024-01-15T10:30:45Z").unwrap()));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(DateRange::parse("").is_none());
        assert!(DateRange::parse("24-01-01").is_none());
        assert!(DateRange::parse("2024-1-01").is_none());
        assert!(DateRange::parse("not a date").is_none());
        assert!(DateRange::parse("2024-01-15T25:00Z").is_none());
        assert!(DateRange::parse("2024-1x").is_none());
        assert!(DateRange::parse("2024-01-1x").is_none());
        assert!(DateRange::parse("2024-01-15T10:5Z").is_none());
    }
}
