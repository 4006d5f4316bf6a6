// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::fmt;

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Length of the `YYYY-MM-DD HH:MM:SS` prefix every record starts with.
pub const TIMESTAMP_PREFIX_LEN: usize = 19;

/// Width of a bucket in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketSpan(u32);

impl BucketSpan {
    pub const HOUR: BucketSpan = BucketSpan(3600);

    /// `None` for a zero-width span.
    pub fn from_secs(secs: u32) -> Option<Self> {
        (secs > 0).then_some(Self(secs))
    }

    pub fn secs(self) -> u32 {
        self.0
    }
}

impl Default for BucketSpan {
    fn default() -> Self {
        Self::HOUR
    }
}

/// Start of the span-aligned interval a record falls in, in seconds since the epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bucket(i64);

impl Bucket {
    pub fn from_start_secs(start_s: i64) -> Self {
        Self(start_s)
    }

    /// Derives the bucket from a line beginning with `YYYY-MM-DD HH:MM:SS` (a `T` is
    /// accepted between date and time). Returns `None` for short or malformed prefixes.
    pub fn from_line(line: &[u8], span: BucketSpan) -> Option<Self> {
        let ts = parse_timestamp_prefix(line)?;
        Some(Self::containing(ts.timestamp(), span))
    }

    pub fn containing(epoch_s: i64, span: BucketSpan) -> Self {
        Self(align_to_span(epoch_s, span))
    }

    pub fn start_secs(self) -> i64 {
        self.0
    }

    pub fn start(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.0, 0)
    }

    /// Hour of day (UTC) the bucket starts in.
    pub fn hour(self) -> u32 {
        self.start().map(|start| start.hour()).unwrap_or(0)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start() {
            Some(start) => write!(f, "{}", start.format("%Y-%m-%d %H:%M:%S")),
            None => write!(f, "@{}", self.0),
        }
    }
}

fn align_to_span(epoch_s: i64, span: BucketSpan) -> i64 {
    let span = i64::from(span.secs());
    epoch_s - epoch_s.rem_euclid(span)
}

fn parse_timestamp_prefix(line: &[u8]) -> Option<DateTime<Utc>> {
    let prefix = line.get(..TIMESTAMP_PREFIX_LEN)?;
    let separators_ok = prefix[4] == b'-'
        && prefix[7] == b'-'
        && matches!(prefix[10], b' ' | b'T')
        && prefix[13] == b':'
        && prefix[16] == b':';
    if !separators_ok {
        return None;
    }
    let year = digits(&prefix[0..4])?;
    let month = digits(&prefix[5..7])?;
    let day = digits(&prefix[8..10])?;
    let hour = digits(&prefix[11..13])?;
    let minute = digits(&prefix[14..16])?;
    let second = digits(&prefix[17..19])?;
    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, second)?;
    Some(naive.and_utc())
}

fn digits(field: &[u8]) -> Option<u32> {
    field.iter().try_fold(0u32, |acc, &b| {
        b.is_ascii_digit().then(|| acc * 10 + u32::from(b - b'0'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_buckets_from_line_prefix() {
        let a = Bucket::from_line(b"2024-03-01 09:15:00.123,AAA,1.0", BucketSpan::HOUR).unwrap();
        let b = Bucket::from_line(b"2024-03-01 09:59:59,AAA,1.1", BucketSpan::HOUR).unwrap();
        let c = Bucket::from_line(b"2024-03-01T10:00:00", BucketSpan::HOUR).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(c > a);
        assert_eq!(a.hour(), 9);
        assert_eq!(c.hour(), 10);
        assert_eq!(a.to_string(), "2024-03-01 09:00:00");
    }

    #[test]
    fn same_hour_on_different_days_differs() {
        let monday = Bucket::from_line(b"2024-03-04 09:00:00", BucketSpan::HOUR).unwrap();
        let tuesday = Bucket::from_line(b"2024-03-05 09:00:00", BucketSpan::HOUR).unwrap();
        assert_ne!(monday, tuesday);
        assert_eq!(monday.hour(), tuesday.hour());
    }

    #[test]
    fn custom_spans_align_to_their_width() {
        let span = BucketSpan::from_secs(900).unwrap();
        let early = Bucket::from_line(b"2024-03-01 09:14:59", span).unwrap();
        let late = Bucket::from_line(b"2024-03-01 09:15:00", span).unwrap();
        assert_ne!(early, late);
        assert_eq!(late.start_secs() - early.start_secs(), 900);
        assert!(BucketSpan::from_secs(0).is_none());
    }

    #[test]
    fn malformed_prefixes_have_no_bucket() {
        let span = BucketSpan::HOUR;
        assert!(Bucket::from_line(b"", span).is_none());
        assert!(Bucket::from_line(b"2024-03-01 09:15", span).is_none());
        assert!(Bucket::from_line(b"2024/03/01 09:15:00", span).is_none());
        assert!(Bucket::from_line(b"2024-13-01 09:15:00", span).is_none());
        assert!(Bucket::from_line(b"2024-03-01 25:15:00", span).is_none());
        assert!(Bucket::from_line(b"2024-03-01 0x:15:00", span).is_none());
    }
}
