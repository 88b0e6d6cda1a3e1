//! Fixed-width time buckets and display-only timezone rendering.
//!
//! All bucket arithmetic runs on `DateTime<Utc>`. A [`DisplayTime`] can be
//! rendered from a UTC instant but never turned back into one, so a shifted
//! display timestamp cannot leak into bucketing or dedup keys.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;

/// Half-open interval `[start, close)` aligned to the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBucket {
    pub start: DateTime<Utc>,
    pub close: DateTime<Utc>,
}

impl TimeBucket {
    pub fn containing(t: DateTime<Utc>, width_minutes: u32) -> Self {
        let start = bucket_start(t, width_minutes);
        Self {
            start,
            close: start + Duration::minutes(i64::from(width_minutes)),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.close
    }

    pub fn width(&self) -> Duration {
        self.close - self.start
    }

    pub fn previous(&self) -> Self {
        let width = self.width();
        Self {
            start: self.start - width,
            close: self.start,
        }
    }

    /// Compact UTC label of the bucket start, e.g. `20240101_0015`.
    pub fn label(&self) -> String {
        self.start.format("%Y%m%d_%H%M").to_string()
    }
}

/// Floor `t` to a multiple of `width_minutes`, truncating seconds and
/// sub-second precision.
pub fn bucket_start(t: DateTime<Utc>, width_minutes: u32) -> DateTime<Utc> {
    let width_secs = i64::from(width_minutes.max(1)) * 60;
    let into_bucket = t.timestamp().rem_euclid(width_secs);
    t - Duration::seconds(into_bucket) - Duration::nanoseconds(i64::from(t.timestamp_subsec_nanos()))
}

/// True once at least `grace` has passed since `bucket_close`.
pub fn is_finalized(now: DateTime<Utc>, bucket_close: DateTime<Utc>, grace: Duration) -> bool {
    now - bucket_close >= grace
}

/// Bucket width plus the grace period before a bucket counts as closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketResolver {
    pub width_minutes: u32,
    pub grace: Duration,
}

impl BucketResolver {
    pub fn new(width_minutes: u32, grace_minutes: u32) -> Self {
        Self {
            width_minutes,
            grace: Duration::minutes(i64::from(grace_minutes)),
        }
    }

    pub fn bucket_of(&self, t: DateTime<Utc>) -> TimeBucket {
        TimeBucket::containing(t, self.width_minutes)
    }

    pub fn is_finalized(&self, now: DateTime<Utc>, bucket: &TimeBucket) -> bool {
        is_finalized(now, bucket.close, self.grace)
    }

    /// The most recent bucket that is finalized at `now`.
    pub fn last_closed_bucket(&self, now: DateTime<Utc>) -> TimeBucket {
        let previous = self.bucket_of(now).previous();
        if self.is_finalized(now, &previous) {
            previous
        } else {
            previous.previous()
        }
    }
}

impl Default for BucketResolver {
    fn default() -> Self {
        Self::new(15, 2)
    }
}

/// Fixed offset used only when rendering timestamps for people.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayZone {
    offset_minutes: i32,
    label: String,
}

impl DisplayZone {
    /// Offsets must stay within one day either side of UTC.
    pub fn new(offset_minutes: i32, label: impl Into<String>) -> Option<Self> {
        if offset_minutes.abs() >= 24 * 60 {
            return None;
        }
        Some(Self {
            offset_minutes,
            label: label.into(),
        })
    }

    /// India Standard Time, UTC+05:30.
    pub fn ist() -> Self {
        Self {
            offset_minutes: 330,
            label: "IST".to_string(),
        }
    }

    pub fn utc() -> Self {
        Self {
            offset_minutes: 0,
            label: "UTC".to_string(),
        }
    }

    pub fn offset_minutes(&self) -> i32 {
        self.offset_minutes
    }

    pub fn render(&self, instant: DateTime<Utc>) -> DisplayTime {
        DisplayTime {
            local: instant.naive_utc() + Duration::minutes(i64::from(self.offset_minutes)),
            label: self.label.clone(),
        }
    }
}

impl Default for DisplayZone {
    fn default() -> Self {
        Self::ist()
    }
}

/// A wall-clock reading in a display zone. Formatting only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayTime {
    local: NaiveDateTime,
    label: String,
}

impl DisplayTime {
    pub fn time_only(&self) -> String {
        format!("{} {}", self.local.format("%H:%M:%S"), self.label)
    }
}

impl fmt::Display for DisplayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.local.format("%Y-%m-%d %H:%M:%S"), self.label)
    }
}

impl Serialize for DisplayTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse an RFC 3339 instant, or a naive ISO timestamp taken as UTC.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
