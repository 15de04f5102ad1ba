// Canonical sample grid and request time ranges
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

pub const MINUTE_MS: i64 = 60_000;
pub const DAY_MS: i64 = 24 * 60 * MINUTE_MS;

/// Round an epoch-millisecond instant to the nearest multiple of
/// `interval_ms`, halves rounding up. `interval_ms` must be positive.
pub fn round_to_interval(time_ms: i64, interval_ms: i64) -> i64 {
    (time_ms + interval_ms / 2).div_euclid(interval_ms) * interval_ms
}

/// Slots from `start` (rounded to the grid) stepping by `interval` up to and
/// including `end`. Empty when `end < start` or the interval is not positive.
///
/// Arithmetic is on absolute milliseconds so the grid never shifts across
/// daylight-saving changes.
pub fn build_timeline(start_ms: i64, end_ms: i64, interval: TimeDelta) -> Vec<i64> {
    let step = interval.num_milliseconds();
    if end_ms < start_ms || step <= 0 {
        return Vec::new();
    }

    let first = round_to_interval(start_ms, step);
    let mut slots = Vec::new();

    let mut next = Some(first);
    while let Some(slot) = next.filter(|&slot| slot <= end_ms) {
        slots.push(slot);
        next = slot.checked_add(step);
    }
    slots
}

/// The absolute window a comparison covers, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeRange {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    /// Widen a date selection to whole days in `zone`: start-of-day of
    /// `start` through the last millisecond of `end`.
    pub fn from_dates(start: NaiveDate, end: NaiveDate, zone: Tz) -> Self {
        let start_ms = local_millis(start.and_time(NaiveTime::MIN), zone);
        let end_ms = end
            .succ_opt()
            .map(|next| local_millis(next.and_time(NaiveTime::MIN), zone) - 1)
            .unwrap_or(i64::MAX);
        Self { start_ms, end_ms }
    }

    pub fn is_empty(&self) -> bool {
        self.end_ms < self.start_ms
    }

    /// Covered span in milliseconds, 0 for an empty range.
    pub fn duration_ms(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.end_ms.saturating_sub(self.start_ms).saturating_add(1)
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.start_ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn end(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.end_ms).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Resolve a wall-clock reading in `zone` to an absolute instant.
///
/// A reading repeated by a DST fall-back takes its earlier occurrence. A
/// reading skipped by a spring-forward gap is moved past the gap, so it
/// still lands on an instant.
pub fn local_instant(naive: NaiveDateTime, zone: Tz) -> Option<DateTime<Utc>> {
    zone.from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            let shifted = naive.checked_add_signed(TimeDelta::hours(1))?;
            zone.from_local_datetime(&shifted).earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
}

fn local_millis(naive: NaiveDateTime, zone: Tz) -> i64 {
    match local_instant(naive, zone) {
        Some(dt) => dt.timestamp_millis(),
        None => naive.and_utc().timestamp_millis(),
    }
}

/// Short chart label, e.g. `5/27 09:05`, rendered in `zone`.
pub fn display_label(time_ms: i64, zone: Tz) -> String {
    match DateTime::from_timestamp_millis(time_ms) {
        Some(instant) => instant.with_timezone(&zone).format("%-m/%-d %H:%M").to_string(),
        None => String::new(),
    }
}
