//! Simulation Clock
//!
//! Time primitives for the simulation plus the two clock policies:
//! LIVE maps wall-clock time-of-day onto the dataset's day, REPLAY fast-forwards
//! through the dataset and loops. The engine owns the mutable state; everything
//! here is a pure function over `Nanos` so it can be checked in isolation.

use chrono::{NaiveDateTime, NaiveTime, TimeZone, Timelike};
use std::time::Duration;

/// Nanoseconds since Unix epoch (1970-01-01 00:00:00, UTC-naive calendar).
///
/// Dataset instants are wall-clock readings: the calendar fields as recorded at
/// the site, with no zone attached. LIVE mode compares them against the host's
/// local time-of-day, so both sides stay in the same zone.
pub type Nanos = i64;

pub const NANOS_PER_SEC: i64 = 1_000_000_000;
pub const NANOS_PER_MIN: i64 = 60 * NANOS_PER_SEC;
pub const NANOS_PER_HOUR: i64 = 60 * NANOS_PER_MIN;
pub const NANOS_PER_DAY: i64 = 24 * NANOS_PER_HOUR;

/// Source of the real time-of-day used by LIVE mode.
pub trait WallClock: Send {
    fn time_of_day(&self) -> NaiveTime;
}

/// Reads the host's local time-of-day.
///
/// Matches datasets whose timestamps are naive local readings, which is what
/// [`parse_timestamp`] produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn time_of_day(&self) -> NaiveTime {
        chrono::Local::now().time()
    }
}

/// Always reports the same time-of-day.
#[derive(Debug, Clone, Copy)]
pub struct FixedWallClock(pub NaiveTime);

impl WallClock for FixedWallClock {
    fn time_of_day(&self) -> NaiveTime {
        self.0
    }
}

/// Nanoseconds elapsed since midnight for a time-of-day.
#[inline]
pub fn time_of_day_nanos(tod: NaiveTime) -> Nanos {
    // Leap seconds report nanosecond() >= 1e9.
    let sub = (tod.nanosecond() as i64).min(NANOS_PER_SEC - 1);
    tod.num_seconds_from_midnight() as i64 * NANOS_PER_SEC + sub
}

/// Midnight of the calendar day containing `t`.
#[inline]
pub fn day_start(t: Nanos) -> Nanos {
    t.div_euclid(NANOS_PER_DAY) * NANOS_PER_DAY
}

/// `end`'s calendar date with the wall-clock time-of-day substituted.
#[inline]
pub fn live_candidate(tod: NaiveTime, end: Nanos) -> Nanos {
    day_start(end) + time_of_day_nanos(tod)
}

/// Place a wall-clock time-of-day on the dataset's represented day.
///
/// The candidate shifts by one day if it falls past `end` or before `start`. A
/// dataset shorter than a day can still leave it in a gap, so the result is
/// clamped into range.
pub fn map_live_time(tod: NaiveTime, start: Nanos, end: Nanos) -> Nanos {
    let mut t = live_candidate(tod, end);
    if t > end {
        t -= NANOS_PER_DAY;
    }
    if t < start {
        t += NANOS_PER_DAY;
    }
    t.clamp(start, end)
}

/// Dataset time covered by one REPLAY tick.
///
/// `speed` is dataset minutes per real second, so 60 at a 100ms tick advances six
/// minutes per tick.
pub fn replay_step(speed: f64, tick_period: Duration) -> Nanos {
    let step = speed * 60.0 * tick_period.as_nanos() as f64;
    step.round() as Nanos
}

/// Advance `now` by `step`, looping back over `[start, end)` once `end` is reached.
pub fn advance_replay(now: Nanos, step: Nanos, start: Nanos, end: Nanos) -> Nanos {
    let span = end - start;
    if span <= 0 {
        return start;
    }
    let next = now.saturating_add(step);
    if next < end {
        return next;
    }
    start + (next - start).rem_euclid(span)
}

/// Position of `now` inside the dataset as a percentage in `[0, 100]`.
pub fn progress_percent(now: Nanos, start: Nanos, end: Nanos) -> f64 {
    let span = end - start;
    if span <= 0 {
        return 100.0;
    }
    let frac = (now - start) as f64 / span as f64;
    frac.clamp(0.0, 1.0) * 100.0
}

/// Helper to convert Nanos to a calendar datetime for display.
pub fn nanos_to_datetime(nanos: Nanos) -> Option<NaiveDateTime> {
    let secs = nanos.div_euclid(NANOS_PER_SEC);
    let nsecs = nanos.rem_euclid(NANOS_PER_SEC) as u32;
    chrono::Utc
        .timestamp_opt(secs, nsecs)
        .single()
        .map(|dt| dt.naive_utc())
}

/// Helper to convert a calendar datetime to Nanos.
pub fn datetime_to_nanos(dt: &NaiveDateTime) -> Option<Nanos> {
    chrono::Utc.from_utc_datetime(dt).timestamp_nanos_opt()
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a timestamp string to Nanos, keeping the wall-clock reading.
///
/// An RFC3339 offset is dropped rather than applied: `10:00+02:00` becomes
/// 10:00 on the naive calendar, the same as `10:00` with no offset.
pub fn parse_timestamp(s: &str) -> Option<Nanos> {
    let naive = match chrono::DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.naive_local(),
        Err(_) => NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())?,
    };
    datetime_to_nanos(&naive)
}
