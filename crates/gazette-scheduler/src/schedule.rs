//! Next-fire-time computation.
//!
//! `compute_next` advances `now` by the frequency interval, then
//! normalizes the time-of-day to 09:00 so deliveries land in the
//! morning regardless of when the previous cycle finished.

use chrono::{DateTime, TimeZone, Timelike};
use gazette_core::types::Frequency;

/// Hour of day (local) at which scheduled cycles fire.
pub const SEND_HOUR: u32 = 9;

/// Compute the next fire time: `now + delta(frequency)`, normalized to
/// 09:00:00. Intervals are daily=24h, weekly=7d, biweekly=3d — the
/// 3-day "biweekly" is a preserved compatibility quirk (see
/// `Frequency::Biweekly`).
pub fn compute_next<Tz: TimeZone>(now: DateTime<Tz>, frequency: Frequency) -> DateTime<Tz> {
    let next = now + frequency.interval();
    next.clone()
        .with_hour(SEND_HOUR)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(next)
}
