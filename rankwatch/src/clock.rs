//! Wall-clock waiting used by the dispatcher both to pace ticks and as the
//! minute-truncation source for snapshot timestamps.

use chrono::{NaiveDateTime, Timelike};
use tokio::time::Duration;

/// Sleeps until 100ms past the next minute boundary and returns the
/// observed wall-clock hour, minute and second. The 100ms buffer exists so
/// callers reliably observe `mm` having already advanced rather than racing
/// the boundary itself.
pub async fn wait_next_minute() -> (u32, u32, u32) {
    let now = chrono::Local::now().naive_local();
    let millis_into_minute = (now.second() as u64) * 1000 + (now.nanosecond() as u64) / 1_000_000;
    let millis_remaining = 60_000u64.saturating_sub(millis_into_minute);

    tokio::time::sleep(Duration::from_millis(millis_remaining + 100)).await;

    let observed = chrono::Local::now().naive_local();
    (observed.hour(), observed.minute(), observed.second())
}

/// Truncates a timestamp to the minute, the unit snapshots and broadcast
/// `sampletm2` values are keyed by.
pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn truncate_to_minute_clears_seconds_and_subseconds() {
        let ts = NaiveDate::from_ymd_opt(2026, 7, 31)
            .unwrap()
            .and_hms_milli_opt(12, 34, 56, 789)
            .unwrap();

        let truncated = truncate_to_minute(ts);

        assert_eq!(truncated.hour(), 12);
        assert_eq!(truncated.minute(), 34);
        assert_eq!(truncated.second(), 0);
        assert_eq!(truncated.and_utc().timestamp_subsec_millis(), 0);
    }
}
