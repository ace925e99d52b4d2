//! Late-night usage detection

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};

/// Whether a local hour falls in the night window `[start_hour, end_hour)`,
/// which may wrap past midnight.
pub fn is_night_hour(hour: u32, start_hour: u32, end_hour: u32) -> bool {
    if start_hour <= end_hour {
        hour >= start_hour && hour < end_hour
    } else {
        hour >= start_hour || hour < end_hour
    }
}

/// True when the session starts or ends inside the night window, or spans it.
///
/// All hours are evaluated in the viewer's local offset.
pub fn circadian_drift(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    offset: FixedOffset,
    start_hour: u32,
    end_hour: u32,
) -> bool {
    let local_start = start.with_timezone(&offset);
    let local_end = end.max(start).with_timezone(&offset);

    if is_night_hour(local_start.hour(), start_hour, end_hour)
        || is_night_hour(local_end.hour(), start_hour, end_hour)
    {
        return true;
    }

    // Both endpoints are outside the window; the session can still cover it
    if local_end - local_start >= Duration::hours(24) {
        return true;
    }
    let Some(window_open) = local_start
        .with_hour(start_hour % 24)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
    else {
        return false;
    };
    let next_open = if window_open <= local_start {
        window_open + Duration::days(1)
    } else {
        window_open
    };
    next_open <= local_end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc_offset() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn session_at(hour: u32, minute: u32, length_min: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap();
        (start, start + Duration::minutes(length_min))
    }

    #[test]
    fn test_night_start_hours() {
        for hour in [23, 0, 1, 2, 3, 4, 5] {
            let (start, end) = session_at(hour, 0, 30);
            assert!(circadian_drift(start, end, utc_offset(), 23, 6), "hour={hour}");
        }
    }

    #[test]
    fn test_day_start_hours() {
        for hour in [7, 12, 18, 22] {
            let (start, end) = session_at(hour, 0, 30);
            assert!(!circadian_drift(start, end, utc_offset(), 23, 6), "hour={hour}");
        }
    }

    #[test]
    fn test_late_evening_and_afternoon_examples() {
        let (start, end) = session_at(23, 30, 30);
        assert!(circadian_drift(start, end, utc_offset(), 23, 6));

        let (start, end) = session_at(14, 0, 30);
        assert!(!circadian_drift(start, end, utc_offset(), 23, 6));
    }

    #[test]
    fn test_session_ending_in_window() {
        let (start, end) = session_at(22, 45, 30);
        assert!(circadian_drift(start, end, utc_offset(), 23, 6));
    }

    #[test]
    fn test_session_spanning_whole_window() {
        // 22:00 to 07:00 next day
        let (start, end) = session_at(22, 0, 9 * 60);
        assert!(circadian_drift(start, end, utc_offset(), 23, 6));
    }

    #[test]
    fn test_local_offset_is_applied() {
        // 20:00 UTC is 05:00 at UTC+9
        let (start, end) = session_at(20, 0, 10);
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        assert!(circadian_drift(start, end, tokyo, 23, 6));
        assert!(!circadian_drift(start, end, utc_offset(), 23, 6));
    }

    #[test]
    fn test_is_night_hour_non_wrapping_window() {
        assert!(is_night_hour(2, 1, 5));
        assert!(!is_night_hour(5, 1, 5));
    }
}
