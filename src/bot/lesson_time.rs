//! Normalization of lesson time values from the store.
//!
//! A lesson's time column has lived through several representations: a
//! duration since midnight (old MySQL TIME dumps imported as integers), a
//! "HH:MM" or "HH:MM:SS" string, or an already structured time. Everything
//! funnels through [`normalize`] so the rest of the code only ever sees a
//! `NaiveTime`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A raw time value as it arrives from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeValue {
    /// Duration since midnight, in seconds.
    SecondsSinceMidnight(i64),
    /// "HH:MM" or "HH:MM:SS".
    Text(String),
    /// Already parsed.
    Clock(NaiveTime),
}

/// Normalize a raw time value into a time of day.
///
/// Returns `None` for values that cannot be interpreted; callers skip the
/// record and keep going.
pub fn normalize(value: &TimeValue) -> Option<NaiveTime> {
    match value {
        TimeValue::SecondsSinceMidnight(total) => {
            if *total < 0 {
                return None;
            }
            let total = total % 86_400;
            let hours = (total / 3600) as u32;
            let minutes = ((total % 3600) / 60) as u32;
            let seconds = (total % 60) as u32;
            NaiveTime::from_hms_opt(hours, minutes, seconds)
        }
        TimeValue::Text(s) => {
            let s = s.trim();
            NaiveTime::parse_from_str(s, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
                .ok()
        }
        TimeValue::Clock(t) => Some(*t),
    }
}

/// Combine a lesson date with its raw time into a full datetime.
pub fn lesson_datetime(date: NaiveDate, time: &TimeValue) -> Option<NaiveDateTime> {
    normalize(time).map(|t| date.and_time(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_since_midnight() {
        // 14:30:00 = 52200 seconds
        let t = normalize(&TimeValue::SecondsSinceMidnight(52_200)).unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
    }

    #[test]
    fn test_seconds_wrap_past_midnight() {
        // 25 hours wraps to 01:00
        let t = normalize(&TimeValue::SecondsSinceMidnight(25 * 3600)).unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(1, 0, 0).unwrap());
    }

    #[test]
    fn test_negative_seconds_rejected() {
        assert!(normalize(&TimeValue::SecondsSinceMidnight(-60)).is_none());
    }

    #[test]
    fn test_text_with_and_without_seconds() {
        assert_eq!(
            normalize(&TimeValue::Text("14:30".into())).unwrap(),
            NaiveTime::from_hms_opt(14, 30, 0).unwrap()
        );
        assert_eq!(
            normalize(&TimeValue::Text("14:30:45".into())).unwrap(),
            NaiveTime::from_hms_opt(14, 30, 45).unwrap()
        );
    }

    #[test]
    fn test_garbage_text_rejected() {
        assert!(normalize(&TimeValue::Text("half past two".into())).is_none());
        assert!(normalize(&TimeValue::Text("".into())).is_none());
        assert!(normalize(&TimeValue::Text("25:99".into())).is_none());
    }

    #[test]
    fn test_clock_passthrough() {
        let t = NaiveTime::from_hms_opt(9, 15, 0).unwrap();
        assert_eq!(normalize(&TimeValue::Clock(t)), Some(t));
    }

    #[test]
    fn test_lesson_datetime() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let dt = lesson_datetime(date, &TimeValue::Text("10:00".into())).unwrap();
        assert_eq!(dt, date.and_hms_opt(10, 0, 0).unwrap());
        assert!(lesson_datetime(date, &TimeValue::Text("nope".into())).is_none());
    }
}
