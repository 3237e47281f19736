//! Date/time to bucket key.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use taxi_demand_models::TimeBucket;

use crate::DemandError;

/// How far ahead of the selected time a forecast looks.
pub const LEAD_TIME: TimeDelta = TimeDelta::minutes(15);

/// Returns the bucket key for a forecast made at `date` + `time`.
///
/// The key is the combined timestamp advanced by [`LEAD_TIME`], unchanged
/// otherwise: it is not snapped to a 15-minute grid, so callers that need
/// grid alignment must pass an aligned time.
///
/// # Errors
///
/// Returns [`DemandError::InvalidInput`] if either part is missing.
pub fn bucket(date: Option<NaiveDate>, time: Option<NaiveTime>) -> Result<TimeBucket, DemandError> {
    let date = date.ok_or_else(|| DemandError::InvalidInput {
        field: "date".to_string(),
    })?;
    let time = time.ok_or_else(|| DemandError::InvalidInput {
        field: "time".to_string(),
    })?;

    Ok(TimeBucket::new(NaiveDateTime::new(date, time) + LEAD_TIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 3, day).unwrap()
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        date(day).and_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn advances_by_fifteen_minutes() {
        let key = bucket(Some(date(1)), NaiveTime::from_hms_opt(0, 0, 0)).unwrap();
        assert_eq!(key.as_datetime(), at(1, 0, 15, 0));
    }

    #[test]
    fn does_not_snap_to_grid() {
        let key = bucket(Some(date(1)), NaiveTime::from_hms_opt(10, 7, 30)).unwrap();
        assert_eq!(key.as_datetime(), at(1, 10, 22, 30));
    }

    #[test]
    fn crosses_midnight() {
        let key = bucket(Some(date(1)), NaiveTime::from_hms_opt(23, 50, 0)).unwrap();
        assert_eq!(key.as_datetime(), at(2, 0, 5, 0));
    }

    #[test]
    fn missing_parts_are_invalid_input() {
        assert!(matches!(
            bucket(None, NaiveTime::from_hms_opt(1, 0, 0)),
            Err(DemandError::InvalidInput { field }) if field == "date"
        ));
        assert!(matches!(
            bucket(Some(date(1)), None),
            Err(DemandError::InvalidInput { field }) if field == "time"
        ));
    }
}
