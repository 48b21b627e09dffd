//! Day-index arithmetic in metric time zones.

use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::{
    data::types::DayIndex, error::CobaltError, registry::types::TimeZonePolicy,
};

/// Number of days since 1970-01-01 for the calendar date of `now` in the
/// zone selected by `policy`.
pub fn day_index(
    now: DateTime<Utc>,
    policy: &TimeZonePolicy,
) -> Result<DayIndex, CobaltError> {
    let date = match policy {
        TimeZonePolicy::Utc => now.date_naive(),
        TimeZonePolicy::Local => now.with_timezone(&Local).date_naive(),
        TimeZonePolicy::Other(name) => {
            let tz: Tz = name.parse().map_err(|_| {
                CobaltError::Configuration(format!("unknown time zone {name:?}"))
            })?;
            now.with_timezone(&tz).date_naive()
        }
    };
    Ok(days_since_epoch(date))
}

fn days_since_epoch(date: NaiveDate) -> DayIndex {
    let days = date.signed_duration_since(NaiveDate::default()).num_days();
    DayIndex::try_from(days).unwrap_or(DayIndex::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_utc_day_index() -> Result<(), anyhow::Error> {
        assert_eq!(day_index(parse("1970-01-01T00:00:00Z"), &TimeZonePolicy::Utc)?, 0);
        assert_eq!(
            day_index(parse("2022-07-28T14:15:30Z"), &TimeZonePolicy::Utc)?,
            19201
        );
        Ok(())
    }

    #[test]
    fn test_other_time_zone_shifts_day() -> Result<(), anyhow::Error> {
        let la = TimeZonePolicy::Other("America/Los_Angeles".into());
        // 03:00 UTC is still the previous evening in Los Angeles.
        let now = parse("2022-07-29T03:00:00Z");
        assert_eq!(day_index(now, &TimeZonePolicy::Utc)?, 19202);
        assert_eq!(day_index(now, &la)?, 19201);
        Ok(())
    }

    #[test]
    fn test_unknown_time_zone() {
        let err = day_index(Utc::now(), &TimeZonePolicy::Other("Nowhere".into()));
        assert!(matches!(err, Err(CobaltError::Configuration(_))));
    }
}
