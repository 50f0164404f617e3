use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;

/// Dates without a year that lie further than this in the past roll into next year.
const ROLLOVER_GRACE_DAYS: i64 = 30;

lazy_static! {
    static ref NUMBER_RE: Regex = Regex::new(r"\d+").unwrap();
    static ref OFFSET_RE: Regex = Regex::new(r"^([+-])(\d{2}):(\d{2})$").unwrap();
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum TimeError {
    #[error("date text needs at least day and month: {0:?}")]
    MissingDate(String),

    #[error("time text has no hour: {0:?}")]
    MissingTime(String),

    #[error("no such date: {day}/{month}/{year}")]
    InvalidDate { day: u32, month: u32, year: i32 },

    #[error("no such time of day: {hour}:{minute:02}")]
    InvalidTime { hour: u32, minute: u32 },

    #[error("UTC offset must look like ±HH:MM, got {0:?}")]
    InvalidOffset(String),
}

/// Parses a fixed `±HH:MM` offset.
///
/// The offset is applied as-is to every date; there is no timezone database
/// behind it, so local daylight-saving changes are not reflected.
pub fn parse_utc_offset(text: &str) -> Result<FixedOffset, TimeError> {
    let invalid = || TimeError::InvalidOffset(text.to_string());
    let caps = OFFSET_RE.captures(text.trim()).ok_or_else(invalid)?;

    let hours: i32 = caps[2].parse().map_err(|_| invalid())?;
    let minutes: i32 = caps[3].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    let seconds = (hours * 60 + minutes) * 60;
    let seconds = if &caps[1] == "-" { -seconds } else { seconds };
    FixedOffset::east_opt(seconds).ok_or_else(invalid)
}

/// Converts loosely formatted local date and time text into a UTC instant.
///
/// Date text supplies day, month and an optional year as its first integer
/// groups (`20/08`, `20-08-2025`, `dia 20 do 8`). Time text supplies hour and
/// optional minute (`14h`, `14:30`, `9h15`). A missing year means the current
/// year, or the next one when that date is more than 30 days behind `now`.
pub fn normalize(
    date_text: &str,
    time_text: &str,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, TimeError> {
    let date = resolve_date(date_text, now)?;
    let time = resolve_time(time_text)?;

    let local = NaiveDateTime::new(date, time);
    local
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(TimeError::InvalidTime {
            hour: time.hour(),
            minute: time.minute(),
        })
}

/// Expresses a UTC instant as wall-clock time at the given offset.
#[cfg(test)]
fn to_local(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    instant.with_timezone(&offset).naive_local()
}

fn resolve_date(text: &str, now: DateTime<Utc>) -> Result<NaiveDate, TimeError> {
    let numbers = integer_groups(text);
    if numbers.len() < 2 {
        return Err(TimeError::MissingDate(text.to_string()));
    }
    let (day, month) = (numbers[0], numbers[1]);

    if let Some(&year) = numbers.get(2) {
        let year = expand_year(year);
        return NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(TimeError::InvalidDate { day, month, year });
    }

    let year = now.year();
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(TimeError::InvalidDate { day, month, year })?;

    let behind = now.naive_utc() - date.and_time(NaiveTime::MIN);
    if behind.num_days() > ROLLOVER_GRACE_DAYS {
        let year = year + 1;
        return NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(TimeError::InvalidDate { day, month, year });
    }
    Ok(date)
}

fn resolve_time(text: &str) -> Result<NaiveTime, TimeError> {
    let numbers = integer_groups(text);
    let hour = *numbers
        .first()
        .ok_or_else(|| TimeError::MissingTime(text.to_string()))?;
    let minute = numbers.get(1).copied().unwrap_or(0);

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or(TimeError::InvalidTime { hour, minute })
}

// Oversized groups saturate so they fail range checks instead of parsing.
fn integer_groups(text: &str) -> Vec<u32> {
    NUMBER_RE
        .find_iter(text)
        .map(|m| m.as_str().parse().unwrap_or(u32::MAX))
        .collect()
}

// "25" means 2025.
fn expand_year(year: u32) -> i32 {
    let year = i32::try_from(year).unwrap_or(i32::MAX);
    if year < 100 {
        2000 + year
    } else {
        year
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn brt() -> FixedOffset {
        parse_utc_offset("-03:00").unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_full_date_with_hour_suffix() {
        let now = utc(2025, 1, 15, 12, 0);
        let resolved = normalize("20/08/2025", "14h", brt(), now).unwrap();
        assert_eq!(resolved, utc(2025, 8, 20, 17, 0));
    }

    #[test]
    fn test_yearless_date_stays_in_current_year() {
        let now = utc(2025, 1, 15, 12, 0);
        let resolved = normalize("20/08", "14:00", brt(), now).unwrap();
        assert_eq!(resolved.year(), 2025);
        assert_eq!(resolved, utc(2025, 8, 20, 17, 0));
    }

    #[test]
    fn test_yearless_date_rolls_forward_when_long_past() {
        let now = utc(2025, 12, 20, 12, 0);
        let resolved = normalize("10/01", "9h", brt(), now).unwrap();
        assert_eq!(resolved, utc(2026, 1, 10, 12, 0));
    }

    #[test]
    fn test_recent_past_date_does_not_roll() {
        // 10 days behind is within the grace period
        let now = utc(2025, 3, 20, 12, 0);
        let resolved = normalize("10/03", "10:30", brt(), now).unwrap();
        assert_eq!(resolved, utc(2025, 3, 10, 13, 30));
    }

    #[test]
    fn test_explicit_year_is_never_rolled() {
        let now = utc(2025, 12, 20, 12, 0);
        let resolved = normalize("10/01/2025", "9h", brt(), now).unwrap();
        assert_eq!(resolved, utc(2025, 1, 10, 12, 0));
    }

    #[test]
    fn test_two_digit_year() {
        let now = utc(2025, 1, 15, 12, 0);
        let resolved = normalize("05/02/26", "08:15", brt(), now).unwrap();
        assert_eq!(resolved, utc(2026, 2, 5, 11, 15));
    }

    #[test]
    fn test_positive_offset_and_day_change() {
        let now = utc(2025, 1, 15, 12, 0);
        let offset = parse_utc_offset("+05:30").unwrap();
        let resolved = normalize("01/06/2025", "03:00", offset, now).unwrap();
        assert_eq!(resolved, utc(2025, 5, 31, 21, 30));
    }

    #[test]
    fn test_missing_date_numbers() {
        let now = utc(2025, 1, 15, 12, 0);
        let err = normalize("amanhã", "14h", brt(), now).unwrap_err();
        assert!(matches!(err, TimeError::MissingDate(_)));

        let err = normalize("dia 20", "14h", brt(), now).unwrap_err();
        assert!(matches!(err, TimeError::MissingDate(_)));
    }

    #[test]
    fn test_missing_time_numbers() {
        let now = utc(2025, 1, 15, 12, 0);
        let err = normalize("20/08", "à tarde", brt(), now).unwrap_err();
        assert!(matches!(err, TimeError::MissingTime(_)));
    }

    #[test]
    fn test_out_of_range_values_are_unresolved() {
        let now = utc(2025, 1, 15, 12, 0);
        assert!(matches!(
            normalize("20/13", "14h", brt(), now),
            Err(TimeError::InvalidDate { month: 13, .. })
        ));
        assert!(matches!(
            normalize("31/04/2025", "14h", brt(), now),
            Err(TimeError::InvalidDate { .. })
        ));
        assert!(matches!(
            normalize("20/08", "25h", brt(), now),
            Err(TimeError::InvalidTime { hour: 25, .. })
        ));
        assert!(matches!(
            normalize("99999999999/08", "10h", brt(), now),
            Err(TimeError::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_leap_day_rollover_into_non_leap_year() {
        let now = utc(2024, 12, 1, 0, 0);
        assert!(matches!(
            normalize("29/02", "10h", brt(), now),
            Err(TimeError::InvalidDate { year: 2025, .. })
        ));
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("-03:00").unwrap().local_minus_utc(), -10800);
        assert_eq!(parse_utc_offset("+00:00").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("+05:45").unwrap().local_minus_utc(), 20700);
        assert!(parse_utc_offset("03:00").is_err());
        assert!(parse_utc_offset("-3").is_err());
        assert!(parse_utc_offset("+02:75").is_err());
        assert!(parse_utc_offset("+24:00").is_err());
    }

    #[test]
    fn test_round_trip_recovers_wall_clock() {
        let now = utc(2025, 1, 1, 0, 0);
        let offsets = ["-03:00", "+00:00", "+09:30", "-11:00", "+14:00"];
        let cases = [
            (1, 1, 2025, 0, 0),
            (20, 8, 2025, 14, 0),
            (31, 12, 2025, 23, 59),
            (29, 2, 2028, 12, 30),
            (15, 6, 2030, 7, 5),
        ];

        for offset_text in offsets {
            let offset = parse_utc_offset(offset_text).unwrap();
            for (day, month, year, hour, minute) in cases {
                let date_text = format!("{day}/{month}/{year}");
                let time_text = format!("{hour}:{minute:02}");
                let instant = normalize(&date_text, &time_text, offset, now).unwrap();
                let local = to_local(instant, offset);
                assert_eq!(
                    (local.day(), local.month(), local.year(), local.hour(), local.minute()),
                    (day, month, year, hour, minute),
                    "offset {offset_text}, {date_text} {time_text}"
                );
            }
        }
    }
}
