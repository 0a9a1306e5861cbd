use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::errors::DomainError;

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Parses `YYYY-MM-DD` (also `YYYY/MM/DD`), the format Slack date pickers emit.
pub fn parse_date(input: &str) -> Result<NaiveDate, DomainError> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y/%m/%d"))
        .map_err(|_| {
            DomainError::Validation(format!("`{trimmed}` is not a valid date (use YYYY-MM-DD)"))
        })
}

/// Parses `YYYY-MM` into the first and last day of that month.
pub fn parse_month(input: &str) -> Result<(NaiveDate, NaiveDate), DomainError> {
    let trimmed = input.trim();
    let first = NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d").map_err(|_| {
        DomainError::Validation(format!("`{trimmed}` is not a valid month (use YYYY-MM)"))
    })?;
    Ok(month_bounds(first))
}

pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month.and_then(|next| next.pred_opt()).unwrap_or(first);
    (first, last)
}

/// Wall-clock `HH:MM` used by the daily jobs.
pub fn parse_time_of_day(input: &str) -> Result<NaiveTime, DomainError> {
    let trimmed = input.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M").map_err(|_| {
        DomainError::Validation(format!("`{trimmed}` is not a valid time of day (use HH:MM, 24h)"))
    })
}

pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Next Monday-Friday occurrence of `at` strictly after `from`.
pub fn next_weekday_run(at: NaiveTime, from: NaiveDateTime) -> NaiveDateTime {
    let mut candidate = from.date().and_time(at);
    if candidate <= from {
        candidate += Duration::days(1);
    }
    while is_weekend(candidate.date()) {
        candidate += Duration::days(1);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::{
        is_weekend, month_bounds, next_weekday_run, parse_date, parse_month, parse_time_of_day,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn weekend_detection() {
        assert!(!is_weekend(date(2024, 7, 5)));
        assert!(is_weekend(date(2024, 7, 6)));
        assert!(is_weekend(date(2024, 7, 7)));
        assert!(!is_weekend(date(2024, 7, 8)));
    }

    #[test]
    fn parses_dates_and_rejects_garbage() {
        assert_eq!(parse_date("2024-07-04").expect("iso"), date(2024, 7, 4));
        assert_eq!(parse_date(" 2024/07/04 ").expect("slashes"), date(2024, 7, 4));
        assert!(parse_date("2024-02-30").is_err());
        assert!(parse_date("next tuesday").is_err());
    }

    #[test]
    fn month_bounds_handle_december_and_leap_years() {
        assert_eq!(month_bounds(date(2024, 12, 15)), (date(2024, 12, 1), date(2024, 12, 31)));
        assert_eq!(month_bounds(date(2024, 2, 10)), (date(2024, 2, 1), date(2024, 2, 29)));
        assert_eq!(parse_month("2023-02").expect("month"), (date(2023, 2, 1), date(2023, 2, 28)));
        assert!(parse_month("2023-13").is_err());
    }

    #[test]
    fn time_of_day_is_strict_24h() {
        assert_eq!(parse_time_of_day("08:00").expect("time"), NaiveTime::from_hms_opt(8, 0, 0).expect("t"));
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("8am").is_err());
    }

    #[test]
    fn next_run_skips_past_times_and_weekends() {
        let eight = NaiveTime::from_hms_opt(8, 0, 0).expect("time");

        // Wednesday 07:00 -> same day
        let from = date(2024, 7, 3).and_hms_opt(7, 0, 0).expect("dt");
        assert_eq!(next_weekday_run(eight, from), date(2024, 7, 3).and_time(eight));

        // Wednesday 08:00 exactly -> Thursday
        let from = date(2024, 7, 3).and_time(eight);
        assert_eq!(next_weekday_run(eight, from), date(2024, 7, 4).and_time(eight));

        // Friday 09:00 -> Monday
        let from = date(2024, 7, 5).and_hms_opt(9, 0, 0).expect("dt");
        assert_eq!(next_weekday_run(eight, from), date(2024, 7, 8).and_time(eight));

        // Saturday 06:00 -> Monday
        let from = date(2024, 7, 6).and_hms_opt(6, 0, 0).expect("dt");
        assert_eq!(next_weekday_run(eight, from), date(2024, 7, 8).and_time(eight));
    }
}
