//! Calendar encodings for daily series

use chrono::{Datelike, NaiveDate, Weekday};

/// Day of week scaled to [0, 1]: Monday is 0.0, Sunday is 1.0
pub fn day_of_week_fraction(date: NaiveDate) -> f64 {
    date.weekday().num_days_from_monday() as f64 / 6.0
}

/// Saturday or Sunday
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Friday or Saturday, the nights with the heaviest listening
pub fn is_peak_listening_day(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Fri | Weekday::Sat)
}

/// June, July or August
pub fn is_summer_month(date: NaiveDate) -> bool {
    matches!(date.month(), 6..=8)
}

/// Day of year scaled to [0, 1), honouring leap years
pub fn day_of_year_fraction(date: NaiveDate) -> f64 {
    let days_in_year = NaiveDate::from_ymd_opt(date.year(), 12, 31)
        .map(|last| last.ordinal())
        .unwrap_or(365);
    date.ordinal0() as f64 / days_in_year as f64
}
