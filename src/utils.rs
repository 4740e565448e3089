use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

const FLOAT_EPSILON: f64 = 1e-9;

pub fn approx_eq(lhs: f64, rhs: f64) -> bool {
    (lhs - rhs).abs() <= FLOAT_EPSILON * lhs.abs().max(rhs.abs()).max(1.0)
}

/// Serialize a serde-backed enum into its string name (e.g. snake_case).
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}

/// First and last calendar day of a month, or `None` for an invalid month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next - Duration::days(1)))
}

/// `(year, month)` of the UTC day containing `now`.
pub fn year_month(now: DateTime<Utc>) -> (i32, u32) {
    let today = now.date_naive();
    (today.year(), today.month())
}

/// Fractional hours between two instants. A clock that went backwards yields zero.
pub fn elapsed_hours(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let ms = (end - start).num_milliseconds();
    if ms <= 0 { 0.0 } else { ms as f64 / 3_600_000.0 }
}
