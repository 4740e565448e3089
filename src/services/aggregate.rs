//! Daily series and totals over usage records.
//!
//! Every reader sums all records of a day; duplicate writes for the same
//! device and day add up.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::db::models::UsageRecord;
use crate::db::store::{validate_period, DailyTotal, StoreError, UsageStore, DEFAULT_RECENT_LIMIT};
use crate::models::energy::{DeviceId, UserId};
use crate::utils::month_bounds;

/// Chart timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
}

impl Window {
    pub fn days(self) -> u32 {
        match self {
            Window::OneWeek => 7,
            Window::OneMonth => 30,
            Window::ThreeMonths => 90,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Window::OneWeek => "1W",
            Window::OneMonth => "1M",
            Window::ThreeMonths => "3M",
        }
    }

    /// Inclusive date range: the `days()` calendar days ending `today`.
    pub fn bounds(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        (today - Duration::days(i64::from(self.days()) - 1), today)
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1W" => Ok(Window::OneWeek),
            "1M" => Ok(Window::OneMonth),
            "3M" => Ok(Window::ThreeMonths),
            other => Err(format!("unknown window {other:?}; expected 1W, 1M or 3M")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// 1-based, chronological.
    pub day_index: u32,
    pub date: NaiveDate,
    pub kwh: f64,
}

/// A chart series, or an explicit marker that the window holds no records.
///
/// `NoData` is distinct from a series of zeros: a day with a record of 0 kWh
/// is real data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UsageSeries {
    NoData {
        window: Window,
        start: NaiveDate,
        end: NaiveDate,
    },
    Data {
        window: Window,
        points: Vec<SeriesPoint>,
    },
}

impl UsageSeries {
    pub fn has_data(&self) -> bool {
        matches!(self, UsageSeries::Data { .. })
    }

    pub fn points(&self) -> &[SeriesPoint] {
        match self {
            UsageSeries::NoData { .. } => &[],
            UsageSeries::Data { points, .. } => points,
        }
    }

    pub fn total(&self) -> f64 {
        series_total(self.points())
    }
}

pub fn series_total(points: &[SeriesPoint]) -> f64 {
    points.iter().map(|p| p.kwh).sum()
}

/// Daily kWh over `window` ending `today`, missing days filled with zero.
pub fn get_series<S: UsageStore + ?Sized>(
    store: &mut S,
    user: UserId,
    device: Option<DeviceId>,
    window: Window,
    today: NaiveDate,
) -> Result<UsageSeries, StoreError> {
    let (start, end) = window.bounds(today);
    let days = store.sum_by_day(user, device, start, end)?;
    if days.is_empty() {
        return Ok(UsageSeries::NoData { window, start, end });
    }

    let by_date: BTreeMap<NaiveDate, f64> = days.into_iter().map(|d| (d.date, d.total_kwh)).collect();
    let points = (0..window.days())
        .map(|offset| {
            let date = start + Duration::days(i64::from(offset));
            SeriesPoint {
                day_index: offset + 1,
                date,
                kwh: by_date.get(&date).copied().unwrap_or(0.0),
            }
        })
        .collect();
    Ok(UsageSeries::Data { window, points })
}

/// Total kWh of a calendar month, first to last day inclusive.
pub fn month_total<S: UsageStore + ?Sized>(
    store: &mut S,
    user: UserId,
    year: i32,
    month: u32,
) -> Result<f64, StoreError> {
    validate_period(year, month)?;
    let Some((first, last)) = month_bounds(year, month) else {
        return Err(StoreError::Validation {
            field: "month",
            reason: format!("{year}-{month:02} is not a calendar month"),
        });
    };
    store.sum_range(user, None, first, last)
}

pub fn daily_total<S: UsageStore + ?Sized>(store: &mut S, user: UserId, date: NaiveDate) -> Result<f64, StoreError> {
    store.sum_range(user, None, date, date)
}

/// Per-day totals and record counts of the last week, most recent first.
pub fn usage_summary<S: UsageStore + ?Sized>(
    store: &mut S,
    user: UserId,
    today: NaiveDate,
) -> Result<Vec<DailyTotal>, StoreError> {
    let (start, end) = Window::OneWeek.bounds(today);
    let mut days = store.sum_by_day(user, None, start, end)?;
    days.reverse();
    Ok(days)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceUsage {
    pub device_id: DeviceId,
    pub kwh: f64,
}

/// kWh per device over `window`, highest first. Devices without records in
/// the window are absent.
pub fn device_totals<S: UsageStore + ?Sized>(
    store: &mut S,
    user: UserId,
    window: Window,
    today: NaiveDate,
) -> Result<Vec<DeviceUsage>, StoreError> {
    let (start, end) = window.bounds(today);
    let mut by_device: BTreeMap<DeviceId, f64> = BTreeMap::new();
    for record in store.query_range(user, None, start, end)? {
        *by_device.entry(DeviceId(record.device_id)).or_insert(0.0) += record.daily_kwh;
    }
    let mut totals: Vec<DeviceUsage> = by_device
        .into_iter()
        .map(|(device_id, kwh)| DeviceUsage { device_id, kwh })
        .collect();
    totals.sort_by(|a, b| b.kwh.total_cmp(&a.kwh).then(a.device_id.cmp(&b.device_id)));
    Ok(totals)
}

/// Latest records of a user (optionally one device), newest first, capped at
/// [`DEFAULT_RECENT_LIMIT`].
pub fn recent_records<S: UsageStore + ?Sized>(
    store: &mut S,
    user: UserId,
    device: Option<DeviceId>,
) -> Result<Vec<UsageRecord>, StoreError> {
    store.recent(user, device, DEFAULT_RECENT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::NewUsageRecord;
    use crate::models::energy::usage_source;
    use crate::utils::approx_eq;

    const USER: UserId = UserId(7);
    const D1: DeviceId = DeviceId(1);
    const D2: DeviceId = DeviceId(2);

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, 20).unwrap()
    }

    fn add(store: &mut MemoryStore, device: DeviceId, date: NaiveDate, kwh: f64) {
        store
            .insert_usage(&NewUsageRecord::new(USER, device, date, kwh, usage_source::MANUAL))
            .unwrap();
    }

    #[test]
    fn week_series_has_seven_chronological_days() {
        let mut store = MemoryStore::new();
        let (start, _) = Window::OneWeek.bounds(today());
        add(&mut store, D1, start + Duration::days(2), 0.5);
        add(&mut store, D1, start + Duration::days(2), 0.5);
        add(&mut store, D2, today(), 3.0);

        let series = get_series(&mut store, USER, None, Window::OneWeek, today()).unwrap();
        let points = series.points();
        assert_eq!(points.len(), 7);
        assert_eq!(points.iter().map(|p| p.day_index).collect::<Vec<_>>(), (1..=7).collect::<Vec<_>>());
        assert!(points.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(points[2].kwh, 1.0);
        assert_eq!(points[6].date, today());
        assert_eq!(points[6].kwh, 3.0);
        assert!(approx_eq(series.total(), 4.0));
    }

    #[test]
    fn month_series_for_one_device() {
        let mut store = MemoryStore::new();
        let (start, _) = Window::OneMonth.bounds(today());
        add(&mut store, D1, start, 0.7);
        add(&mut store, D1, start + Duration::days(4), 1.2);
        add(&mut store, D1, start + Duration::days(4), 0.8);
        add(&mut store, D2, start + Duration::days(4), 9.0);

        let series = get_series(&mut store, USER, Some(D1), Window::OneMonth, today()).unwrap();
        let points = series.points();
        assert_eq!(points.len(), 30);
        assert_eq!(points[0].kwh, 0.7);
        assert!(approx_eq(points[4].kwh, 2.0));
        assert_eq!(points.iter().filter(|p| p.kwh == 0.0).count(), 28);
    }

    #[test]
    fn empty_window_reports_no_data() {
        let mut store = MemoryStore::new();
        add(&mut store, D1, today() - Duration::days(200), 5.0);
        let series = get_series(&mut store, USER, None, Window::ThreeMonths, today()).unwrap();
        assert!(!series.has_data());
        assert!(series.points().is_empty());
        assert_eq!(series.total(), 0.0);
    }

    #[test]
    fn genuine_zero_usage_is_data() {
        let mut store = MemoryStore::new();
        add(&mut store, D1, today(), 0.0);
        let series = get_series(&mut store, USER, None, Window::OneWeek, today()).unwrap();
        assert!(series.has_data());
        assert_eq!(series.total(), 0.0);
        assert_eq!(series.points().len(), 7);
    }

    #[test]
    fn month_total_covers_first_to_last_day() {
        let mut store = MemoryStore::new();
        add(&mut store, D1, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap(), 100.0);
        add(&mut store, D1, NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(), 1.0);
        add(&mut store, D2, NaiveDate::from_ymd_opt(2025, 7, 31).unwrap(), 2.0);
        add(&mut store, D1, NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(), 100.0);
        assert!(approx_eq(month_total(&mut store, USER, 2025, 7).unwrap(), 3.0));
        assert!(month_total(&mut store, USER, 2025, 13).is_err());
    }

    #[test]
    fn summary_is_newest_first_with_counts() {
        let mut store = MemoryStore::new();
        add(&mut store, D1, today() - Duration::days(1), 1.0);
        add(&mut store, D2, today() - Duration::days(1), 2.0);
        add(&mut store, D1, today(), 0.5);
        add(&mut store, D1, today() - Duration::days(10), 8.0);

        let summary = usage_summary(&mut store, USER, today()).unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].date, today());
        assert_eq!(summary[1].total_kwh, 3.0);
        assert_eq!(summary[1].record_count, 2);
        assert_eq!(daily_total(&mut store, USER, today() - Duration::days(1)).unwrap(), 3.0);
    }

    #[test]
    fn device_totals_rank_by_usage() {
        let mut store = MemoryStore::new();
        add(&mut store, D1, today(), 1.0);
        add(&mut store, D2, today(), 2.0);
        add(&mut store, D2, today() - Duration::days(3), 2.0);
        add(&mut store, D1, today() - Duration::days(40), 50.0);

        let totals = device_totals(&mut store, USER, Window::OneMonth, today()).unwrap();
        assert_eq!(
            totals,
            vec![
                DeviceUsage { device_id: D2, kwh: 4.0 },
                DeviceUsage { device_id: D1, kwh: 1.0 },
            ]
        );
    }

    #[test]
    fn window_parses_labels() {
        assert_eq!("1w".parse::<Window>().unwrap(), Window::OneWeek);
        assert_eq!("3M".parse::<Window>().unwrap(), Window::ThreeMonths);
        assert!("6M".parse::<Window>().is_err());
        assert_eq!(Window::OneMonth.label(), "1M");
    }

    #[test]
    fn recent_records_are_capped_newest_first() {
        let mut store = MemoryStore::new();
        let first = today() - Duration::days(59);
        for offset in 0..60 {
            add(&mut store, D1, first + Duration::days(offset), 1.0);
        }
        add(&mut store, D2, today(), 5.0);

        let rows = recent_records(&mut store, USER, Some(D1)).unwrap();
        assert_eq!(rows.len(), DEFAULT_RECENT_LIMIT);
        assert_eq!(rows[0].date, today());
        assert!(rows.windows(2).all(|w| w[0].date > w[1].date));
        assert!(rows.iter().all(|r| r.device_id == D1.0));

        let all = recent_records(&mut store, USER, None).unwrap();
        assert_eq!(all.len(), DEFAULT_RECENT_LIMIT);
        assert_eq!(all.iter().filter(|r| r.device_id == D2.0).count(), 1);
    }
}
