//! Month-end forecast against the budget, delegated to the external
//! forecaster, and the next-day recommendation derived from it.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::client::{ForecastClientError, Forecaster};
use crate::db::store::{BudgetStore, StoreError, UsageStore};
use crate::models::energy::UserId;
use crate::models::forecast::{DailyUsage, ForecastRequest, ForecastResponse, HistoricalPoint};

/// Days of history before today sent to the forecaster; today is included too.
pub const LOOKBACK_DAYS: u32 = 30;
/// Budget sent when the caller gives none and the month has no budget.
pub const DEFAULT_BUDGET: f64 = 1500.0;

#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("no usage recorded in the last {lookback_days} days; add usage data first")]
    InsufficientHistory { lookback_days: u32 },
    #[error("forecast service unavailable: {0}")]
    ServiceUnavailable(#[source] ForecastClientError),
    #[error("budget must be a positive number, got {0}")]
    InvalidBudget(f64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ForecastOptions {
    pub budget_override: Option<f64>,
    /// Splits actual from projected days in the answer. Defaults to today.
    pub as_of_override: Option<NaiveDate>,
}

/// Per-day history of `[today - LOOKBACK_DAYS, today]`, oldest first.
///
/// Each date appears once, carrying the sum of all that day's records over
/// every device; days without records are left out.
pub fn build_history<S: UsageStore + ?Sized>(
    store: &mut S,
    user: UserId,
    today: NaiveDate,
) -> Result<Vec<HistoricalPoint>, ForecastError> {
    let start = today - Duration::days(i64::from(LOOKBACK_DAYS));
    let days = store.sum_by_day(user, None, start, today)?;
    if days.is_empty() {
        return Err(ForecastError::InsufficientHistory {
            lookback_days: LOOKBACK_DAYS,
        });
    }
    Ok(days
        .into_iter()
        .map(|d| HistoricalPoint {
            date: d.date,
            energy_consumption_kwh: d.total_kwh,
        })
        .collect())
}

/// Override, else this month's budget amount, else `default_budget`.
pub fn resolve_budget<S: BudgetStore + ?Sized>(
    store: &mut S,
    user: UserId,
    budget_override: Option<f64>,
    today: NaiveDate,
    default_budget: f64,
) -> Result<f64, ForecastError> {
    if let Some(budget) = budget_override {
        if !budget.is_finite() || budget <= 0.0 {
            return Err(ForecastError::InvalidBudget(budget));
        }
        return Ok(budget);
    }
    match store.get_budget(user, today.year(), today.month())? {
        Some(b) => Ok(b.amount),
        None => Ok(default_budget),
    }
}

pub fn forecast<S, F>(
    store: &mut S,
    forecaster: &F,
    user: UserId,
    opts: ForecastOptions,
    now: DateTime<Utc>,
    default_budget: f64,
) -> Result<ForecastResponse, ForecastError>
where
    S: UsageStore + BudgetStore + ?Sized,
    F: Forecaster + ?Sized,
{
    let today = now.date_naive();
    let historical_data = build_history(store, user, today)?;
    let budget = resolve_budget(store, user, opts.budget_override, today, default_budget)?;
    let request = ForecastRequest {
        historical_data,
        budget,
        current_date: opts.as_of_override.unwrap_or(today),
    };

    debug!(
        "Requesting forecast for user {} ({} day(s) of history, budget {})",
        user,
        request.historical_data.len(),
        request.budget
    );
    forecaster.forecast(&request).map_err(|e| {
        warn!("Forecast for user {} failed: {}", user, e);
        ForecastError::ServiceUnavailable(e)
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRecommendation {
    pub date: NaiveDate,
    pub daily_recommendation_kwh: f64,
    /// Set when no projected day after today existed and the value is the
    /// average of all projected days.
    pub degraded: bool,
}

/// Recommendation for the day after `today` taken from a forecast series.
pub fn recommend_from(rows: &[DailyUsage], today: NaiveDate) -> DailyRecommendation {
    let next = rows
        .iter()
        .filter(|row| row.is_forecast && row.date > today)
        .min_by_key(|row| row.date);
    if let Some(row) = next {
        return DailyRecommendation {
            date: row.date,
            daily_recommendation_kwh: row.daily_kwh,
            degraded: false,
        };
    }

    let projected: Vec<f64> = rows.iter().filter(|r| r.is_forecast).map(|r| r.daily_kwh).collect();
    let average = if projected.is_empty() {
        warn!("Forecast contains no projected days; recommending 0 kWh for {}", today + Duration::days(1));
        0.0
    } else {
        projected.iter().sum::<f64>() / projected.len() as f64
    };
    DailyRecommendation {
        date: today + Duration::days(1),
        daily_recommendation_kwh: average,
        degraded: true,
    }
}

pub fn daily_recommendation<S, F>(
    store: &mut S,
    forecaster: &F,
    user: UserId,
    now: DateTime<Utc>,
    default_budget: f64,
) -> Result<DailyRecommendation, ForecastError>
where
    S: UsageStore + BudgetStore + ?Sized,
    F: Forecaster + ?Sized,
{
    let response = forecast(store, forecaster, user, ForecastOptions::default(), now, default_budget)?;
    Ok(recommend_from(&response.monthly_usage_forecast, now.date_naive()))
}
