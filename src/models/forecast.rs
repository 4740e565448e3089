//! Wire types for the external budget forecaster.
//!
//! Dates travel as `YYYY-MM-DD` strings, which is chrono's serde form for
//! `NaiveDate`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPoint {
    pub date: NaiveDate,
    pub energy_consumption_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub historical_data: Vec<HistoricalPoint>,
    pub budget: f64,
    pub current_date: NaiveDate,
}

/// One day of the month as seen by the forecaster: actual up to the as-of
/// date, projected after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub daily_kwh: f64,
    #[serde(default)]
    pub cumulative_kwh: Option<f64>,
    pub is_forecast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResponse {
    pub monthly_usage_forecast: Vec<DailyUsage>,
    #[serde(default)]
    pub budget_limit: Option<f64>,
    #[serde(default)]
    pub predicted_total_usage: Option<f64>,
    #[serde(default)]
    pub will_exceed_budget: Option<bool>,
    #[serde(default)]
    pub days_passed: Option<u32>,
    #[serde(default)]
    pub days_remaining: Option<u32>,
    #[serde(default)]
    pub consumption_so_far: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_in_forecaster_shape() {
        let req = ForecastRequest {
            historical_data: vec![HistoricalPoint {
                date: NaiveDate::from_ymd_opt(2025, 7, 3).unwrap(),
                energy_consumption_kwh: 2.5,
            }],
            budget: 1500.0,
            current_date: NaiveDate::from_ymd_opt(2025, 7, 4).unwrap(),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "historical_data": [{"date": "2025-07-03", "energy_consumption_kwh": 2.5}],
                "budget": 1500.0,
                "current_date": "2025-07-04"
            })
        );
    }

    #[test]
    fn minimal_response_decodes() {
        let body = r#"{"monthly_usage_forecast":[{"date":"2025-07-05","daily_kwh":3.0,"is_forecast":true}]}"#;
        let resp: ForecastResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.monthly_usage_forecast.len(), 1);
        assert_eq!(resp.monthly_usage_forecast[0].cumulative_kwh, None);
        assert_eq!(resp.will_exceed_budget, None);
    }

    #[test]
    fn full_response_decodes() {
        let body = r#"{
            "monthly_usage_forecast": [
                {"date":"2025-07-01","daily_kwh":2.0,"cumulative_kwh":2.0,"is_forecast":false},
                {"date":"2025-07-02","daily_kwh":2.5,"cumulative_kwh":4.5,"is_forecast":true}
            ],
            "budget_limit": 60.0,
            "predicted_total_usage": 75.5,
            "will_exceed_budget": true,
            "days_passed": 1,
            "days_remaining": 30,
            "consumption_so_far": 2.0
        }"#;
        let resp: ForecastResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.will_exceed_budget, Some(true));
        assert_eq!(resp.days_remaining, Some(30));
        assert_eq!(resp.monthly_usage_forecast[1].cumulative_kwh, Some(4.5));
    }
}
