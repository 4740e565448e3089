//! Monthly budget progress.
//!
//! A missing budget or a missing price is an ordinary state: the figures that
//! need them come back as `None` while the kWh total is always reported.

use serde::Serialize;

use crate::db::store::{BudgetStore, StoreError, UsageStore, DEFAULT_CURRENCY};
use crate::models::energy::UserId;
use crate::services::aggregate::month_total;

const WARNING_PERCENT: f64 = 80.0;
const EXCEEDED_PERCENT: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetProgress {
    pub year: i32,
    pub month: u32,
    pub budget_amount: Option<f64>,
    pub price_per_kwh: Option<f64>,
    pub currency: String,
    pub total_kwh: f64,
    pub spent: Option<f64>,
    pub remaining: Option<f64>,
    pub percent_used: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Safe,
    Warning,
    Exceeded,
}

impl BudgetProgress {
    pub fn has_budget(&self) -> bool {
        self.budget_amount.is_some()
    }

    /// `None` while the percentage is unknown.
    pub fn alert_level(&self) -> Option<AlertLevel> {
        self.percent_used.map(alert_level_for)
    }
}

pub fn alert_level_for(percent_used: f64) -> AlertLevel {
    if percent_used >= EXCEEDED_PERCENT {
        AlertLevel::Exceeded
    } else if percent_used >= WARNING_PERCENT {
        AlertLevel::Warning
    } else {
        AlertLevel::Safe
    }
}

/// Spend and percent-used of `(year, month)` for `user`.
pub fn get_progress<S: UsageStore + BudgetStore + ?Sized>(
    store: &mut S,
    user: UserId,
    year: i32,
    month: u32,
) -> Result<BudgetProgress, StoreError> {
    let total_kwh = month_total(store, user, year, month)?;
    let budget = store.get_budget(user, year, month)?;

    let budget_amount = budget.as_ref().map(|b| b.amount);
    let price_per_kwh = budget.as_ref().and_then(|b| b.price_per_kwh);
    let currency = budget
        .as_ref()
        .map(|b| b.currency.clone())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let (spent, remaining, percent_used) = match (budget_amount, price_per_kwh) {
        (Some(amount), Some(price)) => {
            let spent = total_kwh * price;
            let percent = (amount > 0.0).then(|| spent / amount * 100.0);
            (Some(spent), Some(amount - spent), percent)
        }
        _ => (None, None, None),
    };

    Ok(BudgetProgress {
        year,
        month,
        budget_amount,
        price_per_kwh,
        currency,
        total_kwh,
        spent,
        remaining,
        percent_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::models::NewUsageRecord;
    use crate::db::store::BudgetFields;
    use crate::models::energy::{usage_source, DeviceId};
    use crate::utils::approx_eq;
    use chrono::NaiveDate;

    const USER: UserId = UserId(3);

    fn july(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, day).unwrap()
    }

    fn seed_july(store: &mut MemoryStore) {
        // 100 kWh spread over the month, with a duplicate day.
        for (day, kwh) in [(1, 10.0), (2, 15.5), (2, 4.5), (15, 40.0), (31, 30.0)] {
            store
                .insert_usage(&NewUsageRecord::new(USER, DeviceId(1), july(day), kwh, usage_source::MANUAL))
                .unwrap();
        }
        store
            .insert_usage(&NewUsageRecord::new(
                USER,
                DeviceId(1),
                NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
                99.0,
                usage_source::MANUAL,
            ))
            .unwrap();
    }

    fn budget(amount: f64, price: Option<f64>) -> BudgetFields {
        BudgetFields {
            amount,
            price_per_kwh: price,
            currency: Some("IDR".into()),
            note: None,
        }
    }

    #[test]
    fn spend_and_percent_from_budget_price() {
        let mut store = MemoryStore::new();
        seed_july(&mut store);
        store.upsert_budget(USER, 2025, 7, &budget(500_000.0, Some(1700.0))).unwrap();

        let progress = get_progress(&mut store, USER, 2025, 7).unwrap();
        assert!(approx_eq(progress.total_kwh, 100.0));
        assert!(approx_eq(progress.spent.unwrap(), 170_000.0));
        assert!(approx_eq(progress.remaining.unwrap(), 330_000.0));
        assert!(approx_eq(progress.percent_used.unwrap(), 34.0));
        assert_eq!(progress.currency, "IDR");
        assert_eq!(progress.alert_level(), Some(AlertLevel::Safe));
    }

    #[test]
    fn missing_budget_still_reports_usage() {
        let mut store = MemoryStore::new();
        seed_july(&mut store);

        let progress = get_progress(&mut store, USER, 2025, 7).unwrap();
        assert!(!progress.has_budget());
        assert_eq!(progress.budget_amount, None);
        assert_eq!(progress.spent, None);
        assert_eq!(progress.percent_used, None);
        assert!(approx_eq(progress.total_kwh, 100.0));
        assert_eq!(progress.currency, DEFAULT_CURRENCY);
        assert_eq!(progress.alert_level(), None);
    }

    #[test]
    fn missing_price_leaves_spend_unknown() {
        let mut store = MemoryStore::new();
        seed_july(&mut store);
        store.upsert_budget(USER, 2025, 7, &budget(500_000.0, None)).unwrap();

        let progress = get_progress(&mut store, USER, 2025, 7).unwrap();
        assert_eq!(progress.budget_amount, Some(500_000.0));
        assert_eq!(progress.spent, None);
        assert_eq!(progress.remaining, None);
        assert_eq!(progress.percent_used, None);
    }

    #[test]
    fn deleted_budget_reverts_to_no_budget() {
        let mut store = MemoryStore::new();
        seed_july(&mut store);
        store.upsert_budget(USER, 2025, 7, &budget(1000.0, Some(1.0))).unwrap();
        assert!(store.delete_budget(USER, 2025, 7).unwrap());
        assert!(!get_progress(&mut store, USER, 2025, 7).unwrap().has_budget());
    }

    #[test]
    fn repeated_reads_are_identical() {
        let mut store = MemoryStore::new();
        seed_july(&mut store);
        store.upsert_budget(USER, 2025, 7, &budget(150_000.0, Some(1700.0))).unwrap();

        let first = get_progress(&mut store, USER, 2025, 7).unwrap();
        let second = get_progress(&mut store, USER, 2025, 7).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.alert_level(), Some(AlertLevel::Exceeded));
    }

    #[test]
    fn invalid_month_is_rejected() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            get_progress(&mut store, USER, 2025, 0),
            Err(StoreError::Validation { .. })
        ));
    }

    #[test]
    fn alert_thresholds() {
        assert_eq!(alert_level_for(79.9), AlertLevel::Safe);
        assert_eq!(alert_level_for(80.0), AlertLevel::Warning);
        assert_eq!(alert_level_for(100.0), AlertLevel::Exceeded);
    }
}
