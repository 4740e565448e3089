//! Store contracts consumed by the services, plus the write-boundary
//! validation shared by every implementation.

use chrono::NaiveDate;

use crate::db::models::{MonthlyBudget, NewMonthlyBudget, NewUsageRecord, UsageRecord};
use crate::models::energy::{DeviceId, RegisteredDevice, UserId};

pub const DEFAULT_CURRENCY: &str = "IDR";
pub const DEFAULT_RECENT_LIMIT: usize = 50;

const MIN_BUDGET_YEAR: i32 = 1970;
const MAX_BUDGET_YEAR: i32 = 2100;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl StoreError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// Total kWh of one calendar day, with the number of rows that made it up.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTotal {
    pub date: NaiveDate,
    pub total_kwh: f64,
    pub record_count: usize,
}

/// Mutable fields of a monthly budget, as submitted by the user.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BudgetFields {
    pub amount: f64,
    pub price_per_kwh: Option<f64>,
    /// Three-letter code; `None` means [`DEFAULT_CURRENCY`].
    pub currency: Option<String>,
    pub note: Option<String>,
}

pub trait UsageStore {
    fn insert_usage(&mut self, record: &NewUsageRecord) -> Result<UsageRecord, StoreError>;

    fn insert_usage_batch(&mut self, records: &[NewUsageRecord]) -> Result<usize, StoreError>;

    /// Records dated within `[start, end]`, oldest first.
    fn query_range(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UsageRecord>, StoreError>;

    fn sum_range(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, StoreError>;

    /// Per-day sums within `[start, end]`, oldest first. Days without records are absent.
    fn sum_by_day(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyTotal>, StoreError>;

    /// All kWh ever recorded for a device.
    fn device_total(&mut self, user: UserId, device: DeviceId) -> Result<f64, StoreError>;

    /// Most recent records, newest first.
    fn recent(&mut self, user: UserId, device: Option<DeviceId>, limit: usize) -> Result<Vec<UsageRecord>, StoreError>;
}

pub trait BudgetStore {
    fn upsert_budget(
        &mut self,
        user: UserId,
        year: i32,
        month: u32,
        fields: &BudgetFields,
    ) -> Result<MonthlyBudget, StoreError>;

    fn get_budget(&mut self, user: UserId, year: i32, month: u32) -> Result<Option<MonthlyBudget>, StoreError>;

    fn delete_budget(&mut self, user: UserId, year: i32, month: u32) -> Result<bool, StoreError>;
}

/// Read side of the device registry.
pub trait DeviceRegistry {
    fn list_devices(&mut self, user: UserId) -> Result<Vec<RegisteredDevice>, StoreError>;

    fn list_users(&mut self) -> Result<Vec<UserId>, StoreError>;
}

pub fn validate_usage(record: &NewUsageRecord) -> Result<(), StoreError> {
    if !record.daily_kwh.is_finite() {
        return Err(StoreError::invalid("daily_kwh", "must be a finite number"));
    }
    if record.daily_kwh < 0.0 {
        return Err(StoreError::invalid(
            "daily_kwh",
            format!("must be >= 0, got {}", record.daily_kwh),
        ));
    }
    if record.source.trim().is_empty() {
        return Err(StoreError::invalid("source", "must not be empty"));
    }
    Ok(())
}

pub fn validate_period(year: i32, month: u32) -> Result<i32, StoreError> {
    if !(MIN_BUDGET_YEAR..=MAX_BUDGET_YEAR).contains(&year) {
        return Err(StoreError::invalid(
            "year",
            format!("must be within {MIN_BUDGET_YEAR}..={MAX_BUDGET_YEAR}, got {year}"),
        ));
    }
    if !(1..=12).contains(&month) {
        return Err(StoreError::invalid("month", format!("must be within 1..=12, got {month}")));
    }
    Ok(month as i32)
}

/// Validate and normalise a budget submission into an insertable row.
pub fn validate_budget(
    user: UserId,
    year: i32,
    month: u32,
    fields: &BudgetFields,
) -> Result<NewMonthlyBudget, StoreError> {
    let month = validate_period(year, month)?;
    if !fields.amount.is_finite() || fields.amount <= 0.0 {
        return Err(StoreError::invalid("amount", format!("must be > 0, got {}", fields.amount)));
    }
    if let Some(price) = fields.price_per_kwh {
        if !price.is_finite() || price < 0.0 {
            return Err(StoreError::invalid("price_per_kwh", format!("must be >= 0, got {price}")));
        }
    }
    let currency = match fields.currency.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_CURRENCY.to_string(),
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) => code.to_ascii_uppercase(),
        Some(code) => {
            return Err(StoreError::invalid(
                "currency",
                format!("expected a three-letter code, got {code:?}"),
            ));
        }
    };
    let note = fields
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(NewMonthlyBudget {
        user_id: user.0,
        year,
        month,
        amount: fields.amount,
        price_per_kwh: fields.price_per_kwh,
        currency,
        note,
    })
}
