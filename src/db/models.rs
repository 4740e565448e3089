//! Diesel model structs for the device registry view, usage records and
//! monthly budgets.
//!
//! Important: `usage_records` has no uniqueness constraint on
//! `(device_id, date)`. Readers sum every row of a day.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::energy::{DeviceId, DeviceType, RegisteredDevice, UserId};
use crate::schema;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::devices)]
pub struct Device {
    pub id: i64,
    pub user_id: i64,
    pub device_type: String,
    pub is_on: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn to_registered(&self) -> RegisteredDevice {
        RegisteredDevice {
            device_id: DeviceId(self.id),
            user_id: UserId(self.user_id),
            device_type: DeviceType::from_key(&self.device_type),
            is_on: self.is_on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::usage_records)]
pub struct UsageRecord {
    pub id: i64,
    pub user_id: i64,
    pub device_id: i64,
    pub date: NaiveDate,
    pub daily_kwh: f64,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::usage_records)]
pub struct NewUsageRecord {
    pub user_id: i64,
    pub device_id: i64,
    pub date: NaiveDate,
    pub daily_kwh: f64,
    pub source: String,
}

impl NewUsageRecord {
    pub fn new(user_id: UserId, device_id: DeviceId, date: NaiveDate, daily_kwh: f64, source: &str) -> Self {
        NewUsageRecord {
            user_id: user_id.0,
            device_id: device_id.0,
            date,
            daily_kwh,
            source: source.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::monthly_budgets)]
pub struct MonthlyBudget {
    pub id: i64,
    pub user_id: i64,
    pub year: i32,
    pub month: i32,
    pub amount: f64,
    pub price_per_kwh: Option<f64>,
    pub currency: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = schema::monthly_budgets)]
#[diesel(treat_none_as_null = true)]
pub struct NewMonthlyBudget {
    pub user_id: i64,
    pub year: i32,
    pub month: i32,
    pub amount: f64,
    pub price_per_kwh: Option<f64>,
    pub currency: String,
    pub note: Option<String>,
}
