//! In-process store used by the unit tests. Mirrors the PostgreSQL
//! semantics, including write-boundary validation.

use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::db::models::{MonthlyBudget, NewUsageRecord, UsageRecord};
use crate::db::store::{
    validate_budget, validate_period, validate_usage, BudgetFields, BudgetStore, DailyTotal, DeviceRegistry,
    StoreError, UsageStore,
};
use crate::models::energy::{DeviceId, RegisteredDevice, UserId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Vec<UsageRecord>,
    budgets: BTreeMap<(i64, i32, i32), MonthlyBudget>,
    devices: Vec<RegisteredDevice>,
    next_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    pub fn put_device(&mut self, device: RegisteredDevice) {
        match self.devices.iter_mut().find(|d| d.device_id == device.device_id) {
            Some(existing) => *existing = device,
            None => self.devices.push(device),
        }
    }

    pub fn set_device_on(&mut self, device_id: DeviceId, is_on: bool) {
        if let Some(d) = self.devices.iter_mut().find(|d| d.device_id == device_id) {
            d.is_on = is_on;
        }
    }

    pub fn remove_device(&mut self, device_id: DeviceId) {
        self.devices.retain(|d| d.device_id != device_id);
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn matching(
        &self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = &UsageRecord> {
        self.records.iter().filter(move |r| {
            r.user_id == user.0
                && device.is_none_or(|d| r.device_id == d.0)
                && r.date >= start
                && r.date <= end
        })
    }
}

impl UsageStore for MemoryStore {
    fn insert_usage(&mut self, record: &NewUsageRecord) -> Result<UsageRecord, StoreError> {
        validate_usage(record)?;
        let row = UsageRecord {
            id: self.allocate_id(),
            user_id: record.user_id,
            device_id: record.device_id,
            date: record.date,
            daily_kwh: record.daily_kwh,
            source: record.source.clone(),
            created_at: Utc::now(),
        };
        self.records.push(row.clone());
        Ok(row)
    }

    fn insert_usage_batch(&mut self, records: &[NewUsageRecord]) -> Result<usize, StoreError> {
        for record in records {
            validate_usage(record)?;
        }
        for record in records {
            self.insert_usage(record)?;
        }
        Ok(records.len())
    }

    fn query_range(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        let mut rows: Vec<UsageRecord> = self.matching(user, device, start, end).cloned().collect();
        rows.sort_by_key(|r| (r.date, r.id));
        Ok(rows)
    }

    fn sum_range(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, StoreError> {
        Ok(self.matching(user, device, start, end).map(|r| r.daily_kwh).sum())
    }

    fn sum_by_day(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyTotal>, StoreError> {
        let mut by_day: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
        for r in self.matching(user, device, start, end) {
            let entry = by_day.entry(r.date).or_insert((0.0, 0));
            entry.0 += r.daily_kwh;
            entry.1 += 1;
        }
        Ok(by_day
            .into_iter()
            .map(|(date, (total_kwh, record_count))| DailyTotal {
                date,
                total_kwh,
                record_count,
            })
            .collect())
    }

    fn device_total(&mut self, user: UserId, device: DeviceId) -> Result<f64, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.user_id == user.0 && r.device_id == device.0)
            .map(|r| r.daily_kwh)
            .sum())
    }

    fn recent(&mut self, user: UserId, device: Option<DeviceId>, limit: usize) -> Result<Vec<UsageRecord>, StoreError> {
        let mut rows: Vec<UsageRecord> = self
            .records
            .iter()
            .filter(|r| r.user_id == user.0 && device.is_none_or(|d| r.device_id == d.0))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        rows.truncate(limit);
        Ok(rows)
    }
}

impl BudgetStore for MemoryStore {
    fn upsert_budget(
        &mut self,
        user: UserId,
        year: i32,
        month: u32,
        fields: &BudgetFields,
    ) -> Result<MonthlyBudget, StoreError> {
        let row = validate_budget(user, year, month, fields)?;
        let key = (user.0, row.year, row.month);
        let now = Utc::now();
        let id = match self.budgets.get(&key) {
            Some(existing) => existing.id,
            None => self.allocate_id(),
        };
        let created_at = self.budgets.get(&key).map(|b| b.created_at).unwrap_or(now);
        let saved = MonthlyBudget {
            id,
            user_id: row.user_id,
            year: row.year,
            month: row.month,
            amount: row.amount,
            price_per_kwh: row.price_per_kwh,
            currency: row.currency,
            note: row.note,
            created_at,
            updated_at: now,
        };
        self.budgets.insert(key, saved.clone());
        Ok(saved)
    }

    fn get_budget(&mut self, user: UserId, year: i32, month: u32) -> Result<Option<MonthlyBudget>, StoreError> {
        let month = validate_period(year, month)?;
        Ok(self.budgets.get(&(user.0, year, month)).cloned())
    }

    fn delete_budget(&mut self, user: UserId, year: i32, month: u32) -> Result<bool, StoreError> {
        let month = validate_period(year, month)?;
        Ok(self.budgets.remove(&(user.0, year, month)).is_some())
    }
}

impl DeviceRegistry for MemoryStore {
    fn list_devices(&mut self, user: UserId) -> Result<Vec<RegisteredDevice>, StoreError> {
        Ok(self.devices.iter().filter(|d| d.user_id == user).cloned().collect())
    }

    fn list_users(&mut self) -> Result<Vec<UserId>, StoreError> {
        let mut users: Vec<UserId> = self.devices.iter().map(|d| d.user_id).collect();
        users.sort_unstable();
        users.dedup();
        Ok(users)
    }
}
