//! PostgreSQL implementation of the store contracts.

use chrono::{NaiveDate, Utc};
use diesel::dsl::{count, sum};
use diesel::prelude::*;
use diesel::PgConnection;

use crate::db::models::{Device, MonthlyBudget, NewUsageRecord, UsageRecord};
use crate::db::store::{
    validate_budget, validate_period, validate_usage, BudgetFields, BudgetStore, DailyTotal, DeviceRegistry,
    StoreError, UsageStore,
};
use crate::models::energy::{DeviceId, RegisteredDevice, UserId};
use crate::schema;

pub struct PgStore {
    conn: PgConnection,
}

impl PgStore {
    pub fn new(conn: PgConnection) -> Self {
        PgStore { conn }
    }
}

fn to_daily_totals(rows: Vec<(NaiveDate, Option<f64>, i64)>) -> Vec<DailyTotal> {
    rows.into_iter()
        .map(|(date, total, n)| DailyTotal {
            date,
            total_kwh: total.unwrap_or(0.0),
            record_count: n.max(0) as usize,
        })
        .collect()
}

impl UsageStore for PgStore {
    fn insert_usage(&mut self, record: &NewUsageRecord) -> Result<UsageRecord, StoreError> {
        use schema::usage_records::dsl as U;

        validate_usage(record)?;
        let row = diesel::insert_into(U::usage_records)
            .values(record)
            .returning(UsageRecord::as_returning())
            .get_result(&mut self.conn)?;
        Ok(row)
    }

    fn insert_usage_batch(&mut self, records: &[NewUsageRecord]) -> Result<usize, StoreError> {
        use schema::usage_records::dsl as U;

        if records.is_empty() {
            return Ok(0);
        }
        for record in records {
            validate_usage(record)?;
        }
        let inserted = diesel::insert_into(U::usage_records)
            .values(records)
            .execute(&mut self.conn)?;
        Ok(inserted)
    }

    fn query_range(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        use schema::usage_records::dsl as U;

        let mut query = U::usage_records
            .filter(U::user_id.eq(user.0))
            .filter(U::date.between(start, end))
            .select(UsageRecord::as_select())
            .order((U::date.asc(), U::id.asc()))
            .into_boxed();
        if let Some(d) = device {
            query = query.filter(U::device_id.eq(d.0));
        }
        Ok(query.load(&mut self.conn)?)
    }

    fn sum_range(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<f64, StoreError> {
        use schema::usage_records::dsl as U;

        let base = U::usage_records
            .filter(U::user_id.eq(user.0))
            .filter(U::date.between(start, end));
        let total: Option<f64> = match device {
            Some(d) => base
                .filter(U::device_id.eq(d.0))
                .select(sum(U::daily_kwh))
                .first(&mut self.conn)?,
            None => base.select(sum(U::daily_kwh)).first(&mut self.conn)?,
        };
        Ok(total.unwrap_or(0.0))
    }

    fn sum_by_day(
        &mut self,
        user: UserId,
        device: Option<DeviceId>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyTotal>, StoreError> {
        use schema::usage_records::dsl as U;

        let base = U::usage_records
            .filter(U::user_id.eq(user.0))
            .filter(U::date.between(start, end));
        let rows: Vec<(NaiveDate, Option<f64>, i64)> = match device {
            Some(d) => base
                .filter(U::device_id.eq(d.0))
                .group_by(U::date)
                .select((U::date, sum(U::daily_kwh), count(U::id)))
                .order(U::date.asc())
                .load(&mut self.conn)?,
            None => base
                .group_by(U::date)
                .select((U::date, sum(U::daily_kwh), count(U::id)))
                .order(U::date.asc())
                .load(&mut self.conn)?,
        };
        Ok(to_daily_totals(rows))
    }

    fn device_total(&mut self, user: UserId, device: DeviceId) -> Result<f64, StoreError> {
        use schema::usage_records::dsl as U;

        let total: Option<f64> = U::usage_records
            .filter(U::user_id.eq(user.0).and(U::device_id.eq(device.0)))
            .select(sum(U::daily_kwh))
            .first(&mut self.conn)?;
        Ok(total.unwrap_or(0.0))
    }

    fn recent(&mut self, user: UserId, device: Option<DeviceId>, limit: usize) -> Result<Vec<UsageRecord>, StoreError> {
        use schema::usage_records::dsl as U;

        let mut query = U::usage_records
            .filter(U::user_id.eq(user.0))
            .select(UsageRecord::as_select())
            .order((U::date.desc(), U::id.desc()))
            .limit(limit as i64)
            .into_boxed();
        if let Some(d) = device {
            query = query.filter(U::device_id.eq(d.0));
        }
        Ok(query.load(&mut self.conn)?)
    }
}

impl BudgetStore for PgStore {
    fn upsert_budget(
        &mut self,
        user: UserId,
        year: i32,
        month: u32,
        fields: &BudgetFields,
    ) -> Result<MonthlyBudget, StoreError> {
        use schema::monthly_budgets::dsl as B;

        let row = validate_budget(user, year, month, fields)?;
        let saved = diesel::insert_into(B::monthly_budgets)
            .values(&row)
            .on_conflict((B::user_id, B::year, B::month))
            .do_update()
            .set((&row, B::updated_at.eq(Utc::now())))
            .returning(MonthlyBudget::as_returning())
            .get_result(&mut self.conn)?;
        Ok(saved)
    }

    fn get_budget(&mut self, user: UserId, year: i32, month: u32) -> Result<Option<MonthlyBudget>, StoreError> {
        use schema::monthly_budgets::dsl as B;

        let month = validate_period(year, month)?;
        let found = B::monthly_budgets
            .filter(B::user_id.eq(user.0).and(B::year.eq(year)).and(B::month.eq(month)))
            .select(MonthlyBudget::as_select())
            .first(&mut self.conn)
            .optional()?;
        Ok(found)
    }

    fn delete_budget(&mut self, user: UserId, year: i32, month: u32) -> Result<bool, StoreError> {
        use schema::monthly_budgets::dsl as B;

        let month = validate_period(year, month)?;
        let deleted = diesel::delete(
            B::monthly_budgets.filter(B::user_id.eq(user.0).and(B::year.eq(year)).and(B::month.eq(month))),
        )
        .execute(&mut self.conn)?;
        Ok(deleted > 0)
    }
}

impl DeviceRegistry for PgStore {
    fn list_devices(&mut self, user: UserId) -> Result<Vec<RegisteredDevice>, StoreError> {
        use schema::devices::dsl as D;

        let rows: Vec<Device> = D::devices
            .filter(D::user_id.eq(user.0))
            .select(Device::as_select())
            .order(D::id.asc())
            .load(&mut self.conn)?;
        Ok(rows.iter().map(Device::to_registered).collect())
    }

    fn list_users(&mut self) -> Result<Vec<UserId>, StoreError> {
        use schema::devices::dsl as D;

        let ids: Vec<i64> = D::devices
            .select(D::user_id)
            .distinct()
            .order(D::user_id.asc())
            .load(&mut self.conn)?;
        Ok(ids.into_iter().map(UserId).collect())
    }
}
