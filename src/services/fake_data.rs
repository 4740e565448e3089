//! Explicit synthetic history for demos and local development.
//!
//! Only invoked from startup when `SEED_SYNTHETIC_DAYS` is set. Devices that
//! already have any usage history are left alone, and every generated record
//! is labelled `synthetic`.

use chrono::{Duration, NaiveDate};
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::db::models::NewUsageRecord;
use crate::db::store::{DeviceRegistry, StoreError, UsageStore};
use crate::models::energy::{usage_source, RegisteredDevice, UserId};
use crate::services::estimator::synthetic_daily_kwh;

const SEED: u64 = 0x0E1E_C7A1_CB0D_6E70;
pub const MAX_SEED_DAYS: u32 = 366;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub devices_seeded: usize,
    pub devices_skipped: usize,
    pub records_inserted: usize,
}

/// Seeds every user in the registry with a fixed generator seed.
pub fn run<S: UsageStore + DeviceRegistry + ?Sized>(
    store: &mut S,
    days: u32,
    today: NaiveDate,
) -> Result<SeedReport, StoreError> {
    let mut rng = SmallRng::seed_from_u64(SEED);
    let mut total = SeedReport::default();
    for user in store.list_users()? {
        let report = seed_user(store, user, days, today, &mut rng)?;
        total.devices_seeded += report.devices_seeded;
        total.devices_skipped += report.devices_skipped;
        total.records_inserted += report.records_inserted;
    }
    info!(
        "Fake data: complete (days={}, devices_seeded={}, devices_skipped={}, inserts={})",
        days, total.devices_seeded, total.devices_skipped, total.records_inserted
    );
    Ok(total)
}

/// One record per day of `[today - (days-1), today]` for each of `user`'s
/// devices without history.
pub fn seed_user<S, R>(
    store: &mut S,
    user: UserId,
    days: u32,
    today: NaiveDate,
    rng: &mut R,
) -> Result<SeedReport, StoreError>
where
    S: UsageStore + DeviceRegistry + ?Sized,
    R: Rng,
{
    if days == 0 || days > MAX_SEED_DAYS {
        return Err(StoreError::Validation {
            field: "days",
            reason: format!("must be within 1..={MAX_SEED_DAYS}, got {days}"),
        });
    }

    let mut report = SeedReport::default();
    for device in store.list_devices(user)? {
        if has_any_record(store, &device)? {
            debug!("Fake data: device {} already has history; skipping", device.device_id);
            report.devices_skipped += 1;
            continue;
        }
        let batch = synthetic_records(&device, days, today, rng);
        report.records_inserted += store.insert_usage_batch(&batch)?;
        report.devices_seeded += 1;
    }
    info!(
        "Fake data: user {} seeded {} device(s) over {} day(s)",
        user, report.devices_seeded, days
    );
    Ok(report)
}

// A device with only zero-kWh records has history too.
fn has_any_record<S: UsageStore + ?Sized>(store: &mut S, device: &RegisteredDevice) -> Result<bool, StoreError> {
    Ok(!store.recent(device.user_id, Some(device.device_id), 1)?.is_empty())
}

fn synthetic_records<R: Rng>(
    device: &RegisteredDevice,
    days: u32,
    today: NaiveDate,
    rng: &mut R,
) -> Vec<NewUsageRecord> {
    let start = today - Duration::days(i64::from(days) - 1);
    (0..days)
        .map(|offset| {
            let date = start + Duration::days(i64::from(offset));
            let kwh = synthetic_daily_kwh(device.device_type, rng);
            NewUsageRecord::new(device.user_id, device.device_id, date, kwh, usage_source::SYNTHETIC)
        })
        .collect()
}
