use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, Instant};

use crate::db::store::{DeviceRegistry, UsageStore};
use crate::models::energy::{DeviceId, RegisteredDevice, UserId};
use crate::services::tracking::{TickReport, TrackingRegistry};

#[derive(Debug, Default)]
pub struct PollReport {
    pub started: Vec<DeviceId>,
    pub stopped: Vec<DeviceId>,
    pub tick: TickReport,
}

pub fn run_loop<S: UsageStore + DeviceRegistry + ?Sized>(
    store: &mut S,
    registry: &mut TrackingRegistry,
    interval: Duration,
) -> Result<(), String> {
    loop {
        let tick_start = Instant::now();

        let report = poll_once(store, registry, Utc::now());
        if report.tick.persisted > 0 {
            debug!(
                "Realtime: persisted {} record(s), {:.6} kWh",
                report.tick.persisted, report.tick.persisted_kwh
            );
        }
        for device in registry.tracked_devices() {
            debug!("Realtime: device {} live total {:.6} kWh", device.device_id, device.consumption_kwh);
        }

        // Maintain steady cadence
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }
}

/// One pass: follow on/off changes in the device registry, then let every
/// tracker run what is due at `now`.
pub fn poll_once<S: UsageStore + DeviceRegistry + ?Sized>(
    store: &mut S,
    registry: &mut TrackingRegistry,
    now: DateTime<Utc>,
) -> PollReport {
    let mut report = PollReport::default();
    match store.list_users() {
        Ok(users) => {
            for user in &users {
                match store.list_devices(*user) {
                    Ok(devices) => apply_device_states(store, registry, *user, &devices, now, &mut report),
                    Err(e) => warn!("Realtime: listing devices of user {} failed: {}", user, e),
                }
            }
            // owners whose last device was removed are no longer listed
            let listed: BTreeSet<UserId> = users.into_iter().collect();
            let unlisted: BTreeSet<UserId> = registry
                .tracked_ids()
                .into_iter()
                .filter_map(|id| registry.tracker(id).map(|t| t.user_id))
                .filter(|owner| !listed.contains(owner))
                .collect();
            for owner in unlisted {
                apply_device_states(store, registry, owner, &[], now, &mut report);
            }
        }
        Err(e) => warn!("Realtime: listing users failed: {}", e),
    }
    report.tick = registry.tick(store, now);
    report
}

/// Start trackers for devices that are on, stop them for devices that are
/// off or no longer registered.
pub fn apply_device_states<S: UsageStore + ?Sized>(
    store: &mut S,
    registry: &mut TrackingRegistry,
    user: UserId,
    devices: &[RegisteredDevice],
    now: DateTime<Utc>,
    report: &mut PollReport,
) {
    for device in devices.iter().filter(|d| d.user_id == user) {
        let tracking = registry.is_tracking(device.device_id);
        if device.is_on && !tracking {
            match registry.start(store, user, device.device_id, device.device_type.wattage(), now) {
                Ok(true) => report.started.push(device.device_id),
                Ok(false) => {}
                // retried on the next poll while the device stays on
                Err(e) => warn!("Realtime: {}", e),
            }
        } else if !device.is_on && tracking && registry.stop(store, device.device_id, now).is_some() {
            report.stopped.push(device.device_id);
        }
    }

    let registered: BTreeSet<DeviceId> = devices.iter().map(|d| d.device_id).collect();
    let orphaned: Vec<DeviceId> = registry
        .tracked_ids()
        .into_iter()
        .filter(|id| registry.tracker(*id).is_some_and(|t| t.user_id == user) && !registered.contains(id))
        .collect();
    for device_id in orphaned {
        info!("Realtime: device {} of user {} was removed; stopping its tracker", device_id, user);
        if registry.stop(store, device_id, now).is_some() {
            report.stopped.push(device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::models::energy::DeviceType;
    use crate::services::estimator::estimate_kwh;
    use crate::services::tracking::Cadence;
    use crate::utils::approx_eq;
    use chrono::{Duration as ChronoDuration, TimeZone};

    const USER: UserId = UserId(5);
    const TV: DeviceId = DeviceId(10);
    const FAN: DeviceId = DeviceId(11);

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap() + ChronoDuration::seconds(secs)
    }

    fn store_with_devices() -> MemoryStore {
        let mut store = MemoryStore::new();
        for (id, device_type) in [(TV, DeviceType::Television), (FAN, DeviceType::Fan)] {
            store.put_device(RegisteredDevice {
                device_id: id,
                user_id: USER,
                device_type,
                is_on: false,
            });
        }
        store
    }

    fn session_total(store: &MemoryStore, device: DeviceId) -> f64 {
        store
            .records()
            .iter()
            .filter(|r| r.device_id == device.0)
            .map(|r| r.daily_kwh)
            .sum()
    }

    #[test]
    fn follows_registry_on_off_transitions() {
        let mut store = store_with_devices();
        let mut registry = TrackingRegistry::new(Cadence::default());

        let report = poll_once(&mut store, &mut registry, t(0));
        assert!(report.started.is_empty());

        store.set_device_on(TV, true);
        let report = poll_once(&mut store, &mut registry, t(0));
        assert_eq!(report.started, vec![TV]);
        assert!(registry.is_tracking(TV));
        assert!(!registry.is_tracking(FAN));

        for s in 1..=95 {
            poll_once(&mut store, &mut registry, t(s));
        }
        store.set_device_on(TV, false);
        let report = poll_once(&mut store, &mut registry, t(95));
        assert_eq!(report.stopped, vec![TV]);
        assert!(!registry.is_tracking(TV));

        let expected = estimate_kwh(DeviceType::Television.wattage(), 95.0 / 3600.0);
        assert!(approx_eq(session_total(&store, TV), expected));
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn removed_device_stops_its_tracker() {
        let mut store = store_with_devices();
        let mut registry = TrackingRegistry::new(Cadence::default());
        store.set_device_on(FAN, true);
        poll_once(&mut store, &mut registry, t(0));
        assert!(registry.is_tracking(FAN));

        store.remove_device(FAN);
        // the user still owns TV, so it is still listed
        let report = poll_once(&mut store, &mut registry, t(30));
        assert_eq!(report.stopped, vec![FAN]);
        assert!(registry.tracked_ids().is_empty());
        assert!(approx_eq(session_total(&store, FAN), estimate_kwh(75.0, 30.0 / 3600.0)));
    }

    #[test]
    fn removing_the_only_device_stops_its_tracker() {
        let mut store = MemoryStore::new();
        let heater = DeviceId(1);
        store.put_device(RegisteredDevice {
            device_id: heater,
            user_id: UserId(9),
            device_type: DeviceType::Heater,
            is_on: true,
        });
        let mut registry = TrackingRegistry::new(Cadence::default());
        poll_once(&mut store, &mut registry, t(0));
        assert!(registry.is_tracking(heater));

        store.remove_device(heater);
        let report = poll_once(&mut store, &mut registry, t(60));
        assert_eq!(report.stopped, vec![heater]);
        assert!(!registry.is_tracking(heater));

        let written = store.records().len();
        for minute in 2..=60 {
            poll_once(&mut store, &mut registry, t(minute * 60));
        }
        assert!(!registry.is_tracking(heater));
        assert_eq!(store.records().len(), written);
        assert!(approx_eq(session_total(&store, heater), estimate_kwh(1200.0, 60.0 / 3600.0)));
    }

    #[test]
    fn other_users_trackers_are_untouched() {
        let mut store = store_with_devices();
        let mut registry = TrackingRegistry::new(Cadence::default());
        store.set_device_on(TV, true);
        poll_once(&mut store, &mut registry, t(0));

        let mut report = PollReport::default();
        apply_device_states(&mut store, &mut registry, UserId(99), &[], t(5), &mut report);
        assert!(report.stopped.is_empty());
        assert!(registry.is_tracking(TV));
    }

    #[test]
    fn repeated_on_state_does_not_restart() {
        let mut store = store_with_devices();
        let mut registry = TrackingRegistry::new(Cadence::default());
        store.set_device_on(TV, true);
        poll_once(&mut store, &mut registry, t(0));
        let report = poll_once(&mut store, &mut registry, t(20));
        assert!(report.started.is_empty());
        assert_eq!(registry.tracker(TV).map(|tr| tr.started_at), Some(t(0)));
    }
}
