//! kWh estimation from nominal wattage and on-duration.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::models::energy::{DeviceType, DutyCycle};
use crate::utils::elapsed_hours;

/// kWh = W / 1000 * h
pub fn estimate_kwh(wattage: f64, hours: f64) -> f64 {
    wattage / 1000.0 * hours
}

/// Energy drawn by a device of `wattage` between `start` and `now`.
pub fn session_kwh(wattage: f64, start: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    estimate_kwh(wattage, elapsed_hours(start, now))
}

/// Plausible on-duration for one day of a device category.
pub fn synthetic_daily_hours<R: Rng>(device_type: DeviceType, rng: &mut R) -> f64 {
    match device_type.duty_cycle() {
        DutyCycle::AlwaysOn => 24.0,
        DutyCycle::Intermittent { min_hours, max_hours } => rng.random_range(min_hours..=max_hours),
    }
}

pub fn synthetic_daily_kwh<R: Rng>(device_type: DeviceType, rng: &mut R) -> f64 {
    estimate_kwh(device_type.wattage(), synthetic_daily_hours(device_type, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::approx_eq;
    use chrono::{Duration, TimeZone};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn formula_matches_watts_times_hours() {
        assert!(approx_eq(estimate_kwh(150.0, 10.0 / 3600.0), 0.000_416_666_666_666_666_7));
        assert!(approx_eq(estimate_kwh(2000.0, 1.5), 3.0));
        assert_eq!(estimate_kwh(150.0, 0.0), 0.0);
    }

    #[test]
    fn session_kwh_uses_millisecond_elapsed_time() {
        let t0 = Utc.with_ymd_and_hms(2025, 7, 1, 8, 0, 0).unwrap();
        let kwh = session_kwh(150.0, t0, t0 + Duration::seconds(95));
        assert!(approx_eq(kwh, 150.0 / 1000.0 * 95.0 / 3600.0));
    }

    #[test]
    fn always_on_devices_run_all_day() {
        let mut rng = SmallRng::seed_from_u64(7);
        assert!(approx_eq(synthetic_daily_kwh(DeviceType::Refrigerator, &mut rng), 4.8));
    }

    #[test]
    fn intermittent_devices_stay_in_band() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..200 {
            let hours = synthetic_daily_hours(DeviceType::Television, &mut rng);
            assert!((2.0..=6.0).contains(&hours), "{hours}");
        }
    }

    #[test]
    fn seeded_generators_repeat() {
        let mut a = SmallRng::seed_from_u64(99);
        let mut b = SmallRng::seed_from_u64(99);
        for ty in DeviceType::ALL {
            assert_eq!(synthetic_daily_kwh(ty, &mut a), synthetic_daily_kwh(ty, &mut b));
        }
    }
}
