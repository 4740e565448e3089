//! Household device and usage domain types.
//!
//! Identifiers are opaque integers owned by the registry and user layers;
//! the newtypes keep them from being mixed up in the services.

use core::fmt;
use serde::{Deserialize, Serialize};

/// Wattage used for device types the registry reports but we do not know.
pub const DEFAULT_WATTAGE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Household appliance categories known to the device registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Refrigerator,
    WashingMachine,
    Dishwasher,
    Microwave,
    Oven,
    Stove,
    AirConditioner,
    Heater,
    Television,
    Computer,
    Laptop,
    PhoneCharger,
    Lighting,
    Fan,
    VacuumCleaner,
    Blender,
    Toaster,
    CoffeeMaker,
    #[serde(other)]
    Other,
}

/// How long a device category typically runs on a given day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DutyCycle {
    /// Runs around the clock (24h/day).
    AlwaysOn,
    /// Runs for a random duration within `[min_hours, max_hours]`.
    Intermittent { min_hours: f64, max_hours: f64 },
}

impl DeviceType {
    pub const ALL: [DeviceType; 19] = [
        DeviceType::Refrigerator,
        DeviceType::WashingMachine,
        DeviceType::Dishwasher,
        DeviceType::Microwave,
        DeviceType::Oven,
        DeviceType::Stove,
        DeviceType::AirConditioner,
        DeviceType::Heater,
        DeviceType::Television,
        DeviceType::Computer,
        DeviceType::Laptop,
        DeviceType::PhoneCharger,
        DeviceType::Lighting,
        DeviceType::Fan,
        DeviceType::VacuumCleaner,
        DeviceType::Blender,
        DeviceType::Toaster,
        DeviceType::CoffeeMaker,
        DeviceType::Other,
    ];

    /// Parse a registry type key. Unknown keys map to `Other`.
    pub fn from_key(key: &str) -> DeviceType {
        let normalized = key.trim().to_ascii_lowercase();
        serde_json::from_value(serde_json::Value::String(normalized)).unwrap_or(DeviceType::Other)
    }

    /// Nominal power draw in watts.
    pub fn wattage(self) -> f64 {
        match self {
            DeviceType::Refrigerator => 200.0,
            DeviceType::WashingMachine => 500.0,
            DeviceType::Dishwasher => 1500.0,
            DeviceType::Microwave => 1000.0,
            DeviceType::Oven => 2500.0,
            DeviceType::Stove => 2000.0,
            DeviceType::AirConditioner => 1500.0,
            DeviceType::Heater => 1200.0,
            DeviceType::Television => 150.0,
            DeviceType::Computer => 300.0,
            DeviceType::Laptop => 65.0,
            DeviceType::PhoneCharger => 10.0,
            DeviceType::Lighting => 60.0,
            DeviceType::Fan => 75.0,
            DeviceType::VacuumCleaner => 1000.0,
            DeviceType::Blender => 400.0,
            DeviceType::Toaster => 800.0,
            DeviceType::CoffeeMaker => 1000.0,
            DeviceType::Other => DEFAULT_WATTAGE,
        }
    }

    /// Typical daily on-duration, used only for synthetic history.
    pub fn duty_cycle(self) -> DutyCycle {
        let band = |min_hours, max_hours| DutyCycle::Intermittent { min_hours, max_hours };
        match self {
            DeviceType::Refrigerator => DutyCycle::AlwaysOn,
            DeviceType::WashingMachine => band(0.5, 1.5),
            DeviceType::Dishwasher => band(1.0, 2.0),
            DeviceType::Microwave => band(0.1, 0.5),
            DeviceType::Oven => band(0.5, 1.5),
            DeviceType::Stove => band(0.5, 2.0),
            DeviceType::AirConditioner => band(4.0, 10.0),
            DeviceType::Heater => band(2.0, 8.0),
            DeviceType::Television => band(2.0, 6.0),
            DeviceType::Computer => band(3.0, 8.0),
            DeviceType::Laptop => band(2.0, 8.0),
            DeviceType::PhoneCharger => band(1.0, 3.0),
            DeviceType::Lighting => band(4.0, 8.0),
            DeviceType::Fan => band(3.0, 10.0),
            DeviceType::VacuumCleaner => band(0.2, 0.8),
            DeviceType::Blender => band(0.05, 0.2),
            DeviceType::Toaster => band(0.1, 0.3),
            DeviceType::CoffeeMaker => band(0.2, 0.5),
            DeviceType::Other => band(1.0, 4.0),
        }
    }
}

/// A device as reported by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub device_type: DeviceType,
    pub is_on: bool,
}

/// Where a usage record came from.
pub mod usage_source {
    /// Written by the realtime tracker.
    pub const TRACKED: &str = "tracked";
    /// Entered by the user.
    pub const MANUAL: &str = "manual";
    /// Generated by the seed utility; never measured.
    pub const SYNTHETIC: &str = "synthetic";
}
