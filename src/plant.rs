//! Shared plant state.
//!
//! Every field is its own atomic so the physics activity, the control
//! activity and the fault injector can all touch the plant without a lock.
//! Individual loads and stores are atomic and immediately visible; a
//! [`PlantReading`] assembled from several loads is *not* a transaction and
//! may mix values from either side of a concurrent physics step.

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;

/// Boiler capacity (litres)
pub const CAPACITY: i32 = 1000;
/// Critical low limit (litres)
pub const CRITICAL_LOW: i32 = 150;
/// Critical high limit (litres)
pub const CRITICAL_HIGH: i32 = 850;
/// Lower edge of the normal band (litres)
pub const NORMAL_LOW: i32 = 400;
/// Upper edge of the normal band (litres)
pub const NORMAL_HIGH: i32 = 600;
/// Midpoint of the normal band, used by the single-pump policies
pub const NORMAL_MID: i32 = (NORMAL_LOW + NORMAL_HIGH) / 2;
/// Nominal steam outflow (litres/second)
pub const NOMINAL_STEAM_RATE: i32 = 70;
/// Capacity of one pump (litres/second)
pub const PUMP_CAPACITY: i32 = 50;

pub const INITIAL_WATER_VOLUME: i32 = 500;

const_assert!(0 < CRITICAL_LOW);
const_assert!(CRITICAL_LOW < NORMAL_LOW);
const_assert!(NORMAL_LOW < NORMAL_HIGH);
const_assert!(NORMAL_HIGH < CRITICAL_HIGH);
const_assert!(CRITICAL_HIGH < CAPACITY);

/// Components whose health can be flipped from outside the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Component {
    Pump1,
    Pump2,
    WaterSensor,
    SteamSensor,
}

impl core::fmt::Display for Component {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Component::Pump1 => write!(f, "pump 1"),
            Component::Pump2 => write!(f, "pump 2"),
            Component::WaterSensor => write!(f, "water sensor"),
            Component::SteamSensor => write!(f, "steam sensor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub pump1: bool,
    pub pump2: bool,
    pub water_sensor: bool,
    pub steam_sensor: bool,
}

impl Health {
    pub fn all_healthy() -> Self {
        Self {
            pump1: true,
            pump2: true,
            water_sensor: true,
            steam_sensor: true,
        }
    }

    pub fn both_pumps(&self) -> bool {
        self.pump1 && self.pump2
    }

    pub fn any_pump(&self) -> bool {
        self.pump1 || self.pump2
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::all_healthy()
    }
}

/// Desired on/off state of the two pumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PumpCommands {
    pub pump1: bool,
    pub pump2: bool,
}

impl PumpCommands {
    pub const OFF: Self = Self { pump1: false, pump2: false };

    pub fn new(pump1: bool, pump2: bool) -> Self {
        Self { pump1, pump2 }
    }
}

/// Field-by-field snapshot of [`PlantState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantReading {
    pub water_volume: i32,
    pub steam_rate: i32,
    pub health: Health,
    pub commands: PumpCommands,
}

impl PlantReading {
    /// Reading of a freshly started plant
    pub fn initial() -> Self {
        Self {
            water_volume: INITIAL_WATER_VOLUME,
            steam_rate: NOMINAL_STEAM_RATE,
            health: Health::all_healthy(),
            commands: PumpCommands::OFF,
        }
    }

    /// `volume ≤ M1 ∨ volume ≥ M2`
    pub fn is_emergency_level(&self) -> bool {
        self.water_volume <= CRITICAL_LOW || self.water_volume >= CRITICAL_HIGH
    }
}

#[derive(Debug)]
pub struct PlantState {
    water_volume: AtomicI32,
    steam_rate: AtomicI32,
    pump1_healthy: AtomicBool,
    pump2_healthy: AtomicBool,
    water_sensor_healthy: AtomicBool,
    steam_sensor_healthy: AtomicBool,
    pump1_commanded: AtomicBool,
    pump2_commanded: AtomicBool,
}

impl PlantState {
    pub fn new() -> Self {
        Self::from_reading(&PlantReading::initial())
    }

    /// Build a plant with arbitrary starting values. Volume is clamped to `[0, C]`.
    pub fn from_reading(reading: &PlantReading) -> Self {
        Self {
            water_volume: AtomicI32::new(reading.water_volume.clamp(0, CAPACITY)),
            steam_rate: AtomicI32::new(reading.steam_rate),
            pump1_healthy: AtomicBool::new(reading.health.pump1),
            pump2_healthy: AtomicBool::new(reading.health.pump2),
            water_sensor_healthy: AtomicBool::new(reading.health.water_sensor),
            steam_sensor_healthy: AtomicBool::new(reading.health.steam_sensor),
            pump1_commanded: AtomicBool::new(reading.commands.pump1),
            pump2_commanded: AtomicBool::new(reading.commands.pump2),
        }
    }

    /// Load every field once. Not atomic as a whole.
    pub fn read(&self) -> PlantReading {
        PlantReading {
            water_volume: self.water_volume(),
            steam_rate: self.steam_rate(),
            health: self.health(),
            commands: self.commands(),
        }
    }

    pub fn water_volume(&self) -> i32 {
        self.water_volume.load(Ordering::SeqCst)
    }

    pub fn steam_rate(&self) -> i32 {
        self.steam_rate.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> Health {
        Health {
            pump1: self.pump1_healthy.load(Ordering::SeqCst),
            pump2: self.pump2_healthy.load(Ordering::SeqCst),
            water_sensor: self.water_sensor_healthy.load(Ordering::SeqCst),
            steam_sensor: self.steam_sensor_healthy.load(Ordering::SeqCst),
        }
    }

    pub fn is_healthy(&self, component: Component) -> bool {
        self.health_flag(component).load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> PumpCommands {
        PumpCommands {
            pump1: self.pump1_commanded.load(Ordering::SeqCst),
            pump2: self.pump2_commanded.load(Ordering::SeqCst),
        }
    }

    /// Fault-injection entry point. Returns the previous health value.
    pub fn set_health(&self, component: Component, healthy: bool) -> bool {
        self.health_flag(component).swap(healthy, Ordering::SeqCst)
    }

    /// Written by the controller only.
    pub(crate) fn set_commands(&self, commands: PumpCommands) {
        self.pump1_commanded.store(commands.pump1, Ordering::SeqCst);
        self.pump2_commanded.store(commands.pump2, Ordering::SeqCst);
    }

    /// Written by the physical model only.
    pub(crate) fn set_water_volume(&self, volume: i32) {
        // NASA Rule 5: Safety assertion for the capacity invariant
        debug_assert!(
            (0..=CAPACITY).contains(&volume),
            "Water volume {} outside [0, {}]",
            volume, CAPACITY
        );
        self.water_volume.store(volume, Ordering::SeqCst);
    }

    /// Written by the physical model only.
    pub(crate) fn set_steam_rate(&self, rate: i32) {
        self.steam_rate.store(rate, Ordering::SeqCst);
    }

    fn health_flag(&self, component: Component) -> &AtomicBool {
        match component {
            Component::Pump1 => &self.pump1_healthy,
            Component::Pump2 => &self.pump2_healthy,
            Component::WaterSensor => &self.water_sensor_healthy,
            Component::SteamSensor => &self.steam_sensor_healthy,
        }
    }
}

impl Default for PlantState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plant_initial_state() {
        let plant = PlantState::new();
        let reading = plant.read();

        assert_eq!(reading.water_volume, 500);
        assert_eq!(reading.steam_rate, 70);
        assert_eq!(reading.health, Health::all_healthy());
        assert_eq!(reading.commands, PumpCommands::OFF);
    }

    #[test]
    fn test_set_health_returns_previous_value() {
        let plant = PlantState::new();

        assert!(plant.set_health(Component::Pump1, false));
        assert!(!plant.is_healthy(Component::Pump1));
        assert!(!plant.set_health(Component::Pump1, true));
        assert!(plant.is_healthy(Component::Pump1));

        // Other flags are independent
        plant.set_health(Component::SteamSensor, false);
        let health = plant.health();
        assert!(health.pump1 && health.pump2 && health.water_sensor);
        assert!(!health.steam_sensor);
    }

    #[test]
    fn test_from_reading_clamps_volume() {
        let mut reading = PlantReading::initial();
        reading.water_volume = 1500;
        assert_eq!(PlantState::from_reading(&reading).water_volume(), CAPACITY);

        reading.water_volume = -20;
        assert_eq!(PlantState::from_reading(&reading).water_volume(), 0);
    }

    #[test]
    fn test_emergency_level_boundaries() {
        let mut reading = PlantReading::initial();
        for (volume, expected) in [(150, true), (151, false), (849, false), (850, true), (0, true)] {
            reading.water_volume = volume;
            assert_eq!(reading.is_emergency_level(), expected, "volume {}", volume);
        }
    }
}
