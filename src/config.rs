use crate::fault_injection::{FaultEvent, FaultPlan, MAX_FAULT_EVENTS};
use crate::plant::{Health, PlantReading, PumpCommands, CAPACITY, INITIAL_WATER_VOLUME, NOMINAL_STEAM_RATE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

// Reference run: one time unit is a second, control every 5 units
const DEFAULT_TIME_UNIT_MS: u64 = 1000;
const DEFAULT_CONTROL_PERIOD_UNITS: u32 = 5;
const DEFAULT_PHYSICS_PERIOD_UNITS: u32 = 1;
const DEFAULT_CONTROL_CYCLES: u32 = 30;
const DEFAULT_PHYSICS_STEPS: u32 = 150;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} must be greater than zero")]
    ZeroPeriod(&'static str),
    #[error("{0} overflows when scaled by time_unit_ms")]
    PeriodOverflow(&'static str),
    #[error("control period ({control} units) is not a whole number of physics periods ({physics} units)")]
    UnalignedPeriods { control: u32, physics: u32 },
    #[error("initial water volume {0}L outside [0, {max}]", max = CAPACITY)]
    InitialVolumeOutOfRange(i32),
    #[error("fault plan has {0} events, at most {max} supported", max = MAX_FAULT_EVENTS)]
    TooManyFaultEvents(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Wall-clock length of one time unit
    pub time_unit_ms: u64,
    pub control_period_units: u32,
    pub physics_period_units: u32,
    /// Stop the control activity after this many cycles (None = until stopped)
    pub control_cycles: Option<u32>,
    /// Stop the physics activity after this many steps (None = until stopped)
    pub physics_steps: Option<u32>,
}

impl SchedulerConfig {
    /// Run until the stop flag is raised
    pub fn continuous() -> Self {
        Self {
            control_cycles: None,
            physics_steps: None,
            ..Self::default()
        }
    }

    /// Saturates on overflow; `validate` rejects such configs
    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms.saturating_mul(u64::from(self.control_period_units)))
    }

    /// Saturates on overflow; `validate` rejects such configs
    pub fn physics_period(&self) -> Duration {
        Duration::from_millis(self.time_unit_ms.saturating_mul(u64::from(self.physics_period_units)))
    }

    /// Physics steps per control cycle in a lockstep run
    pub fn physics_steps_per_cycle(&self) -> Result<u32, ConfigError> {
        let (control, physics) = (self.control_period_units, self.physics_period_units);
        if physics == 0 {
            return Err(ConfigError::ZeroPeriod("physics_period_units"));
        }
        if control % physics != 0 {
            return Err(ConfigError::UnalignedPeriods { control, physics });
        }
        Ok(control / physics)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("control_period_units", self.control_period_units),
            ("physics_period_units", self.physics_period_units),
        ];

        if self.time_unit_ms == 0 {
            return Err(ConfigError::ZeroPeriod("time_unit_ms"));
        }
        for (name, units) in periods {
            if units == 0 {
                return Err(ConfigError::ZeroPeriod(name));
            }
            if self.time_unit_ms.checked_mul(u64::from(units)).is_none() {
                return Err(ConfigError::PeriodOverflow(name));
            }
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_unit_ms: DEFAULT_TIME_UNIT_MS,
            control_period_units: DEFAULT_CONTROL_PERIOD_UNITS,
            physics_period_units: DEFAULT_PHYSICS_PERIOD_UNITS,
            control_cycles: Some(DEFAULT_CONTROL_CYCLES),
            physics_steps: Some(DEFAULT_PHYSICS_STEPS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    pub initial_water_volume: i32,
    pub initial_steam_rate: i32,
}

impl PlantConfig {
    pub fn initial_reading(&self) -> PlantReading {
        PlantReading {
            water_volume: self.initial_water_volume,
            steam_rate: self.initial_steam_rate,
            health: Health::all_healthy(),
            commands: PumpCommands::OFF,
        }
    }
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            initial_water_volume: INITIAL_WATER_VOLUME,
            initial_steam_rate: NOMINAL_STEAM_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    pub enabled: bool,
    /// Scripted events; the reference script when left out
    pub events: Option<alloc::vec::Vec<FaultEvent>>,
}

impl FaultConfig {
    pub fn plan(&self) -> Result<FaultPlan, ConfigError> {
        match &self.events {
            Some(events) => FaultPlan::try_from(events.as_slice()).map_err(ConfigError::TooManyFaultEvents),
            None => Ok(FaultPlan::reference()),
        }
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            events: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub scheduler: SchedulerConfig,
    pub plant: PlantConfig,
    pub faults: FaultConfig,
}

impl SimulationConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        if !(0..=CAPACITY).contains(&self.plant.initial_water_volume) {
            return Err(ConfigError::InitialVolumeOutOfRange(self.plant.initial_water_volume));
        }
        self.faults.plan()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::Component;

    #[test]
    fn test_default_config_is_reference_run() {
        let config = SimulationConfig::default();
        assert_eq!(config.scheduler.control_period(), Duration::from_secs(5));
        assert_eq!(config.scheduler.physics_period(), Duration::from_secs(1));
        assert_eq!(config.scheduler.control_cycles, Some(30));
        assert_eq!(config.scheduler.physics_steps, Some(150));
        assert_eq!(config.plant.initial_water_volume, 500);
        assert_eq!(config.faults.plan().unwrap(), FaultPlan::reference());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimulationConfig::from_json(r#"{"scheduler": {"time_unit_ms": 10}}"#).unwrap();
        assert_eq!(config.scheduler.time_unit_ms, 10);
        assert_eq!(config.scheduler.control_period_units, 5);
        assert_eq!(config.plant, PlantConfig::default());
    }

    #[test]
    fn test_custom_fault_events() {
        let json = r#"{
            "faults": {
                "events": [
                    {"cycle": 4, "component": "Pump2", "healthy": false},
                    {"cycle": 2, "component": "SteamSensor", "healthy": false}
                ]
            }
        }"#;
        let plan = SimulationConfig::from_json(json).unwrap().faults.plan().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.events()[0], FaultEvent::fail(2, Component::SteamSensor));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(matches!(
            SimulationConfig::from_json(r#"{"scheduler": {"control_period_units": 0}}"#),
            Err(ConfigError::ZeroPeriod("control_period_units"))
        ));
        assert!(matches!(
            SimulationConfig::from_json(r#"{"plant": {"initial_water_volume": 1200}}"#),
            Err(ConfigError::InitialVolumeOutOfRange(1200))
        ));
        assert!(matches!(SimulationConfig::from_json("{"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_period_overflow_rejected() {
        let config = SchedulerConfig {
            time_unit_ms: u64::MAX / 2,
            ..SchedulerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::PeriodOverflow("control_period_units"))));
        // Getters never panic, even before validation
        assert_eq!(config.control_period(), Duration::from_millis(u64::MAX));

        let json = format!(r#"{{"scheduler": {{"time_unit_ms": {}}}}}"#, u64::MAX);
        assert!(matches!(
            SimulationConfig::from_json(&json),
            Err(ConfigError::PeriodOverflow("control_period_units"))
        ));
    }

    #[test]
    fn test_physics_steps_per_cycle() {
        assert_eq!(SchedulerConfig::default().physics_steps_per_cycle().unwrap(), 5);

        let config = SchedulerConfig {
            control_period_units: 7,
            physics_period_units: 2,
            ..SchedulerConfig::default()
        };
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.physics_steps_per_cycle(),
            Err(ConfigError::UnalignedPeriods { control: 7, physics: 2 })
        ));

        let config = SchedulerConfig {
            control_period_units: 1,
            physics_period_units: 3,
            ..SchedulerConfig::default()
        };
        assert!(config.physics_steps_per_cycle().is_err());
    }

    #[test]
    fn test_continuous_scheduler_has_no_limits() {
        let config = SchedulerConfig::continuous();
        assert_eq!(config.control_cycles, None);
        assert_eq!(config.physics_steps, None);
        assert_eq!(config.time_unit_ms, 1000);
    }
}
