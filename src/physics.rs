use crate::plant::{PlantState, CAPACITY, NOMINAL_STEAM_RATE, PUMP_CAPACITY};
use serde::{Deserialize, Serialize};
use tracing::debug;

// Steam outflow steps with the water volume. The thresholds do not line up
// with the controller's band limits and the curve is deliberately
// discontinuous.
const LOW_STEAM_VOLUME: i32 = 200;
const HIGH_STEAM_VOLUME: i32 = 800;
const LOW_STEAM_RATE: i32 = 40;
const HIGH_STEAM_RATE: i32 = 80;

/// What one physics step did to the plant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: u64,
    pub volume_before: i32,
    pub volume_after: i32,
    pub steam_before: i32,
    pub steam_after: i32,
    pub inflow: i32,
    pub outflow: i32,
}

impl StepReport {
    pub fn changed(&self) -> bool {
        self.volume_before != self.volume_after || self.steam_before != self.steam_after
    }
}

/// Steam outflow for a given volume
pub fn steam_rate_for(volume: i32) -> i32 {
    if volume < LOW_STEAM_VOLUME {
        LOW_STEAM_RATE
    } else if volume > HIGH_STEAM_VOLUME {
        HIGH_STEAM_RATE
    } else {
        NOMINAL_STEAM_RATE
    }
}

/// Discrete-time boiler model, one step per simulation period
#[derive(Debug, Default)]
pub struct PhysicalModel {
    steps: u64,
}

impl PhysicalModel {
    pub fn new() -> Self {
        Self { steps: 0 }
    }

    pub fn step(&mut self, plant: &PlantState) -> StepReport {
        self.steps += 1;

        // A pump only delivers water if it is both commanded and healthy
        let commands = plant.commands();
        let health = plant.health();
        let mut inflow = 0;
        if commands.pump1 && health.pump1 {
            inflow += PUMP_CAPACITY;
        }
        if commands.pump2 && health.pump2 {
            inflow += PUMP_CAPACITY;
        }

        let outflow = plant.steam_rate();
        let volume_before = plant.water_volume();
        let volume_after = (volume_before + inflow - outflow).clamp(0, CAPACITY);
        plant.set_water_volume(volume_after);

        let steam_after = steam_rate_for(volume_after);
        plant.set_steam_rate(steam_after);

        let report = StepReport {
            step: self.steps,
            volume_before,
            volume_after,
            steam_before: outflow,
            steam_after,
            inflow,
            outflow,
        };

        if report.changed() {
            debug!(
                step = report.step,
                "physics: water {}→{}L (+{} -{}) | steam {}→{}L/s",
                volume_before, volume_after, inflow, outflow, outflow, steam_after
            );
        }

        report
    }

    pub fn get_steps(&self) -> u64 {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::{Component, Health, PlantReading, PumpCommands};

    fn plant_with(volume: i32, steam: i32, commands: PumpCommands) -> PlantState {
        PlantState::from_reading(&PlantReading {
            water_volume: volume,
            steam_rate: steam,
            health: Health::all_healthy(),
            commands,
        })
    }

    #[test]
    fn test_step_without_pumps_drains_by_steam_rate() {
        let plant = plant_with(500, 70, PumpCommands::OFF);
        let mut model = PhysicalModel::new();

        let report = model.step(&plant);
        assert_eq!(report.inflow, 0);
        assert_eq!(report.outflow, 70);
        assert_eq!(plant.water_volume(), 430);
        assert_eq!(plant.steam_rate(), 70);
        assert_eq!(model.get_steps(), 1);
    }

    #[test]
    fn test_both_pumps_add_inflow() {
        let plant = plant_with(500, 70, PumpCommands::new(true, true));
        let mut model = PhysicalModel::new();

        model.step(&plant);
        assert_eq!(plant.water_volume(), 530);
    }

    #[test]
    fn test_unhealthy_pump_never_adds_flow() {
        let plant = plant_with(500, 70, PumpCommands::new(true, true));
        plant.set_health(Component::Pump1, false);
        let mut model = PhysicalModel::new();

        let report = model.step(&plant);
        assert_eq!(report.inflow, 50);
        assert_eq!(plant.water_volume(), 480);

        plant.set_health(Component::Pump2, false);
        let report = model.step(&plant);
        assert_eq!(report.inflow, 0);
        assert_eq!(plant.water_volume(), 410);
    }

    #[test]
    fn test_volume_clamped_to_capacity_range() {
        let plant = plant_with(20, 70, PumpCommands::OFF);
        let mut model = PhysicalModel::new();
        model.step(&plant);
        assert_eq!(plant.water_volume(), 0);

        let plant = plant_with(990, 40, PumpCommands::new(true, true));
        model.step(&plant);
        assert_eq!(plant.water_volume(), CAPACITY);
    }

    #[test]
    fn test_steam_rate_steps() {
        assert_eq!(steam_rate_for(0), 40);
        assert_eq!(steam_rate_for(199), 40);
        assert_eq!(steam_rate_for(200), 70);
        assert_eq!(steam_rate_for(800), 70);
        assert_eq!(steam_rate_for(801), 80);
        assert_eq!(steam_rate_for(1000), 80);
    }

    #[test]
    fn test_steam_rate_recomputed_from_new_volume() {
        // Outflow uses the old rate, the new rate follows the new volume
        let plant = plant_with(230, 70, PumpCommands::OFF);
        let mut model = PhysicalModel::new();

        let report = model.step(&plant);
        assert_eq!(report.outflow, 70);
        assert_eq!(plant.water_volume(), 160);
        assert_eq!(plant.steam_rate(), 40);
        assert!(report.changed());
    }
}
