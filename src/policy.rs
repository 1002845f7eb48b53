//! Pump decision policies.
//!
//! Each policy is a pure function of a [`PlantReading`]. The reading carries
//! the current commands because some branches only switch *healthy* pumps on
//! and leave an unhealthy pump's last command alone.

use crate::plant::{PlantReading, PumpCommands, NORMAL_HIGH, NORMAL_LOW, NORMAL_MID};

// Steam outflow thresholds used to estimate the level without a water sensor
const LOW_STEAM_ESTIMATE: i32 = 50;
const HIGH_STEAM_ESTIMATE: i32 = 75;

/// Used while the system stabilises in `Initialization`.
pub fn bootstrap(reading: &PlantReading) -> PumpCommands {
    let volume = reading.water_volume;
    let health = reading.health;

    if volume < NORMAL_LOW {
        PumpCommands::new(health.pump1, health.pump2)
    } else if volume > NORMAL_HIGH {
        PumpCommands::OFF
    } else {
        PumpCommands::new(health.pump1 && volume < NORMAL_MID, false)
    }
}

/// `Normal` mode, both pumps and both sensors available.
pub fn full_capability(reading: &PlantReading) -> PumpCommands {
    let volume = reading.water_volume;

    if volume < NORMAL_LOW {
        PumpCommands::new(true, true)
    } else if volume > NORMAL_HIGH {
        PumpCommands::OFF
    } else if volume < NORMAL_MID {
        PumpCommands::new(true, false)
    } else {
        PumpCommands::OFF
    }
}

/// `Degraded` mode, at least one pump is out.
pub fn degraded(reading: &PlantReading) -> PumpCommands {
    let volume = reading.water_volume;
    let health = reading.health;

    if volume < NORMAL_LOW {
        PumpCommands::new(health.pump1, health.pump2)
    } else if volume > NORMAL_HIGH {
        PumpCommands::OFF
    } else {
        match (health.pump1, health.pump2) {
            // Economy: one pump is enough mid-band
            (true, _) => PumpCommands::new(true, false),
            (false, true) => PumpCommands::new(false, true),
            (false, false) => reading.commands,
        }
    }
}

/// `Rescue` mode, water sensor lost. Steam outflow stands in for the level.
pub fn sensorless(reading: &PlantReading) -> PumpCommands {
    let steam = reading.steam_rate;
    let health = reading.health;

    if steam < LOW_STEAM_ESTIMATE {
        force_healthy_on(reading)
    } else if steam > HIGH_STEAM_ESTIMATE {
        PumpCommands::OFF
    } else if health.pump1 {
        PumpCommands::new(true, false)
    } else if health.pump2 {
        PumpCommands::new(false, true)
    } else {
        reading.commands
    }
}

/// Switch on every healthy pump; an unhealthy pump keeps its last command.
pub fn force_healthy_on(reading: &PlantReading) -> PumpCommands {
    PumpCommands {
        pump1: reading.commands.pump1 || reading.health.pump1,
        pump2: reading.commands.pump2 || reading.health.pump2,
    }
}
