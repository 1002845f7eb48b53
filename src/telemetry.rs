use crate::controller::{ControllerState, Mode, Transition};
use crate::plant::{Health, PlantState, PumpCommands};
use heapless::Vec;
use serde::{Deserialize, Serialize};

const TRANSITION_HISTORY_SIZE: usize = 16;

/// Everything a status reporter needs after one control cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub cycle: u32,
    pub mode: Mode,
    pub water_volume: i32,
    pub steam_rate: i32,
    pub commands: PumpCommands,
    pub health: Health,
    pub stabilization_cycles: u32,
    pub emergency_recovery_cycles: u32,
}

impl StatusSnapshot {
    pub fn capture(cycle: u32, plant: &PlantState, ctrl: &ControllerState) -> Self {
        let reading = plant.read();
        Self {
            cycle,
            mode: ctrl.mode(),
            water_volume: reading.water_volume,
            steam_rate: reading.steam_rate,
            commands: reading.commands,
            health: reading.health,
            stabilization_cycles: ctrl.stabilization_cycles(),
            emergency_recovery_cycles: ctrl.emergency_recovery_cycles(),
        }
    }

    pub fn to_json(&self) -> Result<alloc::string::String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub cycle: u32,
    pub transition: Transition,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryStats {
    pub snapshots: u32,
    pub transitions: u32,
    pub emergency_entries: u32,
    /// Control cycles spent per mode, indexed by [`Mode::index`]
    pub cycles_per_mode: [u32; 5],
}

/// Keeps the latest snapshot, a bounded transition history and mode counters
#[derive(Debug, Default)]
pub struct TelemetryCollector {
    latest: Option<StatusSnapshot>,
    history: Vec<TransitionRecord, TRANSITION_HISTORY_SIZE>,
    stats: TelemetryStats,
}

impl TelemetryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, snapshot: StatusSnapshot, transition: Option<Transition>) {
        self.stats.snapshots += 1;
        self.stats.cycles_per_mode[snapshot.mode.index()] += 1;

        if let Some(transition) = transition {
            self.stats.transitions += 1;
            if transition.to == Mode::EmergencyShutdown {
                self.stats.emergency_entries += 1;
            }

            // Circular buffer, oldest entry drops out
            if self.history.is_full() {
                self.history.remove(0);
            }
            let _ = self.history.push(TransitionRecord {
                cycle: snapshot.cycle,
                transition,
            });
        }

        self.latest = Some(snapshot);
    }

    pub fn get_latest(&self) -> Option<&StatusSnapshot> {
        self.latest.as_ref()
    }

    pub fn get_history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn get_stats(&self) -> &TelemetryStats {
        &self.stats
    }

    pub fn cycles_in(&self, mode: Mode) -> u32 {
        self.stats.cycles_per_mode[mode.index()]
    }
}
