use crate::plant::{PlantReading, PlantState, PumpCommands, CRITICAL_HIGH, CRITICAL_LOW, NORMAL_HIGH, NORMAL_LOW};
use crate::policy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Initialization ticks required before any guard, critical level included, may fire
pub const STABILIZATION_THRESHOLD: u32 = 3;
/// Consecutive improving ticks required to leave emergency shutdown while
/// the level is still at a critical limit
pub const RECOVERY_THRESHOLD: u32 = 2;
/// Distance past a critical limit that counts as improving (litres)
pub const RECOVERY_MARGIN: i32 = 20;
/// Distance inside the critical limits required by the integrity check (litres)
pub const INTEGRITY_MARGIN: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Initialization,
    Normal,
    Degraded,
    Rescue,
    EmergencyShutdown,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Initialization,
        Mode::Normal,
        Mode::Degraded,
        Mode::Rescue,
        Mode::EmergencyShutdown,
    ];

    pub fn index(self) -> usize {
        match self {
            Mode::Initialization => 0,
            Mode::Normal => 1,
            Mode::Degraded => 2,
            Mode::Rescue => 3,
            Mode::EmergencyShutdown => 4,
        }
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Mode::Initialization => write!(f, "INITIALIZATION"),
            Mode::Normal => write!(f, "NORMAL"),
            Mode::Degraded => write!(f, "DEGRADED"),
            Mode::Rescue => write!(f, "RESCUE"),
            Mode::EmergencyShutdown => write!(f, "EMERGENCY_SHUTDOWN"),
        }
    }
}

/// Why the controller changed mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    CriticalLevel,
    Stabilized,
    WaterSensorFailure,
    PumpFailure,
    PumpsRestored,
    WaterSensorRestored,
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
    pub reason: TransitionReason,
    pub water_volume: i32,
}

/// Controller-owned state. Only [`tick`] mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    mode: Mode,
    stabilization_cycles: u32,
    emergency_recovery_cycles: u32,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::in_mode(Mode::Initialization)
    }

    /// Start in an arbitrary mode with both counters cleared
    pub fn in_mode(mode: Mode) -> Self {
        Self {
            mode,
            stabilization_cycles: 0,
            emergency_recovery_cycles: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stabilization_cycles(&self) -> u32 {
        self.stabilization_cycles
    }

    pub fn emergency_recovery_cycles(&self) -> u32 {
        self.emergency_recovery_cycles
    }

    fn enter(mode: Mode) -> Self {
        Self::in_mode(mode)
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Breakdown of the integrity check run before entering `Normal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub level_safe: bool,
    pub level_normal: bool,
    pub devices_ok: bool,
}

impl IntegrityReport {
    /// The normal-band flag is informational only
    pub fn passes(&self) -> bool {
        self.level_safe && self.devices_ok
    }
}

pub fn check_system_integrity(reading: &PlantReading) -> IntegrityReport {
    let volume = reading.water_volume;
    let health = reading.health;

    IntegrityReport {
        level_safe: volume > CRITICAL_LOW + INTEGRITY_MARGIN && volume < CRITICAL_HIGH - INTEGRITY_MARGIN,
        level_normal: (NORMAL_LOW..=NORMAL_HIGH).contains(&volume),
        devices_ok: health.water_sensor && health.steam_sensor && health.any_pump(),
    }
}

/// Outcome of evaluating one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub next: ControllerState,
    pub commands: Option<PumpCommands>,
    pub reason: Option<TransitionReason>,
}

impl Decision {
    fn stay(next: ControllerState, commands: PumpCommands) -> Self {
        Self { next, commands: Some(commands), reason: None }
    }

    fn hold(next: ControllerState) -> Self {
        Self { next, commands: None, reason: None }
    }

    fn switch(mode: Mode, reason: TransitionReason) -> Self {
        Self {
            next: ControllerState::enter(mode),
            commands: None,
            reason: Some(reason),
        }
    }
}

/// Pure transition function: current state and a plant reading in, next state
/// and pump commands out. A mode change never runs the target mode's policy in
/// the same tick.
///
/// Initialization runs its guards only from the third tick on, so a critical
/// level seen during stabilization is met with the bootstrap policy alone.
pub fn decide(state: &ControllerState, reading: &PlantReading) -> Decision {
    let emergency_level = reading.is_emergency_level();
    let health = reading.health;

    match state.mode {
        Mode::Initialization => {
            let commands = policy::bootstrap(reading);
            let cycles = state.stabilization_cycles.saturating_add(1);

            let mut decision = if cycles < STABILIZATION_THRESHOLD {
                Decision::hold(ControllerState { stabilization_cycles: cycles, ..*state })
            } else if emergency_level {
                Decision::switch(Mode::EmergencyShutdown, TransitionReason::CriticalLevel)
            } else if check_system_integrity(reading).passes() {
                Decision::switch(Mode::Normal, TransitionReason::Stabilized)
            } else if !health.water_sensor {
                Decision::switch(Mode::Rescue, TransitionReason::WaterSensorFailure)
            } else if !health.both_pumps() {
                Decision::switch(Mode::Degraded, TransitionReason::PumpFailure)
            } else {
                Decision::hold(ControllerState { stabilization_cycles: cycles, ..*state })
            };

            // Bootstrap commands apply whatever the guards decided
            decision.commands = Some(commands);
            decision
        }

        Mode::Normal => {
            if emergency_level {
                Decision::switch(Mode::EmergencyShutdown, TransitionReason::CriticalLevel)
            } else if !health.water_sensor {
                Decision::switch(Mode::Rescue, TransitionReason::WaterSensorFailure)
            } else if !health.both_pumps() {
                Decision::switch(Mode::Degraded, TransitionReason::PumpFailure)
            } else {
                Decision::stay(*state, policy::full_capability(reading))
            }
        }

        Mode::Degraded => {
            if emergency_level {
                Decision::switch(Mode::EmergencyShutdown, TransitionReason::CriticalLevel)
            } else if !health.water_sensor {
                Decision::switch(Mode::Rescue, TransitionReason::WaterSensorFailure)
            } else if health.both_pumps() {
                Decision::switch(Mode::Normal, TransitionReason::PumpsRestored)
            } else {
                Decision::stay(*state, policy::degraded(reading))
            }
        }

        Mode::Rescue => {
            if emergency_level {
                Decision::switch(Mode::EmergencyShutdown, TransitionReason::CriticalLevel)
            } else if health.water_sensor {
                let target = if health.both_pumps() { Mode::Normal } else { Mode::Degraded };
                Decision::switch(target, TransitionReason::WaterSensorRestored)
            } else {
                Decision::stay(*state, policy::sensorless(reading))
            }
        }

        Mode::EmergencyShutdown => decide_emergency(state, reading),
    }
}

fn decide_emergency(state: &ControllerState, reading: &PlantReading) -> Decision {
    let volume = reading.water_volume;

    if volume <= CRITICAL_LOW {
        let past_margin = volume > CRITICAL_LOW + RECOVERY_MARGIN;
        return count_recovery(state, policy::force_healthy_on(reading), past_margin);
    }
    if volume >= CRITICAL_HIGH {
        let past_margin = volume < CRITICAL_HIGH - RECOVERY_MARGIN;
        return count_recovery(state, PumpCommands::OFF, past_margin);
    }

    // Back inside the critical limits
    Decision::switch(Mode::Initialization, TransitionReason::Recovered)
}

/// Forced commands always apply, including on the tick that leaves the mode
fn count_recovery(state: &ControllerState, commands: PumpCommands, past_margin: bool) -> Decision {
    if !past_margin {
        return Decision::stay(ControllerState { emergency_recovery_cycles: 0, ..*state }, commands);
    }

    let cycles = state.emergency_recovery_cycles.saturating_add(1);
    if cycles >= RECOVERY_THRESHOLD {
        let mut decision = Decision::switch(Mode::Initialization, TransitionReason::Recovered);
        decision.commands = Some(commands);
        decision
    } else {
        Decision::stay(ControllerState { emergency_recovery_cycles: cycles, ..*state }, commands)
    }
}

/// Run one control tick against the shared plant.
///
/// The plant is sampled once at the start of the tick; the sample is not a
/// transaction, so concurrent physics steps may leave it mixing old and new
/// fields.
pub fn tick(plant: &PlantState, ctrl: &mut ControllerState) -> Option<Transition> {
    let reading = plant.read();
    let decision = decide(ctrl, &reading);

    if ctrl.mode == Mode::Initialization {
        let integrity = check_system_integrity(&reading);
        debug!(
            safe = integrity.level_safe,
            normal = integrity.level_normal,
            devices = integrity.devices_ok,
            cycles = decision.next.stabilization_cycles,
            "integrity check"
        );
    }

    if let Some(commands) = decision.commands {
        plant.set_commands(commands);
    }

    let from = ctrl.mode;
    *ctrl = decision.next;

    let transition = decision.reason.map(|reason| Transition {
        from,
        to: ctrl.mode,
        reason,
        water_volume: reading.water_volume,
    });

    match transition {
        Some(t) if t.to == Mode::EmergencyShutdown => {
            warn!(volume = t.water_volume, "critical water level, {} -> {}", t.from, t.to);
        }
        Some(t) => {
            info!(volume = t.water_volume, reason = ?t.reason, "mode change {} -> {}", t.from, t.to);
        }
        None => {
            debug!(mode = %ctrl.mode, volume = reading.water_volume, commands = ?decision.commands, "control tick");
        }
    }

    transition
}
