use crate::plant::{Component, PlantState};
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const MAX_FAULT_EVENTS: usize = 32;
const MAX_EVENTS_PER_CYCLE: usize = 8;

/// One scripted health change, applied just before the given control cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    pub cycle: u32,
    pub component: Component,
    pub healthy: bool,
}

impl FaultEvent {
    pub fn fail(cycle: u32, component: Component) -> Self {
        Self { cycle, component, healthy: false }
    }

    pub fn repair(cycle: u32, component: Component) -> Self {
        Self { cycle, component, healthy: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedFault {
    pub event: FaultEvent,
    /// Whether the flag actually flipped
    pub changed: bool,
}

/// Fault injection statistics for telemetry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FaultInjectionStats {
    pub events_applied: u32,
    pub failures_injected: u32,
    pub repairs_applied: u32,
    pub no_op_events: u32,
}

/// Cycle-ordered list of scripted health changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultPlan {
    events: Vec<FaultEvent, MAX_FAULT_EVENTS>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Failure/repair script of the reference 30-cycle run
    pub fn reference() -> Self {
        let mut plan = Self::new();
        for event in [
            FaultEvent::fail(10, Component::Pump1),
            FaultEvent::fail(15, Component::WaterSensor),
            FaultEvent::repair(20, Component::Pump1),
            FaultEvent::repair(25, Component::WaterSensor),
            FaultEvent::fail(26, Component::Pump1),
        ] {
            // Well under capacity
            let _ = plan.push(event);
        }
        plan
    }

    /// Add an event, keeping the plan sorted by cycle. Events sharing a cycle
    /// keep their insertion order.
    pub fn push(&mut self, event: FaultEvent) -> Result<(), FaultEvent> {
        self.events.push(event)?;
        self.events.sort_by_key(|e| e.cycle);
        Ok(())
    }

    pub fn events(&self) -> &[FaultEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

impl TryFrom<&[FaultEvent]> for FaultPlan {
    type Error = usize;

    /// Fails with the number of events if they do not fit
    fn try_from(events: &[FaultEvent]) -> Result<Self, Self::Error> {
        if events.len() > MAX_FAULT_EVENTS {
            return Err(events.len());
        }
        let mut plan = Self::new();
        for event in events {
            plan.push(*event).map_err(|_| events.len())?;
        }
        Ok(plan)
    }
}

/// Applies a [`FaultPlan`] to the plant through the public health mutator
#[derive(Debug)]
pub struct FaultInjector {
    plan: FaultPlan,
    enabled: bool,
    stats: FaultInjectionStats,
}

impl FaultInjector {
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            plan,
            enabled: true,
            stats: FaultInjectionStats::default(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            plan: FaultPlan::new(),
            enabled: false,
            stats: FaultInjectionStats::default(),
        }
    }

    /// Apply every event scheduled for `cycle`. Call once per control cycle,
    /// before the controller ticks.
    pub fn apply(&mut self, cycle: u32, plant: &PlantState) -> Vec<AppliedFault, MAX_EVENTS_PER_CYCLE> {
        let mut applied = Vec::new();
        if !self.enabled {
            return applied;
        }

        for event in self.plan.events.iter().filter(|e| e.cycle == cycle) {
            let previous = plant.set_health(event.component, event.healthy);
            let changed = previous != event.healthy;

            self.stats.events_applied += 1;
            if !changed {
                self.stats.no_op_events += 1;
            } else if event.healthy {
                self.stats.repairs_applied += 1;
                info!(cycle, "repair: {} back in service", event.component);
            } else {
                self.stats.failures_injected += 1;
                warn!(cycle, "fault injected: {} out of service", event.component);
            }

            if applied.push(AppliedFault { event: *event, changed }).is_err() {
                warn!(cycle, "more than {} fault events in one cycle, rest not reported", MAX_EVENTS_PER_CYCLE);
            }
        }

        applied
    }

    pub fn get_stats(&self) -> &FaultInjectionStats {
        &self.stats
    }

    pub fn get_plan(&self) -> &FaultPlan {
        &self.plan
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
