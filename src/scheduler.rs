//! Periodic scheduling of the physics and control activities.
//!
//! Both activities run as independent tokio tasks against one
//! `Arc<PlantState>`. There is no rendezvous between them: the controller may
//! sample the plant at any point relative to a physics step. Each activity is
//! strictly sequential, waits one full period before its first tick, and
//! checks the shared [`StopFlag`] at every period boundary.

use crate::config::{ConfigError, SchedulerConfig};
use crate::controller::{self, ControllerState};
use crate::fault_injection::{FaultInjectionStats, FaultInjector};
use crate::physics::PhysicalModel;
use crate::plant::PlantState;
use crate::telemetry::{StatusSnapshot, TelemetryCollector, TelemetryStats, TransitionRecord};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinError;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

const STATUS_BROADCAST_BUFFER_SIZE: usize = 64;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid scheduler configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{activity} activity failed: {source}")]
    ActivityFailed {
        activity: &'static str,
        #[source]
        source: JoinError,
    },
}

/// Shared cancellation flag, observed by both activities at period boundaries
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub ticks: u32,
    /// Ticks released more than one period late or running longer than a period
    pub overruns: u32,
    pub max_tick_us: u64,
}

/// Final state of a scheduler run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub control: ActivityStats,
    pub physics: ActivityStats,
    pub controller: ControllerState,
    pub final_status: StatusSnapshot,
    pub telemetry: TelemetryStats,
    pub transitions: alloc::vec::Vec<TransitionRecord>,
    pub faults: FaultInjectionStats,
}

struct ControlOutcome {
    stats: ActivityStats,
    controller: ControllerState,
    collector: TelemetryCollector,
    faults: FaultInjectionStats,
}

pub struct BoilerScheduler {
    config: SchedulerConfig,
    plant: Arc<PlantState>,
    injector: FaultInjector,
    stop: StopFlag,
    status_tx: broadcast::Sender<StatusSnapshot>,
}

impl BoilerScheduler {
    pub fn new(config: SchedulerConfig, plant: Arc<PlantState>) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_BROADCAST_BUFFER_SIZE);
        Self {
            config,
            plant,
            injector: FaultInjector::disabled(),
            stop: StopFlag::new(),
            status_tx,
        }
    }

    pub fn with_fault_injector(mut self, injector: FaultInjector) -> Self {
        self.injector = injector;
        self
    }

    pub fn plant(&self) -> Arc<PlantState> {
        Arc::clone(&self.plant)
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Status snapshots published after every control tick
    pub fn subscribe(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    pub async fn run(self) -> Result<RunReport, SchedulerError> {
        self.config.validate()?;

        let Self { config, plant, injector, stop, status_tx } = self;
        info!(
            control_period_ms = config.control_period().as_millis() as u64,
            physics_period_ms = config.physics_period().as_millis() as u64,
            control_cycles = ?config.control_cycles,
            physics_steps = ?config.physics_steps,
            "boiler scheduler starting"
        );

        let physics_task = tokio::spawn(
            physics_activity(config.clone(), Arc::clone(&plant), stop.clone()).instrument(info_span!("physics")),
        );
        let control_task = tokio::spawn(
            control_activity(config.clone(), Arc::clone(&plant), stop.clone(), injector, status_tx)
                .instrument(info_span!("control")),
        );

        let control = control_task.await.map_err(|source| SchedulerError::ActivityFailed {
            activity: "control",
            source,
        });

        // An unbounded physics activity would otherwise outlive the run
        if config.physics_steps.is_none() || control.is_err() {
            stop.stop();
        }

        let physics = physics_task.await.map_err(|source| SchedulerError::ActivityFailed {
            activity: "physics",
            source,
        })?;
        let control = control?;

        let final_status = StatusSnapshot::capture(control.stats.ticks, &plant, &control.controller);
        info!(
            mode = %final_status.mode,
            volume = final_status.water_volume,
            control_ticks = control.stats.ticks,
            physics_ticks = physics.ticks,
            overruns = control.stats.overruns + physics.overruns,
            "boiler scheduler finished"
        );

        Ok(RunReport {
            control: control.stats,
            physics,
            controller: control.controller,
            final_status,
            telemetry: control.collector.get_stats().clone(),
            transitions: control.collector.get_history().to_vec(),
            faults: control.faults,
        })
    }
}

async fn physics_activity(config: SchedulerConfig, plant: Arc<PlantState>, stop: StopFlag) -> ActivityStats {
    let mut model = PhysicalModel::new();
    run_periodic("physics", config.physics_period(), config.physics_steps, &stop, |_| {
        model.step(&plant);
    })
    .await
}

async fn control_activity(
    config: SchedulerConfig,
    plant: Arc<PlantState>,
    stop: StopFlag,
    mut injector: FaultInjector,
    status_tx: broadcast::Sender<StatusSnapshot>,
) -> ControlOutcome {
    let mut ctrl = ControllerState::new();
    let mut collector = TelemetryCollector::new();

    let stats = run_periodic("control", config.control_period(), config.control_cycles, &stop, |cycle| {
        // Health changes scheduled for this cycle land before the tick
        injector.apply(cycle, &plant);

        let transition = controller::tick(&plant, &mut ctrl);
        let snapshot = StatusSnapshot::capture(cycle, &plant, &ctrl);
        collector.record(snapshot, transition);

        // No subscribers is fine
        let _ = status_tx.send(snapshot);
    })
    .await;

    ControlOutcome {
        stats,
        controller: ctrl,
        collector,
        faults: injector.get_stats().clone(),
    }
}

/// Tick `work` once per `period` until `limit` ticks ran or `stop` is raised.
/// The tick counter handed to `work` starts at 1.
async fn run_periodic<F>(name: &'static str, period: Duration, limit: Option<u32>, stop: &StopFlag, mut work: F) -> ActivityStats
where
    F: FnMut(u32),
{
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = ActivityStats::default();

    loop {
        if limit.is_some_and(|limit| stats.ticks >= limit) {
            debug!(activity = name, ticks = stats.ticks, "iteration limit reached");
            break;
        }

        let release = interval.tick().await;
        if stop.is_stopped() {
            debug!(activity = name, ticks = stats.ticks, "stop flag observed");
            break;
        }

        let started = Instant::now();
        stats.ticks += 1;
        work(stats.ticks);
        let busy = started.elapsed();
        let lateness = started.saturating_duration_since(release);

        stats.max_tick_us = stats.max_tick_us.max(busy.as_micros() as u64);
        if lateness > period || busy > period {
            // Reported only; the plant is never touched because of an overrun
            stats.overruns += 1;
            warn!(
                activity = name,
                tick = stats.ticks,
                late_us = lateness.as_micros() as u64,
                busy_us = busy.as_micros() as u64,
                "period overrun"
            );
        }
    }

    stats
}

/// Deterministic single-threaded runner: every control cycle first advances
/// the physics by one control period's worth of steps, then ticks the
/// controller. Useful for reproducible runs and tests.
pub struct LockstepSimulation {
    plant: Arc<PlantState>,
    model: PhysicalModel,
    controller: ControllerState,
    injector: FaultInjector,
    collector: TelemetryCollector,
    steps_per_cycle: u32,
    cycle: u32,
}

impl LockstepSimulation {
    pub fn new(config: &SchedulerConfig, plant: Arc<PlantState>, injector: FaultInjector) -> Result<Self, ConfigError> {
        config.validate()?;
        let steps_per_cycle = config.physics_steps_per_cycle()?;
        Ok(Self {
            plant,
            model: PhysicalModel::new(),
            controller: ControllerState::new(),
            injector,
            collector: TelemetryCollector::new(),
            steps_per_cycle,
            cycle: 0,
        })
    }

    pub fn step_cycle(&mut self) -> StatusSnapshot {
        for _ in 0..self.steps_per_cycle {
            self.model.step(&self.plant);
        }

        self.cycle += 1;
        self.injector.apply(self.cycle, &self.plant);
        let transition = controller::tick(&self.plant, &mut self.controller);
        let snapshot = StatusSnapshot::capture(self.cycle, &self.plant, &self.controller);
        self.collector.record(snapshot, transition);
        snapshot
    }

    pub fn run(&mut self, cycles: u32) -> alloc::vec::Vec<StatusSnapshot> {
        (0..cycles).map(|_| self.step_cycle()).collect()
    }

    pub fn plant(&self) -> &PlantState {
        &self.plant
    }

    pub fn controller(&self) -> &ControllerState {
        &self.controller
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn physics_steps(&self) -> u64 {
        self.model.get_steps()
    }
}
