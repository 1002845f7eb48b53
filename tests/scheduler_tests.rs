use boilerctl::*;
use boilerctl::config::SchedulerConfig;
use boilerctl::fault_injection::{FaultEvent, FaultInjector, FaultPlan};
use boilerctl::plant::{PlantReading, CAPACITY};
use boilerctl::telemetry::StatusSnapshot;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

async fn drain(mut rx: broadcast::Receiver<StatusSnapshot>) -> Vec<StatusSnapshot> {
    let mut snapshots = Vec::new();
    while let Ok(snapshot) = rx.recv().await {
        snapshots.push(snapshot);
    }
    snapshots
}

#[tokio::test(start_paused = true)]
async fn test_reference_run_with_fault_plan() {
    let plant = Arc::new(PlantState::new());
    let scheduler = BoilerScheduler::new(SchedulerConfig::default(), Arc::clone(&plant))
        .with_fault_injector(FaultInjector::new(FaultPlan::reference()));
    let rx = scheduler.subscribe();

    let report = scheduler.run().await.unwrap();
    let snapshots = drain(rx).await;

    assert_eq!(report.control.ticks, 30);
    assert_eq!(report.physics.ticks, 150);
    assert_eq!(snapshots.len(), 30);
    assert_eq!(report.faults.failures_injected, 3);
    assert_eq!(report.faults.repairs_applied, 2);

    for snapshot in &snapshots {
        assert!((0..=CAPACITY).contains(&snapshot.water_volume));

        let pump1_down = (10..20).contains(&snapshot.cycle) || snapshot.cycle >= 26;
        assert_eq!(snapshot.health.pump1, !pump1_down, "cycle {}", snapshot.cycle);
        let sensor_down = (15..25).contains(&snapshot.cycle);
        assert_eq!(snapshot.health.water_sensor, !sensor_down, "cycle {}", snapshot.cycle);
    }

    // Cycle numbers are strictly sequential
    for (index, snapshot) in snapshots.iter().enumerate() {
        assert_eq!(snapshot.cycle as usize, index + 1);
    }
    assert_eq!(report.final_status.water_volume, plant.water_volume());
}

#[tokio::test(start_paused = true)]
async fn test_critical_level_during_stabilization_escalates_on_third_tick() {
    // 400 -> 330 -> 260 -> 190 -> 150 with the pumps off; the physics
    // activity is done before the first control release at t=5
    let plant = Arc::new(PlantState::from_reading(&PlantReading {
        water_volume: 400,
        ..PlantReading::initial()
    }));
    let config = SchedulerConfig {
        control_cycles: Some(3),
        physics_steps: Some(4),
        ..SchedulerConfig::default()
    };
    let scheduler = BoilerScheduler::new(config, Arc::clone(&plant));
    let rx = scheduler.subscribe();
    let report = scheduler.run().await.unwrap();
    let snapshots = drain(rx).await;

    let modes: Vec<Mode> = snapshots.iter().map(|s| s.mode).collect();
    assert_eq!(modes, [Mode::Initialization, Mode::Initialization, Mode::EmergencyShutdown]);
    assert!(snapshots[..2].iter().all(|s| s.water_volume == 150 && s.commands.pump1 && s.commands.pump2));
    assert_eq!(report.controller.mode(), Mode::EmergencyShutdown);
    assert_eq!(report.telemetry.emergency_entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_physics_stops_with_control() {
    let plant = Arc::new(PlantState::new());
    let config = SchedulerConfig {
        control_cycles: Some(4),
        physics_steps: None,
        ..SchedulerConfig::default()
    };
    let report = BoilerScheduler::new(config, plant).run().await.unwrap();

    assert_eq!(report.control.ticks, 4);
    // The physics release at t=20 may land either side of the stop flag
    assert!(report.physics.ticks >= 19 && report.physics.ticks <= 21);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_rejected_before_start() {
    let config = SchedulerConfig {
        physics_period_units: 0,
        ..SchedulerConfig::default()
    };
    let result = BoilerScheduler::new(config, Arc::new(PlantState::new())).run().await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_fault_flips_keep_invariants() {
    let plant = Arc::new(PlantState::new());
    let config = SchedulerConfig {
        time_unit_ms: 2,
        ..SchedulerConfig::default()
    };
    let mut plan = FaultPlan::new();
    plan.push(FaultEvent::fail(5, Component::SteamSensor)).unwrap();
    plan.push(FaultEvent::repair(8, Component::SteamSensor)).unwrap();

    let scheduler = BoilerScheduler::new(config, Arc::clone(&plant)).with_fault_injector(FaultInjector::new(plan));
    let stop = scheduler.stop_flag();
    let rx = scheduler.subscribe();

    // A third party flipping pump health at arbitrary times
    let flipper_plant = Arc::clone(&plant);
    let flipper_stop = stop.clone();
    let flipper = tokio::spawn(async move {
        let mut healthy = true;
        while !flipper_stop.is_stopped() {
            healthy = !healthy;
            flipper_plant.set_health(Component::Pump2, healthy);
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        flipper_plant.set_health(Component::Pump2, true);
    });

    let report = scheduler.run().await.unwrap();
    stop.stop();
    flipper.await.unwrap();
    let snapshots = drain(rx).await;

    assert_eq!(report.control.ticks, 30);
    assert_eq!(report.physics.ticks, 150);
    assert!(snapshots.iter().all(|s| (0..=CAPACITY).contains(&s.water_volume)));
    assert!((0..=CAPACITY).contains(&plant.water_volume()));
}
