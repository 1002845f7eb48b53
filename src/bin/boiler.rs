use boilerctl::config::SimulationConfig;
use boilerctl::fault_injection::FaultInjector;
use boilerctl::scheduler::{BoilerScheduler, LockstepSimulation, RunReport};
use boilerctl::telemetry::StatusSnapshot;
use boilerctl::{Mode, PlantState};
use clap::{App, Arg};
use colored::*;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("boiler")
        .version("0.1.0")
        .author("Control Systems Engineering Team")
        .about("Steam boiler water level controller simulation")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON run configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("time-unit-ms")
                .long("time-unit-ms")
                .value_name("MS")
                .help("Wall-clock length of one time unit")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(ms) if ms > 0 => Ok(()),
                    _ => Err("Time unit must be a positive number of milliseconds".into()),
                }),
        )
        .arg(
            Arg::with_name("control-cycles")
                .long("control-cycles")
                .value_name("N")
                .help("Number of control cycles to run")
                .takes_value(true)
                .validator(|v| match v.parse::<u32>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Cycle count must be a valid number".into()),
                }),
        )
        .arg(
            Arg::with_name("physics-steps")
                .long("physics-steps")
                .value_name("N")
                .help("Number of physics steps to run")
                .takes_value(true)
                .validator(|v| match v.parse::<u32>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Step count must be a valid number".into()),
                }),
        )
        .arg(
            Arg::with_name("continuous")
                .long("continuous")
                .help("Run until Ctrl+C instead of a fixed number of cycles")
                .conflicts_with_all(&["control-cycles", "physics-steps", "lockstep"]),
        )
        .arg(
            Arg::with_name("lockstep")
                .long("lockstep")
                .help("Run physics and control deterministically in one thread, without waiting"),
        )
        .arg(
            Arg::with_name("no-faults")
                .long("no-faults")
                .help("Disable the scripted fault plan"),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Status output format")
                .takes_value(true)
                .possible_values(&["table", "json"])
                .default_value("table"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    let level = if matches.is_present("verbose") { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match matches.value_of("config") {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(ms) = matches.value_of("time-unit-ms") {
        config.scheduler.time_unit_ms = ms.parse()?;
    }
    if let Some(cycles) = matches.value_of("control-cycles") {
        config.scheduler.control_cycles = Some(cycles.parse()?);
    }
    if let Some(steps) = matches.value_of("physics-steps") {
        config.scheduler.physics_steps = Some(steps.parse()?);
    }
    if matches.is_present("continuous") {
        config.scheduler.control_cycles = None;
        config.scheduler.physics_steps = None;
    }
    if matches.is_present("no-faults") {
        config.faults.enabled = false;
    }
    config.validate()?;

    let json = matches.value_of("format") == Some("json");
    let plant = Arc::new(PlantState::from_reading(&config.plant.initial_reading()));
    let injector = if config.faults.enabled {
        FaultInjector::new(config.faults.plan()?)
    } else {
        FaultInjector::disabled()
    };

    println!("{}", "Steam boiler controller".bright_blue().bold());
    println!(
        "{} control every {:?}, physics every {:?}",
        "Schedule:".dimmed(),
        config.scheduler.control_period(),
        config.scheduler.physics_period()
    );
    if injector.is_enabled() {
        println!("{} {} scripted events", "Fault plan:".dimmed(), injector.get_plan().len());
    } else {
        println!("{} disabled", "Fault plan:".dimmed());
    }

    if matches.is_present("lockstep") {
        let cycles = config.scheduler.control_cycles.unwrap_or(30);
        let mut sim = LockstepSimulation::new(&config.scheduler, plant, injector)?;
        for _ in 0..cycles {
            print_status(&sim.step_cycle(), json)?;
        }
        println!("{} {}", "Final mode:".bright_green(), mode_label(sim.controller().mode()));
        return Ok(());
    }

    let scheduler = BoilerScheduler::new(config.scheduler.clone(), plant).with_fault_injector(injector);
    let stop = scheduler.stop_flag();
    let mut status_rx = scheduler.subscribe();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested, finishing at the next period boundary");
            stop.stop();
        }
    });

    let printer = tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(snapshot) => {
                    if let Err(e) = print_status(&snapshot, json) {
                        warn!("Failed to print status: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("status output lagged, {} snapshots skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let report = scheduler.run().await?;
    // The sender is gone once the run returns, so the printer drains and exits
    let _ = printer.await;
    print_report(&report);

    Ok(())
}

fn mode_label(mode: Mode) -> ColoredString {
    let label = mode.to_string();
    match mode {
        Mode::Initialization => label.cyan(),
        Mode::Normal => label.green(),
        Mode::Degraded => label.yellow(),
        Mode::Rescue => label.magenta(),
        Mode::EmergencyShutdown => label.red().bold(),
    }
}

fn on_off(on: bool) -> ColoredString {
    if on {
        "ON".green()
    } else {
        "OFF".dimmed()
    }
}

fn ok_fail(healthy: bool) -> ColoredString {
    if healthy {
        "ok".green()
    } else {
        "FAIL".red()
    }
}

fn print_status(snapshot: &StatusSnapshot, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", snapshot.to_json()?);
        return Ok(());
    }

    println!(
        "{:>3} {:<20} water {:>4}L  steam {:>2}L/s  pumps {}/{}  health p1={} p2={} water={} steam={}",
        snapshot.cycle,
        mode_label(snapshot.mode),
        snapshot.water_volume,
        snapshot.steam_rate,
        on_off(snapshot.commands.pump1),
        on_off(snapshot.commands.pump2),
        ok_fail(snapshot.health.pump1),
        ok_fail(snapshot.health.pump2),
        ok_fail(snapshot.health.water_sensor),
        ok_fail(snapshot.health.steam_sensor),
    );
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", "Run complete".bright_green().bold());
    println!(
        "  Control ticks: {} ({} overruns)   Physics steps: {} ({} overruns)",
        report.control.ticks, report.control.overruns, report.physics.ticks, report.physics.overruns
    );
    println!(
        "  Final: {} at {}L, {} transitions, {} emergency entries",
        mode_label(report.controller.mode()),
        report.final_status.water_volume,
        report.telemetry.transitions,
        report.telemetry.emergency_entries
    );
    for mode in Mode::ALL {
        println!("    {:<20} {} cycles", mode.to_string(), report.telemetry.cycles_per_mode[mode.index()]);
    }
}
