//! # Steam Boiler Controller
//!
//! A periodic, fault-tolerant water level controller for a simulated steam
//! boiler. Two pumps feed the boiler, steam drains it, and the controller
//! switches pumps on and off while pumps and sensors fail and recover.
//!
//! ## Features
//!
//! - **Mode state machine**: initialization, normal, degraded, rescue and
//!   emergency shutdown, with hysteresis on the way back from an emergency
//! - **Pure pump policies**: one decision function per mode family
//! - **Physical model**: discrete-time volume/steam simulation
//! - **Lock-free shared state**: one atomic per plant field
//! - **Periodic scheduling**: physics and control as independent tokio tasks
//!   with a shared stop flag and overrun reporting
//! - **Fault injection**: scripted, cycle-indexed health changes
//!
//! ## Quick Start
//!
//! ```rust
//! use boilerctl::controller::{self, ControllerState, Mode};
//! use boilerctl::PlantState;
//!
//! let plant = PlantState::new();
//! let mut ctrl = ControllerState::new();
//!
//! // Three stabilization ticks at 500L with everything healthy
//! for _ in 0..3 {
//!     controller::tick(&plant, &mut ctrl);
//! }
//! assert_eq!(ctrl.mode(), Mode::Normal);
//! ```
//!
//! ## Architecture
//!
//! - [`plant`] - Shared plant state and band limits
//! - [`physics`] - Physical model, one step per simulation period
//! - [`policy`] - Pump decision policies
//! - [`controller`] - Mode state machine
//! - [`scheduler`] - Periodic activities and the lockstep runner
//! - [`fault_injection`] - Scripted health changes
//! - [`telemetry`] - Status snapshots and transition history
//! - [`config`] - Run configuration

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

extern crate alloc;

pub mod plant;
pub mod physics;
pub mod policy;
pub mod controller;
pub mod scheduler;
pub mod fault_injection;
pub mod telemetry;
pub mod config;

// Re-export main public types for convenience
pub use plant::{Component, PlantState};
pub use controller::{ControllerState, Mode};
pub use scheduler::{BoilerScheduler, StopFlag};
pub use config::SimulationConfig;
