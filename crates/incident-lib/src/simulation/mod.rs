//! Simulation driver
//!
//! This module provides:
//! - The fixed-interval loop ticking every service in fleet order
//! - Injectable time through [`Clock`]
//! - Fleet status snapshots published after every tick

mod clock;
mod r#loop;
mod status;


pub use clock::{Clock, SystemClock};
pub use r#loop::{SimulationConfig, SimulationLoop, SimulationLoopBuilder, TickReport};
pub use status::{ActiveFaultStatus, FleetStatus};
