//! Application systems
//!
//! Modular systems driven by the demo loop in main.rs.

mod simulation;

pub use simulation::{SimulationStats, SimulationSystem, TickResult};
