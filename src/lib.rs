//! broad2d demo application
//!
//! Configuration loading, scene construction and the fixed-step simulation
//! loop built on top of `broad2d_physics`.

pub mod config;
pub mod scene;
pub mod systems;
