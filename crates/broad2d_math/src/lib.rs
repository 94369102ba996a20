//! 2D Mathematics Library
//!
//! This crate provides the small set of 2D math types the broadphase needs.
//!
//! ## Core Types
//!
//! - [`Vec2`] - 2D vector with x, y components
//! - [`Rot2`] - 2D rotation stored as cosine/sine
//! - [`Transform2D`] - Position and rotation of a body in world space

mod vec2;
mod rot2;
mod transform;

pub use vec2::Vec2;
pub use rot2::Rot2;
pub use transform::Transform2D;
