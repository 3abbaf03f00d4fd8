//! Tiara Core - Fundamental types shared by the pipeline crates
//!
//! This crate defines:
//! - Geometry (Vec3)
//! - Frame samples handed from capture to the channel
//! - Pose messages and render transforms
//! - Channel lifecycle state and close codes
//! - The error taxonomy

pub mod channel;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod pose;

pub use channel::*;
pub use error::*;
pub use frame::*;
pub use geometry::*;
pub use pose::*;
