//! Tiara Pose Mapping
//!
//! Turns the estimator's normalized hat pose into a scene-space transform:
//!
//! 1. Hide when no face
//! 2. Remap the normalized plane onto scene units, clamp depth at zero
//! 3. Apply the per-model offset/scale preset
//! 4. Attenuate rotation per axis
//!
//! The mapping is pure: no state is carried between messages.

pub mod mapper;
pub mod preset;

pub use mapper::*;
pub use preset::*;
