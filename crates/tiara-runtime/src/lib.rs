//! Tiara Runtime - wires the pipeline together
//!
//! Two tasks per session:
//! - sampling: interval tick → gate → sample/encode → channel send
//! - pose consumer: channel messages → mapper → render slot
//!
//! The render slot is a `watch` of the latest `RenderTransform`; the display
//! refresh reads it at its own cadence.

pub mod config;
pub mod pipeline;
pub mod telemetry;

pub use config::*;
pub use pipeline::*;
pub use telemetry::init_tracing;
