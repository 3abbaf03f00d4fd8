//! Tiara Capture
//!
//! The outbound half of the pipeline, up to the channel:
//!
//! Camera → VideoSource → FrameSampler (downsample + JPEG) → BackpressureGate → send
//!
//! - `FrameSampler` bounds frame size so uploads stay small.
//! - `BackpressureGate` bounds frame *rate* and keeps at most one frame in
//!   flight, and suppresses sampling entirely while the channel is not open.
//! - `PerformanceMonitor` reports the achieved sampling rate.

pub mod gate;
pub mod monitor;
pub mod sampler;
pub mod source;

pub use gate::*;
pub use monitor::*;
pub use sampler::*;
pub use source::*;
