//! Tiara Test Harness
//!
//! This crate provides:
//! - `ScriptedConnector`: in-process links with scripted handshakes,
//!   injectable inbound messages and closes, and send-delay control
//! - `FakeEstimator`: seeded stand-in for the pose service's estimator
//! - `PoseServer`: loopback WebSocket pose service
//! - `eventually`: bounded polling for async assertions

pub mod estimator;
pub mod scripted;
pub mod server;
pub mod wait;

pub use estimator::*;
pub use scripted::*;
pub use server::*;
pub use wait::*;
