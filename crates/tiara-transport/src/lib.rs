//! Tiara Transport Layer - one resilient duplex channel per session
//!
//! This crate provides:
//! - `ChannelMachine`: the pure connection lifecycle state machine
//! - `BackoffPolicy`: exponential reconnect delays with an attempt cap
//! - `Connector` / `LinkHandle`: the seam between the machine and a socket
//! - `ChannelManager`: async driver executing the machine against a connector
//! - `WsConnector`: WebSocket links (tokio-tungstenite)

pub mod backoff;
pub mod link;
pub mod machine;
pub mod manager;
pub mod ws;

pub use backoff::*;
pub use link::*;
pub use machine::*;
pub use manager::*;
pub use ws::WsConnector;
