//! Tiara Wire Protocol
//!
//! Client → server: one binary message per frame, raw compressed image
//! bytes with no envelope.
//!
//! Server → client: one UTF-8 JSON document per response:
//!
//! ```text
//! {
//!   "face_detected": bool,
//!   "hat": { "position": {x,y,z}, "rotation": {x,y,z}, "scale": num },
//!   "frame_size": { "width": int, "height": int },
//!   "error": "string"
//! }
//! ```
//!
//! `hat` is present iff `face_detected`; `frame_size` and `error` are
//! optional. Close code 1000 marks an intentional disconnect.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;

/// Maximum message size in either direction (5 MiB)
pub const MAX_MESSAGE_SIZE: usize = 5 * 1024 * 1024;
