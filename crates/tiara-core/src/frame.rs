//! Frame samples - encoded images on their way to the estimator

use std::time::Instant;

use bytes::Bytes;

/// One sampled, encoded frame.
///
/// Produced by the sampler and consumed by a single channel send. Nothing
/// keeps a sample around after that send settles.
#[derive(Debug, Clone)]
pub struct FrameSample {
    /// Capture instant (monotonic)
    pub timestamp: Instant,
    /// Compressed image bytes, sent as-is on the wire
    pub encoded: Bytes,
    /// Encoded width in pixels
    pub width: u32,
    /// Encoded height in pixels
    pub height: u32,
}

impl FrameSample {
    pub fn new(timestamp: Instant, encoded: Bytes, width: u32, height: u32) -> Self {
        Self {
            timestamp,
            encoded,
            width,
            height,
        }
    }

    /// Encoded payload size in bytes
    pub fn byte_len(&self) -> usize {
        self.encoded.len()
    }

    /// Hand the payload to the channel, dropping the sample
    pub fn into_payload(self) -> Bytes {
        self.encoded
    }
}
