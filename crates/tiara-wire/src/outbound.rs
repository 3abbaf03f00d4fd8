//! Outbound frame payloads
//!
//! Frames go out as raw compressed bytes. The only wire-level rule is the
//! size limit.

use bytes::Bytes;

use tiara_core::{FrameSample, TiaraError, TiaraResult};

use crate::MAX_MESSAGE_SIZE;

/// Payload of one outbound binary message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePayload(Bytes);

impl FramePayload {
    /// Wrap encoded bytes, enforcing the message size limit
    pub fn new(bytes: Bytes) -> TiaraResult<Self> {
        if bytes.len() > MAX_MESSAGE_SIZE {
            return Err(TiaraError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(FramePayload(bytes))
    }

    pub fn from_sample(sample: FrameSample) -> TiaraResult<Self> {
        Self::new(sample.into_payload())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_size_limit() {
        assert!(FramePayload::new(Bytes::from(vec![0u8; 1024])).is_ok());

        let err = FramePayload::new(Bytes::from(vec![0u8; MAX_MESSAGE_SIZE + 1])).unwrap_err();
        assert_eq!(
            err,
            TiaraError::FrameTooLarge {
                size: MAX_MESSAGE_SIZE + 1,
                max: MAX_MESSAGE_SIZE
            }
        );
    }
}
