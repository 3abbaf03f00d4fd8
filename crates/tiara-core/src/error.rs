//! Error types for the Tiara pipeline

use std::time::Duration;

use thiserror::Error;

/// Camera acquisition failures.
///
/// The camera subsystem lives outside the pipeline, but its categories gate
/// whether the pipeline can start, so they are kept distinct.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied: allow camera access and try again")]
    PermissionDenied,

    #[error("No camera found: connect a camera and try again")]
    DeviceNotFound,

    #[error("Camera is busy: close other applications using it and try again")]
    DeviceBusy,

    #[error("Camera does not support the requested constraints: try a lower resolution")]
    ConstraintsUnsatisfiable,
}

/// Core Tiara errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TiaraError {
    // Capture errors
    #[error("Frame encoding failed: {0}")]
    EncodingFailed(String),

    #[error(transparent)]
    Camera(#[from] CameraError),

    // Wire errors
    #[error("Malformed inbound message: {0}")]
    MalformedMessage(String),

    #[error("Frame too large: {size} bytes exceeds {max}")]
    FrameTooLarge { size: usize, max: usize },

    // Channel errors
    #[error("Connection lost, reconnecting (attempt {attempt}, next retry in {retry_in:?})")]
    ChannelTransient { attempt: u32, retry_in: Duration },

    #[error("Unable to reach pose service after {attempts} attempts")]
    ChannelTerminal { attempts: u32 },

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for Tiara operations
pub type TiaraResult<T> = Result<T, TiaraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_converts() {
        let err: TiaraError = CameraError::DeviceNotFound.into();
        assert_eq!(err, TiaraError::Camera(CameraError::DeviceNotFound));
        assert!(err.to_string().starts_with("No camera found"));
    }

    #[test]
    fn test_terminal_message_names_attempts() {
        let err = TiaraError::ChannelTerminal { attempts: 5 };
        assert_eq!(err.to_string(), "Unable to reach pose service after 5 attempts");
    }
}
