//! Pose response decoding
//!
//! Anything that does not decode into a complete `PoseMessage` is reported
//! as `MalformedMessage`; callers drop it and keep their previous state.

use serde::Deserialize;

use tiara_core::{FrameSize, HatPose, PoseMessage, TiaraError, TiaraResult, Vec3};

use crate::MAX_MESSAGE_SIZE;

#[derive(Debug, Deserialize)]
struct WireVec3 {
    x: f32,
    y: f32,
    z: f32,
}

impl From<WireVec3> for Vec3 {
    fn from(v: WireVec3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Deserialize)]
struct WireHat {
    position: WireVec3,
    rotation: WireVec3,
    scale: f32,
}

#[derive(Debug, Deserialize)]
struct WireFrameSize {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct WirePoseMessage {
    face_detected: bool,
    #[serde(default)]
    hat: Option<WireHat>,
    #[serde(default)]
    frame_size: Option<WireFrameSize>,
    #[serde(default)]
    error: Option<String>,
}

/// Decode one server response.
pub fn decode_pose_message(payload: &[u8]) -> TiaraResult<PoseMessage> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(TiaraError::MalformedMessage(format!(
            "message of {} bytes exceeds {}",
            payload.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let wire: WirePoseMessage = serde_json::from_slice(payload)
        .map_err(|e| TiaraError::MalformedMessage(e.to_string()))?;

    let hat = match (wire.face_detected, wire.hat) {
        (true, Some(hat)) => Some(validate_hat(hat)?),
        (true, None) => {
            return Err(TiaraError::MalformedMessage(
                "face_detected without hat pose".to_string(),
            ))
        }
        // A stray pose on a no-face response is ignored
        (false, _) => None,
    };

    Ok(PoseMessage {
        face_detected: wire.face_detected,
        hat,
        model_type: None,
        error: wire.error.filter(|e| !e.is_empty()),
        frame_size: wire.frame_size.map(|s| FrameSize {
            width: s.width,
            height: s.height,
        }),
    })
}

fn validate_hat(hat: WireHat) -> TiaraResult<HatPose> {
    let pose = HatPose::new(hat.position.into(), hat.rotation.into(), hat.scale);

    if !pose.position.is_finite() || !pose.rotation.is_finite() {
        return Err(TiaraError::MalformedMessage(
            "non-finite hat pose".to_string(),
        ));
    }
    if !(pose.scale.is_finite() && pose.scale > 0.0) {
        return Err(TiaraError::MalformedMessage(format!(
            "hat scale must be positive, got {}",
            pose.scale
        )));
    }

    Ok(pose)
}
