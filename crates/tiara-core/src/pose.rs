//! Pose State - what the estimator reports and what the renderer consumes
//!
//! A `PoseMessage` is the decoded server response for one frame. A
//! `RenderTransform` is the scene-space placement of the overlay derived
//! from the most recent message.

use crate::Vec3;

/// Model identifier used when nothing else is selected
pub const DEFAULT_MODEL_TYPE: &str = "default";

/// Overlay placement as estimated by the remote service.
///
/// Position is in normalized image-plane coordinates (roughly `[0, 1]`)
/// plus depth; rotation is Euler angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HatPose {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
}

impl HatPose {
    pub fn new(position: Vec3, rotation: Vec3, scale: f32) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }
}

/// Size of the image the server actually processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

/// One complete pose response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PoseMessage {
    pub face_detected: bool,
    /// Present only when a face was detected
    pub hat: Option<HatPose>,
    /// Overlay asset the pose applies to; filled client-side when absent
    pub model_type: Option<String>,
    /// Server-side fault description, if any
    pub error: Option<String>,
    pub frame_size: Option<FrameSize>,
}

impl PoseMessage {
    /// Explicit "no face" message
    pub fn no_face() -> Self {
        Self::default()
    }

    pub fn detected(hat: HatPose) -> Self {
        Self {
            face_detected: true,
            hat: Some(hat),
            ..Self::default()
        }
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    /// Model identifier, falling back to the default preset
    pub fn model_type_or_default(&self) -> &str {
        self.model_type.as_deref().unwrap_or(DEFAULT_MODEL_TYPE)
    }

    /// Pose to render, or `None` when the overlay must be hidden
    pub fn visible_pose(&self) -> Option<&HatPose> {
        if self.face_detected {
            self.hat.as_ref()
        } else {
            None
        }
    }
}

/// Render-ready overlay transform in scene units.
///
/// When `visible` is false, the other fields carry no meaning and the
/// renderer ignores them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: f32,
    pub visible: bool,
}

impl RenderTransform {
    /// Overlay hidden (no face, or nothing received yet)
    pub const fn hidden() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: 1.0,
            visible: false,
        }
    }

    pub fn visible(position: Vec3, rotation: Vec3, scale: f32) -> Self {
        Self {
            position,
            rotation,
            scale,
            visible: true,
        }
    }
}

impl Default for RenderTransform {
    fn default() -> Self {
        Self::hidden()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_pose_requires_detection() {
        let hat = HatPose::new(Vec3::splat(0.5), Vec3::ZERO, 1.0);
        let mut msg = PoseMessage::detected(hat);
        assert_eq!(msg.visible_pose(), Some(&hat));

        msg.face_detected = false;
        assert!(msg.visible_pose().is_none());
    }

    #[test]
    fn test_model_type_fallback() {
        let msg = PoseMessage::no_face();
        assert_eq!(msg.model_type_or_default(), DEFAULT_MODEL_TYPE);
        let msg = msg.with_model_type("cowboy");
        assert_eq!(msg.model_type_or_default(), "cowboy");
    }

    #[test]
    fn test_default_transform_hidden() {
        assert!(!RenderTransform::default().visible);
    }
}
