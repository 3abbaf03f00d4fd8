//! Pose Mapper - normalized estimate to scene transform

use tiara_core::{PoseMessage, RenderTransform, TiaraError, TiaraResult, Vec3};

use crate::PresetTable;

/// Mapping configuration
#[derive(Clone, Debug, PartialEq)]
pub struct MapperConfig {
    /// Scene width covered by the video plane
    pub plane_width: f32,
    /// Scene height covered by the video plane
    pub plane_height: f32,
    /// Per-axis rotation attenuation
    pub damping: Vec3,
    pub presets: PresetTable,
}

/// Rotation attenuation applied on every axis by default
pub const DEFAULT_DAMPING: f32 = 0.8;

impl Default for MapperConfig {
    fn default() -> Self {
        MapperConfig {
            plane_width: 4.0,
            plane_height: 3.0,
            damping: Vec3::splat(DEFAULT_DAMPING),
            presets: PresetTable::builtin(),
        }
    }
}

impl MapperConfig {
    pub fn validate(&self) -> TiaraResult<()> {
        let plane_ok = |v: f32| v.is_finite() && v > 0.0;
        if !plane_ok(self.plane_width) || !plane_ok(self.plane_height) {
            return Err(TiaraError::InvalidConfig(format!(
                "plane must be positive, got {}x{}",
                self.plane_width, self.plane_height
            )));
        }
        if !self.damping.is_finite() {
            return Err(TiaraError::InvalidConfig(
                "damping factors must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct PoseMapper {
    config: MapperConfig,
}

impl PoseMapper {
    pub fn new(config: MapperConfig) -> Self {
        PoseMapper { config }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Map the latest message; `None` (nothing received yet) is hidden
    pub fn map_latest(&self, message: Option<&PoseMessage>) -> RenderTransform {
        match message {
            Some(message) => self.map(message),
            None => RenderTransform::hidden(),
        }
    }

    pub fn map(&self, message: &PoseMessage) -> RenderTransform {
        let Some(hat) = message.visible_pose() else {
            return RenderTransform::hidden();
        };

        let preset = self.config.presets.resolve(message.model_type_or_default());

        let x = (hat.position.x - 0.5) * self.config.plane_width;
        let y = (hat.position.y - 0.5) * self.config.plane_height;
        let z = hat.position.z.max(0.0);

        RenderTransform::visible(
            Vec3::new(x, y + preset.y_offset, z),
            hat.rotation.scale_by(self.config.damping),
            hat.scale * preset.scale_multiplier,
        )
    }
}
