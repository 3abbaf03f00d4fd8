//! Per-model offset/scale presets
//!
//! Overlay assets differ in pivot point and native size. Each model type
//! gets a row; adding an asset means adding a row, not code.

use std::collections::HashMap;

use tiara_core::{TiaraError, TiaraResult, DEFAULT_MODEL_TYPE};

/// Placement correction for one overlay asset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPreset {
    /// Added to the mapped vertical position (scene units)
    pub y_offset: f32,
    /// Multiplies the estimated scale
    pub scale_multiplier: f32,
}

impl ModelPreset {
    pub const fn new(y_offset: f32, scale_multiplier: f32) -> Self {
        Self {
            y_offset,
            scale_multiplier,
        }
    }
}

/// Built-in rows: (model type, y offset, scale multiplier)
pub const BUILTIN_PRESETS: &[(&str, f32, f32)] = &[
    (DEFAULT_MODEL_TYPE, -0.8, 1.0),
    ("large", -1.0, 0.35),
    ("small", -0.2, 0.008),
    ("cowboy", -0.9, 0.8),
    ("baseball_cap", -0.6, 0.6),
];

/// Lookup table from model type to preset.
///
/// Always contains a `default` row; unknown model types resolve to it.
#[derive(Debug, Clone, PartialEq)]
pub struct PresetTable {
    rows: HashMap<String, ModelPreset>,
    fallback: ModelPreset,
}

impl PresetTable {
    /// Table with only the given default row
    pub fn with_default(preset: ModelPreset) -> Self {
        let mut rows = HashMap::new();
        rows.insert(DEFAULT_MODEL_TYPE.to_string(), preset);
        Self {
            rows,
            fallback: preset,
        }
    }

    /// Table with the built-in rows
    pub fn builtin() -> Self {
        let mut table = Self::with_default(ModelPreset::new(-0.8, 1.0));
        for (name, y_offset, scale_multiplier) in BUILTIN_PRESETS {
            table.rows.insert(
                (*name).to_string(),
                ModelPreset::new(*y_offset, *scale_multiplier),
            );
        }
        table
    }

    /// Add or replace a row. Replacing `default` also changes the fallback.
    pub fn insert(&mut self, model_type: impl Into<String>, preset: ModelPreset) -> TiaraResult<()> {
        let model_type = model_type.into();
        if model_type.is_empty() {
            return Err(TiaraError::InvalidConfig(
                "preset model type must not be empty".to_string(),
            ));
        }
        if !(preset.scale_multiplier.is_finite() && preset.scale_multiplier > 0.0) {
            return Err(TiaraError::InvalidConfig(format!(
                "preset '{}' scale multiplier must be positive",
                model_type
            )));
        }
        if !preset.y_offset.is_finite() {
            return Err(TiaraError::InvalidConfig(format!(
                "preset '{}' y offset must be finite",
                model_type
            )));
        }
        if model_type == DEFAULT_MODEL_TYPE {
            self.fallback = preset;
        }
        self.rows.insert(model_type, preset);
        Ok(())
    }

    /// Preset for `model_type`, or the default row
    pub fn resolve(&self, model_type: &str) -> ModelPreset {
        match self.rows.get(model_type) {
            Some(preset) => *preset,
            None => {
                tracing::debug!(model_type, "unknown model type, using default preset");
                self.fallback
            }
        }
    }

    pub fn contains(&self, model_type: &str) -> bool {
        self.rows.contains_key(model_type)
    }

    /// Known model types, sorted
    pub fn model_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rows.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PresetTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rows() {
        let table = PresetTable::builtin();
        assert_eq!(table.resolve("default"), ModelPreset::new(-0.8, 1.0));
        assert_eq!(table.resolve("large"), ModelPreset::new(-1.0, 0.35));
        assert_eq!(table.resolve("small"), ModelPreset::new(-0.2, 0.008));
        assert_eq!(
            table.model_types(),
            vec!["baseball_cap", "cowboy", "default", "large", "small"]
        );
    }

    #[test]
    fn test_unknown_falls_back_to_default() {
        let table = PresetTable::builtin();
        assert_eq!(table.resolve("top_hat"), table.resolve(DEFAULT_MODEL_TYPE));
    }

    #[test]
    fn test_new_asset_is_a_new_row() {
        let mut table = PresetTable::builtin();
        table.insert("top_hat", ModelPreset::new(-1.2, 0.5)).unwrap();
        assert_eq!(table.resolve("top_hat"), ModelPreset::new(-1.2, 0.5));
    }

    #[test]
    fn test_replacing_default_moves_fallback() {
        let mut table = PresetTable::builtin();
        table.insert(DEFAULT_MODEL_TYPE, ModelPreset::new(0.0, 2.0)).unwrap();
        assert_eq!(table.resolve("nope"), ModelPreset::new(0.0, 2.0));
    }

    #[test]
    fn test_invalid_rows_rejected() {
        let mut table = PresetTable::builtin();
        assert!(table.insert("", ModelPreset::new(0.0, 1.0)).is_err());
        assert!(table.insert("x", ModelPreset::new(0.0, 0.0)).is_err());
        assert!(table.insert("x", ModelPreset::new(f32::NAN, 1.0)).is_err());
        assert!(!table.contains("x"));
    }
}
