//! Pipeline configuration
//!
//! Resolution order: built-in defaults, then a JSON file whose fields are all
//! optional, then `TIARA_*` environment variables, then validation.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use tiara_capture::{GateConfig, SamplerConfig};
use tiara_core::{TiaraError, TiaraResult, Vec3, DEFAULT_MODEL_TYPE};
use tiara_pose::{MapperConfig, ModelPreset};
use tiara_transport::{BackoffPolicy, ChannelConfig};

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

pub const ENV_CONFIG_PATH: &str = "TIARA_CONFIG";
pub const ENV_ENDPOINT: &str = "TIARA_ENDPOINT";
pub const ENV_TARGET_RATE: &str = "TIARA_TARGET_RATE";

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    endpoint: Option<String>,
    tick_interval_ms: Option<u64>,
    model_type: Option<String>,
    sampler: Option<SamplerConfigFile>,
    gate: Option<GateConfigFile>,
    reconnect: Option<ReconnectConfigFile>,
    mapper: Option<MapperConfigFile>,
    presets: Option<BTreeMap<String, PresetConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplerConfigFile {
    max_width: Option<u32>,
    max_height: Option<u32>,
    quality: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct GateConfigFile {
    target_rate: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct ReconnectConfigFile {
    base_delay_ms: Option<u64>,
    factor: Option<f64>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MapperConfigFile {
    plane_width: Option<f32>,
    plane_height: Option<f32>,
    /// Per-axis rotation damping `[x, y, z]`
    damping: Option<[f32; 3]>,
}

#[derive(Debug, Deserialize)]
struct PresetConfigFile {
    y_offset: f32,
    scale_multiplier: f32,
}

/// Everything a pipeline session needs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub channel: ChannelConfig,
    pub sampler: SamplerConfig,
    pub gate: GateConfig,
    pub mapper: MapperConfig,
    /// Sampling loop cadence; the gate decides which ticks produce frames
    pub tick_interval: Duration,
    /// Overlay model applied to messages that do not name one
    pub model_type: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            channel: ChannelConfig::new(DEFAULT_ENDPOINT),
            sampler: SamplerConfig::default(),
            gate: GateConfig::default(),
            mapper: MapperConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            model_type: DEFAULT_MODEL_TYPE.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from `TIARA_CONFIG` (if set) and the environment
    pub fn load() -> TiaraResult<Self> {
        let path = std::env::var(ENV_CONFIG_PATH).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any) and the environment
    pub fn load_from(path: Option<&Path>) -> TiaraResult<Self> {
        let file = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let mut config = Self::from_file(file)?;
        config.apply_env_with(|key| std::env::var(key).ok())?;
        config.validate()?;
        tracing::debug!(endpoint = %config.channel.endpoint, "configuration loaded");
        Ok(config)
    }

    /// Parse a JSON document, without consulting the environment
    pub fn from_json(json: &str) -> TiaraResult<Self> {
        let file: PipelineConfigFile = serde_json::from_str(json)
            .map_err(|e| TiaraError::InvalidConfig(format!("config parse error: {}", e)))?;
        let config = Self::from_file(file)?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(file: PipelineConfigFile) -> TiaraResult<Self> {
        let mut config = PipelineConfig::default();

        if let Some(endpoint) = file.endpoint {
            config.channel.endpoint = endpoint;
        }
        if let Some(ms) = file.tick_interval_ms {
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(model_type) = file.model_type {
            config.model_type = model_type;
        }

        let sampler = file.sampler.unwrap_or_default();
        config.sampler.max_width = sampler.max_width.unwrap_or(config.sampler.max_width);
        config.sampler.max_height = sampler.max_height.unwrap_or(config.sampler.max_height);
        config.sampler.quality = sampler.quality.unwrap_or(config.sampler.quality);

        let gate = file.gate.unwrap_or_default();
        config.gate.target_rate = gate.target_rate.unwrap_or(config.gate.target_rate);

        let reconnect = file.reconnect.unwrap_or_default();
        let backoff = &mut config.channel.backoff;
        *backoff = BackoffPolicy {
            base_delay: reconnect
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(backoff.base_delay),
            factor: reconnect.factor.unwrap_or(backoff.factor),
            max_attempts: reconnect.max_attempts.unwrap_or(backoff.max_attempts),
        };

        let mapper = file.mapper.unwrap_or_default();
        config.mapper.plane_width = mapper.plane_width.unwrap_or(config.mapper.plane_width);
        config.mapper.plane_height = mapper.plane_height.unwrap_or(config.mapper.plane_height);
        if let Some([x, y, z]) = mapper.damping {
            config.mapper.damping = Vec3::new(x, y, z);
        }

        for (model_type, row) in file.presets.unwrap_or_default() {
            config
                .mapper
                .presets
                .insert(model_type, ModelPreset::new(row.y_offset, row.scale_multiplier))?;
        }

        Ok(config)
    }

    /// Apply `TIARA_ENDPOINT` / `TIARA_TARGET_RATE` through `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F) -> TiaraResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            if !endpoint.trim().is_empty() {
                self.channel.endpoint = endpoint.trim().to_string();
            }
        }
        if let Some(rate) = lookup(ENV_TARGET_RATE) {
            self.gate.target_rate = rate.trim().parse().map_err(|_| {
                TiaraError::InvalidConfig(format!(
                    "{} must be a number of frames per second",
                    ENV_TARGET_RATE
                ))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> TiaraResult<()> {
        if !(self.channel.endpoint.starts_with("ws://") || self.channel.endpoint.starts_with("wss://")) {
            return Err(TiaraError::InvalidConfig(format!(
                "endpoint must be a ws:// or wss:// URL, got '{}'",
                self.channel.endpoint
            )));
        }
        if self.tick_interval.is_zero() {
            return Err(TiaraError::InvalidConfig(
                "tick interval must be non-zero".to_string(),
            ));
        }
        if self.model_type.is_empty() {
            return Err(TiaraError::InvalidConfig(
                "model type must not be empty".to_string(),
            ));
        }
        self.channel.validate()?;
        self.sampler.validate()?;
        self.gate.validate()?;
        self.mapper.validate()
    }
}

fn read_config_file(path: &Path) -> TiaraResult<PipelineConfigFile> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        TiaraError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&contents).map_err(|e| {
        TiaraError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
    })
}
