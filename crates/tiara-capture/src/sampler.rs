//! Frame Sampler - bounded-size JPEG snapshots of the live source

use std::time::Instant;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use tiara_core::{FrameSample, TiaraError, TiaraResult};

use crate::VideoSource;

/// Sampler configuration
#[derive(Clone, Debug, PartialEq)]
pub struct SamplerConfig {
    /// Maximum encoded width
    pub max_width: u32,
    /// Maximum encoded height
    pub max_height: u32,
    /// Compression quality in (0, 1]
    pub quality: f32,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            max_width: 320,
            max_height: 240,
            quality: 0.7,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> TiaraResult<()> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(TiaraError::InvalidConfig(
                "sampler bounds must be non-zero".to_string(),
            ));
        }
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(TiaraError::InvalidConfig(format!(
                "sampler quality must be in (0, 1], got {}",
                self.quality
            )));
        }
        Ok(())
    }

    /// JPEG quality on the encoder's 1..=100 scale
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// Largest size within `max_w`×`max_h` with the aspect ratio of
/// `width`×`height`. Never upscales.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = (max_w as f64 / width as f64).min(max_h as f64 / height as f64);
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_w);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_h);
    (w, h)
}

/// Stateless frame sampler
#[derive(Clone, Debug, Default)]
pub struct FrameSampler {
    config: SamplerConfig,
}

impl FrameSampler {
    pub fn new(config: SamplerConfig) -> Self {
        FrameSampler { config }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Capture and encode one frame. `Ok(None)` means "not ready, try next tick".
    pub fn sample<V: VideoSource + ?Sized>(&self, source: &mut V) -> TiaraResult<Option<FrameSample>> {
        match self.capture(source) {
            Some(image) => self.encode(image, Instant::now()).map(Some),
            None => Ok(None),
        }
    }

    /// Grab the current frame, filtering out empty ones
    pub fn capture<V: VideoSource + ?Sized>(&self, source: &mut V) -> Option<RgbImage> {
        let image = source.current_frame()?;
        if image.width() == 0 || image.height() == 0 {
            return None;
        }
        Some(image)
    }

    /// Downsample and compress a captured frame
    pub fn encode(&self, image: RgbImage, timestamp: Instant) -> TiaraResult<FrameSample> {
        let (width, height) = fit_within(
            image.width(),
            image.height(),
            self.config.max_width,
            self.config.max_height,
        );

        let resized = if (width, height) == image.dimensions() {
            image
        } else {
            imageops::resize(&image, width, height, FilterType::Triangle)
        };

        let mut buf = Vec::with_capacity(encode_capacity(width, height));
        JpegEncoder::new_with_quality(&mut buf, self.config.jpeg_quality())
            .encode_image(&resized)
            .map_err(|e| TiaraError::EncodingFailed(e.to_string()))?;

        tracing::trace!(width, height, bytes = buf.len(), "frame encoded");
        Ok(FrameSample::new(timestamp, Bytes::from(buf), width, height))
    }
}

/// Output buffer guess, roughly a quarter byte per pixel
fn encode_capacity(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize) / 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestPattern;
    use image::GenericImageView;

    struct Blank(u32, u32);

    impl VideoSource for Blank {
        fn current_frame(&mut self) -> Option<RgbImage> {
            Some(RgbImage::new(self.0, self.1))
        }
    }

    struct NotReady;

    impl VideoSource for NotReady {
        fn current_frame(&mut self) -> Option<RgbImage> {
            None
        }
    }

    fn started(width: u32, height: u32) -> TestPattern {
        let mut source = TestPattern::new(width, height);
        source.start().unwrap();
        source
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(640, 480, 320, 240), (320, 240));
        assert_eq!(fit_within(1000, 200, 320, 240), (320, 64));
        assert_eq!(fit_within(480, 640, 320, 240), (180, 240));
        assert_eq!(fit_within(100, 80, 320, 240), (100, 80));
        assert_eq!(fit_within(10_000, 1, 320, 240), (320, 1));
    }

    #[test]
    fn test_sample_downsamples_and_decodes() {
        let sampler = FrameSampler::default();
        let sample = sampler.sample(&mut started(640, 480)).unwrap().unwrap();

        assert_eq!((sample.width, sample.height), (320, 240));
        assert!(sample.byte_len() > 0);

        let decoded = image::load_from_memory(&sample.encoded).unwrap();
        assert_eq!(decoded.dimensions(), (320, 240));
    }

    #[test]
    fn test_sample_keeps_small_frames() {
        let sampler = FrameSampler::default();
        let sample = sampler.sample(&mut started(160, 90)).unwrap().unwrap();
        let decoded = image::load_from_memory(&sample.encoded).unwrap();
        assert_eq!(decoded.dimensions(), (160, 90));
    }

    #[test]
    fn test_sample_respects_custom_bounds() {
        let sampler = FrameSampler::new(SamplerConfig {
            max_width: 64,
            max_height: 64,
            quality: 0.5,
        });
        let sample = sampler.sample(&mut started(1280, 720)).unwrap().unwrap();
        let (w, h) = image::load_from_memory(&sample.encoded).unwrap().dimensions();
        assert!(w <= 64 && h <= 64);
        assert_eq!((w, h), (64, 36));
    }

    #[test]
    fn test_not_ready_is_not_an_error() {
        let sampler = FrameSampler::default();
        assert!(sampler.sample(&mut NotReady).unwrap().is_none());
        assert!(sampler.sample(&mut Blank(0, 0)).unwrap().is_none());
        assert!(sampler.sample(&mut Blank(0, 10)).unwrap().is_none());
    }

    #[test]
    fn test_quality_mapping() {
        assert_eq!(SamplerConfig::default().jpeg_quality(), 70);
        let config = SamplerConfig {
            quality: 1.0,
            ..Default::default()
        };
        assert_eq!(config.jpeg_quality(), 100);
    }

    #[test]
    fn test_config_validation() {
        assert!(SamplerConfig::default().validate().is_ok());
        let zero = SamplerConfig {
            max_width: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
        let bad_quality = SamplerConfig {
            quality: 1.5,
            ..Default::default()
        };
        assert!(bad_quality.validate().is_err());
    }

    #[test]
    fn test_encode_failure_is_an_error() {
        // JPEG cannot represent widths above 65535
        let sampler = FrameSampler::new(SamplerConfig {
            max_width: 70_000,
            ..Default::default()
        });
        let err = sampler
            .encode(RgbImage::new(70_000, 2), Instant::now())
            .unwrap_err();
        assert!(matches!(err, TiaraError::EncodingFailed(_)));
    }

    #[test]
    fn test_encode_capacity_saturates() {
        assert_eq!(encode_capacity(320, 240), 19_200);
        assert!(encode_capacity(u32::MAX, u32::MAX) > 0);
    }
}
