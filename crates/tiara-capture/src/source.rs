//! Video sources
//!
//! The camera itself is outside the pipeline. A `VideoSource` is the seam:
//! acquire once, then hand out the most recent frame on demand.

use image::{Rgb, RgbImage};

use tiara_core::CameraError;

/// A live video source.
pub trait VideoSource: Send + 'static {
    /// Acquire the device. Failure categories are surfaced to the user as-is.
    fn start(&mut self) -> Result<(), CameraError> {
        Ok(())
    }

    /// Most recent frame, or `None` when nothing is ready yet.
    fn current_frame(&mut self) -> Option<RgbImage>;

    /// Release the device.
    fn stop(&mut self) {}
}

/// Synthetic source: a bright square sweeping across a gradient.
///
/// Used by the demo and tests in place of a camera.
pub struct TestPattern {
    width: u32,
    height: u32,
    frame_index: u32,
    warmup_frames: u32,
    acquisition_error: Option<CameraError>,
    started: bool,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
            warmup_frames: 0,
            acquisition_error: None,
            started: false,
        }
    }

    /// Report "no frame ready" for the first `frames` polls
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup_frames = frames;
        self
    }

    /// Fail `start()` with the given category
    pub fn with_acquisition_error(mut self, error: CameraError) -> Self {
        self.acquisition_error = Some(error);
        self
    }

    pub fn frames_produced(&self) -> u32 {
        self.frame_index
    }

    fn render(&self) -> RgbImage {
        let size = (self.width.min(self.height) / 4).max(1);
        let span = self.width.saturating_sub(size).max(1);
        let left = self.frame_index.wrapping_mul(7) % span;
        let top = self.height.saturating_sub(size) / 2;

        RgbImage::from_fn(self.width, self.height, |x, y| {
            if x >= left && x < left + size && y >= top && y < top + size {
                Rgb([250, 230, 40])
            } else {
                let shade = ((x + y) % 256) as u8;
                Rgb([shade / 2, shade / 3, shade])
            }
        })
    }
}

impl VideoSource for TestPattern {
    fn start(&mut self) -> Result<(), CameraError> {
        if let Some(error) = self.acquisition_error.clone() {
            return Err(error);
        }
        self.started = true;
        Ok(())
    }

    fn current_frame(&mut self) -> Option<RgbImage> {
        if !self.started {
            return None;
        }
        if self.warmup_frames > 0 {
            self.warmup_frames -= 1;
            return None;
        }
        let frame = self.render();
        self.frame_index = self.frame_index.wrapping_add(1);
        Some(frame)
    }

    fn stop(&mut self) {
        self.started = false;
    }
}
