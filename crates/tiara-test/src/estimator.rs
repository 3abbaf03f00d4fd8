//! Seeded pose estimator standing in for the real face detector
//!
//! Produces responses in the service's JSON shape. Poses jitter around the
//! frame center so consecutive responses look like a slightly moving head.

use image::GenericImageView;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

pub struct FakeEstimator {
    rng: StdRng,
    /// Probability that a frame contains a face
    face_probability: f64,
    /// Responses produced
    responses: u64,
}

impl FakeEstimator {
    pub fn new(seed: u64) -> Self {
        FakeEstimator {
            rng: StdRng::seed_from_u64(seed),
            face_probability: 1.0,
            responses: 0,
        }
    }

    pub fn with_face_probability(mut self, probability: f64) -> Self {
        self.face_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn responses(&self) -> u64 {
        self.responses
    }

    /// Estimate from an encoded frame.
    ///
    /// Undecodable input gets the service's error response shape.
    pub fn estimate(&mut self, frame: &[u8]) -> Value {
        self.responses += 1;

        let image = match image::load_from_memory(frame) {
            Ok(image) => image,
            Err(e) => {
                return json!({
                    "face_detected": false,
                    "error": format!("Failed to decode image: {}", e),
                })
            }
        };
        let (width, height) = image.dimensions();
        let frame_size = json!({ "width": width, "height": height });

        if !self.rng.gen_bool(self.face_probability) {
            return json!({ "face_detected": false, "frame_size": frame_size });
        }

        json!({
            "face_detected": true,
            "hat": self.hat(),
            "frame_size": frame_size,
        })
    }

    /// Estimate and serialize to the text frame the service would send
    pub fn respond(&mut self, frame: &[u8]) -> String {
        self.estimate(frame).to_string()
    }

    fn hat(&mut self) -> Value {
        let jitter = |rng: &mut StdRng, spread: f64| rng.gen_range(-spread..spread);
        json!({
            "position": {
                "x": 0.5 + jitter(&mut self.rng, 0.1),
                "y": 0.35 + jitter(&mut self.rng, 0.05),
                "z": self.rng.gen_range(0.0..0.1),
            },
            "rotation": {
                "x": jitter(&mut self.rng, 0.2),
                "y": jitter(&mut self.rng, 0.3),
                "z": jitter(&mut self.rng, 0.1),
            },
            "scale": self.rng.gen_range(0.8..1.2),
        })
    }
}
