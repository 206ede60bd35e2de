use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::DetectionError;
use crate::frame::Frame;
use crate::violations::{Signal, SignalSource, ViolationKind};

use super::DetectionStrategy;

pub const DEFAULT_STUB_PROBABILITY: f64 = 0.03;

/// Offline stand-in for camera/mobile-device detection: each tick raises a
/// `DeviceDetected` signal with a fixed probability, ignoring the frame.
pub struct StubStrategy {
    probability: f64,
    rng: StdRng,
}

impl StubStrategy {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic variant for tests.
    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

impl Default for StubStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_STUB_PROBABILITY)
    }
}

impl DetectionStrategy for StubStrategy {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn analyze(&mut self, _frame: &Frame) -> Result<Vec<Signal>, DetectionError> {
        if self.rng.gen_bool(self.probability) {
            Ok(vec![Signal::new(
                ViolationKind::DeviceDetected,
                SignalSource::Detector,
            )
            .with_detail("possible phone or second camera in view")])
        } else {
            Ok(Vec::new())
        }
    }
}
