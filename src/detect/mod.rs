//! Frame analysis.
//!
//! A `SignalDetector` wraps one swappable `DetectionStrategy`. It turns a
//! frame into zero or more `Signal`s and never touches capture lifecycle or
//! the violation log; the sensing loop forwards its output to the
//! aggregator.

pub mod heuristic;
pub mod model;
pub mod stub;

use serde::{Deserialize, Serialize};

use crate::error::DetectionError;
use crate::frame::Frame;
use crate::violations::Signal;

pub use heuristic::HeuristicStrategy;
pub use model::{head_rotation_degrees, FaceModel, FaceObservation, ModelStrategy, Point};
pub use stub::StubStrategy;

pub trait DetectionStrategy: Send {
    fn name(&self) -> &'static str;

    fn analyze(&mut self, frame: &Frame) -> Result<Vec<Signal>, DetectionError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DetectionMode {
    #[default]
    Stub,
    Heuristic,
    /// Needs a `FaceModel` supplied by the host.
    Model,
}

#[derive(Default)]
pub struct SignalDetector {
    strategy: Option<Box<dyn DetectionStrategy>>,
    ticks: u64,
    failures: u64,
}

impl SignalDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(strategy: Box<dyn DetectionStrategy>) -> Self {
        let mut detector = Self::new();
        detector.configure(strategy);
        detector
    }

    /// Swaps the active strategy.
    pub fn configure(&mut self, strategy: Box<dyn DetectionStrategy>) {
        log::info!("detection strategy set to {}", strategy.name());
        self.strategy = Some(strategy);
    }

    pub fn is_configured(&self) -> bool {
        self.strategy.is_some()
    }

    pub fn strategy_name(&self) -> Option<&'static str> {
        self.strategy.as_ref().map(|s| s.name())
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Runs one analysis pass over `frame`.
    pub fn tick(&mut self, frame: &Frame) -> Result<Vec<Signal>, DetectionError> {
        let strategy = self
            .strategy
            .as_mut()
            .ok_or(DetectionError::NotConfigured)?;
        self.ticks += 1;
        if frame.is_empty() {
            self.failures += 1;
            return Err(DetectionError::EmptyFrame);
        }
        strategy.analyze(frame).inspect_err(|_| self.failures += 1)
    }
}

/// Builds the strategy named by `mode`.
///
/// `Model` consumes `model`; without one the detector is unavailable.
pub fn strategy_for_mode(
    mode: DetectionMode,
    stub_probability: f64,
    rotation_threshold_deg: f32,
    model: Option<Box<dyn FaceModel>>,
) -> Result<Box<dyn DetectionStrategy>, DetectionError> {
    match mode {
        DetectionMode::Stub => Ok(Box::new(StubStrategy::new(stub_probability))),
        DetectionMode::Heuristic => Ok(Box::new(HeuristicStrategy::default())),
        DetectionMode::Model => {
            let model = model.ok_or(DetectionError::Strategy {
                strategy: "model",
                message: "no face model was provided".into(),
            })?;
            Ok(Box::new(ModelStrategy::new(model, rotation_threshold_deg)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::violations::{SignalSource, ViolationKind};

    struct Failing;

    impl DetectionStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn analyze(&mut self, _frame: &Frame) -> Result<Vec<Signal>, DetectionError> {
            Err(DetectionError::Strategy {
                strategy: "failing",
                message: "boom".into(),
            })
        }
    }

    struct Always(ViolationKind);

    impl DetectionStrategy for Always {
        fn name(&self) -> &'static str {
            "always"
        }

        fn analyze(&mut self, _frame: &Frame) -> Result<Vec<Signal>, DetectionError> {
            Ok(vec![Signal::new(self.0, SignalSource::Detector)])
        }
    }

    #[test]
    fn unconfigured_detector_reports_not_configured() {
        let mut detector = SignalDetector::new();
        assert!(!detector.is_configured());
        let frame = Frame::solid(4, 4, [10, 10, 10], 1);
        assert_eq!(detector.tick(&frame), Err(DetectionError::NotConfigured));
    }

    #[test]
    fn strategy_can_be_swapped() {
        let mut detector = SignalDetector::with_strategy(Box::new(Failing));
        let frame = Frame::solid(4, 4, [10, 10, 10], 1);
        assert!(detector.tick(&frame).is_err());
        assert_eq!(detector.failures(), 1);

        detector.configure(Box::new(Always(ViolationKind::MultiplePeople)));
        let signals = detector.tick(&frame).unwrap();
        assert_eq!(signals[0].kind, ViolationKind::MultiplePeople);
        assert_eq!(detector.strategy_name(), Some("always"));
        assert_eq!(detector.ticks(), 2);
    }

    #[test]
    fn empty_frame_is_rejected_before_strategy_runs() {
        let mut detector = SignalDetector::with_strategy(Box::new(Always(ViolationKind::Other)));
        let frame = Frame::solid(0, 0, [0, 0, 0], 1);
        assert_eq!(detector.tick(&frame), Err(DetectionError::EmptyFrame));
    }

    #[test]
    fn model_mode_without_model_is_unavailable() {
        assert!(strategy_for_mode(DetectionMode::Model, 0.03, 30.0, None).is_err());
        assert_eq!(
            strategy_for_mode(DetectionMode::Heuristic, 0.03, 30.0, None)
                .unwrap()
                .name(),
            "heuristic"
        );
    }
}
