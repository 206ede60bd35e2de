use crate::error::DetectionError;
use crate::frame::Frame;
use crate::violations::{Signal, SignalSource, ViolationKind};

use super::DetectionStrategy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One face found by a `FaceModel`. Eye landmarks are optional because not
/// every model reports them.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceObservation {
    pub confidence: f32,
    pub left_eye: Option<Point>,
    pub right_eye: Option<Point>,
}

/// Host-supplied face detector (an on-device network, a remote service...).
pub trait FaceModel: Send {
    fn name(&self) -> &str;

    fn detect_faces(&mut self, frame: &Frame) -> anyhow::Result<Vec<FaceObservation>>;
}

impl<M: FaceModel + ?Sized> FaceModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn detect_faces(&mut self, frame: &Frame) -> anyhow::Result<Vec<FaceObservation>> {
        (**self).detect_faces(frame)
    }
}

/// Tilt of the line between the eyes, in degrees. 0 means level; 90 means
/// the head is turned fully sideways.
pub fn head_rotation_degrees(left: Point, right: Point) -> f32 {
    let dx = (right.x - left.x).abs();
    let dy = (right.y - left.y).abs();
    dy.atan2(dx).to_degrees()
}

/// Faces the model is less sure of than this are ignored.
const MIN_CONFIDENCE: f32 = 0.5;

pub struct ModelStrategy<M: FaceModel> {
    model: M,
    rotation_threshold_deg: f32,
}

impl<M: FaceModel> ModelStrategy<M> {
    pub fn new(model: M, rotation_threshold_deg: f32) -> Self {
        Self {
            model,
            rotation_threshold_deg,
        }
    }
}

impl<M: FaceModel> DetectionStrategy for ModelStrategy<M> {
    fn name(&self) -> &'static str {
        "model"
    }

    fn analyze(&mut self, frame: &Frame) -> Result<Vec<Signal>, DetectionError> {
        let faces: Vec<FaceObservation> = self
            .model
            .detect_faces(frame)
            .map_err(|err| DetectionError::Strategy {
                strategy: "model",
                message: format!("{}: {err:#}", self.model.name()),
            })?
            .into_iter()
            .filter(|face| face.confidence >= MIN_CONFIDENCE)
            .collect();

        let signal = match faces.as_slice() {
            [] => Some(
                Signal::new(ViolationKind::NoFaceOrAway, SignalSource::Detector)
                    .with_detail("no face in view"),
            ),
            [face] => match (face.left_eye, face.right_eye) {
                (Some(left), Some(right)) => {
                    let rotation = head_rotation_degrees(left, right);
                    (rotation > self.rotation_threshold_deg).then(|| {
                        Signal::new(ViolationKind::NoFaceOrAway, SignalSource::Detector)
                            .with_detail(format!("head turned {rotation:.0} degrees"))
                    })
                }
                _ => None,
            },
            many => Some(
                Signal::new(ViolationKind::MultiplePeople, SignalSource::Detector)
                    .with_detail(format!("{} faces in view", many.len())),
            ),
        };

        Ok(signal.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct Scripted(VecDeque<anyhow::Result<Vec<FaceObservation>>>);

    impl FaceModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn detect_faces(&mut self, _frame: &Frame) -> anyhow::Result<Vec<FaceObservation>> {
            self.0.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn face(left: (f32, f32), right: (f32, f32)) -> FaceObservation {
        FaceObservation {
            confidence: 0.9,
            left_eye: Some(Point::new(left.0, left.1)),
            right_eye: Some(Point::new(right.0, right.1)),
        }
    }

    fn frame() -> Frame {
        Frame::solid(16, 16, [128, 128, 128], 1)
    }

    fn strategy(script: Vec<anyhow::Result<Vec<FaceObservation>>>) -> ModelStrategy<Scripted> {
        ModelStrategy::new(Scripted(script.into()), 30.0)
    }

    #[test]
    fn rotation_is_angle_between_eyes() {
        let level = head_rotation_degrees(Point::new(0.0, 0.0), Point::new(10.0, 0.0));
        assert!(level.abs() < 1e-4);
        let diagonal = head_rotation_degrees(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        assert!((diagonal - 45.0).abs() < 1e-3);
    }

    #[test]
    fn classifies_face_counts_and_rotation() {
        let mut strategy = strategy(vec![
            Ok(vec![]),
            Ok(vec![face((0.0, 0.0), (10.0, 1.0))]),
            Ok(vec![face((0.0, 0.0), (10.0, 10.0))]),
            Ok(vec![face((0.0, 0.0), (10.0, 0.0)), face((30.0, 0.0), (40.0, 0.0))]),
        ]);

        let none = strategy.analyze(&frame()).unwrap();
        assert_eq!(none[0].kind, ViolationKind::NoFaceOrAway);

        assert!(strategy.analyze(&frame()).unwrap().is_empty());

        let turned = strategy.analyze(&frame()).unwrap();
        assert_eq!(turned[0].kind, ViolationKind::NoFaceOrAway);
        assert!(turned[0].detail.as_deref().unwrap_or_default().contains("45"));

        let crowd = strategy.analyze(&frame()).unwrap();
        assert_eq!(crowd[0].kind, ViolationKind::MultiplePeople);
    }

    #[test]
    fn low_confidence_faces_are_ignored() {
        let mut weak = face((0.0, 0.0), (10.0, 0.0));
        weak.confidence = 0.1;
        let mut strategy = strategy(vec![Ok(vec![face((0.0, 0.0), (10.0, 0.0)), weak])]);
        assert!(strategy.analyze(&frame()).unwrap().is_empty());
    }

    #[test]
    fn model_errors_surface_as_strategy_errors() {
        let mut strategy = strategy(vec![Err(anyhow::anyhow!("runtime crashed"))]);
        match strategy.analyze(&frame()) {
            Err(DetectionError::Strategy { strategy, message }) => {
                assert_eq!(strategy, "model");
                assert!(message.contains("runtime crashed"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
