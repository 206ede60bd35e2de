use crate::error::DetectionError;
use crate::frame::Frame;
use crate::violations::{Signal, SignalSource, ViolationKind};

use super::DetectionStrategy;

/// Flags frames that cannot contain a visible face: a covered lens or a
/// pointed-away camera gives a dark or nearly uniform image.
pub struct HeuristicStrategy {
    /// Mean luma below this is treated as dark.
    pub dark_luma: f32,
    /// Luma standard deviation below this is treated as featureless.
    pub min_contrast: f32,
    /// Sample every n-th pixel in each direction.
    pub stride: u32,
}

impl Default for HeuristicStrategy {
    fn default() -> Self {
        Self {
            dark_luma: 16.0,
            min_contrast: 4.0,
            stride: 4,
        }
    }
}

impl HeuristicStrategy {
    fn luma_stats(&self, frame: &Frame) -> (f32, f32) {
        let image = frame.image();
        let stride = self.stride.max(1) as usize;
        let mut count = 0f64;
        let mut sum = 0f64;
        let mut sum_sq = 0f64;

        for y in (0..image.height()).step_by(stride) {
            for x in (0..image.width()).step_by(stride) {
                let [r, g, b] = image.get_pixel(x, y).0;
                let luma = 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
                sum += luma;
                sum_sq += luma * luma;
                count += 1.0;
            }
        }

        let mean = sum / count;
        let variance = (sum_sq / count - mean * mean).max(0.0);
        (mean as f32, variance.sqrt() as f32)
    }
}

impl DetectionStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn analyze(&mut self, frame: &Frame) -> Result<Vec<Signal>, DetectionError> {
        if frame.is_empty() {
            return Err(DetectionError::EmptyFrame);
        }
        let (mean, contrast) = self.luma_stats(frame);
        if mean < self.dark_luma || contrast < self.min_contrast {
            return Ok(vec![Signal::new(
                ViolationKind::NoFaceOrAway,
                SignalSource::Detector,
            )
            .with_detail(format!(
                "camera view blank or covered (luma {mean:.0}, contrast {contrast:.1})"
            ))]);
        }
        Ok(Vec::new())
    }
}
