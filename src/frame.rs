//! Video frames as seen by sinks and detection strategies.
//!
//! A `Frame` is cheap to clone (the pixel buffer is shared) and read-only:
//! nothing downstream of the capture manager can alter what the device
//! produced.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::{imageops, Rgb, RgbImage};

#[derive(Clone, Debug)]
pub struct Frame {
    image: Arc<RgbImage>,
    /// Monotonic per-stream counter; a stalled stream stops advancing it.
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
            captured_at: Utc::now(),
        }
    }

    /// Uniformly coloured frame; used by the synthetic camera.
    pub fn solid(width: u32, height: u32, color: [u8; 3], sequence: u64) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(color)), sequence)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Horizontally flipped copy for natural self-view.
    pub fn mirrored(&self) -> Frame {
        Frame {
            image: Arc::new(imageops::flip_horizontal(self.image.as_ref())),
            sequence: self.sequence,
            captured_at: self.captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_swaps_left_and_right_columns() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 0, 255]));
        let frame = Frame::new(image, 7);

        let mirrored = frame.mirrored();
        assert_eq!(mirrored.image().get_pixel(0, 0), &Rgb([0, 0, 255]));
        assert_eq!(mirrored.image().get_pixel(1, 0), &Rgb([255, 0, 0]));
        assert_eq!(mirrored.sequence, 7);
        // the source frame is untouched
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn zero_sized_frame_is_empty() {
        assert!(Frame::solid(0, 480, [0, 0, 0], 1).is_empty());
        assert!(!Frame::solid(640, 480, [0, 0, 0], 1).is_empty());
    }
}
