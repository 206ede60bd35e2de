//! Capture session management.
//!
//! - `device`: the boundary to a camera (`CaptureDevice`, `MediaStream`)
//! - `sink`: where frames are rendered and read back (`FrameSink`)
//! - `manager`: acquisition with fallback, sink binding, health checks,
//!   recovery and release of the single per-session handle
//! - `synthetic`: a scriptable camera for tests and offline runs

pub mod device;
pub mod manager;
pub mod sink;
pub mod synthetic;

pub use device::{CaptureDevice, CaptureRequest, Facing, MediaStream, TrackInfo, TrackState};
pub use manager::{CaptureManager, CaptureSettings, DegradedReason, HandleInfo, HealthStatus};
pub use sink::{FrameSink, PlaybackState, PreviewSink};
pub use synthetic::{SyntheticCamera, SyntheticConfig, SyntheticControl};
