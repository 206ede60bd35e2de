//! Per-session background work: frame analysis, capture health and host
//! focus monitoring. All three run as tokio tasks under one cancellation
//! token and report only through the aggregator or `SensingNotice`s.

pub mod controller;
pub mod focus;
mod loop_worker;

use tokio::time::Duration;

use crate::capture::DegradedReason;
use crate::error::CaptureError;

pub use controller::{SensingContext, SensingController};
pub use focus::{EnvironmentBus, EnvironmentEvent, FocusMonitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensingTiming {
    pub detection_interval: Duration,
    pub tick_timeout: Duration,
    pub health_interval: Duration,
}

impl Default for SensingTiming {
    fn default() -> Self {
        Self {
            detection_interval: Duration::from_millis(2_000),
            tick_timeout: Duration::from_millis(1_500),
            health_interval: Duration::from_millis(2_000),
        }
    }
}

/// Capture conditions the session needs to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensingNotice {
    Degraded(DegradedReason),
    /// Recovery failed and the handle is gone.
    CaptureLost(CaptureError),
}
