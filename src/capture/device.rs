use async_trait::async_trait;

use crate::error::CaptureError;
use crate::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// The camera looking at the user.
    Front,
    Back,
}

/// What the manager asks a device for. Video only; `audio` exists so the
/// request can be inspected, and the manager always forces it off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub facing: Option<Facing>,
    pub audio: bool,
}

impl CaptureRequest {
    /// First attempt: front camera at 1280x720.
    pub fn preferred() -> Self {
        Self {
            width: Some(1280),
            height: Some(720),
            facing: Some(Facing::Front),
            audio: false,
        }
    }

    /// Fallback attempt: any video input, no constraints.
    pub fn unconstrained() -> Self {
        Self {
            width: None,
            height: None,
            facing: None,
            audio: false,
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.width.is_some() || self.height.is_some() || self.facing.is_some()
    }
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self::preferred()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Live,
    /// Muted/disabled but recoverable.
    Disabled,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub id: String,
    pub state: TrackState,
}

/// A live stream handed out by a device. Implementations use interior
/// mutability; the stream is shared between the manager and the sink.
pub trait MediaStream: Send + Sync {
    fn label(&self) -> String;

    fn tracks(&self) -> Vec<TrackInfo>;

    /// Re-enables disabled tracks. Returns how many were re-enabled.
    fn enable_tracks(&self) -> usize;

    /// Stops every track. Idempotent.
    fn stop(&self);

    /// Most recent frame the device produced, unmirrored.
    fn latest_frame(&self) -> Option<Frame>;

    fn is_live(&self) -> bool {
        self.tracks().iter().any(|t| t.state == TrackState::Live)
    }
}

#[async_trait]
pub trait CaptureDevice: Send + Sync {
    fn name(&self) -> &str;

    async fn open(
        &self,
        request: &CaptureRequest,
    ) -> Result<std::sync::Arc<dyn MediaStream>, CaptureError>;
}
