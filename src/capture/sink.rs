use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::CaptureError;
use crate::frame::Frame;

use super::device::{MediaStream, TrackState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing attached.
    Idle,
    Playing,
    Paused,
    Ended,
}

/// Where a stream is rendered and read back for analysis.
///
/// Shared between the capture manager (which binds and recovers it) and the
/// host (which displays it), so every method takes `&self`.
pub trait FrameSink: Send + Sync {
    fn attach(&self, stream: Arc<dyn MediaStream>, mirrored: bool);

    fn detach(&self);

    fn play(&self) -> Result<(), CaptureError>;

    fn state(&self) -> PlaybackState;

    /// Current output frame, mirrored if the sink was attached that way.
    fn current_frame(&self) -> Option<Frame>;

    fn dimensions(&self) -> (u32, u32) {
        self.current_frame()
            .map(|frame| frame.dimensions())
            .unwrap_or((0, 0))
    }
}

struct PreviewInner {
    stream: Option<Arc<dyn MediaStream>>,
    mirrored: bool,
    playing: bool,
}

/// In-memory self-view sink.
pub struct PreviewSink {
    inner: Mutex<PreviewInner>,
}

impl Default for PreviewSink {
    fn default() -> Self {
        Self::new()
    }
}

impl PreviewSink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PreviewInner {
                stream: None,
                mirrored: false,
                playing: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PreviewInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Host-initiated pause (window minimised, OS throttling, ...).
    pub fn pause(&self) {
        self.lock().playing = false;
    }

    pub fn is_attached(&self) -> bool {
        self.lock().stream.is_some()
    }

    pub fn is_mirrored(&self) -> bool {
        self.lock().mirrored
    }
}

impl FrameSink for PreviewSink {
    fn attach(&self, stream: Arc<dyn MediaStream>, mirrored: bool) {
        let mut inner = self.lock();
        inner.stream = Some(stream);
        inner.mirrored = mirrored;
        inner.playing = false;
    }

    fn detach(&self) {
        let mut inner = self.lock();
        inner.stream = None;
        inner.playing = false;
    }

    fn play(&self) -> Result<(), CaptureError> {
        let mut inner = self.lock();
        match inner.stream.as_ref() {
            Some(stream) if stream.is_live() => {
                inner.playing = true;
                Ok(())
            }
            Some(_) => Err(CaptureError::Unavailable(
                "stream has no live video track".into(),
            )),
            None => Err(CaptureError::NoActiveHandle),
        }
    }

    fn state(&self) -> PlaybackState {
        let inner = self.lock();
        let Some(stream) = inner.stream.as_ref() else {
            return PlaybackState::Idle;
        };
        let tracks = stream.tracks();
        if tracks.is_empty() || tracks.iter().all(|t| t.state == TrackState::Ended) {
            return PlaybackState::Ended;
        }
        if inner.playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        }
    }

    fn current_frame(&self) -> Option<Frame> {
        let (stream, mirrored) = {
            let inner = self.lock();
            (inner.stream.clone()?, inner.mirrored)
        };
        let frame = stream.latest_frame()?;
        Some(if mirrored { frame.mirrored() } else { frame })
    }

    /// Mirroring never changes the size, so read it off the raw frame.
    fn dimensions(&self) -> (u32, u32) {
        let Some(stream) = self.lock().stream.clone() else {
            return (0, 0);
        };
        stream
            .latest_frame()
            .map(|frame| frame.dimensions())
            .unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureDevice, CaptureRequest, SyntheticCamera};

    #[tokio::test]
    async fn dimensions_follow_the_attached_stream() {
        let sink = PreviewSink::new();
        assert_eq!(sink.dimensions(), (0, 0));
        assert_eq!(sink.state(), PlaybackState::Idle);

        let camera = SyntheticCamera::default();
        let control = camera.control();
        let stream = camera.open(&CaptureRequest::preferred()).await.unwrap();
        sink.attach(stream, true);
        assert_eq!(sink.state(), PlaybackState::Paused);
        assert_eq!(sink.dimensions(), (1280, 720));

        sink.play().unwrap();
        assert_eq!(sink.state(), PlaybackState::Playing);
        let frame = sink.current_frame().unwrap();
        assert_eq!(frame.dimensions(), sink.dimensions());

        control.disable_tracks();
        assert_eq!(sink.dimensions(), (0, 0));
        sink.detach();
        assert_eq!(sink.state(), PlaybackState::Idle);
    }
}
