//! Synthetic camera for tests and offline runs.
//!
//! Produces a patterned frame at a fixed rate and exposes a
//! [`SyntheticControl`] through which faults (permission denial, stalls,
//! disabled tracks, a covered lens) can be injected while a session runs.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use log::info;
use tokio::time::{Duration, Instant};

use crate::error::CaptureError;
use crate::frame::Frame;

use super::device::{CaptureDevice, CaptureRequest, MediaStream, TrackInfo, TrackState};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub fps: u32,
    /// Largest resolution the fake sensor supports.
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            fps: 15,
            max_width: 1280,
            max_height: 720,
        }
    }
}

#[derive(Default)]
struct ControlState {
    deny_permission: bool,
    busy: bool,
    unavailable: bool,
    reject_constraints: bool,
    stalled: bool,
    covered: bool,
    open_attempts: u32,
    opens: u32,
    stops: u32,
    last_request: Option<CaptureRequest>,
    streams: Vec<Arc<SyntheticStream>>,
}

/// Fault injection and bookkeeping shared by a camera and its streams.
#[derive(Clone, Default)]
pub struct SyntheticControl {
    state: Arc<Mutex<ControlState>>,
}

impl SyntheticControl {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn deny_permission(&self, deny: bool) {
        self.lock().deny_permission = deny;
    }

    pub fn set_busy(&self, busy: bool) {
        self.lock().busy = busy;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Fail any request that carries resolution or facing constraints.
    pub fn reject_constraints(&self, reject: bool) {
        self.lock().reject_constraints = reject;
    }

    /// Freeze frame delivery on every open stream.
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    /// Dark, uniform frames, as from a covered lens.
    pub fn set_covered(&self, covered: bool) {
        self.lock().covered = covered;
    }

    /// Disables the tracks of every open stream (recoverable).
    pub fn disable_tracks(&self) {
        for stream in self.lock().streams.iter() {
            stream.set_track_state(TrackState::Disabled);
        }
    }

    /// Ends the tracks of every open stream (not recoverable in place).
    pub fn end_tracks(&self) {
        for stream in self.lock().streams.iter() {
            stream.set_track_state(TrackState::Ended);
        }
    }

    pub fn open_attempts(&self) -> u32 {
        self.lock().open_attempts
    }

    pub fn opens(&self) -> u32 {
        self.lock().opens
    }

    pub fn stops(&self) -> u32 {
        self.lock().stops
    }

    pub fn last_request(&self) -> Option<CaptureRequest> {
        self.lock().last_request.clone()
    }

    /// Streams opened and not yet stopped.
    pub fn live_streams(&self) -> usize {
        self.lock()
            .streams
            .iter()
            .filter(|stream| !stream.is_stopped())
            .count()
    }

    fn stalled(&self) -> bool {
        self.lock().stalled
    }

    fn covered(&self) -> bool {
        self.lock().covered
    }

    fn note_stop(&self) {
        self.lock().stops += 1;
    }
}

pub struct SyntheticCamera {
    config: SyntheticConfig,
    control: SyntheticControl,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            control: SyntheticControl::default(),
        }
    }

    pub fn control(&self) -> SyntheticControl {
        self.control.clone()
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn open(&self, request: &CaptureRequest) -> Result<Arc<dyn MediaStream>, CaptureError> {
        let mut state = self.control.lock();
        state.open_attempts += 1;
        state.last_request = Some(request.clone());

        if state.deny_permission {
            return Err(CaptureError::PermissionDenied(
                "synthetic camera permission denied".into(),
            ));
        }
        if state.unavailable {
            return Err(CaptureError::Unavailable("no synthetic camera attached".into()));
        }
        if state.busy {
            return Err(CaptureError::DeviceBusy(
                "synthetic camera in use by another process".into(),
            ));
        }
        if state.reject_constraints && request.is_constrained() {
            return Err(CaptureError::ConstraintsRejected(format!(
                "{}x{} not supported",
                request.width.unwrap_or(0),
                request.height.unwrap_or(0)
            )));
        }

        let width = request
            .width
            .unwrap_or(DEFAULT_WIDTH)
            .min(self.config.max_width);
        let height = request
            .height
            .unwrap_or(DEFAULT_HEIGHT)
            .min(self.config.max_height);

        state.opens += 1;
        let stream = Arc::new(SyntheticStream::new(
            format!("synthetic-{}", state.opens),
            width,
            height,
            self.config.fps.max(1),
            self.control.clone(),
        ));
        state.streams.push(stream.clone());
        info!("synthetic camera opened {} at {width}x{height}", stream.label);
        Ok(stream)
    }
}

struct StreamState {
    track: TrackState,
    stopped: bool,
    frozen_sequence: Option<u64>,
    cached: Option<Frame>,
}

struct SyntheticStream {
    label: String,
    width: u32,
    height: u32,
    frame_interval: Duration,
    opened_at: Instant,
    control: SyntheticControl,
    state: Mutex<StreamState>,
}

impl SyntheticStream {
    fn new(label: String, width: u32, height: u32, fps: u32, control: SyntheticControl) -> Self {
        Self {
            label,
            width,
            height,
            frame_interval: Duration::from_millis(u64::from(1000 / fps).max(1)),
            opened_at: Instant::now(),
            control,
            state: Mutex::new(StreamState {
                track: TrackState::Live,
                stopped: false,
                frozen_sequence: None,
                cached: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn set_track_state(&self, track: TrackState) {
        let mut state = self.lock();
        if !state.stopped {
            state.track = track;
        }
    }

    fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    fn render(&self, sequence: u64, covered: bool) -> Frame {
        if covered {
            return Frame::solid(self.width, self.height, [4, 4, 4], sequence);
        }
        let shift = (sequence % 64) as u32;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            let r = ((x + shift) * 255 / self.width.max(1)) as u8;
            let g = (y * 255 / self.height.max(1)) as u8;
            Rgb([r, g, 128])
        });
        Frame::new(image, sequence)
    }
}

impl MediaStream for SyntheticStream {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn tracks(&self) -> Vec<TrackInfo> {
        let state = self.lock();
        vec![TrackInfo {
            id: format!("{}-video", self.label),
            state: if state.stopped {
                TrackState::Ended
            } else {
                state.track
            },
        }]
    }

    fn enable_tracks(&self) -> usize {
        let mut state = self.lock();
        if !state.stopped && state.track == TrackState::Disabled {
            state.track = TrackState::Live;
            1
        } else {
            0
        }
    }

    fn stop(&self) {
        let mut state = self.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        state.track = TrackState::Ended;
        state.cached = None;
        drop(state);
        self.control.note_stop();
    }

    fn latest_frame(&self) -> Option<Frame> {
        let stalled = self.control.stalled();
        let covered = self.control.covered();
        let mut state = self.lock();
        if state.stopped || state.track != TrackState::Live {
            return None;
        }

        let elapsed = self.opened_at.elapsed().as_millis() as u64;
        let live_sequence = elapsed / self.frame_interval.as_millis().max(1) as u64 + 1;
        let sequence = if stalled {
            *state.frozen_sequence.get_or_insert(live_sequence)
        } else {
            state.frozen_sequence = None;
            live_sequence
        };

        if let Some(frame) = state.cached.as_ref() {
            if frame.sequence == sequence {
                return Some(frame.clone());
            }
        }
        let frame = self.render(sequence, covered);
        state.cached = Some(frame.clone());
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_stops_advancing_sequence() {
        let camera = SyntheticCamera::default();
        let control = camera.control();
        let stream = camera.open(&CaptureRequest::preferred()).await.unwrap();

        let first = stream.latest_frame().unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        let second = stream.latest_frame().unwrap();
        assert!(second.sequence > first.sequence);

        control.set_stalled(true);
        let frozen = stream.latest_frame().unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(stream.latest_frame().unwrap().sequence, frozen.sequence);
    }

    #[tokio::test]
    async fn honours_requested_resolution_within_sensor_limits() {
        let camera = SyntheticCamera::default();
        let stream = camera
            .open(&CaptureRequest {
                width: Some(1920),
                height: Some(1080),
                ..CaptureRequest::preferred()
            })
            .await
            .unwrap();
        assert_eq!(stream.latest_frame().unwrap().dimensions(), (1280, 720));

        let fallback = camera.open(&CaptureRequest::unconstrained()).await.unwrap();
        assert_eq!(fallback.latest_frame().unwrap().dimensions(), (640, 480));
    }

    #[tokio::test]
    async fn disabled_track_yields_no_frames_until_reenabled() {
        let camera = SyntheticCamera::default();
        let control = camera.control();
        let stream = camera.open(&CaptureRequest::preferred()).await.unwrap();

        control.disable_tracks();
        assert!(stream.latest_frame().is_none());
        assert_eq!(stream.enable_tracks(), 1);
        assert!(stream.latest_frame().is_some());

        stream.stop();
        stream.stop();
        assert_eq!(control.stops(), 1);
        assert_eq!(stream.enable_tracks(), 0);
    }
}
