use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::time::{self, Duration, Instant};
use uuid::Uuid;

use crate::error::CaptureError;
use crate::frame::Frame;

use super::device::{CaptureDevice, CaptureRequest, MediaStream};
use super::sink::{FrameSink, PlaybackState};

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub preferred: CaptureRequest,
    /// In-place recovery attempts before a full re-acquisition.
    pub max_recovery_attempts: u32,
    pub bind_timeout: Duration,
    pub bind_poll: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            preferred: CaptureRequest::preferred(),
            max_recovery_attempts: 3,
            bind_timeout: Duration::from_secs(3),
            bind_poll: Duration::from_millis(100),
        }
    }
}

/// The one live stream (plus sink binding) a manager owns.
struct CaptureHandle {
    id: Uuid,
    stream: Arc<dyn MediaStream>,
    sink: Option<Arc<dyn FrameSink>>,
    fallback: bool,
    acquired_at: DateTime<Utc>,
}

/// Read-only description of the active handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleInfo {
    pub id: Uuid,
    pub label: String,
    /// Acquired with the unconstrained fallback request.
    pub fallback: bool,
    pub bound: bool,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedReason {
    NoSink,
    SinkPaused,
    SinkEnded,
    ZeroDimensions,
    /// Frames stopped arriving since the previous check.
    Stalled,
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DegradedReason::NoSink => "no sink bound",
            DegradedReason::SinkPaused => "sink paused",
            DegradedReason::SinkEnded => "sink ended",
            DegradedReason::ZeroDimensions => "zero-dimension frames",
            DegradedReason::Stalled => "frame delivery stalled",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// Unhealthy at check time; recovery has been attempted.
    Degraded { reason: DegradedReason },
}

/// Owns capture device lifecycle for one session.
pub struct CaptureManager {
    device: Arc<dyn CaptureDevice>,
    settings: CaptureSettings,
    handle: Option<CaptureHandle>,
    recovery_attempts: u32,
    last_sequence: Option<u64>,
}

impl CaptureManager {
    pub fn new(device: Arc<dyn CaptureDevice>, settings: CaptureSettings) -> Self {
        Self {
            device,
            settings,
            handle: None,
            recovery_attempts: 0,
            last_sequence: None,
        }
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle_info(&self) -> Option<HandleInfo> {
        self.handle.as_ref().map(|handle| HandleInfo {
            id: handle.id,
            label: handle.stream.label(),
            fallback: handle.fallback,
            bound: handle.sink.is_some(),
            acquired_at: handle.acquired_at,
        })
    }

    /// Acquires with the configured preferred request.
    pub async fn acquire(&mut self) -> Result<HandleInfo, CaptureError> {
        let preferred = self.settings.preferred.clone();
        self.acquire_with(&preferred).await
    }

    /// Releases any current handle, then opens `preferred`, falling back once
    /// to an unconstrained video-only request. Permission denial is final.
    pub async fn acquire_with(
        &mut self,
        preferred: &CaptureRequest,
    ) -> Result<HandleInfo, CaptureError> {
        self.release();

        let mut request = preferred.clone();
        request.audio = false;

        let (stream, fallback) = match self.device.open(&request).await {
            Ok(stream) => (stream, false),
            Err(err @ CaptureError::PermissionDenied(_)) => {
                warn!("capture permission denied on {}: {err}", self.device.name());
                return Err(err);
            }
            Err(first) => {
                warn!(
                    "preferred capture request failed on {} ({first}); retrying unconstrained",
                    self.device.name()
                );
                let stream = self
                    .device
                    .open(&CaptureRequest::unconstrained())
                    .await
                    .map_err(|err| {
                        error!("fallback capture request failed: {err}");
                        err
                    })?;
                (stream, true)
            }
        };

        let handle = CaptureHandle {
            id: Uuid::new_v4(),
            stream,
            sink: None,
            fallback,
            acquired_at: Utc::now(),
        };
        info!(
            "capture handle {} acquired ({}{})",
            handle.id,
            handle.stream.label(),
            if fallback { ", fallback" } else { "" }
        );
        self.handle = Some(handle);
        self.recovery_attempts = 0;
        self.last_sequence = None;

        self.handle_info().ok_or(CaptureError::NoActiveHandle)
    }

    /// Attaches the stream to `sink` mirrored, starts playback, and waits
    /// until the sink is playing non-empty frames.
    pub async fn bind_sink(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), CaptureError> {
        let handle = self.handle.as_mut().ok_or(CaptureError::NoActiveHandle)?;
        if let Some(previous) = handle.sink.take() {
            previous.detach();
        }

        sink.attach(handle.stream.clone(), true);
        if let Err(err) = sink.play() {
            sink.detach();
            return Err(err);
        }

        let timeout = self.settings.bind_timeout;
        let poll = self.settings.bind_poll;
        let started = Instant::now();
        let ready = time::timeout(timeout, async {
            loop {
                if sink_is_producing(sink.as_ref()) {
                    break;
                }
                time::sleep(poll).await;
            }
        })
        .await;

        if ready.is_err() {
            sink.detach();
            let waited_ms = started.elapsed().as_millis() as u64;
            warn!("sink not ready after {waited_ms}ms");
            return Err(CaptureError::SinkNotReady { waited_ms });
        }

        handle.sink = Some(sink);
        self.last_sequence = None;
        info!("capture handle {} bound to sink", handle.id);
        Ok(())
    }

    /// Latest mirrored frame from the bound sink.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.handle
            .as_ref()
            .and_then(|handle| handle.sink.as_ref())
            .and_then(|sink| sink.current_frame())
    }

    /// Checks the binding and repairs it if needed.
    ///
    /// Up to `max_recovery_attempts` consecutive unhealthy checks are repaired
    /// in place; the next one triggers a full re-acquisition. Only a failed
    /// re-acquisition is returned as an error, and it leaves no handle behind.
    pub async fn health_check(&mut self) -> Result<HealthStatus, CaptureError> {
        let reason = match self.inspect()? {
            None => {
                if self.recovery_attempts > 0 {
                    info!(
                        "capture healthy again after {} recovery attempt(s)",
                        self.recovery_attempts
                    );
                }
                self.recovery_attempts = 0;
                return Ok(HealthStatus::Healthy);
            }
            Some(reason) => reason,
        };

        if self.recovery_attempts < self.settings.max_recovery_attempts {
            self.recovery_attempts += 1;
            warn!(
                "capture degraded ({reason}); in-place recovery attempt {}/{}",
                self.recovery_attempts, self.settings.max_recovery_attempts
            );
            self.recover_in_place();
            return Ok(HealthStatus::Degraded { reason });
        }

        let attempts = self.recovery_attempts;
        warn!("capture still degraded ({reason}) after {attempts} attempts; re-acquiring");
        let sink = self.handle.as_ref().and_then(|handle| handle.sink.clone());

        let reacquired = async {
            self.acquire().await?;
            if let Some(sink) = sink {
                self.bind_sink(sink).await?;
            }
            Ok::<(), CaptureError>(())
        }
        .await;

        match reacquired {
            Ok(()) => Ok(HealthStatus::Degraded { reason }),
            Err(err) => {
                error!("capture re-acquisition failed: {err}");
                self.release();
                Err(CaptureError::RecoveryExhausted {
                    attempts: attempts + 1,
                    last: err.to_string(),
                })
            }
        }
    }

    /// `Ok(None)` when healthy, the reason otherwise.
    fn inspect(&mut self) -> Result<Option<DegradedReason>, CaptureError> {
        let handle = self.handle.as_ref().ok_or(CaptureError::NoActiveHandle)?;
        let Some(sink) = handle.sink.as_ref() else {
            return Ok(Some(DegradedReason::NoSink));
        };

        match sink.state() {
            PlaybackState::Playing => {}
            PlaybackState::Paused => return Ok(Some(DegradedReason::SinkPaused)),
            PlaybackState::Ended | PlaybackState::Idle => {
                return Ok(Some(DegradedReason::SinkEnded))
            }
        }

        let Some(frame) = sink.current_frame().filter(|frame| !frame.is_empty()) else {
            return Ok(Some(DegradedReason::ZeroDimensions));
        };

        let previous = self.last_sequence.replace(frame.sequence);
        if previous == Some(frame.sequence) {
            return Ok(Some(DegradedReason::Stalled));
        }
        Ok(None)
    }

    fn recover_in_place(&mut self) {
        let Some(handle) = self.handle.as_ref() else {
            return;
        };
        let enabled = handle.stream.enable_tracks();
        if enabled > 0 {
            info!("re-enabled {enabled} track(s) on {}", handle.stream.label());
        }
        if let Some(sink) = handle.sink.as_ref() {
            sink.detach();
            sink.attach(handle.stream.clone(), true);
            if let Err(err) = sink.play() {
                warn!("sink replay failed during recovery: {err}");
            }
        }
    }

    /// Stops every track and detaches the sink. No-op without a handle.
    pub fn release(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Some(sink) = handle.sink.as_ref() {
            sink.detach();
        }
        handle.stream.stop();
        self.recovery_attempts = 0;
        self.last_sequence = None;
        info!("capture handle {} released", handle.id);
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.release();
    }
}

fn sink_is_producing(sink: &dyn FrameSink) -> bool {
    if sink.state() != PlaybackState::Playing {
        return false;
    }
    let (width, height) = sink.dimensions();
    width > 0 && height > 0
}
