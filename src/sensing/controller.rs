use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::CaptureManager;
use crate::detect::SignalDetector;
use crate::violations::ViolationAggregator;

use super::focus::EnvironmentBus;
use super::loop_worker::{detection_loop, focus_loop, health_loop};
use super::{SensingNotice, SensingTiming};

/// Everything the sensing tasks read from or report to.
pub struct SensingContext {
    pub capture: Arc<Mutex<CaptureManager>>,
    pub detector: Arc<StdMutex<SignalDetector>>,
    pub aggregator: Arc<ViolationAggregator>,
    pub bus: EnvironmentBus,
    pub notices: mpsc::UnboundedSender<SensingNotice>,
    pub timing: SensingTiming,
}

/// Starts and stops the detection, health and focus tasks of one session.
#[derive(Default)]
pub struct SensingController {
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SensingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// `cancel_token` is a child of the session token, so cancelling the
    /// session also stops sensing.
    pub fn start_sensing(&mut self, ctx: SensingContext, cancel_token: CancellationToken) -> Result<()> {
        if self.is_active() {
            bail!("sensing already active");
        }

        // Subscribe before returning so no host event published after start is missed.
        let events = ctx.bus.subscribe();

        self.handles = vec![
            tokio::spawn(detection_loop(
                ctx.capture.clone(),
                ctx.detector,
                ctx.aggregator.clone(),
                ctx.timing,
                cancel_token.clone(),
            )),
            tokio::spawn(health_loop(
                ctx.capture,
                ctx.timing.health_interval,
                ctx.notices,
                cancel_token.clone(),
            )),
            tokio::spawn(focus_loop(events, ctx.aggregator, cancel_token.clone())),
        ];
        self.cancel_token = Some(cancel_token);
        info!("sensing started");
        Ok(())
    }

    /// Cancels every sensing task and waits for each to exit. Safe to repeat.
    pub async fn stop_sensing(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let mut first_err = None;
        for handle in self.handles.drain(..) {
            if let Err(err) = handle.await {
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err).context("sensing task failed to join"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureSettings, PreviewSink, SyntheticCamera};
    use crate::detect::StubStrategy;
    use crate::sensing::EnvironmentEvent;
    use crate::violations::ViolationKind;
    use tokio::time::Duration;

    fn context(
        camera: Arc<SyntheticCamera>,
        aggregator: Arc<ViolationAggregator>,
        bus: EnvironmentBus,
    ) -> (SensingContext, mpsc::UnboundedReceiver<SensingNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = SensingContext {
            capture: Arc::new(Mutex::new(CaptureManager::new(camera, CaptureSettings::default()))),
            detector: Arc::new(StdMutex::new(SignalDetector::with_strategy(Box::new(
                StubStrategy::seeded(1.0, 7),
            )))),
            aggregator,
            bus,
            notices: tx,
            timing: SensingTiming::default(),
        };
        (ctx, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn focus_loss_is_recorded_and_subscription_dropped_on_stop() {
        let aggregator = Arc::new(ViolationAggregator::new());
        let bus = EnvironmentBus::new();
        let (ctx, _rx) = context(Arc::new(SyntheticCamera::default()), aggregator.clone(), bus.clone());

        let mut sensing = SensingController::new();
        sensing.start_sensing(ctx, CancellationToken::new()).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(EnvironmentEvent::FocusChanged { focused: false });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(aggregator.snapshot()[0].kind, ViolationKind::AppBlur);

        sensing.stop_sensing().await.unwrap();
        assert_eq!(bus.subscriber_count(), 0);
        assert!(!sensing.is_active());
        sensing.stop_sensing().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn detection_feeds_aggregator_once_frames_flow() {
        let camera = Arc::new(SyntheticCamera::default());
        let aggregator = Arc::new(ViolationAggregator::new());
        let (ctx, _rx) = context(camera, aggregator.clone(), EnvironmentBus::new());

        {
            let mut capture = ctx.capture.lock().await;
            capture.acquire().await.unwrap();
            capture.bind_sink(Arc::new(PreviewSink::new())).await.unwrap();
        }

        let mut sensing = SensingController::new();
        sensing.start_sensing(ctx, CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        sensing.stop_sensing().await.unwrap();

        let log = aggregator.snapshot();
        assert!(!log.is_empty());
        assert!(log.iter().all(|event| event.kind == ViolationKind::DeviceDetected));
    }

    #[tokio::test]
    async fn stop_joins_every_task_even_after_one_panics() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let waiter = {
            let token = token.clone();
            let finished = finished.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                tokio::task::yield_now().await;
                finished.store(true, Ordering::SeqCst);
            })
        };
        let mut sensing = SensingController {
            handles: vec![tokio::spawn(async { panic!("detector crashed") }), waiter],
            cancel_token: Some(token),
        };

        assert!(sensing.stop_sensing().await.is_err());
        assert!(finished.load(Ordering::SeqCst));
        assert!(sensing.handles.is_empty());
        assert!(!sensing.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_capture_is_reported_once() {
        let camera = Arc::new(SyntheticCamera::default());
        let control = camera.control();
        let aggregator = Arc::new(ViolationAggregator::new());
        let (ctx, mut rx) = context(camera, aggregator, EnvironmentBus::new());
        {
            let mut capture = ctx.capture.lock().await;
            capture.acquire().await.unwrap();
            capture.bind_sink(Arc::new(PreviewSink::new())).await.unwrap();
        }
        let capture = ctx.capture.clone();

        control.set_stalled(true);
        control.set_unavailable(true);

        let mut sensing = SensingController::new();
        sensing.start_sensing(ctx, CancellationToken::new()).unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        sensing.stop_sensing().await.unwrap();

        let mut lost = 0;
        while let Ok(notice) = rx.try_recv() {
            if matches!(notice, SensingNotice::CaptureLost(_)) {
                lost += 1;
            }
        }
        assert_eq!(lost, 1);
        assert!(!capture.lock().await.is_active());
    }
}
