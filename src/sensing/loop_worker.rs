use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{anyhow, Context, Result};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureManager, HealthStatus};
use crate::detect::SignalDetector;
use crate::violations::ViolationAggregator;

use super::focus::{EnvironmentEvent, FocusMonitor};
use super::{SensingNotice, SensingTiming};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Periodically analyzes the latest sink frame and feeds the signals to the
/// aggregator. A failed or slow tick is skipped, never retried.
pub async fn detection_loop(
    capture: Arc<Mutex<CaptureManager>>,
    detector: Arc<StdMutex<SignalDetector>>,
    aggregator: Arc<ViolationAggregator>,
    timing: SensingTiming,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(timing.detection_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately; analysis starts one interval in
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fut = analyze_latest(&capture, &detector, &aggregator);
                match tokio::time::timeout(timing.tick_timeout, fut).await {
                    Ok(Ok(recorded)) => {
                        if recorded > 0 {
                            log_info!("detection tick recorded {recorded} violation(s)");
                        }
                    }
                    Ok(Err(err)) => log_warn!("detection tick skipped: {err:#}"),
                    Err(_) => log_warn!(
                        "detection tick timed out (> {}ms)",
                        timing.tick_timeout.as_millis()
                    ),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("detection loop shutting down");
                break;
            }
        }
    }
}

async fn analyze_latest(
    capture: &Mutex<CaptureManager>,
    detector: &Arc<StdMutex<SignalDetector>>,
    aggregator: &ViolationAggregator,
) -> Result<usize> {
    let Some(frame) = capture.lock().await.latest_frame() else {
        log_debug!("no frame available this tick");
        return Ok(0);
    };

    let started = Instant::now();
    let signals = tokio::task::spawn_blocking({
        let detector = Arc::clone(detector);
        move || {
            let mut guard = detector
                .lock()
                .map_err(|_| anyhow!("detector lock poisoned"))?;
            guard.tick(&frame).map_err(anyhow::Error::from)
        }
    })
    .await
    .context("detection worker join failed")??;
    log_debug!(
        "analysis produced {} signal(s) in {}ms",
        signals.len(),
        started.elapsed().as_millis()
    );

    Ok(signals
        .into_iter()
        .filter_map(|signal| aggregator.record(signal))
        .count())
}

/// Runs the capture health check on its own schedule. Stops after reporting
/// `CaptureLost`, since there is nothing left to check.
pub async fn health_loop(
    capture: Arc<Mutex<CaptureManager>>,
    interval: Duration,
    notices: mpsc::UnboundedSender<SensingNotice>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = capture.lock().await.health_check().await;
                match status {
                    Ok(HealthStatus::Healthy) => log_debug!("capture healthy"),
                    Ok(HealthStatus::Degraded { reason }) => {
                        log_warn!("capture degraded: {reason}");
                        let _ = notices.send(SensingNotice::Degraded(reason));
                    }
                    Err(err) => {
                        log_error!("capture lost: {err}");
                        let _ = notices.send(SensingNotice::CaptureLost(err));
                        break;
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("health loop shutting down");
                break;
            }
        }
    }
}

/// Owns the bus subscription for the lifetime of the session; dropping out of
/// the loop unsubscribes.
pub async fn focus_loop(
    mut events: broadcast::Receiver<EnvironmentEvent>,
    aggregator: Arc<ViolationAggregator>,
    cancel_token: CancellationToken,
) {
    let mut monitor = FocusMonitor::new();

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if let Some(signal) = monitor.observe(event) {
                        aggregator.record(signal);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log_warn!("focus monitor lagged; {skipped} host event(s) dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    log_info!("environment bus closed");
                    break;
                }
            },
            _ = cancel_token.cancelled() => {
                log_info!("focus monitor unsubscribed");
                break;
            }
        }
    }
}
