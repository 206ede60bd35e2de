use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, warn};

use super::{Signal, ViolationEvent};

pub type ViolationCallback = Box<dyn Fn(&ViolationEvent) + Send + Sync>;

struct AggregatorInner {
    log: Vec<ViolationEvent>,
    sealed: bool,
    callback: Option<ViolationCallback>,
}

/// Single ordered violation log for one session.
///
/// `record` appends and notifies under one lock, so the callback observes
/// events in exactly the order they were appended even when the detection
/// loop and the focus monitor record concurrently. The callback therefore
/// must not call back into the aggregator.
pub struct ViolationAggregator {
    inner: Mutex<AggregatorInner>,
}

impl Default for ViolationAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ViolationAggregator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(AggregatorInner {
                log: Vec::new(),
                sealed: false,
                callback: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replaces any previously registered callback.
    pub fn set_callback(&self, callback: ViolationCallback) {
        self.lock().callback = Some(callback);
    }

    /// Stamps and appends `signal`, then invokes the callback.
    ///
    /// Returns `None` once the log has been sealed; a terminal session's log
    /// is frozen.
    pub fn record(&self, signal: Signal) -> Option<ViolationEvent> {
        let mut inner = self.lock();
        if inner.sealed {
            debug!(
                "dropping {} signal from {:?}: violation log is sealed",
                signal.kind, signal.source
            );
            return None;
        }

        let event = ViolationEvent {
            kind: signal.kind,
            occurred_at: Utc::now(),
            detail: signal.detail,
        };
        inner.log.push(event.clone());
        warn!(
            "violation #{}: {}{}",
            inner.log.len(),
            event.kind,
            event
                .detail
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default()
        );

        if let Some(callback) = inner.callback.as_ref() {
            callback(&event);
        }
        Some(event)
    }

    /// Copy of the log at call time.
    pub fn snapshot(&self) -> Vec<ViolationEvent> {
        self.lock().log.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Freezes the log and drops the callback. Returns the final log.
    pub fn seal(&self) -> Vec<ViolationEvent> {
        let mut inner = self.lock();
        inner.sealed = true;
        inner.callback = None;
        inner.log.clone()
    }
}
