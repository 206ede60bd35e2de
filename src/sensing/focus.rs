//! Host focus / visibility transitions.
//!
//! The host publishes raw `EnvironmentEvent`s on an `EnvironmentBus`. While a
//! session runs, a `FocusMonitor` turns each transition *away* from the exam
//! into exactly one signal; returning to the exam is only logged.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::violations::{Signal, SignalSource, ViolationKind};

const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum EnvironmentEvent {
    VisibilityChanged { visible: bool },
    FocusChanged { focused: bool },
}

#[derive(Clone)]
pub struct EnvironmentBus {
    tx: broadcast::Sender<EnvironmentEvent>,
}

impl Default for EnvironmentBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Returns how many monitors saw the event; zero outside a session.
    pub fn publish(&self, event: EnvironmentEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EnvironmentEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Edge detector over the two host transitions.
#[derive(Debug, Clone)]
pub struct FocusMonitor {
    visible: bool,
    focused: bool,
}

impl Default for FocusMonitor {
    fn default() -> Self {
        // A session starts with the exam in front of the student.
        Self {
            visible: true,
            focused: true,
        }
    }
}

impl FocusMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn observe(&mut self, event: EnvironmentEvent) -> Option<Signal> {
        match event {
            EnvironmentEvent::VisibilityChanged { visible } => {
                let was_visible = std::mem::replace(&mut self.visible, visible);
                match (was_visible, visible) {
                    (true, false) => Some(
                        Signal::new(ViolationKind::TabSwitch, SignalSource::Environment)
                            .with_detail("exam hidden"),
                    ),
                    (false, true) => {
                        log::info!("exam visible again");
                        None
                    }
                    _ => None,
                }
            }
            EnvironmentEvent::FocusChanged { focused } => {
                let was_focused = std::mem::replace(&mut self.focused, focused);
                match (was_focused, focused) {
                    (true, false) => Some(
                        Signal::new(ViolationKind::AppBlur, SignalSource::Environment)
                            .with_detail("exam window lost focus"),
                    ),
                    (false, true) => {
                        log::info!("exam window focused again");
                        None
                    }
                    _ => None,
                }
            }
        }
    }
}
