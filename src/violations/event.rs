use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ViolationKind {
    TabSwitch,
    AppBlur,
    MultiplePeople,
    /// No face in frame, or a face turned away; the two are not distinguished.
    NoFaceOrAway,
    DeviceDetected,
    Other,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ViolationKind::TabSwitch => "tab switch",
            ViolationKind::AppBlur => "application lost focus",
            ViolationKind::MultiplePeople => "multiple people",
            ViolationKind::NoFaceOrAway => "no face or looking away",
            ViolationKind::DeviceDetected => "device detected",
            ViolationKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// Where a signal came from. Diagnostic only; the log does not keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalSource {
    Detector,
    Environment,
    Capture,
}

/// A raw observation that has not yet been accepted into the violation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub kind: ViolationKind,
    pub detail: Option<String>,
    pub source: SignalSource,
}

impl Signal {
    pub fn new(kind: ViolationKind, source: SignalSource) -> Self {
        Self {
            kind,
            detail: None,
            source,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// An accepted, timestamped violation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub occurred_at: DateTime<Utc>,
    pub detail: Option<String>,
}
