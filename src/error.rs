use thiserror::Error;

/// Failures of the capture layer that callers must be able to tell apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user (or OS policy) refused camera access.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// The device exists but another process holds it.
    #[error("camera busy: {0}")]
    DeviceBusy(String),

    /// No usable video input at all.
    #[error("no camera available: {0}")]
    Unavailable(String),

    /// The requested constraints could not be satisfied by the device.
    #[error("camera rejected constraints: {0}")]
    ConstraintsRejected(String),

    #[error("sink did not start producing frames within {waited_ms}ms")]
    SinkNotReady { waited_ms: u64 },

    #[error("no capture handle is active")]
    NoActiveHandle,

    /// In-place recovery and re-acquisition were both exhausted.
    #[error("capture recovery exhausted after {attempts} attempts: {last}")]
    RecoveryExhausted { attempts: u32, last: String },
}

impl CaptureError {
    /// Whether the UI should prompt for permission rather than report hardware.
    pub fn is_permission(&self) -> bool {
        matches!(self, CaptureError::PermissionDenied(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    #[error("no detection strategy configured")]
    NotConfigured,

    #[error("frame has zero dimensions")]
    EmptyFrame,

    #[error("{strategy} failed: {message}")]
    Strategy {
        strategy: &'static str,
        message: String,
    },
}

/// Why a start attempt left the session in `NotStarted`.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("exam {exam_id} was already taken by student {student_id}")]
    AlreadyTaken { student_id: String, exam_id: String },

    #[error("exam {0} not found")]
    ExamNotFound(String),

    #[error("exam is not runnable: {0}")]
    InvalidExam(String),

    #[error("session already started")]
    AlreadyStarted,

    #[error("session was stopped before it started")]
    Stopped,

    #[error("detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(String),

    #[error("option {option_id} does not belong to question {question_id}")]
    UnknownOption {
        question_id: String,
        option_id: String,
    },

    #[error("submission is only allowed from the final question")]
    NotOnFinalQuestion,

    #[error("session is not in progress")]
    NotInProgress,
}
