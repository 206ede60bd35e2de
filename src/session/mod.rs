//! Exam session engine: the state machine and the controller that runs it.

pub mod controller;
pub mod state;

pub use controller::{
    ExamSessionController, SessionConfig, SessionDeps, SessionEvent, SessionOutcome,
};
pub use state::{ExamSession, SessionStatus, TerminationReason};
