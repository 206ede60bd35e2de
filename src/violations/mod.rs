//! Violation log shared by the detection loop and the focus monitor.

mod aggregator;
mod event;

pub use aggregator::{ViolationAggregator, ViolationCallback};
pub use event::{Signal, SignalSource, ViolationEvent, ViolationKind};
