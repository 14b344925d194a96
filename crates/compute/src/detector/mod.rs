//! Detection orchestrator: session lifecycle, staged execution, metrics.
//!
//! Split into focused submodules:
//! - `core`: PatternDetector struct, constructors, accessors and the buffer
//! - `execution`: real-time entry point, stage loop and result publishing
//! - `batch`: range-based batch processing and result aggregation
//! - `metrics`: running counters exposed through `metrics()`

mod batch;
mod core;
mod execution;
mod metrics;

use std::sync::Arc;

use pulse_core::{DetectionResult, PatternAlert, SessionId};

pub use self::core::PatternDetector;
pub use self::metrics::DetectionMetrics;

/// Input errors that reject a run before any stage executes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DetectionError {
    #[error("no active session")]
    NoActiveSession,
    #[error("no project bound to session {0}")]
    NoProject(SessionId),
    #[error("real-time detection is disabled")]
    RealtimeDisabled,
    #[error("batch processing is disabled")]
    BatchDisabled,
    #[error("commit history unavailable: {0}")]
    History(String),
}

/// Published to subscribers after every run.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub result: Arc<DetectionResult>,
    pub alerts: Arc<Vec<PatternAlert>>,
}
