pub mod buffer;
pub mod detector;
pub mod pipeline;
pub mod service;

pub use buffer::CommitBuffer;
pub use detector::{DetectionError, DetectionEvent, DetectionMetrics, PatternDetector};
pub use pipeline::{PatternStage, StageContext, StageError, StageKind, StageOutput};
pub use service::PatternService;
