//! Pattern detection pipeline stages.
//!
//! Each analyzer is a [`PatternStage`]. The detector runs the stages in a
//! fixed order over one commit set:
//!
//! 1. [`cooccurrence`]: market-basket file coupling
//! 2. [`temporal`]: chi-square rhythm test per granularity
//! 3. [`developer`]: per-author specialization and silo risk
//! 4. [`magnitude`]: change-size anomaly and volatility
//! 5. [`insights`]: cross-pattern synthesis over 1-4
//! 6. [`alerts`]: rule engine over everything above
//!
//! The four analyzers only read the commit set; stages 5 and 6 also read the
//! outputs accumulated so far, so a failed analyzer simply leaves its
//! collection empty for the stages after it.

pub mod alerts;
pub mod cooccurrence;
pub mod developer;
pub mod insights;
pub mod magnitude;
pub mod stats;
pub mod temporal;
pub mod transactions;

use std::sync::Arc;

use pulse_core::{
    Commit, CooccurrencePattern, DetectionConfig, DeveloperPattern, DiscoverySessionId,
    FileChange, MagnitudePattern, PatternAlert, PatternInsight, TemporalPattern,
};

use self::alerts::AlertGenerator;
use self::cooccurrence::CooccurrenceMiner;
use self::developer::DeveloperProfiler;
use self::insights::InsightSynthesizer;
use self::magnitude::MagnitudeAnalyzer;
use self::temporal::TemporalAnalyzer;
use self::transactions::TransactionSet;

/// Error type for a single stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("stage failed: {0}")]
    Failed(String),
    #[error("stage panicked: {0}")]
    Panicked(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("timeout after {elapsed_ms}ms (budget {budget_ms}ms)")]
    Timeout { elapsed_ms: u64, budget_ms: u64 },
    #[error("non-finite {metric} for {subject}")]
    NonFinite { metric: &'static str, subject: String },
}

/// Identity of a pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    Cooccurrence,
    Temporal,
    Developer,
    Magnitude,
    Insights,
    Alerts,
}

impl StageKind {
    pub const ORDER: [StageKind; 6] = [
        StageKind::Cooccurrence,
        StageKind::Temporal,
        StageKind::Developer,
        StageKind::Magnitude,
        StageKind::Insights,
        StageKind::Alerts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Cooccurrence => "cooccurrence",
            Self::Temporal => "temporal",
            Self::Developer => "developer",
            Self::Magnitude => "magnitude",
            Self::Insights => "insights",
            Self::Alerts => "alerts",
        }
    }
}

/// What a stage produced. The variant always matches the stage's kind.
#[derive(Debug, Clone)]
pub enum StageOutput {
    Cooccurrence(Vec<CooccurrencePattern>),
    Temporal(Vec<TemporalPattern>),
    Developer(Vec<DeveloperPattern>),
    Magnitude(Vec<MagnitudePattern>),
    Insights(Vec<PatternInsight>),
    Alerts(Vec<PatternAlert>),
}

/// Outputs accumulated over one run.
#[derive(Debug, Clone, Default)]
pub struct StageOutputs {
    pub cooccurrence: Vec<CooccurrencePattern>,
    pub temporal: Vec<TemporalPattern>,
    pub developer: Vec<DeveloperPattern>,
    pub magnitude: Vec<MagnitudePattern>,
    pub insights: Vec<PatternInsight>,
    pub alerts: Vec<PatternAlert>,
}

impl StageOutputs {
    pub fn absorb(&mut self, output: StageOutput) {
        match output {
            StageOutput::Cooccurrence(p) => self.cooccurrence = p,
            StageOutput::Temporal(p) => self.temporal = p,
            StageOutput::Developer(p) => self.developer = p,
            StageOutput::Magnitude(p) => self.magnitude = p,
            StageOutput::Insights(p) => self.insights = p,
            StageOutput::Alerts(p) => self.alerts = p,
        }
    }
}

/// Read-only inputs handed to every stage.
pub struct StageContext<'a> {
    pub session_id: DiscoverySessionId,
    pub commits: &'a [Commit],
    pub changes: &'a [FileChange],
    pub transactions: &'a TransactionSet,
    /// Outputs of the stages that already ran.
    pub outputs: &'a StageOutputs,
}

/// A unit of analysis the detector can run.
///
/// Implementations are synchronous; all I/O happens in the detector before
/// the first stage.
pub trait PatternStage: Send + Sync {
    fn kind(&self) -> StageKind;

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, StageError>;
}

/// The standard six stages, configured from `config`, in execution order.
pub fn default_stages(config: &DetectionConfig) -> Vec<Arc<dyn PatternStage>> {
    vec![
        Arc::new(CooccurrenceMiner::from_config(config)),
        Arc::new(TemporalAnalyzer::from_config(config)),
        Arc::new(DeveloperProfiler::new()),
        Arc::new(MagnitudeAnalyzer::from_config(config)),
        Arc::new(InsightSynthesizer::new()),
        Arc::new(AlertGenerator::from_config(config)),
    ]
}

/// Fail the stage when a computed score is NaN or infinite.
pub(crate) fn ensure_finite(
    metric: &'static str,
    subject: &str,
    value: f64,
) -> Result<(), StageError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StageError::NonFinite {
            metric,
            subject: subject.to_string(),
        })
    }
}
