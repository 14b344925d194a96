use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commit::ProjectId;
use crate::patterns::{
    CooccurrencePattern, DeveloperPattern, DiscoverySessionId, MagnitudePattern, PatternId,
    PatternInsight, TemporalPattern,
};

// ── Alerts ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CriticalRiskFile,
    StrongCoupling,
    KnowledgeSilo,
    CriticalInsight,
    DevelopmentRhythm,
}

/// Notification payload derived from one run.
///
/// Self-contained: it carries everything a notifier needs and is never
/// written back to the pattern store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternAlert {
    pub id: PatternId,
    pub session_id: DiscoverySessionId,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub recommended_actions: Vec<String>,
    pub affected_files: Vec<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

// ── Detection result ─────────────────────────────────────────

/// Aggregate output of one detection run (or one aggregated batch run).
///
/// `success` is true exactly when `errors` is empty. Empty pattern
/// collections mean "no signal"; a failed stage shows up only in `errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub session_id: Option<DiscoverySessionId>,
    pub project_id: Option<ProjectId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub execution_time_ms: u64,
    /// Stage name -> elapsed milliseconds, for the stages that ran.
    pub stage_timings: BTreeMap<String, u64>,
    pub cooccurrence: Vec<CooccurrencePattern>,
    pub temporal: Vec<TemporalPattern>,
    pub developer: Vec<DeveloperPattern>,
    pub magnitude: Vec<MagnitudePattern>,
    pub insights: Vec<PatternInsight>,
    pub alert_count: usize,
    pub commits_analyzed: usize,
    pub files_analyzed: usize,
    pub success: bool,
    pub errors: Vec<String>,
}

impl DetectionResult {
    /// A successful result with nothing analyzed.
    pub fn empty(project_id: Option<ProjectId>, started_at: DateTime<Utc>) -> Self {
        let finished_at = Utc::now();
        Self {
            session_id: None,
            project_id,
            started_at,
            finished_at,
            execution_time_ms: elapsed_ms(started_at, finished_at),
            stage_timings: BTreeMap::new(),
            cooccurrence: Vec::new(),
            temporal: Vec::new(),
            developer: Vec::new(),
            magnitude: Vec::new(),
            insights: Vec::new(),
            alert_count: 0,
            commits_analyzed: 0,
            files_analyzed: 0,
            success: true,
            errors: Vec::new(),
        }
    }

    /// A result that failed before any stage ran.
    pub fn rejected(
        project_id: Option<ProjectId>,
        started_at: DateTime<Utc>,
        error: String,
    ) -> Self {
        Self {
            success: false,
            errors: vec![error],
            ..Self::empty(project_id, started_at)
        }
    }

    /// Patterns plus insights, the figure tracked by the run metrics.
    pub fn pattern_count(&self) -> usize {
        self.cooccurrence.len()
            + self.temporal.len()
            + self.developer.len()
            + self.magnitude.len()
            + self.insights.len()
    }
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    end.signed_duration_since(start).num_milliseconds().max(0) as u64
}
