//! Pattern records produced by the analyzers.
//!
//! Every record carries the id of the [`DiscoverySession`](crate::DiscoverySession)
//! that produced it. Records are never mutated after creation; the next run
//! produces fresh rows that supersede them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commit::CommitId;

/// Identifier of one orchestrator run.
pub type DiscoverySessionId = Uuid;

/// Identifier of a single pattern or insight record.
pub type PatternId = Uuid;

// ── Co-occurrence ─────────────────────────────────────────────

/// Qualitative strength of a file coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl CouplingStrength {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Moderate => "moderate",
            Self::Strong => "strong",
            Self::VeryStrong => "very_strong",
        }
    }

    /// Strong or very strong.
    pub fn is_strong(self) -> bool {
        self >= Self::Strong
    }
}

/// Two files that change together more often than chance predicts.
///
/// `file_a < file_b` lexicographically, so a pair has exactly one spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooccurrencePattern {
    pub id: PatternId,
    pub session_id: DiscoverySessionId,
    pub file_a: String,
    pub file_b: String,
    pub count: usize,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub strength: CouplingStrength,
    /// Every commit that touched both files, in transaction order.
    pub commits: Vec<CommitId>,
}

// ── Temporal ──────────────────────────────────────────────────

/// Bucketing granularity for commit timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Hour,
    Day,
    Week,
    Month,
}

impl Period {
    pub const ALL: [Period; 4] = [Period::Hour, Period::Day, Period::Week, Period::Month];

    /// Number of buckets for this granularity (ISO weeks run 1..=53).
    pub fn bucket_count(self) -> usize {
        match self {
            Self::Hour => 24,
            Self::Day => 7,
            Self::Week => 53,
            Self::Month => 12,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// Non-uniform commit activity over one granularity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalPattern {
    pub id: PatternId,
    pub session_id: DiscoverySessionId,
    pub period: Period,
    pub significance: f64,
    pub chi_square: f64,
    pub p_value: f64,
    /// Bucket indices of the busiest periods, busiest first.
    pub peak_periods: Vec<u32>,
    /// Raw commit count per bucket, indexed by bucket.
    pub bucket_counts: Vec<u64>,
}

// ── Developer ─────────────────────────────────────────────────

/// Coarse classification of an author's recent work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkPattern {
    FeatureFocused,
    MaintenanceFocused,
    Mixed,
    Experimental,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeveloperPattern {
    pub id: PatternId,
    pub session_id: DiscoverySessionId,
    pub author: String,
    pub commit_count: usize,
    pub specialty_files: Vec<String>,
    pub specialization_score: f64,
    pub knowledge_breadth_score: f64,
    /// Commits per week.
    pub change_velocity: f64,
    pub consistency_score: f64,
    pub knowledge_silo_risk: f64,
    pub work_pattern: WorkPattern,
}

// ── Magnitude ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
    Massive,
}

impl SizeCategory {
    /// Bucket an average lines-per-change figure.
    pub fn from_avg_lines(avg: f64) -> Self {
        if avg <= 10.0 {
            Self::Small
        } else if avg <= 50.0 {
            Self::Medium
        } else if avg <= 200.0 {
            Self::Large
        } else {
            Self::Massive
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Change-size statistics and derived risk for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnitudePattern {
    pub id: PatternId,
    pub session_id: DiscoverySessionId,
    pub path: String,
    pub change_count: usize,
    pub contributor_count: usize,
    pub size_category: SizeCategory,
    pub avg_lines_per_change: f64,
    /// Changes per week.
    pub change_frequency: f64,
    pub volatility_score: f64,
    pub anomaly_score: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub hotspot_score: f64,
    pub technical_debt: f64,
}

// ── Insights ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    FileCoupling,
    CriticalRiskFiles,
    KnowledgeSilo,
    DevelopmentRhythm,
}

/// Cross-pattern narrative synthesized from the analyzer outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsight {
    pub id: PatternId,
    pub session_id: DiscoverySessionId,
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub business_impact: String,
    pub recommendations: Vec<String>,
    /// Ids of the pattern records that triggered this insight.
    pub supporting_patterns: Vec<PatternId>,
    /// 1 is the most urgent.
    pub priority: u8,
}
