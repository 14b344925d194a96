//! Cross-pattern synthesis.
//!
//! Reads the four analyzer outputs and emits at most one insight per trigger
//! rule, most urgent first.

use pulse_core::{
    CooccurrencePattern, DeveloperPattern, DiscoverySessionId, InsightKind, MagnitudePattern,
    PatternInsight, RiskLevel, TemporalPattern,
};
use tracing::debug;
use uuid::Uuid;

use super::{PatternStage, StageContext, StageError, StageKind, StageOutput};

const SILO_MIN_SPECIALIZATION: f64 = 0.8;
const SILO_MAX_BREADTH: f64 = 0.3;
const RHYTHM_MIN_SIGNIFICANCE: f64 = 0.8;

/// Files listed in an insight description before truncating.
const MAX_LISTED: usize = 5;

fn listing<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let items: Vec<&str> = items.collect();
    if items.len() <= MAX_LISTED {
        items.join(", ")
    } else {
        format!(
            "{} and {} more",
            items[..MAX_LISTED].join(", "),
            items.len() - MAX_LISTED
        )
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Insight synthesizer. Stateless.
#[derive(Debug, Clone, Default)]
pub struct InsightSynthesizer;

impl InsightSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(
        &self,
        session_id: DiscoverySessionId,
        cooccurrence: &[CooccurrencePattern],
        temporal: &[TemporalPattern],
        developer: &[DeveloperPattern],
        magnitude: &[MagnitudePattern],
    ) -> Vec<PatternInsight> {
        let mut insights: Vec<PatternInsight> = [
            coupling_insight(session_id, cooccurrence),
            critical_files_insight(session_id, magnitude),
            silo_insight(session_id, developer),
            rhythm_insight(session_id, temporal),
        ]
        .into_iter()
        .flatten()
        .collect();

        // Stable: equal priorities keep rule order.
        insights.sort_by_key(|i| i.priority);
        debug!(insights = insights.len(), "insight synthesis complete");
        insights
    }
}

fn coupling_insight(
    session_id: DiscoverySessionId,
    patterns: &[CooccurrencePattern],
) -> Option<PatternInsight> {
    let strong: Vec<&CooccurrencePattern> =
        patterns.iter().filter(|p| p.strength.is_strong()).collect();
    if strong.is_empty() {
        return None;
    }

    let pairs: Vec<String> = strong
        .iter()
        .map(|p| format!("{} <-> {}", p.file_a, p.file_b))
        .collect();
    let risk_level = if strong.iter().any(|p| p.lift >= 10.0) {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    };

    Some(PatternInsight {
        id: Uuid::new_v4(),
        session_id,
        kind: InsightKind::FileCoupling,
        title: format!("{} tightly coupled file pair(s)", strong.len()),
        description: format!(
            "These files change together far more often than chance: {}",
            listing(pairs.iter().map(String::as_str))
        ),
        confidence: average(strong.iter().map(|p| p.confidence)),
        risk_level,
        business_impact: "Changes to one file routinely require edits to its partner, \
                          raising review cost and the chance of incomplete changes."
            .into(),
        recommendations: strings(&[
            "Review whether coupled files share a missing abstraction",
            "Consider merging or co-locating files that always change together",
            "Add tests that exercise coupled files as a unit",
        ]),
        supporting_patterns: strong.iter().map(|p| p.id).collect(),
        priority: 2,
    })
}

fn critical_files_insight(
    session_id: DiscoverySessionId,
    patterns: &[MagnitudePattern],
) -> Option<PatternInsight> {
    let critical: Vec<&MagnitudePattern> = patterns
        .iter()
        .filter(|p| p.risk_level == RiskLevel::Critical)
        .collect();
    if critical.is_empty() {
        return None;
    }

    let confidence = critical
        .iter()
        .map(|p| p.risk_score.max(p.anomaly_score))
        .fold(0.0, f64::max);

    Some(PatternInsight {
        id: Uuid::new_v4(),
        session_id,
        kind: InsightKind::CriticalRiskFiles,
        title: format!("{} critical-risk file(s)", critical.len()),
        description: format!(
            "Change size or churn is far outside the norm for: {}",
            listing(critical.iter().map(|p| p.path.as_str()))
        ),
        confidence,
        risk_level: RiskLevel::Critical,
        business_impact: "Volatile, anomalous files are the most likely source of \
                          regressions and slow down every change that touches them."
            .into(),
        recommendations: strings(&[
            "Prioritize refactoring of the listed files",
            "Require additional review for changes to these files",
            "Increase test coverage before the next change",
        ]),
        supporting_patterns: critical.iter().map(|p| p.id).collect(),
        priority: 1,
    })
}

fn silo_insight(
    session_id: DiscoverySessionId,
    patterns: &[DeveloperPattern],
) -> Option<PatternInsight> {
    let specialists: Vec<&DeveloperPattern> = patterns
        .iter()
        .filter(|p| {
            p.specialization_score > SILO_MIN_SPECIALIZATION
                && p.knowledge_breadth_score < SILO_MAX_BREADTH
        })
        .collect();
    if specialists.is_empty() {
        return None;
    }

    Some(PatternInsight {
        id: Uuid::new_v4(),
        session_id,
        kind: InsightKind::KnowledgeSilo,
        title: format!("{} highly specialized developer(s)", specialists.len()),
        description: format!(
            "Knowledge of some files is concentrated in: {}",
            listing(specialists.iter().map(|p| p.author.as_str()))
        ),
        confidence: average(specialists.iter().map(|p| p.specialization_score)),
        risk_level: RiskLevel::High,
        business_impact: "Losing a specialist would leave their files without an \
                          experienced maintainer."
            .into(),
        recommendations: strings(&[
            "Pair specialists with other developers on their core files",
            "Rotate code review of specialty files across the team",
            "Document the design of heavily siloed areas",
        ]),
        supporting_patterns: specialists.iter().map(|p| p.id).collect(),
        priority: 3,
    })
}

fn rhythm_insight(
    session_id: DiscoverySessionId,
    patterns: &[TemporalPattern],
) -> Option<PatternInsight> {
    let strong: Vec<&TemporalPattern> = patterns
        .iter()
        .filter(|p| p.significance > RHYTHM_MIN_SIGNIFICANCE)
        .collect();
    if strong.is_empty() {
        return None;
    }

    Some(PatternInsight {
        id: Uuid::new_v4(),
        session_id,
        kind: InsightKind::DevelopmentRhythm,
        title: "Pronounced development rhythm".into(),
        description: format!(
            "Commit activity is strongly non-uniform by {}",
            listing(strong.iter().map(|p| p.period.as_str()))
        ),
        confidence: average(strong.iter().map(|p| p.significance)),
        risk_level: RiskLevel::Low,
        business_impact: "Work clusters into bursts, which can hide crunch periods \
                          and uneven review capacity."
            .into(),
        recommendations: strings(&[
            "Plan reviews and releases around peak activity periods",
            "Check whether bursts line up with deadlines or on-call rotations",
        ]),
        supporting_patterns: strong.iter().map(|p| p.id).collect(),
        priority: 4,
    })
}

impl PatternStage for InsightSynthesizer {
    fn kind(&self) -> StageKind {
        StageKind::Insights
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, StageError> {
        let out = ctx.outputs;
        Ok(StageOutput::Insights(self.synthesize(
            ctx.session_id,
            &out.cooccurrence,
            &out.temporal,
            &out.developer,
            &out.magnitude,
        )))
    }
}
