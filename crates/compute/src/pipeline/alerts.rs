//! Alert rules over analyzer outputs and insights.

use std::collections::BTreeMap;

use chrono::Utc;
use pulse_core::{
    AlertKind, AlertSeverity, CouplingStrength, DetectionConfig, DiscoverySessionId, PatternAlert,
    RiskLevel,
};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::{PatternStage, StageContext, StageError, StageKind, StageOutput, StageOutputs};

/// Coupling lift that escalates a very strong pair to an alert.
const COUPLING_ALERT_LIFT: f64 = 10.0;
const SILO_ALERT_RISK: f64 = 0.8;
/// Temporal significance counted as "highly significant".
const RHYTHM_ALERT_SIGNIFICANCE: f64 = 0.95;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

struct AlertDraft {
    kind: AlertKind,
    severity: AlertSeverity,
    title: String,
    description: String,
    recommended_actions: Vec<String>,
    affected_files: Vec<String>,
    confidence: f64,
    metadata: BTreeMap<String, Value>,
}

impl AlertDraft {
    fn finish(self, session_id: DiscoverySessionId) -> PatternAlert {
        PatternAlert {
            id: Uuid::new_v4(),
            session_id,
            kind: self.kind,
            severity: self.severity,
            title: self.title,
            description: self.description,
            recommended_actions: self.recommended_actions,
            affected_files: self.affected_files,
            confidence: self.confidence,
            created_at: Utc::now(),
            metadata: self.metadata,
        }
    }
}

fn metadata(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Threshold rule engine. Runs independently of the insight rules.
#[derive(Debug, Clone)]
pub struct AlertGenerator {
    pub alert_score_threshold: f64,
}

impl Default for AlertGenerator {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

impl AlertGenerator {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            alert_score_threshold: config.alert_score_threshold,
        }
    }

    /// Evaluate every rule, in rule order.
    pub fn generate(
        &self,
        session_id: DiscoverySessionId,
        outputs: &StageOutputs,
    ) -> Vec<PatternAlert> {
        let mut drafts = Vec::new();

        for file in outputs
            .magnitude
            .iter()
            .filter(|p| p.risk_level == RiskLevel::Critical)
        {
            drafts.push(AlertDraft {
                kind: AlertKind::CriticalRiskFile,
                severity: AlertSeverity::Critical,
                title: format!("Critical risk: {}", file.path),
                description: format!(
                    "{} has risk score {:.2} (anomaly {:.2}, volatility {:.2}) over {} changes",
                    file.path,
                    file.risk_score,
                    file.anomaly_score,
                    file.volatility_score,
                    file.change_count
                ),
                recommended_actions: strings(&[
                    "Schedule a refactoring review for this file",
                    "Require an extra reviewer on changes to this file",
                ]),
                affected_files: vec![file.path.clone()],
                confidence: file.risk_score.max(file.anomaly_score),
                metadata: metadata(&[
                    ("risk_score", json!(file.risk_score)),
                    ("anomaly_score", json!(file.anomaly_score)),
                    ("technical_debt", json!(file.technical_debt)),
                    ("pattern_id", json!(file.id)),
                ]),
            });
        }

        for pair in outputs.cooccurrence.iter().filter(|p| {
            p.strength == CouplingStrength::VeryStrong && p.lift > COUPLING_ALERT_LIFT
        }) {
            drafts.push(AlertDraft {
                kind: AlertKind::StrongCoupling,
                severity: AlertSeverity::Warning,
                title: format!("Very strong coupling: {} and {}", pair.file_a, pair.file_b),
                description: format!(
                    "Changed together in {} commits (lift {:.1}, confidence {:.2})",
                    pair.count, pair.lift, pair.confidence
                ),
                recommended_actions: strings(&[
                    "Check whether the two files should be merged or share an abstraction",
                ]),
                affected_files: vec![pair.file_a.clone(), pair.file_b.clone()],
                confidence: pair.confidence,
                metadata: metadata(&[
                    ("lift", json!(pair.lift)),
                    ("support", json!(pair.support)),
                    ("pattern_id", json!(pair.id)),
                ]),
            });
        }

        for dev in outputs
            .developer
            .iter()
            .filter(|p| p.knowledge_silo_risk > SILO_ALERT_RISK)
        {
            drafts.push(AlertDraft {
                kind: AlertKind::KnowledgeSilo,
                severity: AlertSeverity::Warning,
                title: format!("Knowledge silo: {}", dev.author),
                description: format!(
                    "{} holds concentrated knowledge of {} file(s) (silo risk {:.2})",
                    dev.author,
                    dev.specialty_files.len(),
                    dev.knowledge_silo_risk
                ),
                recommended_actions: strings(&[
                    "Pair another developer on the specialty files",
                    "Spread reviews of these files across the team",
                ]),
                affected_files: dev.specialty_files.clone(),
                confidence: dev.knowledge_silo_risk,
                metadata: metadata(&[
                    ("author", json!(dev.author)),
                    ("specialization_score", json!(dev.specialization_score)),
                    ("pattern_id", json!(dev.id)),
                ]),
            });
        }

        for insight in outputs.insights.iter().filter(|i| {
            i.risk_level == RiskLevel::Critical && i.confidence > self.alert_score_threshold
        }) {
            drafts.push(AlertDraft {
                kind: AlertKind::CriticalInsight,
                severity: AlertSeverity::Critical,
                title: insight.title.clone(),
                description: insight.description.clone(),
                recommended_actions: insight.recommendations.clone(),
                affected_files: Vec::new(),
                confidence: insight.confidence,
                metadata: metadata(&[
                    ("insight_id", json!(insight.id)),
                    ("priority", json!(insight.priority)),
                    ("business_impact", json!(insight.business_impact)),
                ]),
            });
        }

        for rhythm in outputs
            .temporal
            .iter()
            .filter(|p| p.significance >= RHYTHM_ALERT_SIGNIFICANCE)
        {
            drafts.push(AlertDraft {
                kind: AlertKind::DevelopmentRhythm,
                severity: AlertSeverity::Info,
                title: format!("Highly significant {} rhythm", rhythm.period.as_str()),
                description: format!(
                    "Commits cluster by {} (chi-square {:.1}, p approx. {:.3})",
                    rhythm.period.as_str(),
                    rhythm.chi_square,
                    rhythm.p_value
                ),
                recommended_actions: strings(&["Review workload distribution around peak periods"]),
                affected_files: Vec::new(),
                confidence: rhythm.significance,
                metadata: metadata(&[
                    ("period", json!(rhythm.period)),
                    ("peak_periods", json!(rhythm.peak_periods)),
                    ("pattern_id", json!(rhythm.id)),
                ]),
            });
        }

        let alerts: Vec<PatternAlert> = drafts.into_iter().map(|d| d.finish(session_id)).collect();
        debug!(alerts = alerts.len(), "alert generation complete");
        alerts
    }
}

impl PatternStage for AlertGenerator {
    fn kind(&self) -> StageKind {
        StageKind::Alerts
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, StageError> {
        Ok(StageOutput::Alerts(self.generate(ctx.session_id, ctx.outputs)))
    }
}
