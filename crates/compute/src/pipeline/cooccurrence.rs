use std::collections::BTreeMap;

use pulse_core::{CommitId, CooccurrencePattern, CouplingStrength, DetectionConfig};
use tracing::debug;
use uuid::Uuid;

use super::transactions::TransactionSet;
use super::{ensure_finite, PatternStage, StageContext, StageError, StageKind, StageOutput};

/// Raw tally for one unordered file pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairCount {
    pub count: usize,
    pub commits: Vec<CommitId>,
}

/// Association metrics for one pair before thresholding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMetrics {
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
}

/// Count every unordered pair of files that appear in the same transaction.
///
/// Keys are `(a, b)` with `a < b`; only pairs that actually co-occur are
/// materialized.
pub fn count_pairs(transactions: &TransactionSet) -> BTreeMap<(String, String), PairCount> {
    let mut pairs: BTreeMap<(String, String), PairCount> = BTreeMap::new();

    for tx in transactions.transactions() {
        // BTreeSet iteration is sorted, so (files[i], files[j]) with i < j is
        // already normalized.
        let files: Vec<&String> = tx.files.iter().collect();
        for i in 0..files.len() {
            for j in (i + 1)..files.len() {
                let entry = pairs
                    .entry((files[i].clone(), files[j].clone()))
                    .or_default();
                entry.count += 1;
                entry.commits.push(tx.commit_id.clone());
            }
        }
    }

    pairs
}

/// Support, confidence and lift for a pair seen `count` times.
///
/// Returns `None` when a marginal frequency is zero.
pub fn pair_metrics(
    count: usize,
    freq_a: usize,
    freq_b: usize,
    total: usize,
) -> Option<PairMetrics> {
    if total == 0 || freq_a == 0 || freq_b == 0 {
        return None;
    }
    let count = count as f64;
    let (fa, fb, total) = (freq_a as f64, freq_b as f64, total as f64);

    Some(PairMetrics {
        support: count / total,
        confidence: (count / fa).max(count / fb),
        // count / ((fa * fb) / total), rearranged to keep exact ratios exact
        lift: (count * total) / (fa * fb),
    })
}

/// Strength from (lift, confidence). First matching rule wins.
pub fn classify_strength(lift: f64, confidence: f64) -> CouplingStrength {
    if lift >= 10.0 && confidence >= 0.8 {
        CouplingStrength::VeryStrong
    } else if lift >= 5.0 && confidence >= 0.6 {
        CouplingStrength::Strong
    } else if lift >= 2.0 && confidence >= 0.4 {
        CouplingStrength::Moderate
    } else {
        CouplingStrength::Weak
    }
}

/// Market-basket miner over commit transactions.
#[derive(Debug, Clone)]
pub struct CooccurrenceMiner {
    pub min_support: f64,
    pub min_confidence: f64,
    pub min_lift: f64,
}

impl Default for CooccurrenceMiner {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

impl CooccurrenceMiner {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            min_support: config.min_support,
            min_confidence: config.min_confidence,
            min_lift: config.min_lift,
        }
    }

    /// True when all three thresholds are met (inclusive).
    pub fn accepts(&self, metrics: &PairMetrics) -> bool {
        metrics.support >= self.min_support
            && metrics.confidence >= self.min_confidence
            && metrics.lift >= self.min_lift
    }

    /// Mine retained pairs, strongest lift first.
    pub fn mine(
        &self,
        session_id: Uuid,
        transactions: &TransactionSet,
    ) -> Result<Vec<CooccurrencePattern>, StageError> {
        let total = transactions.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let pairs = count_pairs(transactions);
        let candidates = pairs.len();
        let mut patterns = Vec::new();

        for ((file_a, file_b), tally) in pairs {
            let Some(metrics) = pair_metrics(
                tally.count,
                transactions.frequency(&file_a),
                transactions.frequency(&file_b),
                total,
            ) else {
                continue;
            };
            ensure_finite("lift", &file_a, metrics.lift)?;

            if !self.accepts(&metrics) {
                continue;
            }

            patterns.push(CooccurrencePattern {
                id: Uuid::new_v4(),
                session_id,
                strength: classify_strength(metrics.lift, metrics.confidence),
                file_a,
                file_b,
                count: tally.count,
                support: metrics.support,
                confidence: metrics.confidence,
                lift: metrics.lift,
                commits: tally.commits,
            });
        }

        patterns.sort_by(|a, b| {
            b.lift
                .total_cmp(&a.lift)
                .then(b.confidence.total_cmp(&a.confidence))
                .then_with(|| (&a.file_a, &a.file_b).cmp(&(&b.file_a, &b.file_b)))
        });

        debug!(
            transactions = total,
            candidates,
            retained = patterns.len(),
            "co-occurrence mining complete"
        );
        Ok(patterns)
    }
}

impl PatternStage for CooccurrenceMiner {
    fn kind(&self) -> StageKind {
        StageKind::Cooccurrence
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, StageError> {
        self.mine(ctx.session_id, ctx.transactions)
            .map(StageOutput::Cooccurrence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::{ChangeType, FileChange};

    fn tx_set(rows: &[(&str, &[&str])]) -> TransactionSet {
        let mut ids = Vec::new();
        let mut changes = Vec::new();
        for (commit, files) in rows {
            ids.push(commit.to_string());
            for f in *files {
                changes.push(FileChange {
                    commit_id: commit.to_string(),
                    path: f.to_string(),
                    lines_added: 1,
                    lines_removed: 0,
                    change_type: ChangeType::Modified,
                });
            }
        }
        TransactionSet::build(&ids, &changes)
    }

    fn find<'a>(
        patterns: &'a [CooccurrencePattern],
        a: &str,
        b: &str,
    ) -> Option<&'a CooccurrencePattern> {
        patterns.iter().find(|p| p.file_a == a && p.file_b == b)
    }

    #[test]
    fn weak_boundary_pair_is_retained() {
        let set = tx_set(&[("c1", &["A", "B"]), ("c2", &["A", "B"]), ("c3", &["C"])]);
        let patterns = CooccurrenceMiner::default().mine(Uuid::nil(), &set).unwrap();

        let ab = find(&patterns, "A", "B").expect("(A,B) retained");
        assert_eq!(ab.count, 2);
        assert!((ab.support - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(ab.confidence, 1.0);
        assert_eq!(ab.lift, 1.5);
        assert_eq!(ab.strength, CouplingStrength::Weak);
        assert_eq!(ab.commits, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[test]
    fn pair_just_below_lift_threshold_is_dropped() {
        let set = tx_set(&[("c1", &["A", "B"]), ("c2", &["A", "B"]), ("c3", &["C"])]);
        let miner = CooccurrenceMiner {
            min_lift: 1.5000001,
            ..CooccurrenceMiner::default()
        };
        let patterns = miner.mine(Uuid::nil(), &set).unwrap();
        assert!(find(&patterns, "A", "B").is_none());
    }

    #[test]
    fn metrics_stay_in_range() {
        let set = tx_set(&[
            ("c1", &["a", "b", "c"]),
            ("c2", &["a", "b"]),
            ("c3", &["c", "d"]),
            ("c4", &["a", "d"]),
            ("c5", &["b"]),
        ]);
        let miner = CooccurrenceMiner {
            min_support: 0.0,
            min_confidence: 0.0,
            min_lift: 0.0,
        };
        let patterns = miner.mine(Uuid::nil(), &set).unwrap();
        assert!(!patterns.is_empty());
        for p in &patterns {
            assert!((0.0..=1.0).contains(&p.support));
            assert!((0.0..=1.0).contains(&p.confidence));
            assert!(p.lift >= 0.0);
            assert!(p.file_a < p.file_b);
        }
    }

    #[test]
    fn strength_rules_first_match_wins() {
        assert_eq!(classify_strength(10.0, 0.8), CouplingStrength::VeryStrong);
        // high lift but confidence only qualifies for strong
        assert_eq!(classify_strength(12.0, 0.7), CouplingStrength::Strong);
        assert_eq!(classify_strength(5.0, 0.6), CouplingStrength::Strong);
        assert_eq!(classify_strength(4.99, 0.9), CouplingStrength::Moderate);
        assert_eq!(classify_strength(2.0, 0.4), CouplingStrength::Moderate);
        assert_eq!(classify_strength(2.0, 0.39), CouplingStrength::Weak);
        assert_eq!(classify_strength(0.0, 0.0), CouplingStrength::Weak);
    }

    #[test]
    fn empty_transactions_yield_no_patterns() {
        let set = TransactionSet::default();
        assert!(CooccurrenceMiner::default().mine(Uuid::nil(), &set).unwrap().is_empty());
    }

    #[test]
    fn output_sorted_by_lift_descending() {
        let set = tx_set(&[
            ("c1", &["x", "y"]),
            ("c2", &["x", "y"]),
            ("c3", &["p", "q"]),
            ("c4", &["p", "z"]),
            ("c5", &["m"]),
            ("c6", &["n"]),
        ]);
        let patterns = CooccurrenceMiner::default().mine(Uuid::nil(), &set).unwrap();
        let lifts: Vec<f64> = patterns.iter().map(|p| p.lift).collect();
        let mut sorted = lifts.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        assert_eq!(lifts, sorted);
    }

    #[test]
    fn file_seen_outside_the_pair_lowers_lift() {
        // A also appears in c3, so freq(A) = 3 and A/B are independent.
        let set = tx_set(&[("c1", &["A", "B"]), ("c2", &["A", "B"]), ("c3", &["A", "C"])]);
        let tally = &count_pairs(&set)[&("A".to_string(), "B".to_string())];
        let metrics =
            pair_metrics(tally.count, set.frequency("A"), set.frequency("B"), set.len()).unwrap();
        assert_eq!(metrics.lift, 1.0);
        assert_eq!(metrics.confidence, 1.0);

        let patterns = CooccurrenceMiner::default().mine(Uuid::nil(), &set).unwrap();
        assert!(find(&patterns, "A", "B").is_none());
    }

    #[test]
    fn count_pairs_skips_single_file_transactions() {
        let set = tx_set(&[("c1", &["a"]), ("c2", &["b"])]);
        assert!(count_pairs(&set).is_empty());
    }
}
