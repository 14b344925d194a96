//! Per-file change-size statistics, anomaly scoring and risk levels.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use pulse_core::{
    Commit, DetectionConfig, FileChange, MagnitudePattern, RiskLevel, SizeCategory,
};
use tracing::debug;
use uuid::Uuid;

use super::stats::{mean, std_dev};
use super::{ensure_finite, PatternStage, StageContext, StageError, StageKind, StageOutput};

/// Files changed fewer times than this are not scored.
pub const MIN_CHANGES: usize = 2;

const SECS_PER_WEEK: f64 = 7.0 * 24.0 * 3600.0;

/// Aggregated history of one file over the input commit set.
#[derive(Debug, Clone, PartialEq)]
pub struct FileStats {
    pub path: String,
    pub change_count: usize,
    pub avg_lines: f64,
    pub std_lines: f64,
    pub min_lines: u64,
    pub max_lines: u64,
    pub contributors: usize,
    pub weeks_spanned: f64,
}

impl FileStats {
    pub fn change_frequency(&self) -> f64 {
        self.change_count as f64 / self.weeks_spanned
    }

    /// Relative spread of change sizes, capped at 1.
    pub fn volatility(&self) -> f64 {
        if self.avg_lines <= f64::EPSILON {
            return 0.0;
        }
        (self.std_lines / self.avg_lines).min(1.0)
    }
}

#[derive(Default)]
struct FileAccumulator<'a> {
    // commit id -> (lines changed, author, timestamp)
    per_commit: BTreeMap<&'a str, (u64, &'a str, DateTime<Utc>)>,
}

/// Collect per-file statistics for files changed at least [`MIN_CHANGES`]
/// times, keyed by path.
///
/// Rows for commits missing from `commits` are ignored; several rows for the
/// same path in one commit count as a single change.
pub fn collect_file_stats(
    commits: &[Commit],
    changes: &[FileChange],
) -> BTreeMap<String, FileStats> {
    let by_id: HashMap<&str, &Commit> = commits.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut files: BTreeMap<&str, FileAccumulator<'_>> = BTreeMap::new();
    for change in changes {
        let Some(commit) = by_id.get(change.commit_id.as_str()) else {
            continue;
        };
        let slot = files
            .entry(change.path.as_str())
            .or_default()
            .per_commit
            .entry(change.commit_id.as_str())
            .or_insert((0, commit.author.as_str(), commit.authored_at));
        slot.0 += change.lines_changed();
    }

    let mut stats = BTreeMap::new();
    for (path, acc) in files {
        if acc.per_commit.len() < MIN_CHANGES {
            continue;
        }
        let sizes: Vec<f64> = acc.per_commit.values().map(|(l, _, _)| *l as f64).collect();
        let authors: BTreeSet<&str> = acc.per_commit.values().map(|(_, a, _)| *a).collect();
        let first = acc.per_commit.values().map(|(_, _, t)| *t).min();
        let last = acc.per_commit.values().map(|(_, _, t)| *t).max();
        let span_secs = match (first, last) {
            (Some(f), Some(l)) => l.signed_duration_since(f).num_seconds() as f64,
            _ => 0.0,
        };

        stats.insert(
            path.to_string(),
            FileStats {
                path: path.to_string(),
                change_count: sizes.len(),
                avg_lines: mean(&sizes),
                std_lines: std_dev(&sizes),
                min_lines: acc.per_commit.values().map(|(l, _, _)| *l).min().unwrap_or(0),
                max_lines: acc.per_commit.values().map(|(l, _, _)| *l).max().unwrap_or(0),
                contributors: authors.len(),
                weeks_spanned: (span_secs / SECS_PER_WEEK).max(1.0),
            },
        );
    }
    stats
}

/// `min(|avg - mean| / std / 3, 1)`; zero when the population has no spread.
pub fn anomaly_score(avg: f64, population_mean: f64, population_std: f64) -> f64 {
    if population_std <= f64::EPSILON {
        return 0.0;
    }
    let z = (avg - population_mean).abs() / population_std;
    (z / 3.0).min(1.0)
}

pub fn risk_level(risk_score: f64, anomaly: f64, anomaly_threshold: f64) -> RiskLevel {
    if risk_score >= 0.8 || anomaly > anomaly_threshold {
        RiskLevel::Critical
    } else if risk_score >= 0.6 {
        RiskLevel::High
    } else if risk_score >= 0.4 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[derive(Debug, Clone)]
pub struct MagnitudeAnalyzer {
    pub anomaly_threshold: f64,
}

impl Default for MagnitudeAnalyzer {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

impl MagnitudeAnalyzer {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            anomaly_threshold: config.anomaly_threshold,
        }
    }

    /// Score every qualifying file, riskiest first.
    pub fn analyze(
        &self,
        session_id: Uuid,
        commits: &[Commit],
        changes: &[FileChange],
    ) -> Result<Vec<MagnitudePattern>, StageError> {
        let stats = collect_file_stats(commits, changes);
        if stats.is_empty() {
            return Ok(Vec::new());
        }

        // BTreeMap order keeps the population figures independent of row order.
        let averages: Vec<f64> = stats.values().map(|s| s.avg_lines).collect();
        let population_mean = mean(&averages);
        let population_std = std_dev(&averages);

        let mut patterns = Vec::with_capacity(stats.len());
        for s in stats.into_values() {
            let anomaly = anomaly_score(s.avg_lines, population_mean, population_std);
            let frequency = s.change_frequency();
            let volatility = s.volatility();
            let risk_score = 0.4 * anomaly + 0.3 * volatility + 0.3 * (frequency / 5.0).min(1.0);
            let hotspot = ((s.change_count as f64 / 10.0) * (frequency / 2.0)).min(1.0);
            let technical_debt = (0.5 * volatility + 0.3 * hotspot + 0.2 * anomaly).min(1.0);

            ensure_finite("risk_score", &s.path, risk_score)?;
            ensure_finite("technical_debt", &s.path, technical_debt)?;

            patterns.push(MagnitudePattern {
                id: Uuid::new_v4(),
                session_id,
                size_category: SizeCategory::from_avg_lines(s.avg_lines),
                change_count: s.change_count,
                contributor_count: s.contributors,
                avg_lines_per_change: s.avg_lines,
                change_frequency: frequency,
                volatility_score: volatility,
                anomaly_score: anomaly,
                risk_score,
                risk_level: risk_level(risk_score, anomaly, self.anomaly_threshold),
                hotspot_score: hotspot,
                technical_debt,
                path: s.path,
            });
        }

        patterns.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score).then(a.path.cmp(&b.path)));

        debug!(
            files = patterns.len(),
            population_mean,
            population_std,
            critical = patterns.iter().filter(|p| p.risk_level == RiskLevel::Critical).count(),
            "magnitude analysis complete"
        );
        Ok(patterns)
    }
}

impl PatternStage for MagnitudeAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::Magnitude
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, StageError> {
        self.analyze(ctx.session_id, ctx.commits, ctx.changes)
            .map(StageOutput::Magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pulse_core::ChangeType;

    fn commits(n: usize) -> Vec<Commit> {
        let base = Utc.with_ymd_and_hms(2025, 2, 3, 12, 0, 0).unwrap();
        (0..n)
            .map(|i| Commit {
                id: format!("c{i}"),
                author: format!("dev{}", i % 2),
                authored_at: base + Duration::days(i as i64),
                insertions: 10,
                deletions: 0,
                files_changed: 1,
            })
            .collect()
    }

    fn row(commit: usize, path: &str, lines: u32) -> FileChange {
        FileChange {
            commit_id: format!("c{commit}"),
            path: path.into(),
            lines_added: lines,
            lines_removed: 0,
            change_type: ChangeType::Modified,
        }
    }

    #[test]
    fn file_at_population_mean_has_zero_anomaly() {
        let history = commits(10);
        let mut rows = Vec::new();
        for i in 0..10 {
            rows.push(row(i, "steady.rs", 20));
        }
        rows.extend([row(0, "small.rs", 5), row(1, "small.rs", 15)]);
        rows.extend([row(2, "big.rs", 25), row(3, "big.rs", 35)]);

        let patterns = MagnitudeAnalyzer::default()
            .analyze(Uuid::nil(), &history, &rows)
            .unwrap();
        let steady = patterns.iter().find(|p| p.path == "steady.rs").unwrap();
        assert_eq!(steady.change_count, 10);
        assert_eq!(steady.anomaly_score, 0.0);
        assert_eq!(steady.volatility_score, 0.0);
        assert!(patterns.iter().any(|p| p.anomaly_score > 0.0));
    }

    #[test]
    fn anomaly_is_order_independent() {
        let history = commits(6);
        let rows = vec![
            row(0, "a.rs", 3),
            row(1, "a.rs", 5),
            row(2, "b.rs", 100),
            row(3, "b.rs", 300),
            row(4, "c.rs", 40),
            row(5, "c.rs", 44),
            row(1, "c.rs", 41),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();
        let mut shuffled_commits = history.clone();
        shuffled_commits.rotate_left(2);

        let analyzer = MagnitudeAnalyzer::default();
        let score = |patterns: Vec<MagnitudePattern>| -> BTreeMap<String, (f64, f64)> {
            patterns
                .into_iter()
                .map(|p| (p.path, (p.anomaly_score, p.risk_score)))
                .collect()
        };
        let forward = score(analyzer.analyze(Uuid::nil(), &history, &rows).unwrap());
        let backward = score(analyzer.analyze(Uuid::nil(), &shuffled_commits, &reversed).unwrap());
        assert_eq!(forward, backward);
    }

    #[test]
    fn single_change_files_are_ignored() {
        let history = commits(3);
        let rows = vec![row(0, "once.rs", 10), row(1, "twice.rs", 10), row(2, "twice.rs", 10)];
        let patterns = MagnitudeAnalyzer::default()
            .analyze(Uuid::nil(), &history, &rows)
            .unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].path, "twice.rs");
        assert_eq!(patterns[0].contributor_count, 2);
    }

    #[test]
    fn same_commit_rows_are_summed() {
        let history = commits(2);
        let rows = vec![row(0, "x.rs", 4), row(0, "x.rs", 6), row(1, "x.rs", 10)];
        let stats = collect_file_stats(&history, &rows);
        let x = &stats["x.rs"];
        assert_eq!(x.change_count, 2);
        assert_eq!(x.avg_lines, 10.0);
        assert_eq!((x.min_lines, x.max_lines), (10, 10));
    }

    #[test]
    fn rows_for_unknown_commits_are_skipped() {
        let history = commits(1);
        let rows = vec![row(0, "x.rs", 4), row(9, "x.rs", 6)];
        assert!(collect_file_stats(&history, &rows).is_empty());
    }

    #[test]
    fn risk_level_thresholds() {
        assert_eq!(risk_level(0.8, 0.0, 0.8), RiskLevel::Critical);
        assert_eq!(risk_level(0.1, 0.81, 0.8), RiskLevel::Critical);
        // anomaly exactly at threshold does not escalate
        assert_eq!(risk_level(0.1, 0.8, 0.8), RiskLevel::Low);
        assert_eq!(risk_level(0.6, 0.0, 0.8), RiskLevel::High);
        assert_eq!(risk_level(0.4, 0.0, 0.8), RiskLevel::Medium);
        assert_eq!(risk_level(0.39, 0.0, 0.8), RiskLevel::Low);
    }

    #[test]
    fn anomaly_score_caps_at_one() {
        assert_eq!(anomaly_score(100.0, 0.0, 1.0), 1.0);
        assert_eq!(anomaly_score(3.0, 0.0, 1.0), 1.0);
        assert!((anomaly_score(1.5, 0.0, 1.0) - 0.5).abs() < 1e-12);
        assert_eq!(anomaly_score(7.0, 2.0, 0.0), 0.0);
    }
}
