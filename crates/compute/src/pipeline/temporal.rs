//! Commit rhythm analysis.
//!
//! Buckets authored timestamps per granularity and tests the histogram
//! against uniform activity with a chi-square goodness-of-fit statistic.

use chrono::{DateTime, Datelike, Timelike, Utc};
use pulse_core::{Commit, DetectionConfig, Period, TemporalPattern};
use tracing::debug;
use uuid::Uuid;

use super::stats::{chi_square_sf, chi_square_uniform};
use super::{ensure_finite, PatternStage, StageContext, StageError, StageKind, StageOutput};

/// Fewer commits than this yields no temporal patterns.
pub const MIN_COMMITS: usize = 5;

/// Chi-square value that maps to full significance, shared by every
/// granularity.
pub const CRITICAL_VALUE: f64 = 14.067;

/// Share of buckets reported as peaks.
const PEAK_FRACTION: f64 = 0.2;

/// Bucket index of `ts` for `period`.
///
/// Hours are UTC 0-23, days 0 (Monday) to 6, weeks are ISO week numbers
/// shifted to 0-52, months 0-11.
pub fn bucket_of(period: Period, ts: &DateTime<Utc>) -> usize {
    match period {
        Period::Hour => ts.hour() as usize,
        Period::Day => ts.weekday().num_days_from_monday() as usize,
        Period::Week => ts.iso_week().week0() as usize,
        Period::Month => ts.month0() as usize,
    }
}

/// Per-bucket commit counts for one granularity.
pub fn histogram(period: Period, commits: &[Commit]) -> Vec<u64> {
    let mut counts = vec![0u64; period.bucket_count()];
    for commit in commits {
        let idx = bucket_of(period, &commit.authored_at);
        if let Some(slot) = counts.get_mut(idx) {
            *slot += 1;
        }
    }
    counts
}

/// Top-quintile buckets by count, busiest first; empty buckets never peak.
pub fn peak_periods(counts: &[u64]) -> Vec<u32> {
    let take = (counts.len() as f64 * PEAK_FRACTION).ceil() as usize;
    let mut ranked: Vec<(usize, u64)> = counts
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, c)| c > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(take)
        .map(|(idx, _)| idx as u32)
        .collect()
}

#[derive(Debug, Clone)]
pub struct TemporalAnalyzer {
    pub significance_threshold: f64,
}

impl Default for TemporalAnalyzer {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

impl TemporalAnalyzer {
    pub fn from_config(config: &DetectionConfig) -> Self {
        Self {
            significance_threshold: config.significance_threshold,
        }
    }

    pub fn analyze(
        &self,
        session_id: Uuid,
        commits: &[Commit],
    ) -> Result<Vec<TemporalPattern>, StageError> {
        if commits.len() < MIN_COMMITS {
            debug!(commits = commits.len(), "too few commits for temporal analysis");
            return Ok(Vec::new());
        }

        let mut patterns = Vec::new();
        for period in Period::ALL {
            let counts = histogram(period, commits);
            let chi_square = chi_square_uniform(&counts);
            ensure_finite("chi_square", period.as_str(), chi_square)?;

            let significance = (chi_square / CRITICAL_VALUE).min(1.0);
            debug!(
                period = period.as_str(),
                chi_square,
                significance,
                "temporal bucket test"
            );
            if significance < self.significance_threshold {
                continue;
            }

            patterns.push(TemporalPattern {
                id: Uuid::new_v4(),
                session_id,
                period,
                significance,
                chi_square,
                p_value: chi_square_sf(chi_square, counts.len() - 1),
                peak_periods: peak_periods(&counts),
                bucket_counts: counts,
            });
        }
        Ok(patterns)
    }
}

impl PatternStage for TemporalAnalyzer {
    fn kind(&self) -> StageKind {
        StageKind::Temporal
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, StageError> {
        self.analyze(ctx.session_id, ctx.commits)
            .map(StageOutput::Temporal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit_at(id: usize, ts: DateTime<Utc>) -> Commit {
        Commit {
            id: format!("c{id}"),
            author: "dev".into(),
            authored_at: ts,
            insertions: 1,
            deletions: 0,
            files_changed: 1,
        }
    }

    fn burst(n: usize) -> Vec<Commit> {
        // Same hour, weekday, week and month: maximally non-uniform.
        let ts = Utc.with_ymd_and_hms(2025, 3, 4, 14, 0, 0).unwrap();
        (0..n).map(|i| commit_at(i, ts)).collect()
    }

    #[test]
    fn four_commits_are_not_enough() {
        let patterns = TemporalAnalyzer::default().analyze(Uuid::nil(), &burst(4)).unwrap();
        assert!(patterns.is_empty());
    }

    #[test]
    fn five_commits_are_analyzed() {
        let patterns = TemporalAnalyzer::default().analyze(Uuid::nil(), &burst(5)).unwrap();
        assert_eq!(patterns.len(), 4);

        let hour = patterns.iter().find(|p| p.period == Period::Hour).unwrap();
        assert_eq!(hour.significance, 1.0);
        assert_eq!(hour.peak_periods, vec![14]);
        assert_eq!(hour.bucket_counts.len(), 24);
        assert_eq!(hour.bucket_counts[14], 5);
        assert!(hour.p_value < 0.05);
    }

    #[test]
    fn uniform_activity_is_not_significant() {
        // One commit in each hour of a single day.
        let commits: Vec<Commit> = (0..24)
            .map(|h| commit_at(h as usize, Utc.with_ymd_and_hms(2025, 3, 4, h, 0, 0).unwrap()))
            .collect();
        let patterns = TemporalAnalyzer::default().analyze(Uuid::nil(), &commits).unwrap();
        assert!(patterns.iter().all(|p| p.period != Period::Hour));
    }

    #[test]
    fn bucket_indices() {
        // 2025-03-04 is a Tuesday in ISO week 10.
        let ts = Utc.with_ymd_and_hms(2025, 3, 4, 23, 59, 0).unwrap();
        assert_eq!(bucket_of(Period::Hour, &ts), 23);
        assert_eq!(bucket_of(Period::Day, &ts), 1);
        assert_eq!(bucket_of(Period::Week, &ts), 9);
        assert_eq!(bucket_of(Period::Month, &ts), 2);
    }

    #[test]
    fn peaks_take_top_fifth_and_skip_empty() {
        // 7 buckets -> ceil(1.4) = 2 peaks
        assert_eq!(peak_periods(&[1, 5, 0, 5, 2, 0, 0]), vec![1, 3]);
        assert_eq!(peak_periods(&[0; 7]), Vec::<u32>::new());
        // 12 buckets -> 3 peaks, only 1 non-zero
        let mut months = vec![0; 12];
        months[6] = 4;
        assert_eq!(peak_periods(&months), vec![6]);
    }

    #[test]
    fn threshold_above_one_filters_everything() {
        let analyzer = TemporalAnalyzer {
            significance_threshold: 1.01,
        };
        assert!(analyzer.analyze(Uuid::nil(), &burst(10)).unwrap().is_empty());
    }
}
