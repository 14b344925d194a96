//! Per-author behavior profiling.

use std::collections::{BTreeMap, HashMap};

use pulse_core::{Commit, DeveloperPattern, WorkPattern};
use tracing::debug;
use uuid::Uuid;

use super::stats::{mean, std_dev};
use super::transactions::TransactionSet;
use super::{ensure_finite, PatternStage, StageContext, StageError, StageKind, StageOutput};

/// Authors with fewer commits are not profiled.
pub const MIN_COMMITS_PER_AUTHOR: usize = 2;

/// A file must be touched at least this often to count as a specialty.
const MIN_SPECIALTY_TOUCHES: usize = 2;

const SECS_PER_WEEK: f64 = 7.0 * 24.0 * 3600.0;

/// Files in the author's top quintile by touch count that were touched at
/// least twice, most touched first. Equal counts rank by path.
pub fn specialty_files(touches: &HashMap<&str, usize>) -> Vec<String> {
    let mut ranked: Vec<(&str, usize)> = touches.iter().map(|(f, c)| (*f, *c)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let quintile = (ranked.len() as f64 * 0.2).ceil() as usize;
    ranked
        .into_iter()
        .take(quintile)
        .filter(|&(_, count)| count >= MIN_SPECIALTY_TOUCHES)
        .map(|(file, _)| file.to_string())
        .collect()
}

/// Weeks between the first and last timestamp, never less than one.
pub fn weeks_spanned(commits: &[&Commit]) -> f64 {
    let (Some(first), Some(last)) = (
        commits.iter().map(|c| c.authored_at).min(),
        commits.iter().map(|c| c.authored_at).max(),
    ) else {
        return 1.0;
    };
    let secs = last.signed_duration_since(first).num_seconds() as f64;
    (secs / SECS_PER_WEEK).max(1.0)
}

/// `1 - stddev/mean` of the gaps between consecutive commits, floored at 0.
///
/// `commits` must be sorted by time. Simultaneous commits count as perfectly
/// regular.
pub fn consistency(commits: &[&Commit]) -> f64 {
    let intervals: Vec<f64> = commits
        .windows(2)
        .map(|w| {
            w[1].authored_at
                .signed_duration_since(w[0].authored_at)
                .num_seconds() as f64
                / 3600.0
        })
        .collect();
    if intervals.is_empty() {
        return 1.0;
    }
    let m = mean(&intervals);
    if m <= f64::EPSILON {
        return 1.0;
    }
    (1.0 - std_dev(&intervals) / m).max(0.0)
}

/// Decision table on average commit size and specialization.
pub fn classify_work(
    avg_lines_per_commit: f64,
    specialization: f64,
    breadth: f64,
    insertions: u64,
    deletions: u64,
) -> WorkPattern {
    if avg_lines_per_commit > 100.0 && specialization > 0.6 {
        WorkPattern::FeatureFocused
    } else if avg_lines_per_commit < 20.0 && deletions > insertions {
        WorkPattern::MaintenanceFocused
    } else if breadth > 0.7 {
        WorkPattern::Mixed
    } else {
        WorkPattern::Experimental
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeveloperProfiler;

impl DeveloperProfiler {
    pub fn new() -> Self {
        Self
    }

    /// Profile each author with enough commits, sorted by author.
    pub fn profile(
        &self,
        session_id: Uuid,
        commits: &[Commit],
        transactions: &TransactionSet,
    ) -> Result<Vec<DeveloperPattern>, StageError> {
        let mut by_author: BTreeMap<&str, Vec<&Commit>> = BTreeMap::new();
        for commit in commits {
            by_author.entry(commit.author.as_str()).or_default().push(commit);
        }

        let total_files = transactions.unique_files();
        let mut patterns = Vec::new();

        for (author, mut authored) in by_author {
            if authored.len() < MIN_COMMITS_PER_AUTHOR {
                continue;
            }
            authored.sort_by(|a, b| a.authored_at.cmp(&b.authored_at).then(a.id.cmp(&b.id)));

            let mut touches: HashMap<&str, usize> = HashMap::new();
            for commit in &authored {
                if let Some(files) = transactions.files_for(&commit.id) {
                    for file in files {
                        *touches.entry(file.as_str()).or_insert(0) += 1;
                    }
                }
            }

            let specialty = specialty_files(&touches);
            let specialization = if touches.is_empty() {
                0.0
            } else {
                (specialty.len() as f64 / touches.len() as f64).min(1.0)
            };
            let breadth = 1.0 - specialization;

            let commit_count = authored.len();
            let velocity = commit_count as f64 / weeks_spanned(&authored);
            let consistency_score = consistency(&authored);

            let file_share = if total_files == 0 {
                0.0
            } else {
                specialty.len() as f64 / total_files as f64
            };
            let silo_risk = (0.6 * file_share + 0.4 * specialization).min(1.0);

            let insertions: u64 = authored.iter().map(|c| u64::from(c.insertions)).sum();
            let deletions: u64 = authored.iter().map(|c| u64::from(c.deletions)).sum();
            let avg_lines = (insertions + deletions) as f64 / commit_count as f64;

            ensure_finite("change_velocity", author, velocity)?;
            ensure_finite("consistency", author, consistency_score)?;

            patterns.push(DeveloperPattern {
                id: Uuid::new_v4(),
                session_id,
                author: author.to_string(),
                commit_count,
                specialty_files: specialty,
                specialization_score: specialization,
                knowledge_breadth_score: breadth,
                change_velocity: velocity,
                consistency_score,
                knowledge_silo_risk: silo_risk,
                work_pattern: classify_work(
                    avg_lines,
                    specialization,
                    breadth,
                    insertions,
                    deletions,
                ),
            });
        }

        debug!(developers = patterns.len(), "developer profiling complete");
        Ok(patterns)
    }
}

impl PatternStage for DeveloperProfiler {
    fn kind(&self) -> StageKind {
        StageKind::Developer
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutput, StageError> {
        self.profile(ctx.session_id, ctx.commits, ctx.transactions)
            .map(StageOutput::Developer)
    }
}
