use chrono::{DateTime, Utc};
use pulse_core::{DetectionResult, ProjectId};
use tracing::info;

use super::{DetectionError, PatternDetector};

/// Fold per-batch results into one.
///
/// Collections are concatenated and counters summed; errors keep a
/// `batch <n>:` prefix (1-based). The first batch's session stands for the
/// whole run.
pub(super) fn aggregate(
    project: Option<ProjectId>,
    started_at: DateTime<Utc>,
    results: Vec<DetectionResult>,
) -> DetectionResult {
    let mut combined = DetectionResult::empty(project, started_at);
    combined.session_id = results.iter().find_map(|r| r.session_id);
    combined.execution_time_ms = 0;

    for (n, r) in results.into_iter().enumerate() {
        combined.execution_time_ms += r.execution_time_ms;
        for (stage, ms) in r.stage_timings {
            *combined.stage_timings.entry(stage).or_insert(0) += ms;
        }
        combined.cooccurrence.extend(r.cooccurrence);
        combined.temporal.extend(r.temporal);
        combined.developer.extend(r.developer);
        combined.magnitude.extend(r.magnitude);
        combined.insights.extend(r.insights);
        combined.alert_count += r.alert_count;
        combined.commits_analyzed += r.commits_analyzed;
        combined.files_analyzed += r.files_analyzed;
        combined
            .errors
            .extend(r.errors.into_iter().map(|e| format!("batch {}: {e}", n + 1)));
    }

    combined.finished_at = Utc::now();
    combined.success = combined.errors.is_empty();
    combined
}

impl PatternDetector {
    /// Scheduled/manual entry point: analyze every commit of `project`
    /// authored in `[range_start, range_end]`, `batch_size` commits at a
    /// time with `batch_delay_ms` between batches.
    ///
    /// Each batch is a full run with its own discovery session, metrics
    /// entry and subscriber event; the returned result aggregates them.
    pub async fn batch_process(
        &self,
        project: &ProjectId,
        range_start: Option<DateTime<Utc>>,
        range_end: Option<DateTime<Utc>>,
    ) -> DetectionResult {
        let started_at = Utc::now();
        if !self.config.batch_enabled {
            return self.reject(Some(project.clone()), started_at, DetectionError::BatchDisabled);
        }

        let ids = match self
            .commits
            .commit_ids_in_range(project, range_start, range_end)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                return self.reject(
                    Some(project.clone()),
                    started_at,
                    DetectionError::History(e.to_string()),
                )
            }
        };
        if ids.is_empty() {
            info!(project = %project, "no commits in range");
            return DetectionResult::empty(Some(project.clone()), started_at);
        }

        let batch_size = self.config.batch_size.max(1);
        let batches = ids.len().div_ceil(batch_size);
        let mut results = Vec::with_capacity(batches);
        for (n, chunk) in ids.chunks(batch_size).enumerate() {
            if n > 0 && self.config.batch_delay_ms > 0 {
                tokio::time::sleep(self.config.batch_delay()).await;
            }
            let (result, alerts) = self.execute(project, None, chunk, Utc::now()).await;
            results.push(self.publish(result, alerts).await);
        }

        let combined = aggregate(Some(project.clone()), started_at, results);
        info!(
            project = %project,
            batches,
            commits = combined.commits_analyzed,
            patterns = combined.pattern_count(),
            success = combined.success,
            "batch processing complete"
        );
        combined
    }
}
