use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use pulse_core::{
    Commit, CommitId, DetectionResult, DiscoverySession, FileChange, PatternAlert, ProjectId,
    SessionId,
};
use pulse_store::{LifecycleEvent, StoreError};
use tracing::{debug, info, warn};

use crate::pipeline::transactions::TransactionSet;
use crate::pipeline::{PatternStage, StageContext, StageError, StageOutput, StageOutputs};

use super::batch::aggregate;
use super::{DetectionError, DetectionEvent, PatternDetector};

/// Run one stage, turning a panic into a stage error.
fn run_isolated(
    stage: &dyn PatternStage,
    ctx: &StageContext<'_>,
) -> Result<StageOutput, StageError> {
    panic::catch_unwind(AssertUnwindSafe(|| stage.run(ctx))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(StageError::Panicked(message))
    })
}

fn millis(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl PatternDetector {
    /// Real-time entry point: analyze `commit_ids` for the active session's
    /// project.
    ///
    /// Never fails; input errors come back as an unsuccessful result with a
    /// single error and no session.
    pub async fn detect_for_commits(&self, commit_ids: &[CommitId]) -> DetectionResult {
        let started_at = Utc::now();
        if !self.config.realtime_enabled {
            return self.reject(None, started_at, DetectionError::RealtimeDisabled);
        }
        self.run_for_active_session(commit_ids, started_at).await
    }

    /// Analyze everything currently buffered, in chunks of `batch_size`.
    ///
    /// Returns `None` when the buffer was empty.
    pub async fn drain_buffer(&self) -> Option<DetectionResult> {
        let ids = self.buffer.take_all();
        if ids.is_empty() {
            return None;
        }
        let started_at = Utc::now();
        debug!(commits = ids.len(), "draining commit buffer");

        let mut results = Vec::new();
        for chunk in ids.chunks(self.config.batch_size.max(1)) {
            results.push(self.run_for_active_session(chunk, Utc::now()).await);
        }
        let project = results.first().and_then(|r| r.project_id.clone());
        Some(aggregate(project, started_at, results))
    }

    pub(super) async fn run_for_active_session(
        &self,
        commit_ids: &[CommitId],
        started_at: DateTime<Utc>,
    ) -> DetectionResult {
        match self.resolve_project().await {
            Ok((session, project)) => {
                let (result, alerts) = self
                    .execute(&project, Some(session), commit_ids, started_at)
                    .await;
                self.publish(result, alerts).await
            }
            Err(e) => self.reject(None, started_at, e),
        }
    }

    async fn resolve_project(&self) -> Result<(SessionId, ProjectId), DetectionError> {
        let session = self
            .sessions
            .current_session_id()
            .await
            .ok_or(DetectionError::NoActiveSession)?;
        let project = self
            .sessions
            .project_for_session(&session)
            .await
            .ok_or_else(|| DetectionError::NoProject(session.clone()))?;
        Ok((session, project))
    }

    pub(super) fn reject(
        &self,
        project: Option<ProjectId>,
        started_at: DateTime<Utc>,
        error: DetectionError,
    ) -> DetectionResult {
        warn!(error = %error, "detection rejected");
        let result = DetectionResult::rejected(project, started_at, error.to_string());
        self.record_metrics(&result);
        result
    }

    async fn load_history(
        &self,
        project: &ProjectId,
        commit_ids: &[CommitId],
    ) -> Result<(Vec<Commit>, Vec<FileChange>), StoreError> {
        let commits = self.commits.commits(project, commit_ids).await?;
        let known: Vec<CommitId> = commits.iter().map(|c| c.id.clone()).collect();
        let changes = self.commits.file_changes(project, &known).await?;
        Ok((commits, changes))
    }

    /// One full pipeline run: session open, stages, persistence, session
    /// close. Does not touch metrics or subscribers.
    pub(super) async fn execute(
        &self,
        project: &ProjectId,
        origin: Option<SessionId>,
        commit_ids: &[CommitId],
        started_at: DateTime<Utc>,
    ) -> (DetectionResult, Vec<PatternAlert>) {
        let clock = Instant::now();
        let budget_ms = self.config.timeout_ms;
        let session = DiscoverySession::open(
            project.clone(),
            origin,
            self.config.algorithm_version.clone(),
        );
        if let Err(e) = self.store.open_session(&session).await {
            warn!(session = %session.id, error = %e, "failed to persist discovery session");
        }

        let mut errors: Vec<String> = Vec::new();
        let mut stage_timings = BTreeMap::new();

        let load_start = Instant::now();
        let (commits, changes) = match self.load_history(project, commit_ids).await {
            Ok(history) => history,
            Err(e) => {
                let err = StageError::Storage(e.to_string());
                warn!(session = %session.id, error = %err, "failed to load commit history");
                errors.push(format!("transactions: {err}"));
                (Vec::new(), Vec::new())
            }
        };
        let order: Vec<CommitId> = commits.iter().map(|c| c.id.clone()).collect();
        let transactions = TransactionSet::build(&order, &changes);
        stage_timings.insert("transactions".to_string(), millis(load_start));

        let mut outputs = StageOutputs::default();
        for stage in &self.stages {
            let name = stage.kind().name();
            let elapsed_ms = millis(clock);
            if elapsed_ms >= budget_ms {
                let err = StageError::Timeout {
                    elapsed_ms,
                    budget_ms,
                };
                warn!(session = %session.id, stage = name, error = %err, "run aborted");
                errors.push(format!("{name}: {err}"));
                break;
            }

            let stage_start = Instant::now();
            let outcome = {
                let ctx = StageContext {
                    session_id: session.id,
                    commits: &commits,
                    changes: &changes,
                    transactions: &transactions,
                    outputs: &outputs,
                };
                run_isolated(stage.as_ref(), &ctx)
            };
            let took = millis(stage_start);
            stage_timings.insert(name.to_string(), took);

            match outcome {
                Ok(output) => {
                    debug!(session = %session.id, stage = name, ms = took, "stage complete");
                    outputs.absorb(output);
                }
                Err(e) => {
                    warn!(session = %session.id, stage = name, error = %e, "stage failed");
                    errors.push(format!("{name}: {e}"));
                }
            }
        }

        self.persist(project, &outputs).await;

        let success = errors.is_empty();
        let session = session.close(success);
        if let Err(e) = self.store.close_session(&session).await {
            warn!(session = %session.id, error = %e, "failed to close discovery session");
        }

        let finished_at = Utc::now();
        let StageOutputs {
            cooccurrence,
            temporal,
            developer,
            magnitude,
            insights,
            alerts,
        } = outputs;

        let result = DetectionResult {
            session_id: Some(session.id),
            project_id: Some(project.clone()),
            started_at,
            finished_at,
            execution_time_ms: millis(clock),
            stage_timings,
            cooccurrence,
            temporal,
            developer,
            magnitude,
            insights,
            alert_count: alerts.len(),
            commits_analyzed: commits.len(),
            files_analyzed: transactions.unique_files(),
            success,
            errors,
        };

        info!(
            session = %session.id,
            project = %project,
            commits = result.commits_analyzed,
            patterns = result.pattern_count(),
            alerts = result.alert_count,
            ms = result.execution_time_ms,
            success,
            "detection run complete"
        );
        (result, alerts)
    }

    /// Write the pattern collections. Failures are logged and leave the
    /// in-memory result untouched.
    async fn persist(&self, project: &ProjectId, outputs: &StageOutputs) {
        let writes = [
            ("cooccurrence", self.store.save_cooccurrence(project, &outputs.cooccurrence).await),
            ("temporal", self.store.save_temporal(project, &outputs.temporal).await),
            ("developer", self.store.save_developer(project, &outputs.developer).await),
            ("magnitude", self.store.save_magnitude(project, &outputs.magnitude).await),
            ("insights", self.store.save_insights(project, &outputs.insights).await),
        ];
        for (collection, outcome) in writes {
            if let Err(e) = outcome {
                warn!(project = %project, collection, error = %e, "failed to persist patterns");
            }
        }
    }

    fn record_metrics(&self, result: &DetectionResult) {
        self.metrics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record_run(
                result.execution_time_ms,
                result.pattern_count(),
                result.alert_count,
                result.success,
            );
    }

    /// Update metrics, log the run and notify subscribers.
    pub(super) async fn publish(
        &self,
        result: DetectionResult,
        alerts: Vec<PatternAlert>,
    ) -> DetectionResult {
        self.record_metrics(&result);

        let event = LifecycleEvent::RunCompleted {
            session_id: result.session_id,
            project_id: result.project_id.clone(),
            success: result.success,
            execution_time_ms: result.execution_time_ms,
            patterns: result.pattern_count(),
            alerts: result.alert_count,
        };
        if let Err(e) = self.events.record(event).await {
            debug!(error = %e, "failed to record run event");
        }

        // No receivers is not an error.
        let _ = self.notifier.send(DetectionEvent {
            result: Arc::new(result.clone()),
            alerts: Arc::new(alerts),
        });
        result
    }
}
