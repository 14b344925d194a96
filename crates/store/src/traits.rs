//! Collaborator trait definitions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pulse_core::{
    Commit, CommitId, CooccurrencePattern, DeveloperPattern, DiscoverySession,
    DiscoverySessionId, FileChange, MagnitudePattern, PatternInsight, ProjectId, SessionId,
    TemporalPattern,
};

use crate::error::StoreError;

/// Read access to ingested commit history.
#[async_trait::async_trait]
pub trait CommitSource: Send + Sync {
    /// Commits with the given ids. Unknown ids are skipped.
    async fn commits(
        &self,
        project: &ProjectId,
        ids: &[CommitId],
    ) -> Result<Vec<Commit>, StoreError>;

    /// File-change rows belonging to the given commits.
    async fn file_changes(
        &self,
        project: &ProjectId,
        ids: &[CommitId],
    ) -> Result<Vec<FileChange>, StoreError>;

    /// Commit ids authored within `[start, end]`, oldest first. Open bounds
    /// are unbounded.
    async fn commit_ids_in_range(
        &self,
        project: &ProjectId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitId>, StoreError>;
}

/// Resolves the active user session and its project.
#[async_trait::async_trait]
pub trait SessionResolver: Send + Sync {
    async fn current_session_id(&self) -> Option<SessionId>;

    async fn project_for_session(&self, session: &SessionId) -> Option<ProjectId>;
}

/// Append-only persistence for discovery sessions and pattern collections.
#[async_trait::async_trait]
pub trait PatternStore: Send + Sync {
    async fn open_session(&self, session: &DiscoverySession) -> Result<(), StoreError>;

    /// Record the final state of a session that was previously opened.
    async fn close_session(&self, session: &DiscoverySession) -> Result<(), StoreError>;

    async fn save_cooccurrence(
        &self,
        project: &ProjectId,
        patterns: &[CooccurrencePattern],
    ) -> Result<(), StoreError>;

    async fn save_temporal(
        &self,
        project: &ProjectId,
        patterns: &[TemporalPattern],
    ) -> Result<(), StoreError>;

    async fn save_developer(
        &self,
        project: &ProjectId,
        patterns: &[DeveloperPattern],
    ) -> Result<(), StoreError>;

    async fn save_magnitude(
        &self,
        project: &ProjectId,
        patterns: &[MagnitudePattern],
    ) -> Result<(), StoreError>;

    async fn save_insights(
        &self,
        project: &ProjectId,
        insights: &[PatternInsight],
    ) -> Result<(), StoreError>;
}

/// Lifecycle and telemetry events emitted by the detector service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    ServiceStarted {
        drain_interval_ms: u64,
    },
    ServiceStopped,
    RunCompleted {
        session_id: Option<DiscoverySessionId>,
        project_id: Option<ProjectId>,
        success: bool,
        execution_time_ms: u64,
        patterns: usize,
        alerts: usize,
    },
}

/// Fire-and-forget event sink. Callers log failures and move on.
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    async fn record(&self, event: LifecycleEvent) -> Result<(), StoreError>;
}
