//! In-process implementation of every storage collaborator.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use pulse_core::{
    Commit, CommitId, CooccurrencePattern, DeveloperPattern, DiscoverySession,
    DiscoverySessionId, FileChange, MagnitudePattern, PatternInsight, ProjectId, SessionId,
    TemporalPattern,
};

use crate::error::StoreError;
use crate::traits::{CommitSource, EventLog, LifecycleEvent, PatternStore, SessionResolver};

#[derive(Debug, Default)]
struct Inner {
    commits: HashMap<ProjectId, Vec<Commit>>,
    file_changes: HashMap<ProjectId, Vec<FileChange>>,
    active_session: Option<SessionId>,
    session_projects: HashMap<SessionId, ProjectId>,
    sessions: HashMap<DiscoverySessionId, DiscoverySession>,
    cooccurrence: Vec<(ProjectId, CooccurrencePattern)>,
    temporal: Vec<(ProjectId, TemporalPattern)>,
    developer: Vec<(ProjectId, DeveloperPattern)>,
    magnitude: Vec<(ProjectId, MagnitudePattern)>,
    insights: Vec<(ProjectId, PatternInsight)>,
    events: Vec<LifecycleEvent>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_pattern_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append commits for a project.
    pub async fn insert_commits(&self, project: &str, commits: impl IntoIterator<Item = Commit>) {
        let mut inner = self.inner.write().await;
        inner
            .commits
            .entry(project.to_string())
            .or_default()
            .extend(commits);
    }

    /// Append file-change rows for a project.
    pub async fn insert_file_changes(
        &self,
        project: &str,
        changes: impl IntoIterator<Item = FileChange>,
    ) {
        let mut inner = self.inner.write().await;
        inner
            .file_changes
            .entry(project.to_string())
            .or_default()
            .extend(changes);
    }

    /// Make `session` the active session, bound to `project`.
    pub async fn set_active_session(&self, session: &str, project: &str) {
        let mut inner = self.inner.write().await;
        inner.active_session = Some(session.to_string());
        inner
            .session_projects
            .insert(session.to_string(), project.to_string());
    }

    /// Make every pattern write fail (sessions still persist).
    pub fn set_fail_pattern_writes(&self, fail: bool) {
        self.fail_pattern_writes.store(fail, Ordering::Relaxed);
    }

    /// Make every commit-history read fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub async fn session(&self, id: DiscoverySessionId) -> Option<DiscoverySession> {
        self.inner.read().await.sessions.get(&id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn saved_cooccurrence(&self) -> Vec<CooccurrencePattern> {
        collect_rows(&self.inner.read().await.cooccurrence)
    }

    pub async fn saved_temporal(&self) -> Vec<TemporalPattern> {
        collect_rows(&self.inner.read().await.temporal)
    }

    pub async fn saved_developer(&self) -> Vec<DeveloperPattern> {
        collect_rows(&self.inner.read().await.developer)
    }

    pub async fn saved_magnitude(&self) -> Vec<MagnitudePattern> {
        collect_rows(&self.inner.read().await.magnitude)
    }

    pub async fn saved_insights(&self) -> Vec<PatternInsight> {
        collect_rows(&self.inner.read().await.insights)
    }

    pub async fn events(&self) -> Vec<LifecycleEvent> {
        self.inner.read().await.events.clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_pattern_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("pattern writes disabled".into()));
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("commit reads disabled".into()));
        }
        Ok(())
    }
}

fn collect_rows<T: Clone>(rows: &[(ProjectId, T)]) -> Vec<T> {
    rows.iter().map(|(_, row)| row.clone()).collect()
}

fn append_rows<T: Clone>(rows: &mut Vec<(ProjectId, T)>, project: &ProjectId, new_rows: &[T]) {
    rows.extend(new_rows.iter().map(|row| (project.clone(), row.clone())));
}

#[async_trait::async_trait]
impl CommitSource for MemoryStore {
    async fn commits(
        &self,
        project: &ProjectId,
        ids: &[CommitId],
    ) -> Result<Vec<Commit>, StoreError> {
        self.check_readable()?;
        let inner = self.inner.read().await;
        let Some(all) = inner.commits.get(project) else {
            return Ok(Vec::new());
        };
        let by_id: HashMap<&str, &Commit> = all.iter().map(|c| (c.id.as_str(), c)).collect();

        let mut seen = HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| by_id.get(id.as_str()).map(|c| (*c).clone()))
            .collect())
    }

    async fn file_changes(
        &self,
        project: &ProjectId,
        ids: &[CommitId],
    ) -> Result<Vec<FileChange>, StoreError> {
        self.check_readable()?;
        let inner = self.inner.read().await;
        let Some(all) = inner.file_changes.get(project) else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            rows.extend(all.iter().filter(|fc| &fc.commit_id == id).cloned());
        }
        Ok(rows)
    }

    async fn commit_ids_in_range(
        &self,
        project: &ProjectId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<CommitId>, StoreError> {
        self.check_readable()?;
        let inner = self.inner.read().await;
        let Some(all) = inner.commits.get(project) else {
            return Ok(Vec::new());
        };

        let mut in_range: Vec<&Commit> = all
            .iter()
            .filter(|c| start.map_or(true, |s| c.authored_at >= s))
            .filter(|c| end.map_or(true, |e| c.authored_at <= e))
            .collect();
        in_range.sort_by(|a, b| a.authored_at.cmp(&b.authored_at).then_with(|| a.id.cmp(&b.id)));

        Ok(in_range.into_iter().map(|c| c.id.clone()).collect())
    }
}

#[async_trait::async_trait]
impl SessionResolver for MemoryStore {
    async fn current_session_id(&self) -> Option<SessionId> {
        self.inner.read().await.active_session.clone()
    }

    async fn project_for_session(&self, session: &SessionId) -> Option<ProjectId> {
        self.inner.read().await.session_projects.get(session).cloned()
    }
}

#[async_trait::async_trait]
impl PatternStore for MemoryStore {
    async fn open_session(&self, session: &DiscoverySession) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(session.id, session.clone());
        debug!(session_id = %session.id, project = %session.project_id, "discovery session opened");
        Ok(())
    }

    async fn close_session(&self, session: &DiscoverySession) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .sessions
            .get_mut(&session.id)
            .ok_or(StoreError::SessionNotFound(session.id))?;
        // Closed sessions are immutable.
        if stored.is_closed() {
            return Ok(());
        }
        *stored = session.clone();
        Ok(())
    }

    async fn save_cooccurrence(
        &self,
        project: &ProjectId,
        patterns: &[CooccurrencePattern],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        append_rows(&mut self.inner.write().await.cooccurrence, project, patterns);
        Ok(())
    }

    async fn save_temporal(
        &self,
        project: &ProjectId,
        patterns: &[TemporalPattern],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        append_rows(&mut self.inner.write().await.temporal, project, patterns);
        Ok(())
    }

    async fn save_developer(
        &self,
        project: &ProjectId,
        patterns: &[DeveloperPattern],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        append_rows(&mut self.inner.write().await.developer, project, patterns);
        Ok(())
    }

    async fn save_magnitude(
        &self,
        project: &ProjectId,
        patterns: &[MagnitudePattern],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        append_rows(&mut self.inner.write().await.magnitude, project, patterns);
        Ok(())
    }

    async fn save_insights(
        &self,
        project: &ProjectId,
        insights: &[PatternInsight],
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        append_rows(&mut self.inner.write().await.insights, project, insights);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EventLog for MemoryStore {
    async fn record(&self, event: LifecycleEvent) -> Result<(), StoreError> {
        self.inner.write().await.events.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pulse_core::ChangeType;

    fn commit(id: &str, hour: u32) -> Commit {
        Commit {
            id: id.to_string(),
            author: "alice".to_string(),
            authored_at: Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap(),
            insertions: 5,
            deletions: 1,
            files_changed: 1,
        }
    }

    fn change(commit_id: &str, path: &str) -> FileChange {
        FileChange {
            commit_id: commit_id.to_string(),
            path: path.to_string(),
            lines_added: 5,
            lines_removed: 1,
            change_type: ChangeType::Modified,
        }
    }

    #[tokio::test]
    async fn commits_follow_requested_order_and_skip_unknown() {
        let store = MemoryStore::new();
        store
            .insert_commits("p", vec![commit("a", 1), commit("b", 2), commit("c", 3)])
            .await;

        let ids = vec!["c".to_string(), "zz".to_string(), "a".to_string(), "c".to_string()];
        let found = store.commits(&"p".to_string(), &ids).await.unwrap();
        let found_ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(found_ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn range_query_is_inclusive_and_ordered() {
        let store = MemoryStore::new();
        store
            .insert_commits("p", vec![commit("late", 9), commit("early", 1), commit("mid", 5)])
            .await;

        let start = Utc.with_ymd_and_hms(2025, 3, 1, 1, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 5, 0, 0).unwrap();
        let ids = store
            .commit_ids_in_range(&"p".to_string(), Some(start), Some(end))
            .await
            .unwrap();
        assert_eq!(ids, vec!["early".to_string(), "mid".to_string()]);

        let all = store
            .commit_ids_in_range(&"p".to_string(), None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn file_changes_filtered_by_commit() {
        let store = MemoryStore::new();
        store
            .insert_file_changes(
                "p",
                vec![change("a", "x.rs"), change("b", "y.rs"), change("a", "z.rs")],
            )
            .await;

        let rows = store
            .file_changes(&"p".to_string(), &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.commit_id == "a"));
    }

    #[tokio::test]
    async fn session_resolution() {
        let store = MemoryStore::new();
        assert!(store.current_session_id().await.is_none());

        store.set_active_session("s1", "proj").await;
        let session = store.current_session_id().await.unwrap();
        assert_eq!(store.project_for_session(&session).await.as_deref(), Some("proj"));
    }

    #[tokio::test]
    async fn closed_session_not_overwritten() {
        let store = MemoryStore::new();
        let session = DiscoverySession::open("p", None, "test");
        store.open_session(&session).await.unwrap();

        let failed = session.clone().close(false);
        store.close_session(&failed).await.unwrap();

        let completed = session.close(true);
        store.close_session(&completed).await.unwrap();

        let stored = store.session(failed.id).await.unwrap();
        assert_eq!(stored.status, pulse_core::SessionStatus::Failed);
    }

    #[tokio::test]
    async fn closing_unknown_session_is_an_error() {
        let store = MemoryStore::new();
        let session = DiscoverySession::open("p", None, "test").close(true);
        let err = store.close_session(&session).await;
        assert!(matches!(err, Err(StoreError::SessionNotFound(id)) if id == session.id));
    }

    #[tokio::test]
    async fn failing_writes_surface_as_errors() {
        let store = MemoryStore::new();
        store.set_fail_pattern_writes(true);
        let err = store.save_insights(&"p".to_string(), &[]).await;
        assert!(matches!(err, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn failing_reads_surface_as_errors() {
        let store = MemoryStore::new();
        store.set_fail_reads(true);
        let project = "p".to_string();
        assert!(matches!(
            store.commits(&project, &["c1".to_string()]).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.commit_ids_in_range(&project, None, None).await.is_err());

        store.set_fail_reads(false);
        assert!(store.commits(&project, &[]).await.is_ok());
    }
}
