//! JSON history fixtures for the worker binary and integration tests.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use pulse_core::{Commit, FileChange};

use crate::error::StoreError;
use crate::memory::MemoryStore;

/// A project's commit history serialized as one JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub project: String,
    /// Session bound to `project` as the active session, if any.
    #[serde(default)]
    pub session: Option<String>,
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub file_changes: Vec<FileChange>,
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Load the fixture into `store`.
    pub async fn populate(&self, store: &MemoryStore) {
        store
            .insert_commits(&self.project, self.commits.iter().cloned())
            .await;
        store
            .insert_file_changes(&self.project, self.file_changes.iter().cloned())
            .await;
        if let Some(session) = &self.session {
            store.set_active_session(session, &self.project).await;
        }
        info!(
            project = %self.project,
            commits = self.commits.len(),
            file_changes = self.file_changes.len(),
            "fixture loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{CommitSource, SessionResolver};

    const FIXTURE: &str = r#"{
        "project": "demo",
        "session": "s-1",
        "commits": [
            {"id": "c1", "author": "alice", "authored_at": "2025-03-01T10:00:00Z",
             "insertions": 10, "deletions": 2, "files_changed": 2}
        ],
        "file_changes": [
            {"commit_id": "c1", "path": "a.rs", "lines_added": 6, "lines_removed": 1,
             "change_type": "modified"},
            {"commit_id": "c1", "path": "b.rs", "lines_added": 4, "lines_removed": 1,
             "change_type": "added"}
        ]
    }"#;

    #[tokio::test]
    async fn fixture_populates_store() {
        let fixture = Fixture::from_json(FIXTURE).unwrap();
        let store = MemoryStore::new();
        fixture.populate(&store).await;

        let session = store.current_session_id().await.unwrap();
        let project = store.project_for_session(&session).await.unwrap();
        assert_eq!(project, "demo");

        let rows = store
            .file_changes(&project, &["c1".to_string()])
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn missing_fixture_file_is_an_io_error() {
        let path = std::env::temp_dir().join("pulse-fixture-does-not-exist.json");
        assert!(matches!(Fixture::load(&path), Err(StoreError::Io(_))));
    }

    #[test]
    fn malformed_fixture_is_an_error() {
        assert!(matches!(
            Fixture::from_json("{\"project\": 3}"),
            Err(StoreError::Serialize(_))
        ));
    }
}
