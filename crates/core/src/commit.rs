use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commit identifier (usually the lowercase hex hash).
pub type CommitId = String;

/// Project identifier issued by the session/project subsystem.
pub type ProjectId = String;

/// Identifier of the user-facing session that triggered a run.
pub type SessionId = String;

/// A commit as recorded by the upstream git ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub author: String,
    pub authored_at: DateTime<Utc>,
    pub insertions: u32,
    pub deletions: u32,
    pub files_changed: u32,
}

impl Commit {
    /// Total lines touched by the commit.
    pub fn lines_changed(&self) -> u64 {
        u64::from(self.insertions) + u64::from(self.deletions)
    }
}

/// How a file was touched by a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

/// One file touched by one commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub commit_id: CommitId,
    pub path: String,
    pub lines_added: u32,
    pub lines_removed: u32,
    pub change_type: ChangeType,
}

impl FileChange {
    pub fn lines_changed(&self) -> u64 {
        u64::from(self.lines_added) + u64::from(self.lines_removed)
    }
}
