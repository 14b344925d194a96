use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commit::{ProjectId, SessionId};
use crate::patterns::DiscoverySessionId;

/// Lifecycle status of a discovery session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// One orchestrator run. Groups every pattern, insight and alert it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySession {
    pub id: DiscoverySessionId,
    pub project_id: ProjectId,
    /// Session that triggered the run; `None` for scheduled batches.
    pub origin_session_id: Option<SessionId>,
    pub algorithm_version: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DiscoverySession {
    /// Open a new running session.
    pub fn open(
        project_id: impl Into<ProjectId>,
        origin_session_id: Option<SessionId>,
        algorithm_version: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.into(),
            origin_session_id,
            algorithm_version: algorithm_version.into(),
            status: SessionStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status != SessionStatus::Running
    }

    /// Close the session. A closed session is returned unchanged.
    pub fn close(mut self, success: bool) -> Self {
        if self.is_closed() {
            return self;
        }
        self.status = if success {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        };
        self.finished_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_then_close_completed() {
        let session = DiscoverySession::open("proj", Some("s1".into()), "1.0");
        assert_eq!(session.status, SessionStatus::Running);
        assert!(session.finished_at.is_none());

        let closed = session.close(true);
        assert_eq!(closed.status, SessionStatus::Completed);
        assert!(closed.finished_at.is_some());
    }

    #[test]
    fn closed_session_is_not_reopened_or_relabelled() {
        let failed = DiscoverySession::open("proj", None, "1.0").close(false);
        let finished_at = failed.finished_at;

        let again = failed.close(true);
        assert_eq!(again.status, SessionStatus::Failed);
        assert_eq!(again.finished_at, finished_at);
    }
}
