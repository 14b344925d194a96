use std::sync::{Arc, PoisonError, RwLock};

use pulse_core::{CommitId, DetectionConfig};
use pulse_store::{CommitSource, EventLog, PatternStore, SessionResolver};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::buffer::CommitBuffer;
use crate::pipeline::{default_stages, PatternStage};

use super::{DetectionEvent, DetectionMetrics};

/// Subscriber queue depth; slow subscribers lag instead of blocking runs.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// The pattern detector. Owns the stage list, the commit buffer and the run
/// counters; shares the storage collaborators.
///
/// Every entry point takes `&self`, so one detector behind an `Arc` can serve
/// concurrent real-time, batch and drain calls.
pub struct PatternDetector {
    pub(super) config: DetectionConfig,
    pub(super) commits: Arc<dyn CommitSource>,
    pub(super) sessions: Arc<dyn SessionResolver>,
    pub(super) store: Arc<dyn PatternStore>,
    pub(super) events: Arc<dyn EventLog>,
    /// Stages in execution order.
    pub(super) stages: Vec<Arc<dyn PatternStage>>,
    pub(super) metrics: RwLock<DetectionMetrics>,
    pub(super) buffer: CommitBuffer,
    pub(super) notifier: broadcast::Sender<DetectionEvent>,
}

impl PatternDetector {
    pub fn new(
        config: DetectionConfig,
        commits: Arc<dyn CommitSource>,
        sessions: Arc<dyn SessionResolver>,
        store: Arc<dyn PatternStore>,
        events: Arc<dyn EventLog>,
    ) -> Self {
        let stages = default_stages(&config);
        let buffer = CommitBuffer::new(config.effective_buffer_capacity());
        let (notifier, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        info!(
            stages = stages.len(),
            buffer_capacity = buffer.capacity(),
            "pattern detector created"
        );
        Self {
            config,
            commits,
            sessions,
            store,
            events,
            stages,
            metrics: RwLock::new(DetectionMetrics::default()),
            buffer,
            notifier,
        }
    }

    /// Build a detector whose collaborators are all served by one backend.
    pub fn with_backend<B>(config: DetectionConfig, backend: Arc<B>) -> Self
    where
        B: CommitSource + SessionResolver + PatternStore + EventLog + 'static,
    {
        Self::new(
            config,
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend,
        )
    }

    /// Replace the stage of the same kind, keeping the execution order.
    /// A stage whose kind is not present yet is appended.
    pub fn with_stage(mut self, stage: Arc<dyn PatternStage>) -> Self {
        let kind = stage.kind();
        match self.stages.iter().position(|s| s.kind() == kind) {
            Some(idx) => self.stages[idx] = stage,
            None => self.stages.push(stage),
        }
        debug!(stage = kind.name(), "stage replaced");
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Receive a [`DetectionEvent`] for every run finished after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DetectionEvent> {
        self.notifier.subscribe()
    }

    /// Snapshot of the run counters plus current buffer state.
    pub fn metrics(&self) -> DetectionMetrics {
        let mut snapshot = self
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        snapshot.buffered_commits = self.buffer.len();
        snapshot.dropped_commits = self.buffer.dropped();
        snapshot
    }

    /// Queue commit ids for the next drain. Never blocks on a run.
    pub fn buffer_commits(&self, ids: impl IntoIterator<Item = CommitId>) {
        let evicted = self.buffer.push(ids);
        if evicted > 0 {
            warn!(
                evicted,
                capacity = self.buffer.capacity(),
                "commit buffer full, oldest ids dropped"
            );
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
