//! Periodic buffer drain around a shared [`PatternDetector`].

use std::sync::Arc;
use std::time::Duration;

use pulse_store::{EventLog, LifecycleEvent};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::detector::PatternDetector;

struct DrainTask {
    shutdown: Arc<Notify>,
    /// `None` when batch processing is disabled and no timer was spawned.
    handle: Option<JoinHandle<()>>,
}

/// Owns the drain timer. `start` and `stop` are idempotent.
pub struct PatternService {
    detector: Arc<PatternDetector>,
    events: Arc<dyn EventLog>,
    task: Mutex<Option<DrainTask>>,
}

impl PatternService {
    pub fn new(detector: Arc<PatternDetector>, events: Arc<dyn EventLog>) -> Self {
        Self {
            detector,
            events,
            task: Mutex::new(None),
        }
    }

    pub fn detector(&self) -> &Arc<PatternDetector> {
        &self.detector
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Start the drain timer. Returns `false` if already running.
    ///
    /// Drain interval and batch mode come from the detector's config, fixed
    /// when the detector was built.
    pub async fn start(&self) -> bool {
        let mut task = self.task.lock().await;
        if task.is_some() {
            debug!("pattern service already running");
            return false;
        }

        let config = self.detector.config();
        let shutdown = Arc::new(Notify::new());
        let handle = if config.batch_enabled {
            Some(tokio::spawn(drain_loop(
                Arc::clone(&self.detector),
                config.drain_interval(),
                Arc::clone(&shutdown),
            )))
        } else {
            warn!("batch processing disabled, buffered commits will not be drained");
            None
        };
        *task = Some(DrainTask { shutdown, handle });

        info!(
            drain_interval_ms = config.drain_interval_ms,
            "pattern service started"
        );
        self.record(LifecycleEvent::ServiceStarted {
            drain_interval_ms: config.drain_interval_ms,
        })
        .await;
        true
    }

    /// Stop the timer after one final drain. Returns `false` if not running.
    pub async fn stop(&self) -> bool {
        let Some(task) = self.task.lock().await.take() else {
            debug!("pattern service not running");
            return false;
        };

        task.shutdown.notify_one();
        if let Some(handle) = task.handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "drain task ended abnormally");
            }
        }

        info!("pattern service stopped");
        self.record(LifecycleEvent::ServiceStopped).await;
        true
    }

    async fn record(&self, event: LifecycleEvent) {
        if let Err(e) = self.events.record(event).await {
            debug!(error = %e, "failed to record lifecycle event");
        }
    }
}

/// Drain the buffer every `interval` until `shutdown` fires, then once more.
async fn drain_loop(detector: Arc<PatternDetector>, interval: Duration, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(result) = detector.drain_buffer().await {
                    debug!(
                        commits = result.commits_analyzed,
                        success = result.success,
                        "periodic drain complete"
                    );
                }
            }
            _ = shutdown.notified() => {
                break;
            }
        }
    }

    if let Some(result) = detector.drain_buffer().await {
        info!(commits = result.commits_analyzed, "final drain on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pulse_core::{ChangeType, Commit, DetectionConfig, FileChange};
    use pulse_store::MemoryStore;

    async fn service(config: DetectionConfig) -> (PatternService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let ts = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        store
            .insert_commits(
                "proj",
                (0..3).map(|i| Commit {
                    id: format!("c{i}"),
                    author: "dev".into(),
                    authored_at: ts,
                    insertions: 4,
                    deletions: 1,
                    files_changed: 1,
                }),
            )
            .await;
        store
            .insert_file_changes(
                "proj",
                (0..3).map(|i| FileChange {
                    commit_id: format!("c{i}"),
                    path: "lib.rs".into(),
                    lines_added: 4,
                    lines_removed: 1,
                    change_type: ChangeType::Modified,
                }),
            )
            .await;
        store.set_active_session("s-1", "proj").await;

        let detector = Arc::new(PatternDetector::with_backend(config, store.clone()));
        (PatternService::new(detector, store.clone()), store)
    }

    fn fast_config() -> DetectionConfig {
        DetectionConfig {
            drain_interval_ms: 20,
            timeout_ms: 10_000,
            ..DetectionConfig::default()
        }
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (service, store) = service(fast_config()).await;

        assert!(service.start().await);
        assert!(!service.start().await);
        assert!(service.is_running().await);

        assert!(service.stop().await);
        assert!(!service.stop().await);
        assert!(!service.is_running().await);

        let events = store.events().await;
        assert_eq!(events.first(), Some(&LifecycleEvent::ServiceStarted { drain_interval_ms: 20 }));
        assert_eq!(events.last(), Some(&LifecycleEvent::ServiceStopped));
    }

    #[tokio::test]
    async fn timer_drains_buffer() {
        let (service, store) = service(fast_config()).await;
        service.start().await;

        service
            .detector()
            .buffer_commits(["c0".to_string(), "c1".to_string(), "c2".to_string()]);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(service.detector().buffered(), 0);
        assert!(service.detector().metrics().total_runs >= 1);
        service.stop().await;

        let runs = store
            .events()
            .await
            .into_iter()
            .filter(|e| matches!(e, LifecycleEvent::RunCompleted { .. }))
            .count();
        assert_eq!(runs, 1);
    }

    #[tokio::test]
    async fn stop_flushes_pending_commits() {
        let config = DetectionConfig {
            drain_interval_ms: 60_000,
            ..fast_config()
        };
        let (service, _store) = service(config).await;
        service.start().await;
        service.detector().buffer_commits(["c0".to_string()]);

        service.stop().await;
        assert_eq!(service.detector().buffered(), 0);
        assert_eq!(service.detector().metrics().total_runs, 1);
    }

    #[tokio::test]
    async fn batch_disabled_spawns_no_timer() {
        let config = DetectionConfig {
            batch_enabled: false,
            ..fast_config()
        };
        let (service, _store) = service(config).await;
        assert!(service.start().await);

        service.detector().buffer_commits(["c0".to_string()]);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(service.detector().buffered(), 1);

        assert!(service.stop().await);
        assert_eq!(service.detector().buffered(), 1);
    }
}
