use chrono::{DateTime, Utc};
use serde::Serialize;

/// Detector counters. Snapshots are returned by value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionMetrics {
    pub total_runs: u64,
    pub avg_execution_time_ms: f64,
    /// Patterns plus insights across all runs.
    pub total_patterns_found: u64,
    pub total_alerts_generated: u64,
    pub failed_runs: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Commit ids currently waiting in the buffer.
    pub buffered_commits: usize,
    /// Commit ids evicted from the full buffer since startup.
    pub dropped_commits: u64,
}

impl DetectionMetrics {
    /// Record one finished run.
    pub fn record_run(
        &mut self,
        execution_time_ms: u64,
        patterns: usize,
        alerts: usize,
        success: bool,
    ) {
        self.total_runs += 1;
        self.total_patterns_found += patterns as u64;
        self.total_alerts_generated += alerts as u64;
        if !success {
            self.failed_runs += 1;
        }
        self.last_run_at = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (x - prev_avg) / n
        let n = self.total_runs as f64;
        self.avg_execution_time_ms += (execution_time_ms as f64 - self.avg_execution_time_ms) / n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_run() {
        let mut m = DetectionMetrics::default();
        m.record_run(40, 3, 1, true);

        assert_eq!(m.total_runs, 1);
        assert_eq!(m.avg_execution_time_ms, 40.0);
        assert_eq!(m.total_patterns_found, 3);
        assert_eq!(m.total_alerts_generated, 1);
        assert_eq!(m.failed_runs, 0);
        assert!(m.last_run_at.is_some());
    }

    #[test]
    fn average_tracks_all_runs() {
        let mut m = DetectionMetrics::default();
        m.record_run(100, 0, 0, true);
        m.record_run(200, 0, 0, false);
        m.record_run(0, 0, 0, true);

        assert!((m.avg_execution_time_ms - 100.0).abs() < 1e-9);
        assert_eq!(m.failed_runs, 1);
    }

    #[test]
    fn default_metrics() {
        let m = DetectionMetrics::default();
        assert_eq!(m.total_runs, 0);
        assert_eq!(m.avg_execution_time_ms, 0.0);
        assert!(m.last_run_at.is_none());
    }
}
