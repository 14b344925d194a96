use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

/// Tuning knobs for the detection pipeline and its service wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Accept `detect_for_commits` calls.
    #[serde(default = "default_true")]
    pub realtime_enabled: bool,
    /// Accept `batch_process` calls and run the buffer drain timer.
    #[serde(default = "default_true")]
    pub batch_enabled: bool,
    /// Soft per-run budget, checked between stages.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Commits per batch in batch mode and per drained chunk.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between consecutive batches.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_min_support")]
    pub min_support: f64,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_min_lift")]
    pub min_lift: f64,
    /// Minimum temporal significance for a pattern to be kept.
    #[serde(default = "default_significance")]
    pub significance_threshold: f64,
    /// Anomaly score above which a file is critical regardless of its risk score.
    #[serde(default = "default_anomaly")]
    pub anomaly_threshold: f64,
    /// Commit buffer bound. `None` means twice the batch size.
    #[serde(default)]
    pub buffer_capacity: Option<usize>,
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,
    /// Minimum insight confidence for a critical-insight alert.
    #[serde(default = "default_alert_score")]
    pub alert_score_threshold: f64,
    /// Stamped on every discovery session.
    #[serde(default = "default_algorithm_version")]
    pub algorithm_version: String,
}

fn default_true() -> bool { true }
fn default_timeout_ms() -> u64 { 100 }
fn default_batch_size() -> usize { 50 }
fn default_batch_delay_ms() -> u64 { 10 }
fn default_min_support() -> f64 { 0.1 }
fn default_min_confidence() -> f64 { 0.3 }
fn default_min_lift() -> f64 { 1.5 }
fn default_significance() -> f64 { 0.7 }
fn default_anomaly() -> f64 { 0.8 }
fn default_drain_interval_ms() -> u64 { 5000 }
fn default_alert_score() -> f64 { 0.7 }
fn default_algorithm_version() -> String { env!("CARGO_PKG_VERSION").to_string() }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            realtime_enabled: default_true(),
            batch_enabled: default_true(),
            timeout_ms: default_timeout_ms(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            min_support: default_min_support(),
            min_confidence: default_min_confidence(),
            min_lift: default_min_lift(),
            significance_threshold: default_significance(),
            anomaly_threshold: default_anomaly(),
            buffer_capacity: None,
            drain_interval_ms: default_drain_interval_ms(),
            alert_score_threshold: default_alert_score(),
            algorithm_version: default_algorithm_version(),
        }
    }
}

impl DetectionConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `PULSE_PROFILE`; when set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("PULSE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let d = Self::default();
        Self {
            realtime_enabled: profiled_env_bool(p, "PATTERN_REALTIME_ENABLED", d.realtime_enabled),
            batch_enabled: profiled_env_bool(p, "PATTERN_BATCH_ENABLED", d.batch_enabled),
            timeout_ms: profiled_env_parse(p, "PATTERN_TIMEOUT_MS", d.timeout_ms),
            batch_size: profiled_env_parse(p, "PATTERN_BATCH_SIZE", d.batch_size),
            batch_delay_ms: profiled_env_parse(p, "PATTERN_BATCH_DELAY_MS", d.batch_delay_ms),
            min_support: profiled_env_parse(p, "PATTERN_MIN_SUPPORT", d.min_support),
            min_confidence: profiled_env_parse(p, "PATTERN_MIN_CONFIDENCE", d.min_confidence),
            min_lift: profiled_env_parse(p, "PATTERN_MIN_LIFT", d.min_lift),
            significance_threshold: profiled_env_parse(
                p,
                "PATTERN_SIGNIFICANCE_THRESHOLD",
                d.significance_threshold,
            ),
            anomaly_threshold: profiled_env_parse(
                p,
                "PATTERN_ANOMALY_THRESHOLD",
                d.anomaly_threshold,
            ),
            buffer_capacity: profiled_env_opt(p, "PATTERN_BUFFER_CAPACITY")
                .and_then(|v| v.parse().ok()),
            drain_interval_ms: profiled_env_parse(
                p,
                "PATTERN_DRAIN_INTERVAL_MS",
                d.drain_interval_ms,
            ),
            alert_score_threshold: profiled_env_parse(
                p,
                "PATTERN_ALERT_SCORE_THRESHOLD",
                d.alert_score_threshold,
            ),
            algorithm_version: profiled_env_opt(p, "PATTERN_ALGORITHM_VERSION")
                .unwrap_or(d.algorithm_version),
        }
    }

    /// Reject values outside their mathematical domain.
    pub fn validate(&self) -> Result<(), PulseError> {
        let unit = [
            ("min_support", self.min_support),
            ("min_confidence", self.min_confidence),
            ("significance_threshold", self.significance_threshold),
            ("anomaly_threshold", self.anomaly_threshold),
            ("alert_score_threshold", self.alert_score_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(PulseError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.min_lift.is_nan() || self.min_lift < 0.0 {
            return Err(PulseError::Config(format!("min_lift must be >= 0, got {}", self.min_lift)));
        }
        if self.batch_size == 0 {
            return Err(PulseError::Config("batch_size must be > 0".into()));
        }
        if self.drain_interval_ms == 0 {
            return Err(PulseError::Config("drain_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    /// Resolve the buffer bound (defaults to twice the batch size).
    pub fn effective_buffer_capacity(&self) -> usize {
        self.buffer_capacity.unwrap_or(self.batch_size * 2).max(1)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Detection config loaded:");
        tracing::info!(
            "  modes:       realtime={}, batch={}",
            self.realtime_enabled,
            self.batch_enabled
        );
        tracing::info!(
            "  budget:      timeout={}ms, batch_size={}, buffer={}",
            self.timeout_ms,
            self.batch_size,
            self.effective_buffer_capacity()
        );
        tracing::info!(
            "  cooccurrence: support>={}, confidence>={}, lift>={}",
            self.min_support,
            self.min_confidence,
            self.min_lift
        );
        tracing::info!(
            "  thresholds:  significance>={}, anomaly>{}, alert>{}",
            self.significance_threshold,
            self.anomaly_threshold,
            self.alert_score_threshold
        );
        tracing::info!("  drain:       every {}ms", self.drain_interval_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DetectionConfig::default();
        assert!(config.realtime_enabled);
        assert!(config.batch_enabled);
        assert_eq!(config.timeout_ms, 100);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.min_support, 0.1);
        assert_eq!(config.min_confidence, 0.3);
        assert_eq!(config.min_lift, 1.5);
        assert_eq!(config.significance_threshold, 0.7);
        assert_eq!(config.anomaly_threshold, 0.8);
        assert_eq!(config.drain_interval_ms, 5000);
        assert_eq!(config.effective_buffer_capacity(), 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn serde_fills_missing_fields() {
        let config: DetectionConfig = serde_json::from_str(r#"{"batch_size": 10}"#).unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.effective_buffer_capacity(), 20);
        assert_eq!(config.timeout_ms, 100);
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let mut config = DetectionConfig::default();
        config.min_support = 1.5;
        assert!(matches!(config.validate(), Err(PulseError::Config(_))));

        let mut config = DetectionConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = DetectionConfig::default();
        config.min_lift = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn profile_prefix_wins_over_plain_key() {
        // Unique key names keep this test independent of the process env.
        env::set_var("PULSETEST_PATTERN_BATCH_SIZE", "7");
        let config = DetectionConfig::for_profile("pulsetest");
        assert_eq!(config.batch_size, 7);
        env::remove_var("PULSETEST_PATTERN_BATCH_SIZE");
    }
}
