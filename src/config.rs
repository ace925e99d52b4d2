//! Engine configuration
//!
//! Every empirically chosen constant lives here so hosts can tune them without
//! touching the computations. Defaults reproduce the reference thresholds.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Thresholds used by the metrics engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsConfig {
    /// EWMA smoothing factor for attention span
    pub attention_alpha: f64,
    /// Dwell times below this count toward scroll momentum (seconds)
    pub quick_skip_threshold_sec: f64,
    /// Dwell times below this count toward binge bursts (seconds)
    pub binge_dwell_threshold_sec: f64,
    /// Minimum run length for a binge burst
    pub min_binge_length: usize,
    /// Leave events shorter than this add to cognitive load (seconds)
    pub glance_threshold_sec: f64,
    /// Late-night window start hour (local, inclusive)
    pub night_start_hour: u32,
    /// Late-night window end hour (local, exclusive)
    pub night_end_hour: u32,
    /// Sessions shorter than this get no archetype (minutes)
    pub min_archetype_session_min: f64,
    /// Confidence subtracted from in-progress sessions
    pub real_time_confidence_penalty: f64,
    /// Lowest confidence an in-progress session can report
    pub real_time_confidence_floor: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            attention_alpha: 0.3,
            quick_skip_threshold_sec: 3.0,
            binge_dwell_threshold_sec: 5.0,
            min_binge_length: 5,
            glance_threshold_sec: 2.0,
            night_start_hour: 23,
            night_end_hour: 6,
            min_archetype_session_min: 0.5,
            real_time_confidence_penalty: 0.2,
            real_time_confidence_floor: 0.3,
        }
    }
}

/// Normalization caps and decision bands used by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassifierConfig {
    pub max_session_length_min: f64,
    pub max_attention_span_sec: f64,
    pub max_dopamine_spike: f64,
    pub max_replays: f64,
    pub max_reward_variability_sec: f64,
    pub max_binge_bursts: f64,
    pub max_half_life_videos: f64,
    /// Fatigue slopes are mapped from `[-bound, bound]` onto `[0, 1]`
    pub fatigue_slope_bound: f64,
    /// Probabilities above this are labelled doomscroll
    pub doomscroll_threshold: f64,
    /// Probabilities below this are labelled healthy
    pub healthy_threshold: f64,
    /// Confidence reported when the model cannot be used
    pub fallback_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_session_length_min: 200.0,
            max_attention_span_sec: 100.0,
            max_dopamine_spike: 10.0,
            max_replays: 20.0,
            max_reward_variability_sec: 40.0,
            max_binge_bursts: 10.0,
            max_half_life_videos: 50.0,
            fatigue_slope_bound: 2.0,
            doomscroll_threshold: 0.7,
            healthy_threshold: 0.3,
            fallback_confidence: 0.3,
        }
    }
}

/// Batching and retry behaviour of the analysis scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    pub batch_size: usize,
    pub max_retries: u32,
    /// Per-attempt backoff step; attempt `n` is pushed back `n` steps
    pub retry_delay_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            batch_size: 5,
            max_retries: 3,
            retry_delay_ms: 2_000,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn retry_delay(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.retry_delay_ms).unwrap_or(i64::MAX))
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub metrics: MetricsConfig,
    pub classifier: ClassifierConfig,
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    /// Parse a configuration document; missing sections and fields take defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, ComputeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ComputeError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.metrics.attention_alpha, 0.3);
        assert_eq!(config.metrics.min_binge_length, 5);
        assert_eq!(config.scheduler.batch_size, 5);
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.scheduler.retry_delay(), chrono::Duration::seconds(2));
        assert_eq!(config.classifier.fallback_confidence, 0.3);
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let json = r#"{ "scheduler": { "batchSize": 2 }, "metrics": { "attentionAlpha": 0.5 } }"#;
        let config = EngineConfig::from_json(json).unwrap();

        assert_eq!(config.scheduler.batch_size, 2);
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.metrics.attention_alpha, 0.5);
        assert_eq!(config.metrics.quick_skip_threshold_sec, 3.0);
        assert_eq!(config.classifier, ClassifierConfig::default());
    }

    #[test]
    fn test_invalid_document_is_an_error() {
        assert!(EngineConfig::from_json("{ not json").is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = EngineConfig::load(Path::new("/nonexistent/feedpulse.json"));
        assert!(matches!(result, Err(ComputeError::ConfigError(_))));
    }

    #[test]
    fn test_zero_tick_interval_is_clamped() {
        let config = SchedulerConfig {
            tick_interval_ms: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }
}
