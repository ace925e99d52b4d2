//! Pipeline orchestration
//!
//! This module provides the synchronous public API for Feedpulse. It runs a
//! tracker session payload through the full pipeline: adapter → metrics →
//! classification → report encoding.

use crate::adapter::parse_session;
use crate::classifier::{ClassificationResult, Classifier};
use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::metrics::MetricsEngine;
use crate::types::{ComputedMetrics, Session};
use crate::{FEEDPULSE_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics plus classification for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub producer: String,
    pub version: String,
    pub session_id: String,
    pub computed_at: DateTime<Utc>,
    /// Metrics carrying the classifier's label and confidence
    pub metrics: ComputedMetrics,
    pub classification: ClassificationResult,
}

/// Convert a tracker session payload into an analysis report JSON.
///
/// Uses the default configuration and the built-in model.
///
/// # Example
/// ```ignore
/// let report_json = session_to_report(&session_json)?;
/// ```
pub fn session_to_report(raw_json: &str) -> Result<String, ComputeError> {
    FeedProcessor::new().process(raw_json)
}

/// Reusable processor holding a configuration and an initialized classifier
#[derive(Debug)]
pub struct FeedProcessor {
    config: EngineConfig,
    engine: MetricsEngine,
    classifier: Classifier,
}

impl Default for FeedProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedProcessor {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut classifier = Classifier::new(config.classifier.clone());
        classifier.init();
        Self {
            engine: MetricsEngine::new(config.metrics.clone()),
            classifier,
            config,
        }
    }

    /// Replace the classifier, e.g. to install a custom model
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics_engine(&self) -> &MetricsEngine {
        &self.engine
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Metrics for a session: real-time for active sessions, final otherwise
    pub fn compute_metrics(&self, session: &Session) -> ComputedMetrics {
        if session.is_active {
            self.engine.update_real_time_metrics(session)
        } else {
            self.engine.compute_metrics(session)
        }
    }

    /// Parse, analyze and encode one session payload
    pub fn process(&self, raw_json: &str) -> Result<String, ComputeError> {
        let session = parse_session(raw_json)?;
        let report = self.process_session(&session);
        Ok(serde_json::to_string(&report)?)
    }

    pub fn process_session(&self, session: &Session) -> AnalysisReport {
        let metrics = self.compute_metrics(session);
        let classification = self.classifier.classify_session(session, &metrics);

        AnalysisReport {
            producer: PRODUCER_NAME.to_string(),
            version: FEEDPULSE_VERSION.to_string(),
            session_id: session.id.clone(),
            computed_at: Utc::now(),
            metrics: metrics
                .with_classification(classification.classification, classification.confidence),
            classification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FALLBACK_MODEL_VERSION;
    use crate::config::ClassifierConfig;
    use crate::types::HealthClassification;

    fn sample_session_json() -> &'static str {
        r#"{
            "id": "sess-42",
            "startTime": "2024-01-15T02:00:00Z",
            "endTime": "2024-01-15T02:01:00Z",
            "isActive": false,
            "interactions": [
                {"videoId": "v1", "timestamp": "2024-01-15T02:00:00Z", "action": "enter"},
                {"videoId": "v1", "timestamp": "2024-01-15T02:00:01Z", "action": "leave", "metadata": {"dwellTimeMs": 1200}},
                {"videoId": "v2", "timestamp": "2024-01-15T02:00:01Z", "action": "enter"},
                {"videoId": "v2", "timestamp": "2024-01-15T02:00:03Z", "action": "leave", "metadata": {"dwellTimeMs": 1500}},
                {"videoId": "v3", "timestamp": "2024-01-15T02:00:03Z", "action": "enter"},
                {"videoId": "v3", "timestamp": "2024-01-15T02:00:04Z", "action": "leave", "metadata": {"dwellTimeMs": 1100}},
                {"videoId": "v4", "timestamp": "2024-01-15T02:00:04Z", "action": "enter"},
                {"videoId": "v4", "timestamp": "2024-01-15T02:00:06Z", "action": "leave", "metadata": {"dwellTimeMs": 1800}},
                {"videoId": "v5", "timestamp": "2024-01-15T02:00:06Z", "action": "enter"},
                {"videoId": "v5", "timestamp": "2024-01-15T02:00:07Z", "action": "leave", "metadata": {"dwellTimeMs": 900}}
            ]
        }"#
    }

    #[test]
    fn test_session_to_report() {
        let json = session_to_report(sample_session_json()).unwrap();
        let report: AnalysisReport = serde_json::from_str(&json).unwrap();

        assert_eq!(report.producer, PRODUCER_NAME);
        assert_eq!(report.version, FEEDPULSE_VERSION);
        assert_eq!(report.session_id, "sess-42");
        assert_eq!(report.metrics.fatigue_points.len(), 5);
        assert_eq!(report.metrics.binge_bursts.len(), 1);
        assert!(report.metrics.circadian_drift);
        assert_eq!(
            report.metrics.health_classification,
            report.classification.classification
        );
        assert_eq!(report.metrics.confidence, report.classification.confidence);
    }

    #[test]
    fn test_report_wire_format() {
        let json = session_to_report(sample_session_json()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.get("sessionId").is_some());
        assert!(value.get("computedAt").is_some());
        assert!(value["metrics"].get("attentionSpan").is_some());
        assert!(value["classification"].get("modelVersion").is_some());
    }

    #[test]
    fn test_invalid_payload() {
        assert!(matches!(
            session_to_report("{"),
            Err(ComputeError::ParseError(_))
        ));
    }

    #[test]
    fn test_active_session_uses_real_time_metrics() {
        let processor = FeedProcessor::new();
        let mut session = crate::adapter::parse_session(sample_session_json()).unwrap();
        session.is_active = true;
        session.end_time = None;

        let live = processor.compute_metrics(&session);
        let finished = processor.metrics_engine().compute_metrics(&session);
        // Real-time length runs to now, long after the last interaction
        assert!(live.session_length > finished.session_length);
    }

    #[test]
    fn test_custom_classifier() {
        let processor =
            FeedProcessor::new().with_classifier(Classifier::new(ClassifierConfig::default()));
        let session = crate::adapter::parse_session(sample_session_json()).unwrap();
        let report = processor.process_session(&session);

        assert_eq!(report.classification.model_version, FALLBACK_MODEL_VERSION);
        assert_eq!(report.metrics.confidence, 0.3);
        assert_ne!(report.classification.classification, HealthClassification::Healthy);
    }
}
