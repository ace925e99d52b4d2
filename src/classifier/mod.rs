//! Session classification
//!
//! Maps a session and its metrics to a healthy/doomscroll label using an opaque
//! prediction model. Classification never fails from the caller's point of
//! view: when the model is missing or errors, the result falls back to the
//! rule-based label already carried by the metrics.

pub mod features;
pub mod model;

pub use features::{extract_features, SessionFeatures, FEATURE_COUNT};
pub use model::{HeuristicModel, PredictionModel, HEURISTIC_MODEL_VERSION};

use crate::config::ClassifierConfig;
use crate::error::ComputeError;
use crate::types::{ComputedMetrics, HealthClassification, Session};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Model version recorded on rule-based fallback results
pub const FALLBACK_MODEL_VERSION: &str = "fallback";

/// Confidence reported for probabilities inside the undecided band
const UNDECIDED_CONFIDENCE: f64 = 0.5;

/// Outcome of classifying one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub classification: HealthClassification,
    pub confidence: f64,
    pub features: SessionFeatures,
    pub model_version: String,
}

impl ClassificationResult {
    pub fn is_fallback(&self) -> bool {
        self.model_version == FALLBACK_MODEL_VERSION
    }
}

/// Classifies sessions with a pluggable prediction model
pub struct Classifier {
    config: ClassifierConfig,
    model: Option<Box<dyn PredictionModel>>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("config", &self.config)
            .field("model", &self.model.as_ref().map(|m| m.version().to_string()))
            .finish()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        let mut classifier = Self::new(ClassifierConfig::default());
        classifier.init();
        classifier
    }
}

impl Classifier {
    /// Create a classifier without a model; call [`Classifier::init`] or
    /// [`Classifier::with_model`] before expecting model-backed results
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Install a custom prediction model
    pub fn with_model(mut self, model: Box<dyn PredictionModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Install the built-in model unless one is already set
    pub fn init(&mut self) {
        if self.model.is_none() {
            debug!("loading built-in model {}", HEURISTIC_MODEL_VERSION);
            self.model = Some(Box::new(HeuristicModel));
        }
    }

    /// Release the model; later classifications fall back
    pub fn dispose(&mut self) {
        self.model = None;
    }

    pub fn is_ready(&self) -> bool {
        self.model.is_some()
    }

    pub fn model_version(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.version())
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Normalized features for a session
    pub fn extract_features(
        &self,
        session: &Session,
        metrics: &ComputedMetrics,
    ) -> SessionFeatures {
        extract_features(session, metrics, &self.config)
    }

    /// Classify one session, falling back to the metrics' own label on any model error
    pub fn classify_session(
        &self,
        session: &Session,
        metrics: &ComputedMetrics,
    ) -> ClassificationResult {
        let features = self.extract_features(session, metrics);
        match self.predict_one(&features) {
            Ok((probability, version)) => self.label(probability, features, version),
            Err(e) => {
                warn!("classification of session {} fell back to rules: {}", session.id, e);
                self.fallback(metrics, features)
            }
        }
    }

    /// Classify a batch; output has the same length and order as the input.
    ///
    /// A batch-level model failure makes every element fall back.
    pub fn classify_sessions(
        &self,
        batch: &[(&Session, &ComputedMetrics)],
    ) -> Vec<ClassificationResult> {
        let features: Vec<SessionFeatures> = batch
            .iter()
            .map(|(session, metrics)| self.extract_features(session, metrics))
            .collect();

        match self.predict_many(&features) {
            Ok((probabilities, version)) => probabilities
                .into_iter()
                .zip(features)
                .map(|(p, f)| self.label(p, f, version.clone()))
                .collect(),
            Err(e) => {
                warn!("batch of {} sessions fell back to rules: {}", batch.len(), e);
                batch
                    .iter()
                    .zip(features)
                    .map(|((_, metrics), f)| self.fallback(metrics, f))
                    .collect()
            }
        }
    }

    fn predict_one(&self, features: &SessionFeatures) -> Result<(f64, String), ComputeError> {
        let model = self.model.as_deref().ok_or(ComputeError::ModelUnavailable)?;
        let vector = features.to_vector();
        let probability = validate_probability(catch_model_panic(|| model.predict(&vector))?)?;
        Ok((probability, model.version().to_string()))
    }

    fn predict_many(
        &self,
        features: &[SessionFeatures],
    ) -> Result<(Vec<f64>, String), ComputeError> {
        let model = self.model.as_deref().ok_or(ComputeError::ModelUnavailable)?;
        let rows: Vec<Vec<f64>> = features.iter().map(|f| f.to_vector().to_vec()).collect();
        let probabilities = catch_model_panic(|| model.predict_batch(&rows))?;
        if probabilities.len() != rows.len() {
            return Err(ComputeError::PredictionFailed(format!(
                "model returned {} predictions for {} sessions",
                probabilities.len(),
                rows.len()
            )));
        }
        let probabilities = probabilities
            .into_iter()
            .map(validate_probability)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((probabilities, model.version().to_string()))
    }

    fn label(
        &self,
        probability: f64,
        features: SessionFeatures,
        model_version: String,
    ) -> ClassificationResult {
        let (classification, confidence) = if probability > self.config.doomscroll_threshold {
            (HealthClassification::Doomscroll, (probability - 0.5).abs() * 2.0)
        } else if probability < self.config.healthy_threshold {
            (HealthClassification::Healthy, (probability - 0.5).abs() * 2.0)
        } else {
            (HealthClassification::Unknown, UNDECIDED_CONFIDENCE)
        };

        ClassificationResult {
            classification,
            confidence,
            features,
            model_version,
        }
    }

    fn fallback(
        &self,
        metrics: &ComputedMetrics,
        features: SessionFeatures,
    ) -> ClassificationResult {
        ClassificationResult {
            classification: metrics.health_classification,
            confidence: self.config.fallback_confidence,
            features,
            model_version: FALLBACK_MODEL_VERSION.to_string(),
        }
    }
}

/// Run a model call, turning a panic inside the model into a prediction failure
fn catch_model_panic<T>(
    call: impl FnOnce() -> Result<T, ComputeError>,
) -> Result<T, ComputeError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(ComputeError::PredictionFailed(format!(
            "model panicked: {}",
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn validate_probability(p: f64) -> Result<f64, ComputeError> {
    if p.is_finite() && (0.0..=1.0).contains(&p) {
        Ok(p)
    } else {
        Err(ComputeError::PredictionFailed(format!(
            "probability {} outside [0, 1]",
            p
        )))
    }
}
