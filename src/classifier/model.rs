//! Prediction model seam
//!
//! The classifier treats the model as an opaque function from a normalized
//! feature vector to a doomscroll probability. [`HeuristicModel`] is the
//! built-in deterministic stand-in.

use crate::classifier::features::FEATURE_COUNT;
use crate::error::ComputeError;

/// A model that scores normalized feature vectors
pub trait PredictionModel: Send + Sync {
    /// Probability in `[0, 1]` that the session is compulsive usage
    fn predict(&self, features: &[f64]) -> Result<f64, ComputeError>;

    /// Score several vectors; any failure fails the whole batch
    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ComputeError> {
        rows.iter().map(|row| self.predict(row)).collect()
    }

    /// Identifier recorded on every result this model produces
    fn version(&self) -> &str;
}

/// Weights in [`SessionFeatures::to_vector`](crate::classifier::SessionFeatures::to_vector) order
const HEURISTIC_WEIGHTS: [f64; FEATURE_COUNT] = [
    1.5,  // session length
    -3.0, // attention span
    2.5,  // dopamine spike
    0.5,  // replays
    -0.5, // reward variability
    2.0,  // binge bursts
    -0.5, // engagement half-life
    0.0,  // time of day
    -0.5, // fatigue slope
    2.0,  // scroll momentum
    1.0,  // cognitive load
    0.3,  // habit strength
    0.0,  // novelty bias
    1.0,  // circadian drift
];
const HEURISTIC_BIAS: f64 = -2.0;

pub const HEURISTIC_MODEL_VERSION: &str = "heuristic-v1";

/// Fixed-weight logistic model
#[derive(Debug, Clone, Default)]
pub struct HeuristicModel;

impl PredictionModel for HeuristicModel {
    fn predict(&self, features: &[f64]) -> Result<f64, ComputeError> {
        if features.len() != FEATURE_COUNT {
            return Err(ComputeError::PredictionFailed(format!(
                "expected {} features, got {}",
                FEATURE_COUNT,
                features.len()
            )));
        }

        let z = HEURISTIC_WEIGHTS
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + HEURISTIC_BIAS;
        Ok(1.0 / (1.0 + (-z).exp()))
    }

    fn version(&self) -> &str {
        HEURISTIC_MODEL_VERSION
    }
}
