//! Normalized feature vector fed to the prediction model

use crate::config::ClassifierConfig;
use crate::metrics::fatigue_slope;
use crate::types::{ComputedMetrics, Session};
use chrono::Timelike;
use serde::{Deserialize, Serialize};

/// Number of entries in [`SessionFeatures::to_vector`]
pub const FEATURE_COUNT: usize = 14;

/// Session features scaled into `[0, 1]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFeatures {
    pub session_length: f64,
    pub attention_span: f64,
    pub dopamine_spike_index: f64,
    pub replay_sensitivity: f64,
    pub reward_variability: f64,
    pub binge_bursts: f64,
    pub engagement_half_life: f64,
    /// Local start hour over 24
    pub time_of_day: f64,
    /// Fatigue slope remapped from `[-bound, bound]`
    pub fatigue_slope: f64,
    pub scroll_momentum: f64,
    pub cognitive_load: f64,
    pub habit_strength: f64,
    pub novelty_bias: f64,
    pub circadian_drift: f64,
}

impl SessionFeatures {
    /// Model input in a fixed order
    pub fn to_vector(&self) -> [f64; FEATURE_COUNT] {
        [
            self.session_length,
            self.attention_span,
            self.dopamine_spike_index,
            self.replay_sensitivity,
            self.reward_variability,
            self.binge_bursts,
            self.engagement_half_life,
            self.time_of_day,
            self.fatigue_slope,
            self.scroll_momentum,
            self.cognitive_load,
            self.habit_strength,
            self.novelty_bias,
            self.circadian_drift,
        ]
    }
}

/// Scale `value` against `cap`, clamping to `[0, 1]`. Non-finite input or a
/// non-positive cap yields 0.
fn normalize(value: f64, cap: f64) -> f64 {
    if !value.is_finite() || !cap.is_finite() || cap <= 0.0 {
        return 0.0;
    }
    (value / cap).clamp(0.0, 1.0)
}

/// Map `value` from `[-bound, bound]` onto `[0, 1]`
fn remap_symmetric(value: f64, bound: f64) -> f64 {
    if !value.is_finite() || !bound.is_finite() || bound <= 0.0 {
        return 0.5;
    }
    ((value + bound) / (2.0 * bound)).clamp(0.0, 1.0)
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Extract normalized features from a session and its metrics
pub fn extract_features(
    session: &Session,
    metrics: &ComputedMetrics,
    config: &ClassifierConfig,
) -> SessionFeatures {
    let local_hour = session
        .start_time
        .with_timezone(&session.local_offset())
        .hour();

    SessionFeatures {
        session_length: normalize(metrics.session_length, config.max_session_length_min),
        attention_span: normalize(metrics.attention_span, config.max_attention_span_sec),
        dopamine_spike_index: normalize(metrics.dopamine_spike_index, config.max_dopamine_spike),
        replay_sensitivity: normalize(metrics.replay_sensitivity, config.max_replays),
        reward_variability: normalize(
            metrics.reward_variability,
            config.max_reward_variability_sec,
        ),
        binge_bursts: normalize(metrics.binge_bursts.len() as f64, config.max_binge_bursts),
        engagement_half_life: normalize(
            metrics.engagement_half_life,
            config.max_half_life_videos,
        ),
        time_of_day: normalize(local_hour as f64, 24.0),
        fatigue_slope: remap_symmetric(
            fatigue_slope(&metrics.fatigue_points),
            config.fatigue_slope_bound,
        ),
        scroll_momentum: unit(metrics.scroll_momentum),
        cognitive_load: unit(metrics.cognitive_load),
        habit_strength: unit(metrics.habit_strength),
        novelty_bias: unit(metrics.novelty_bias),
        circadian_drift: if metrics.circadian_drift { 1.0 } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BingeBurst, FatiguePoint};
    use chrono::{TimeZone, Utc};

    fn config() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    fn session_starting(hour: u32) -> Session {
        Session::start("s", Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap(), 0)
    }

    #[test]
    fn test_values_beyond_caps_are_clamped() {
        let metrics = ComputedMetrics {
            session_length: 500.0,
            attention_span: 250.0,
            dopamine_spike_index: 12.0,
            replay_sensitivity: 40.0,
            reward_variability: 80.0,
            engagement_half_life: 75.0,
            ..ComputedMetrics::default()
        };
        let features = extract_features(&session_starting(12), &metrics, &config());

        assert_eq!(features.session_length, 1.0);
        assert_eq!(features.attention_span, 1.0);
        assert_eq!(features.dopamine_spike_index, 1.0);
        assert_eq!(features.replay_sensitivity, 1.0);
        assert_eq!(features.reward_variability, 1.0);
        assert_eq!(features.engagement_half_life, 1.0);
        assert_eq!(features.time_of_day, 0.5);
    }

    #[test]
    fn test_scaling_against_caps() {
        let now = Utc::now();
        let metrics = ComputedMetrics {
            session_length: 50.0,
            attention_span: 25.0,
            dopamine_spike_index: 2.5,
            replay_sensitivity: 5.0,
            reward_variability: 10.0,
            binge_bursts: (0..3)
                .map(|i| BingeBurst {
                    start_index: i * 10,
                    end_index: i * 10 + 4,
                    length: 5,
                    average_dwell_time: 1.0,
                    timestamp: now,
                })
                .collect(),
            circadian_drift: true,
            ..ComputedMetrics::default()
        };
        let features = extract_features(&session_starting(6), &metrics, &config());

        assert_eq!(features.session_length, 0.25);
        assert_eq!(features.attention_span, 0.25);
        assert_eq!(features.dopamine_spike_index, 0.25);
        assert_eq!(features.replay_sensitivity, 0.25);
        assert_eq!(features.reward_variability, 0.25);
        assert!((features.binge_bursts - 0.3).abs() < 1e-9);
        assert_eq!(features.time_of_day, 0.25);
        assert_eq!(features.circadian_drift, 1.0);
    }

    #[test]
    fn test_fatigue_slope_remap() {
        let now = Utc::now();
        let declining: Vec<FatiguePoint> = [10.0, 9.0, 8.0]
            .iter()
            .enumerate()
            .map(|(i, &d)| FatiguePoint {
                video_order: i as u32,
                dwell_time: d,
                timestamp: now,
            })
            .collect();
        let metrics = ComputedMetrics {
            fatigue_points: declining,
            ..ComputedMetrics::default()
        };
        let features = extract_features(&session_starting(12), &metrics, &config());
        // slope -1 maps to 0.25
        assert!((features.fatigue_slope - 0.25).abs() < 1e-9);

        let flat = extract_features(&session_starting(12), &ComputedMetrics::default(), &config());
        assert_eq!(flat.fatigue_slope, 0.5);
    }

    #[test]
    fn test_non_finite_metrics_normalize_to_zero() {
        let metrics = ComputedMetrics {
            attention_span: f64::NAN,
            dopamine_spike_index: f64::INFINITY,
            scroll_momentum: f64::NAN,
            ..ComputedMetrics::default()
        };
        let features = extract_features(&session_starting(12), &metrics, &config());
        assert_eq!(features.attention_span, 0.0);
        assert_eq!(features.dopamine_spike_index, 0.0);
        assert_eq!(features.scroll_momentum, 0.0);
        assert!(features.to_vector().iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
