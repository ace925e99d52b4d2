//! Session metrics computation
//!
//! Turns a session's interaction log into a [`ComputedMetrics`] snapshot:
//! dwell statistics, sequence metrics (fatigue, binge bursts, half-life),
//! late-night detection and the rule-based archetype and health labels.
//!
//! Pipeline: Session → dwell samples → numeric metrics → labels → ComputedMetrics

pub mod bursts;
pub mod circadian;
pub mod dwell;
pub mod labels;

pub use bursts::fatigue_slope;

use crate::config::MetricsConfig;
use crate::types::{ComputedMetrics, InteractionAction, Session};
use chrono::{DateTime, Utc};
use dwell::finite_or_zero;
use labels::LabelInputs;
use log::debug;

/// Computes behavioral metrics from sessions
#[derive(Debug, Clone, Default)]
pub struct MetricsEngine {
    config: MetricsConfig,
}

impl MetricsEngine {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Compute the metrics snapshot for a session.
    ///
    /// Never fails: a session without interactions yields
    /// [`ComputedMetrics::default`] with an unknown classification.
    pub fn compute_metrics(&self, session: &Session) -> ComputedMetrics {
        let interactions = &session.interactions;
        if interactions.is_empty() {
            debug!("session {} has no interactions, returning default metrics", session.id);
            return ComputedMetrics::default();
        }

        let samples = dwell::dwell_samples(interactions);
        let dwell_seconds: Vec<f64> = samples.iter().map(|s| s.seconds).collect();
        let enter_count = dwell::count_action(interactions, InteractionAction::Enter);

        let dopamine_spike_index = dwell::dopamine_spike_index(enter_count, &dwell_seconds);
        let attention_span = dwell::attention_span(&dwell_seconds, self.config.attention_alpha);
        let replay_sensitivity =
            dwell::count_action(interactions, InteractionAction::Replay) as f64;
        let session_length = session_length_minutes(session.start_time, session.effective_end());
        let fatigue_points = bursts::fatigue_points(interactions);
        let circadian_drift = circadian::circadian_drift(
            session.start_time,
            session.effective_end(),
            session.local_offset(),
            self.config.night_start_hour,
            self.config.night_end_hour,
        );
        let scroll_momentum =
            dwell::scroll_momentum(&dwell_seconds, self.config.quick_skip_threshold_sec);
        let reward_variability = dwell::reward_variability(&dwell_seconds);
        let binge_bursts = bursts::binge_bursts(
            &samples,
            self.config.binge_dwell_threshold_sec,
            self.config.min_binge_length,
        );
        let engagement_half_life = bursts::engagement_half_life(&fatigue_points);
        let cognitive_load =
            dwell::cognitive_load(interactions, &dwell_seconds, self.config.glance_threshold_sec);
        let habit_strength = dwell::habit_strength(&dwell_seconds);
        let novelty_bias = dwell::novelty_bias(interactions);

        let mut metrics = ComputedMetrics {
            dopamine_spike_index,
            attention_span,
            replay_sensitivity,
            session_length,
            fatigue_points,
            circadian_drift,
            scroll_momentum,
            reward_variability,
            binge_bursts,
            engagement_half_life,
            cognitive_load,
            habit_strength,
            novelty_bias,
            timestamp: Utc::now(),
            ..ComputedMetrics::default()
        };
        self.apply_labels(&mut metrics);

        debug!(
            "session {}: {} interactions, {} dwell samples, archetype {:?}, health {:?}",
            session.id,
            interactions.len(),
            dwell_seconds.len(),
            metrics.session_archetype,
            metrics.health_classification
        );
        metrics
    }

    /// Recompute metrics for a session that may still be in progress, using the wall clock
    pub fn update_real_time_metrics(&self, session: &Session) -> ComputedMetrics {
        self.update_real_time_metrics_at(session, Utc::now())
    }

    /// Recompute metrics for a possibly active session as of `now`.
    ///
    /// Active sessions take their length from `now` and report reduced
    /// confidence, floored at the configured minimum. A session with no
    /// interactions yet keeps its unknown labels.
    pub fn update_real_time_metrics_at(
        &self,
        session: &Session,
        now: DateTime<Utc>,
    ) -> ComputedMetrics {
        let mut metrics = self.compute_metrics(session);
        if !session.is_active {
            return metrics;
        }

        metrics.session_length = session_length_minutes(session.start_time, now);
        if !session.interactions.is_empty() {
            self.apply_labels(&mut metrics);
        }
        metrics.confidence = (metrics.confidence - self.config.real_time_confidence_penalty)
            .max(self.config.real_time_confidence_floor);
        metrics
    }

    fn apply_labels(&self, metrics: &mut ComputedMetrics) {
        let inputs = LabelInputs {
            attention_span: metrics.attention_span,
            scroll_momentum: metrics.scroll_momentum,
            binge_burst_count: metrics.binge_bursts.len(),
            session_length_min: metrics.session_length,
            dopamine_spike_index: metrics.dopamine_spike_index,
            replay_count: metrics.replay_sensitivity,
            circadian_drift: metrics.circadian_drift,
        };
        metrics.session_archetype =
            labels::session_archetype(&inputs, self.config.min_archetype_session_min);
        let (classification, confidence) = labels::health_classification(&inputs);
        metrics.health_classification = classification;
        metrics.confidence = confidence;
    }
}

/// Minutes between two instants, never negative
fn session_length_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds();
    finite_or_zero(millis as f64 / 60_000.0)
}
