//! Rule-based session labels, evaluated after all numeric metrics are known.

use crate::types::{HealthClassification, SessionArchetype};

const EXPLORER_MIN_ATTENTION_SEC: f64 = 15.0;
const DOOMSCROLLER_MAX_ATTENTION_SEC: f64 = 8.0;
const LOW_MOMENTUM: f64 = 0.3;
const HIGH_MOMENTUM: f64 = 0.6;
const MANY_BURSTS: usize = 2;

/// Indicator counts needed for a confident label
const INDICATOR_QUORUM: usize = 3;
const INDICATOR_TOTAL: f64 = 5.0;
const UNDECIDED_CONFIDENCE: f64 = 0.5;

/// Inputs shared by the archetype and health rules
#[derive(Debug, Clone, Copy)]
pub struct LabelInputs {
    pub attention_span: f64,
    pub scroll_momentum: f64,
    pub binge_burst_count: usize,
    pub session_length_min: f64,
    pub dopamine_spike_index: f64,
    pub replay_count: f64,
    pub circadian_drift: bool,
}

/// Classify the consumption style of a session
pub fn session_archetype(inputs: &LabelInputs, min_session_min: f64) -> SessionArchetype {
    let attention = inputs.attention_span;
    let momentum = inputs.scroll_momentum;

    if inputs.session_length_min < min_session_min || attention == 0.0 {
        return SessionArchetype::Unknown;
    }

    let compulsive = momentum >= HIGH_MOMENTUM || inputs.binge_burst_count >= MANY_BURSTS;

    if attention > EXPLORER_MIN_ATTENTION_SEC && momentum < LOW_MOMENTUM {
        return SessionArchetype::Explorer;
    }
    if attention <= DOOMSCROLLER_MAX_ATTENTION_SEC && compulsive {
        return SessionArchetype::Doomscroller;
    }
    if attention > DOOMSCROLLER_MAX_ATTENTION_SEC
        && attention <= EXPLORER_MIN_ATTENTION_SEC
        && (LOW_MOMENTUM..=HIGH_MOMENTUM).contains(&momentum)
    {
        return SessionArchetype::Sampler;
    }

    // Tiebreak for sessions outside the table
    if compulsive {
        SessionArchetype::Doomscroller
    } else if attention > EXPLORER_MIN_ATTENTION_SEC {
        SessionArchetype::Explorer
    } else {
        SessionArchetype::Sampler
    }
}

/// Count healthy and doomscroll indicators
pub fn health_indicators(inputs: &LabelInputs) -> (usize, usize) {
    let healthy = [
        (10.0..=120.0).contains(&inputs.attention_span),
        inputs.dopamine_spike_index < 2.0,
        inputs.replay_count < 5.0,
        inputs.session_length_min < 60.0,
        !inputs.circadian_drift,
    ];
    let doomscroll = [
        inputs.attention_span < 5.0,
        inputs.dopamine_spike_index > 5.0,
        inputs.replay_count > 10.0,
        inputs.session_length_min > 120.0,
        inputs.circadian_drift,
    ];
    (
        healthy.iter().filter(|&&hit| hit).count(),
        doomscroll.iter().filter(|&&hit| hit).count(),
    )
}

/// Preliminary health label with its confidence
pub fn health_classification(inputs: &LabelInputs) -> (HealthClassification, f64) {
    let (healthy, doomscroll) = health_indicators(inputs);

    if healthy >= INDICATOR_QUORUM {
        (HealthClassification::Healthy, healthy as f64 / INDICATOR_TOTAL)
    } else if doomscroll >= INDICATOR_QUORUM {
        (HealthClassification::Doomscroll, doomscroll as f64 / INDICATOR_TOTAL)
    } else {
        (HealthClassification::Unknown, UNDECIDED_CONFIDENCE)
    }
}
