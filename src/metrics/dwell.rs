//! Dwell-time statistics
//!
//! Every function here is total: degenerate input or a non-finite intermediate
//! resolves to 0 rather than propagating NaN into the metrics snapshot.

use crate::types::{Interaction, InteractionAction};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// A completed viewing extracted from a leave event
#[derive(Debug, Clone, PartialEq)]
pub struct DwellSample {
    pub video_id: String,
    /// Dwell time in seconds
    pub seconds: f64,
    pub timestamp: DateTime<Utc>,
}

/// Collect dwell samples from leave events in interaction order.
///
/// Leaves without a finite, non-negative dwell time are skipped.
pub fn dwell_samples(interactions: &[Interaction]) -> Vec<DwellSample> {
    interactions
        .iter()
        .filter(|i| i.action == InteractionAction::Leave)
        .filter_map(|i| {
            i.metadata.valid_dwell_ms().map(|ms| DwellSample {
                video_id: i.video_id.clone(),
                seconds: ms / 1000.0,
                timestamp: i.timestamp,
            })
        })
        .collect()
}

pub fn count_action(interactions: &[Interaction], action: InteractionAction) -> usize {
    interactions.iter().filter(|i| i.action == action).count()
}

/// Replace a non-finite or negative value with 0
pub(crate) fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        0.0
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    avg.is_finite().then_some(avg)
}

/// Enter events per second of average dwell time
///
/// Formula: `enter_count / mean(dwell_seconds)`
pub fn dopamine_spike_index(enter_count: usize, dwell_seconds: &[f64]) -> f64 {
    let Some(avg_dwell) = mean(dwell_seconds) else {
        return 0.0;
    };
    if enter_count == 0 || avg_dwell <= 0.0 {
        return 0.0;
    }
    finite_or_zero(enter_count as f64 / avg_dwell)
}

/// Exponentially weighted moving average of dwell times, seeded with the first sample
///
/// Formula: `ewma = alpha * x + (1 - alpha) * ewma`
pub fn attention_span(dwell_seconds: &[f64], alpha: f64) -> f64 {
    let Some((&first, rest)) = dwell_seconds.split_first() else {
        return 0.0;
    };
    if !alpha.is_finite() || !first.is_finite() {
        return 0.0;
    }

    let mut ewma = first;
    for &x in rest {
        ewma = alpha * x + (1.0 - alpha) * ewma;
        if !ewma.is_finite() {
            return 0.0;
        }
    }
    finite_or_zero(ewma)
}

/// Population standard deviation of dwell times; 0 with fewer than 2 samples
pub fn reward_variability(dwell_seconds: &[f64]) -> f64 {
    if dwell_seconds.len() < 2 {
        return 0.0;
    }
    let Some(avg) = mean(dwell_seconds) else {
        return 0.0;
    };
    let variance = dwell_seconds
        .iter()
        .map(|x| (x - avg).powi(2))
        .sum::<f64>()
        / dwell_seconds.len() as f64;
    finite_or_zero(variance.sqrt())
}

/// Fraction of dwell times below the quick-skip threshold (0-1)
pub fn scroll_momentum(dwell_seconds: &[f64], quick_skip_threshold_sec: f64) -> f64 {
    if dwell_seconds.is_empty() {
        return 0.0;
    }
    let quick = dwell_seconds
        .iter()
        .filter(|&&d| d < quick_skip_threshold_sec)
        .count();
    (quick as f64 / dwell_seconds.len() as f64).clamp(0.0, 1.0)
}

/// Regularity of dwell times: `max(0, 1 - stddev / mean)`
///
/// Requires at least 3 samples and a positive mean.
pub fn habit_strength(dwell_seconds: &[f64]) -> f64 {
    if dwell_seconds.len() < 3 {
        return 0.0;
    }
    let Some(avg) = mean(dwell_seconds) else {
        return 0.0;
    };
    if avg <= 0.0 {
        return 0.0;
    }
    let cv = reward_variability(dwell_seconds) / avg;
    finite_or_zero(1.0 - cv).min(1.0)
}

/// Share of interactions that are scrolls or glances (0-1)
///
/// Formula: `(scroll_count + leaves_under_glance_threshold) / total_interactions`
pub fn cognitive_load(
    interactions: &[Interaction],
    dwell_seconds: &[f64],
    glance_threshold_sec: f64,
) -> f64 {
    if interactions.is_empty() {
        return 0.0;
    }
    let scrolls = count_action(interactions, InteractionAction::Scroll);
    let glances = dwell_seconds
        .iter()
        .filter(|&&d| d < glance_threshold_sec)
        .count();
    ((scrolls + glances) as f64 / interactions.len() as f64).clamp(0.0, 1.0)
}

/// Distinct videos entered per enter event (0-1)
pub fn novelty_bias(interactions: &[Interaction]) -> f64 {
    let entered: Vec<&str> = interactions
        .iter()
        .filter(|i| i.action == InteractionAction::Enter)
        .map(|i| i.video_id.as_str())
        .collect();
    if entered.is_empty() {
        return 0.0;
    }
    let distinct: HashSet<&str> = entered.iter().copied().collect();
    (distinct.len() as f64 / entered.len() as f64).clamp(0.0, 1.0)
}
