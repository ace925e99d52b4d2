//! Sequence metrics over the ordered dwell samples: fatigue points, binge
//! bursts and engagement half-life.

use crate::metrics::dwell::{finite_or_zero, DwellSample};
use crate::types::{BingeBurst, FatiguePoint, Interaction, InteractionAction};
use std::collections::HashMap;

/// Build one fatigue point per leave event with a dwell time.
///
/// `video_order` is the 0-based order in which the video was first entered,
/// falling back to the tracker's `videoOrder` for videos never entered.
pub fn fatigue_points(interactions: &[Interaction]) -> Vec<FatiguePoint> {
    let mut first_enter: HashMap<&str, u32> = HashMap::new();
    let mut next_order = 0u32;
    let mut points = Vec::new();

    for interaction in interactions {
        match interaction.action {
            InteractionAction::Enter => {
                first_enter
                    .entry(interaction.video_id.as_str())
                    .or_insert_with(|| {
                        let order = next_order;
                        next_order += 1;
                        order
                    });
            }
            InteractionAction::Leave => {
                let Some(ms) = interaction.metadata.valid_dwell_ms() else {
                    continue;
                };
                let order = first_enter
                    .get(interaction.video_id.as_str())
                    .copied()
                    .or(interaction.metadata.video_order);
                if let Some(video_order) = order {
                    points.push(FatiguePoint {
                        video_order,
                        dwell_time: ms / 1000.0,
                        timestamp: interaction.timestamp,
                    });
                }
            }
            InteractionAction::Replay | InteractionAction::Scroll => {}
        }
    }

    points.sort_by_key(|p| p.video_order);
    points
}

/// Linear-regression slope of dwell time against video order; 0 with fewer than 2 points
pub fn fatigue_slope(points: &[FatiguePoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.video_order as f64).sum();
    let sum_y: f64 = points.iter().map(|p| p.dwell_time).sum();
    let sum_xy: f64 = points
        .iter()
        .map(|p| p.video_order as f64 * p.dwell_time)
        .sum();
    let sum_xx: f64 = points.iter().map(|p| (p.video_order as f64).powi(2)).sum();

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.0;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denominator;
    if slope.is_finite() {
        slope
    } else {
        0.0
    }
}

/// Find maximal runs of at least `min_length` consecutive dwell times below `threshold_sec`
pub fn binge_bursts(
    samples: &[DwellSample],
    threshold_sec: f64,
    min_length: usize,
) -> Vec<BingeBurst> {
    let min_length = min_length.max(1);
    let mut bursts = Vec::new();
    let mut run_start: Option<usize> = None;

    // Iterate one past the end so a trailing run is closed
    for index in 0..=samples.len() {
        let is_short = samples
            .get(index)
            .map(|s| s.seconds < threshold_sec)
            .unwrap_or(false);

        match (is_short, run_start) {
            (true, None) => run_start = Some(index),
            (false, Some(start)) => {
                let length = index - start;
                if length >= min_length {
                    let run = &samples[start..index];
                    let average = run.iter().map(|s| s.seconds).sum::<f64>() / length as f64;
                    bursts.push(BingeBurst {
                        start_index: start,
                        end_index: index - 1,
                        length,
                        average_dwell_time: finite_or_zero(average),
                        timestamp: run[0].timestamp,
                    });
                }
                run_start = None;
            }
            _ => {}
        }
    }

    bursts
}

/// Video order at which the 3-point moving average of dwell time first falls to
/// half of the initial (first three videos) average or lower.
///
/// Returns the last video order when attention never halves and 0 with fewer
/// than 3 points.
pub fn engagement_half_life(points: &[FatiguePoint]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }

    let initial = points[..3].iter().map(|p| p.dwell_time).sum::<f64>() / 3.0;
    if !initial.is_finite() || initial <= 0.0 {
        return 0.0;
    }
    let half = initial / 2.0;

    for (offset, window) in points.windows(3).enumerate() {
        let moving_average = window.iter().map(|p| p.dwell_time).sum::<f64>() / 3.0;
        if moving_average <= half {
            return points[offset + 2].video_order as f64;
        }
    }

    points
        .last()
        .map(|p| p.video_order as f64)
        .unwrap_or(0.0)
}
