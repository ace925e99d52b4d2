//! Retry and backoff state transitions
//!
//! Independent of how the queue stores entries: given an entry's retry count
//! and the configuration, decide whether it is retried (and how) or exhausted.

use crate::config::SchedulerConfig;
use crate::scheduler::queue::Priority;
use chrono::{DateTime, Utc};

/// Lifecycle of one scheduled analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    Pending,
    InBatch,
    Succeeded,
    Retrying { retry_count: u32 },
    Exhausted { retry_count: u32 },
}

impl AnalysisState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisState::Succeeded | AnalysisState::Exhausted { .. })
    }
}

/// What to do with an entry whose classification failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureTransition {
    /// Requeue with a demoted priority and a later timestamp
    Retry {
        retry_count: u32,
        priority: Priority,
        timestamp: DateTime<Utc>,
    },
    /// Give up and deliver a terminal failure
    Exhausted { retry_count: u32 },
}

impl FailureTransition {
    pub fn state(&self) -> AnalysisState {
        match *self {
            FailureTransition::Retry { retry_count, .. } => {
                AnalysisState::Retrying { retry_count }
            }
            FailureTransition::Exhausted { retry_count } => {
                AnalysisState::Exhausted { retry_count }
            }
        }
    }
}

/// Transition for an entry that failed with `retry_count` earlier failures
pub fn on_failure(
    retry_count: u32,
    config: &SchedulerConfig,
    now: DateTime<Utc>,
) -> FailureTransition {
    let next = retry_count.saturating_add(1);
    if next > config.max_retries {
        return FailureTransition::Exhausted { retry_count: next };
    }

    let backoff = config
        .retry_delay()
        .checked_mul(i32::try_from(next).unwrap_or(i32::MAX))
        .unwrap_or_else(chrono::Duration::zero);
    FailureTransition::Retry {
        retry_count: next,
        priority: Priority::Low,
        timestamp: now.checked_add_signed(backoff).unwrap_or(now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let config = SchedulerConfig::default();
        for (count, delay) in [(0u32, 2i64), (1, 4), (2, 6)] {
            let transition = on_failure(count, &config, now());
            assert_eq!(
                transition,
                FailureTransition::Retry {
                    retry_count: count + 1,
                    priority: Priority::Low,
                    timestamp: now() + Duration::seconds(delay),
                }
            );
        }
    }

    #[test]
    fn test_exhausted_after_max_retries() {
        let config = SchedulerConfig::default();
        let transition = on_failure(3, &config, now());
        assert_eq!(transition, FailureTransition::Exhausted { retry_count: 4 });
        assert!(transition.state().is_terminal());
    }

    #[test]
    fn test_zero_retries_exhausts_immediately() {
        let config = SchedulerConfig {
            max_retries: 0,
            ..SchedulerConfig::default()
        };
        assert!(matches!(
            on_failure(0, &config, now()),
            FailureTransition::Exhausted { retry_count: 1 }
        ));
    }

    #[test]
    fn test_states() {
        assert!(!AnalysisState::Pending.is_terminal());
        assert!(!AnalysisState::InBatch.is_terminal());
        assert!(!AnalysisState::Retrying { retry_count: 1 }.is_terminal());
        assert!(AnalysisState::Succeeded.is_terminal());
    }
}
