//! Feed interaction data types
//!
//! This module defines the interaction events emitted by the feed tracker, the
//! sessions they accumulate into, and the derived metric snapshots computed
//! from a session.

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the viewer did to a video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionAction {
    Enter,
    Leave,
    Replay,
    Scroll,
}

/// Scroll direction reported by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Optional measurements attached to an interaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionMetadata {
    /// Time spent on the video before leaving, in milliseconds (leave events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dwell_time_ms: Option<f64>,
    /// Scroll speed in pixels per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_speed: Option<f64>,
    /// Position of the video in the feed as seen by the tracker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_direction: Option<ScrollDirection>,
    /// Scroll distance in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_distance: Option<f64>,
}

impl InteractionMetadata {
    /// Metadata for a leave event with the given dwell time
    pub fn with_dwell_ms(dwell_time_ms: f64) -> Self {
        Self {
            dwell_time_ms: Some(dwell_time_ms),
            ..Self::default()
        }
    }

    /// Dwell time in milliseconds if present, finite and non-negative
    pub fn valid_dwell_ms(&self) -> Option<f64> {
        self.dwell_time_ms.filter(|ms| ms.is_finite() && *ms >= 0.0)
    }
}

/// A single recorded interaction. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: String,
    pub video_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: InteractionAction,
    #[serde(default)]
    pub metadata: InteractionMetadata,
}

impl Interaction {
    /// Create an interaction with a fresh identifier and empty metadata
    pub fn new(
        session_id: impl Into<String>,
        video_id: impl Into<String>,
        action: InteractionAction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            video_id: video_id.into(),
            session_id: session_id.into(),
            timestamp,
            action,
            metadata: InteractionMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: InteractionMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A viewing session: an append-only list of interactions plus running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub video_count: u32,
    /// Sum of recorded dwell times in milliseconds
    #[serde(default)]
    pub total_dwell_time: f64,
    #[serde(default)]
    pub interactions: Vec<Interaction>,
    /// Viewer's offset from UTC in minutes, used for local-hour computations
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_metrics: Option<ComputedMetrics>,
}

impl Session {
    /// Start a new, active session with no interactions
    pub fn start(
        id: impl Into<String>,
        start_time: DateTime<Utc>,
        utc_offset_minutes: i32,
    ) -> Self {
        Self {
            id: id.into(),
            start_time,
            end_time: None,
            is_active: true,
            video_count: 0,
            total_dwell_time: 0.0,
            interactions: Vec::new(),
            utc_offset_minutes,
            computed_metrics: None,
        }
    }

    /// Append an interaction and update the running totals.
    ///
    /// Returns `false` (and records nothing) once the session has been finished.
    pub fn record(&mut self, interaction: Interaction) -> bool {
        if !self.is_active {
            return false;
        }

        match interaction.action {
            InteractionAction::Enter => self.video_count += 1,
            InteractionAction::Leave => {
                if let Some(ms) = interaction.metadata.valid_dwell_ms() {
                    self.total_dwell_time += ms;
                }
            }
            InteractionAction::Replay | InteractionAction::Scroll => {}
        }

        self.interactions.push(interaction);
        self.computed_metrics = None;
        true
    }

    /// Finalize the session. Calling this on a finished session keeps the first end time.
    pub fn finish(&mut self, end_time: DateTime<Utc>) {
        if !self.is_active && self.end_time.is_some() {
            return;
        }
        self.end_time = Some(end_time.max(self.start_time));
        self.is_active = false;
    }

    /// End time if finished, else the last interaction, else the start time
    pub fn effective_end(&self) -> DateTime<Utc> {
        self.end_time
            .or_else(|| self.interactions.iter().map(|i| i.timestamp).max())
            .unwrap_or(self.start_time)
    }

    /// The viewer's local offset, falling back to UTC for out-of-range values
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    /// Elapsed time between start and effective end, never negative
    pub fn elapsed(&self) -> Duration {
        let elapsed = self.effective_end() - self.start_time;
        if elapsed < Duration::zero() {
            Duration::zero()
        } else {
            elapsed
        }
    }
}

/// One completed viewing, used to chart dwell-time decay across the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FatiguePoint {
    /// 0-based order in which the video was first entered
    pub video_order: u32,
    /// Dwell time in seconds
    pub dwell_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// A maximal run of very short consecutive dwell times
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BingeBurst {
    /// Index of the first dwell sample in the run
    pub start_index: usize,
    /// Index of the last dwell sample in the run (inclusive)
    pub end_index: usize,
    pub length: usize,
    /// Average dwell time across the run, in seconds
    pub average_dwell_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// Coarse consumption style of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionArchetype {
    Explorer,
    Sampler,
    Doomscroller,
    #[default]
    Unknown,
}

/// Healthy vs. compulsive usage label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthClassification {
    Healthy,
    Doomscroll,
    #[default]
    Unknown,
}

/// Metrics derived from one session snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedMetrics {
    /// Videos entered per second of average dwell
    pub dopamine_spike_index: f64,
    /// EWMA of dwell times, in seconds
    pub attention_span: f64,
    /// Number of replay actions
    pub replay_sensitivity: f64,
    /// Session length in minutes
    pub session_length: f64,
    pub fatigue_points: Vec<FatiguePoint>,
    /// Whether the session touched the late-night window
    pub circadian_drift: bool,
    /// Fraction of dwell times under the quick-skip threshold (0-1)
    pub scroll_momentum: f64,
    /// Population standard deviation of dwell times, in seconds
    pub reward_variability: f64,
    pub binge_bursts: Vec<BingeBurst>,
    /// Video order at which attention halved
    pub engagement_half_life: f64,
    /// Share of interactions that were scrolls or very short views (0-1)
    pub cognitive_load: f64,
    /// Regularity of dwell times (0-1)
    pub habit_strength: f64,
    /// Distinct videos per enter event (0-1)
    pub novelty_bias: f64,
    pub session_archetype: SessionArchetype,
    pub health_classification: HealthClassification,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl Default for ComputedMetrics {
    fn default() -> Self {
        Self {
            dopamine_spike_index: 0.0,
            attention_span: 0.0,
            replay_sensitivity: 0.0,
            session_length: 0.0,
            fatigue_points: Vec::new(),
            circadian_drift: false,
            scroll_momentum: 0.0,
            reward_variability: 0.0,
            binge_bursts: Vec::new(),
            engagement_half_life: 0.0,
            cognitive_load: 0.0,
            habit_strength: 0.0,
            novelty_bias: 0.0,
            session_archetype: SessionArchetype::Unknown,
            health_classification: HealthClassification::Unknown,
            confidence: 0.0,
            timestamp: Utc::now(),
        }
    }
}

impl ComputedMetrics {
    /// Copy of these metrics carrying a classifier's label and confidence
    pub fn with_classification(
        &self,
        classification: HealthClassification,
        confidence: f64,
    ) -> Self {
        Self {
            health_classification: classification,
            confidence: if confidence.is_finite() {
                confidence.clamp(0.0, 1.0)
            } else {
                0.0
            },
            ..self.clone()
        }
    }
}

/// User preferences persisted alongside sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub tracking_enabled: bool,
    /// Schedule high-priority analysis while a session is still active
    pub real_time_analysis: bool,
    /// Local hour at which the late-night window is highlighted to the viewer
    pub night_mode_start_hour: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit_minutes: Option<u32>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            tracking_enabled: true,
            real_time_analysis: true,
            night_mode_start_hour: 23,
            daily_limit_minutes: None,
        }
    }
}
