//! Priority queue of pending analyses
//!
//! Entries are kept sorted by (priority rank, timestamp). There is at most one
//! entry per session: inserting replaces any earlier entry for the same id.

use crate::types::{ComputedMetrics, Session};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Analysis priority; declaration order is dequeue order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

/// A queued request to classify one session
#[derive(Debug, Clone)]
pub struct ScheduledAnalysis {
    /// Identifies this particular scheduling of the session
    pub entry_id: Uuid,
    pub session_id: String,
    pub session: Session,
    pub metrics: ComputedMetrics,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl ScheduledAnalysis {
    pub fn new(
        session: Session,
        metrics: ComputedMetrics,
        priority: Priority,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            session_id: session.id.clone(),
            session,
            metrics,
            priority,
            timestamp,
            retry_count: 0,
        }
    }

    fn sort_key(&self) -> (Priority, DateTime<Utc>) {
        (self.priority, self.timestamp)
    }
}

/// Entry counts per priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityCounts {
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

#[derive(Debug, Default)]
pub struct AnalysisQueue {
    entries: Vec<ScheduledAnalysis>,
}

impl AnalysisQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any queued entry for the same session.
    ///
    /// Returns the replaced entry, if any.
    pub fn insert(&mut self, entry: ScheduledAnalysis) -> Option<ScheduledAnalysis> {
        let replaced = self.remove(&entry.session_id);
        self.entries.push(entry);
        // Stable sort keeps insertion order among equal keys
        self.entries.sort_by_key(ScheduledAnalysis::sort_key);
        replaced
    }

    pub fn remove(&mut self, session_id: &str) -> Option<ScheduledAnalysis> {
        let index = self.entries.iter().position(|e| e.session_id == session_id)?;
        Some(self.entries.remove(index))
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.iter().any(|e| e.session_id == session_id)
    }

    /// Remove and return up to `size` entries from the front
    pub fn take_batch(&mut self, size: usize) -> Vec<ScheduledAnalysis> {
        let count = size.min(self.entries.len());
        self.entries.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn counts(&self) -> PriorityCounts {
        self.entries
            .iter()
            .fold(PriorityCounts::default(), |mut counts, entry| {
                match entry.priority {
                    Priority::High => counts.high += 1,
                    Priority::Normal => counts.normal += 1,
                    Priority::Low => counts.low += 1,
                }
                counts
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledAnalysis> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entry(id: &str, priority: Priority, second: i64) -> ScheduledAnalysis {
        let base = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        ScheduledAnalysis::new(
            Session::start(id, base, 0),
            ComputedMetrics::default(),
            priority,
            base + Duration::seconds(second),
        )
    }

    fn order(queue: &AnalysisQueue) -> Vec<String> {
        queue.iter().map(|e| e.session_id.clone()).collect()
    }

    #[test]
    fn test_priority_then_timestamp_order() {
        let mut queue = AnalysisQueue::new();
        queue.insert(entry("low", Priority::Low, 0));
        queue.insert(entry("high", Priority::High, 1));
        queue.insert(entry("normal", Priority::Normal, 2));
        queue.insert(entry("high-later", Priority::High, 3));
        queue.insert(entry("high-earlier", Priority::High, -5));

        assert_eq!(
            order(&queue),
            vec!["high-earlier", "high", "high-later", "normal", "low"]
        );
    }

    #[test]
    fn test_insert_replaces_same_session() {
        let mut queue = AnalysisQueue::new();
        queue.insert(entry("a", Priority::Low, 0));
        queue.insert(entry("b", Priority::Normal, 1));
        let replaced = queue.insert(entry("a", Priority::High, 2));

        assert_eq!(replaced.map(|e| e.priority), Some(Priority::Low));
        assert_eq!(queue.len(), 2);
        assert_eq!(order(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_take_batch() {
        let mut queue = AnalysisQueue::new();
        for i in 0..7 {
            queue.insert(entry(&format!("s{i}"), Priority::Normal, i));
        }
        let batch = queue.take_batch(5);
        assert_eq!(batch.len(), 5);
        assert_eq!(batch[0].session_id, "s0");
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.take_batch(5).len(), 2);
        assert!(queue.take_batch(5).is_empty());
    }

    #[test]
    fn test_counts() {
        let mut queue = AnalysisQueue::new();
        queue.insert(entry("a", Priority::High, 0));
        queue.insert(entry("b", Priority::Low, 0));
        queue.insert(entry("c", Priority::Low, 0));
        assert_eq!(
            queue.counts(),
            PriorityCounts {
                high: 1,
                normal: 0,
                low: 2
            }
        );

        queue.remove("b");
        assert!(!queue.contains("b"));
        assert_eq!(queue.counts().low, 1);
    }
}
