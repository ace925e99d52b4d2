//! Asynchronous analysis scheduler
//!
//! Sessions are queued with a priority and classified in batches by a periodic
//! tick. Each scheduling returns an [`AnalysisHandle`] that resolves exactly
//! once: with the classification, with a terminal failure after the retry
//! budget is spent, or as cancelled when the entry is replaced or cleared.
//!
//! At most one batch runs at a time. The queue lock is released while the
//! analyzer runs, so scheduling never waits on classification.

pub mod queue;
pub mod retry;

pub use queue::{AnalysisQueue, Priority, PriorityCounts, ScheduledAnalysis};
pub use retry::{on_failure, AnalysisState, FailureTransition};

use crate::classifier::{ClassificationResult, Classifier};
use crate::config::SchedulerConfig;
use crate::error::ComputeError;
use crate::types::{ComputedMetrics, HealthClassification, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Classifies a batch of queued entries.
///
/// The result vector is matched to the batch by position. An `Err` element,
/// or a missing element when the vector is short, counts as that entry failing.
#[async_trait]
pub trait SessionAnalyzer: Send + Sync {
    async fn analyze_batch(
        &self,
        batch: &[ScheduledAnalysis],
    ) -> Vec<Result<ClassificationResult, ComputeError>>;
}

#[async_trait]
impl SessionAnalyzer for Classifier {
    async fn analyze_batch(
        &self,
        batch: &[ScheduledAnalysis],
    ) -> Vec<Result<ClassificationResult, ComputeError>> {
        let pairs: Vec<(&Session, &ComputedMetrics)> =
            batch.iter().map(|e| (&e.session, &e.metrics)).collect();
        self.classify_sessions(&pairs).into_iter().map(Ok).collect()
    }
}

/// Final result delivered for one scheduled session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub session_id: String,
    pub classification: HealthClassification,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    /// Metrics with the classification and confidence applied
    pub metrics: ComputedMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
}

impl AnalysisOutcome {
    fn succeeded(entry: &ScheduledAnalysis, result: ClassificationResult) -> Self {
        Self {
            session_id: entry.session_id.clone(),
            classification: result.classification,
            confidence: result.confidence,
            model_version: Some(result.model_version),
            metrics: entry
                .metrics
                .with_classification(result.classification, result.confidence),
            error: None,
            retry_count: entry.retry_count,
        }
    }

    fn exhausted(entry: &ScheduledAnalysis, retry_count: u32, error: String) -> Self {
        Self {
            session_id: entry.session_id.clone(),
            classification: HealthClassification::Unknown,
            confidence: 0.0,
            model_version: None,
            metrics: entry
                .metrics
                .with_classification(HealthClassification::Unknown, 0.0),
            error: Some(error),
            retry_count,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Pending result of one [`AnalysisScheduler::schedule_analysis`] call
#[derive(Debug)]
pub struct AnalysisHandle {
    session_id: String,
    receiver: oneshot::Receiver<AnalysisOutcome>,
}

impl AnalysisHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Wait for the outcome.
    ///
    /// Fails with [`ComputeError::AnalysisCancelled`] when the entry was
    /// rescheduled, cleared, or the scheduler was disposed first.
    pub async fn wait(self) -> Result<AnalysisOutcome, ComputeError> {
        let Self {
            session_id,
            receiver,
        } = self;
        receiver
            .await
            .map_err(|_| ComputeError::AnalysisCancelled(session_id))
    }
}

/// Read-only snapshot of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_length: usize,
    pub is_processing: bool,
    pub high: usize,
    pub normal: usize,
    pub low: usize,
}

fn log_transition(session_id: &str, state: AnalysisState) {
    debug!("analysis of {} -> {:?}", session_id, state);
}

struct Registration {
    entry_id: Uuid,
    sender: oneshot::Sender<AnalysisOutcome>,
}

#[derive(Default)]
struct SchedulerState {
    queue: AnalysisQueue,
    registrations: HashMap<String, Registration>,
}

impl SchedulerState {
    /// The entry still owns its session's registration
    fn is_current(&self, entry: &ScheduledAnalysis) -> bool {
        self.registrations
            .get(&entry.session_id)
            .is_some_and(|r| r.entry_id == entry.entry_id)
    }

    fn deliver(&mut self, session_id: &str, outcome: AnalysisOutcome) {
        if let Some(registration) = self.registrations.remove(session_id) {
            if registration.sender.send(outcome).is_err() {
                debug!("handle for session {} was dropped before delivery", session_id);
            }
        }
    }

    fn on_success(&mut self, entry: ScheduledAnalysis, result: ClassificationResult) {
        if !self.is_current(&entry) {
            debug!("dropping result for superseded analysis of {}", entry.session_id);
            return;
        }
        log_transition(&entry.session_id, AnalysisState::Succeeded);
        let outcome = AnalysisOutcome::succeeded(&entry, result);
        self.deliver(&entry.session_id, outcome);
    }

    fn on_error(
        &mut self,
        mut entry: ScheduledAnalysis,
        error: String,
        config: &SchedulerConfig,
        now: DateTime<Utc>,
    ) {
        if !self.is_current(&entry) {
            debug!("not retrying superseded analysis of {}", entry.session_id);
            return;
        }

        let transition = on_failure(entry.retry_count, config, now);
        log_transition(&entry.session_id, transition.state());
        match transition {
            FailureTransition::Retry {
                retry_count,
                priority,
                timestamp,
            } => {
                warn!(
                    "analysis of {} failed (attempt {}), retrying: {}",
                    entry.session_id, retry_count, error
                );
                entry.retry_count = retry_count;
                entry.priority = priority;
                entry.timestamp = timestamp;
                self.queue.insert(entry);
            }
            FailureTransition::Exhausted { retry_count } => {
                warn!(
                    "analysis of {} abandoned after {} attempts: {}",
                    entry.session_id, retry_count, error
                );
                let outcome = AnalysisOutcome::exhausted(&entry, retry_count, error);
                self.deliver(&entry.session_id, outcome);
            }
        }
    }

    fn clear(&mut self) {
        // Dropping the senders resolves every outstanding handle as cancelled
        self.queue.clear();
        self.registrations.clear();
    }
}

struct Shared {
    state: Mutex<SchedulerState>,
    processing: AtomicBool,
    analyzer: Arc<dyn SessionAnalyzer>,
    config: SchedulerConfig,
}

/// Resets the processing flag when a batch ends, however it ends
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    async fn process_queue(&self) -> usize {
        if self
            .processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("batch already in progress");
            return 0;
        }
        let _guard = ProcessingGuard(&self.processing);

        let batch = {
            let mut state = self.state.lock().await;
            state.queue.take_batch(self.config.batch_size.max(1))
        };
        if batch.is_empty() {
            return 0;
        }

        let size = batch.len();
        debug!("analyzing batch of {} sessions", size);
        for entry in &batch {
            log_transition(&entry.session_id, AnalysisState::InBatch);
        }

        // A panicking analyzer fails this batch instead of the caller
        let batch = Arc::new(batch);
        let joined = {
            let analyzer = Arc::clone(&self.analyzer);
            let batch = Arc::clone(&batch);
            tokio::spawn(async move { analyzer.analyze_batch(&batch).await }).await
        };
        let batch = Arc::try_unwrap(batch).unwrap_or_else(|shared| (*shared).clone());
        let mut results = match joined {
            Ok(results) => results.into_iter(),
            Err(e) => {
                warn!("analyzer task failed on a batch of {}: {}", size, e);
                batch
                    .iter()
                    .map(|entry| {
                        Err(ComputeError::ClassificationFailed {
                            session_id: entry.session_id.clone(),
                            reason: format!("analyzer task failed: {}", e),
                        })
                    })
                    .collect::<Vec<Result<ClassificationResult, ComputeError>>>()
                    .into_iter()
            }
        };

        let now = Utc::now();
        let mut state = self.state.lock().await;
        for entry in batch {
            match results.next() {
                Some(Ok(result)) => state.on_success(entry, result),
                Some(Err(e)) => state.on_error(entry, e.to_string(), &self.config, now),
                None => {
                    let error = ComputeError::ClassificationFailed {
                        session_id: entry.session_id.clone(),
                        reason: "analyzer returned no result".to_string(),
                    };
                    state.on_error(entry, error.to_string(), &self.config, now);
                }
            }
        }
        debug!("batch of {} finished, {} queued", size, state.queue.len());
        size
    }
}

async fn tick_loop(shared: Arc<Shared>, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                shared.process_queue().await;
            }
            _ = cancel_token.cancelled() => {
                debug!("analysis tick loop shutting down");
                break;
            }
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Priority, batching and retry around a [`SessionAnalyzer`]
pub struct AnalysisScheduler {
    shared: Arc<Shared>,
    worker: std::sync::Mutex<Option<Worker>>,
}

impl AnalysisScheduler {
    pub fn new(analyzer: Arc<dyn SessionAnalyzer>, config: SchedulerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::default()),
                processing: AtomicBool::new(false),
                analyzer,
                config,
            }),
            worker: std::sync::Mutex::new(None),
        }
    }

    /// Scheduler backed by an initialized classifier
    pub fn with_classifier(classifier: Classifier, config: SchedulerConfig) -> Self {
        Self::new(Arc::new(classifier), config)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    fn worker(&self) -> std::sync::MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the background tick. Calling it again while running is a no-op.
    pub fn init(&self) -> Result<(), ComputeError> {
        let mut worker = self.worker();
        if worker.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ComputeError::SchedulerUnavailable(e.to_string()))?;
        let cancel_token = CancellationToken::new();
        let handle = runtime.spawn(tick_loop(Arc::clone(&self.shared), cancel_token.clone()));

        info!(
            "analysis scheduler started (tick {:?}, batch {})",
            self.shared.config.tick_interval(),
            self.shared.config.batch_size
        );
        *worker = Some(Worker {
            handle,
            cancel_token,
        });
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker().is_some()
    }

    /// Stop the tick and discard all queued entries and registrations
    pub async fn dispose(&self) {
        let worker = {
            let mut guard = self.worker();
            guard.take()
        };

        if let Some(worker) = worker {
            worker.cancel_token.cancel();
            if let Err(e) = worker.handle.await {
                warn!("analysis tick loop failed to join: {}", e);
            }
            info!("analysis scheduler stopped");
        }

        self.shared.state.lock().await.clear();
    }

    /// Queue a session for classification, replacing any earlier entry for it
    pub async fn schedule_analysis(
        &self,
        session: Session,
        metrics: ComputedMetrics,
        priority: Priority,
    ) -> AnalysisHandle {
        let entry = ScheduledAnalysis::new(session, metrics, priority, Utc::now());
        let session_id = entry.session_id.clone();
        let (sender, receiver) = oneshot::channel();

        let mut state = self.shared.state.lock().await;
        log_transition(&session_id, AnalysisState::Pending);
        state.registrations.insert(
            session_id.clone(),
            Registration {
                entry_id: entry.entry_id,
                sender,
            },
        );
        if state.queue.insert(entry).is_some() {
            debug!("replaced queued analysis of {}", session_id);
        }

        AnalysisHandle {
            session_id,
            receiver,
        }
    }

    /// [`schedule_analysis`](Self::schedule_analysis) at high priority
    pub async fn schedule_real_time_analysis(
        &self,
        session: Session,
        metrics: ComputedMetrics,
    ) -> AnalysisHandle {
        self.schedule_analysis(session, metrics, Priority::High).await
    }

    /// Run one batch now. Returns how many entries were analyzed; 0 when the
    /// queue is empty or another batch is in progress.
    pub async fn process_queue(&self) -> usize {
        self.shared.process_queue().await
    }

    pub async fn get_queue_status(&self) -> QueueStatus {
        let state = self.shared.state.lock().await;
        let counts = state.queue.counts();
        QueueStatus {
            queue_length: state.queue.len(),
            is_processing: self.shared.processing.load(Ordering::Acquire),
            high: counts.high,
            normal: counts.normal,
            low: counts.low,
        }
    }

    pub async fn clear_queue(&self) {
        self.shared.state.lock().await.clear();
    }

    /// Forget a session's queued entry and handle. A batch already running
    /// for it still completes, but its result is dropped.
    pub async fn clear_session_analysis(&self, session_id: &str) -> bool {
        let mut state = self.shared.state.lock().await;
        let queued = state.queue.remove(session_id).is_some();
        let registered = state.registrations.remove(session_id).is_some();
        queued || registered
    }
}

impl Drop for AnalysisScheduler {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            debug!("analysis scheduler dropped while running");
            worker.cancel_token.cancel();
        }
    }
}
