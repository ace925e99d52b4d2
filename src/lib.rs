//! Feedpulse - Behavioral analysis engine for short-form video feeds
//!
//! Feedpulse turns the interaction log of a feed viewing session into
//! behavioral metrics and a healthy/doomscroll classification:
//! tracker payload → session → metrics → classification.
//!
//! ## Modules
//!
//! - **Metrics**: Deterministic session metrics (attention span, binge bursts,
//!   engagement half-life, circadian drift, archetype and health labels)
//! - **Classifier**: Model-backed classification with rule-based fallback
//! - **Scheduler**: Prioritized, batched, retried asynchronous classification

pub mod adapter;
pub mod classifier;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use classifier::{ClassificationResult, Classifier, PredictionModel};
pub use config::EngineConfig;
pub use error::ComputeError;
pub use metrics::MetricsEngine;
pub use pipeline::{session_to_report, AnalysisReport, FeedProcessor};
pub use scheduler::{AnalysisHandle, AnalysisOutcome, AnalysisScheduler, Priority, QueueStatus};
pub use storage::{KeyValueStore, MemoryStore, SessionRepository};

/// Feedpulse version embedded in every report
pub const FEEDPULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "feedpulse";
