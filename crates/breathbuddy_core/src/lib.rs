//! Core domain logic for BreathBuddy.
//! This crate is the single source of truth for measurement and achievement
//! invariants.

pub mod db;
pub mod engine;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use engine::progress::{
    evaluate_progress, evaluate_records, EvaluationContext, ProgressSnapshot, RuleProgress,
};
pub use engine::unlock::{plan_unlocks, UnlockPlan};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::achievement::{
    default_catalog, AchievementDefinition, Catalog, CatalogEntry, FrequencyCondition,
    PerformanceCondition, Rarity, RuleKind, TimeCondition,
};
pub use model::ledger::{UnlockLedger, LEDGER_KEY, NOTIFICATION_QUEUE_KEY};
pub use model::measurement::{
    MalformedRecord, MeasurementId, MeasurementRecord, MeasurementStatus, RawMeasurement,
    ReadingComparison,
};
pub use repo::kv_store::{KeyValueStore, MemoryKvStore, SqliteKvStore, StoreError, StoreResult};
pub use repo::measurement_repo::{
    MeasurementRepository, RepoError, RepoResult, SqliteMeasurementRepository,
};
pub use service::achievement_service::{
    AchievementService, AchievementServiceError, Completion, UnlockOutcome,
};
pub use service::measurement_service::{
    MeasurementReceipt, MeasurementService, MeasurementServiceError,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
