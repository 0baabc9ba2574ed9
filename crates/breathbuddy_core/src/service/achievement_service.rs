//! Achievement use-case service (unlock coordinator).
//!
//! # Responsibility
//! - Evaluate progress for display without side effects.
//! - Commit newly unlocked rules to the ledger and the notification queue.
//! - Expose unlocked/locked views and queue acknowledgment.
//!
//! # Invariants
//! - Ledger and queue for one invocation are written by a single `set_many`
//!   call, ledger first. A failed write leaves the previous state as truth.
//! - A second invocation without new history writes nothing.
//! - Writers take `&mut self`; one service instance per persisted ledger.

use crate::engine::progress::{evaluate_progress, EvaluationContext, ProgressSnapshot};
use crate::engine::unlock::plan_unlocks;
use crate::model::achievement::{default_catalog, AchievementDefinition, Catalog, CatalogEntry};
use crate::model::ledger::{UnlockLedger, LEDGER_KEY, NOTIFICATION_QUEUE_KEY};
use crate::model::measurement::RawMeasurement;
use crate::repo::kv_store::{KeyValueStore, StoreError};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type AchievementResult<T> = Result<T, AchievementServiceError>;

/// Service error for achievement use-cases.
#[derive(Debug)]
pub enum AchievementServiceError {
    /// Underlying store failed; nothing from this call was committed.
    Store(StoreError),
    /// A persisted slot holds a value that cannot be decoded.
    CorruptState { key: &'static str, message: String },
    /// State could not be encoded for persistence.
    Encode(String),
}

impl Display for AchievementServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::CorruptState { key, message } => {
                write!(f, "persisted `{key}` is unreadable: {message}")
            }
            Self::Encode(message) => write!(f, "failed to encode achievement state: {message}"),
        }
    }
}

impl Error for AchievementServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for AchievementServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Result of one coordinator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockOutcome {
    pub snapshot: ProgressSnapshot,
    /// Rules unlocked by this call, in catalog order. Empty when nothing changed.
    pub newly_unlocked: Vec<AchievementDefinition>,
}

/// Unlocked vs. total rule count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub unlocked: usize,
    pub total: usize,
}

impl Completion {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.unlocked as f64 / self.total as f64 * 100.0
    }
}

/// Coordinates progress evaluation with the persisted ledger and queue.
pub struct AchievementService<'c, S: KeyValueStore> {
    store: S,
    catalog: &'c Catalog,
}

impl<S: KeyValueStore> AchievementService<'static, S> {
    /// Creates a service over the built-in catalog.
    pub fn with_default_catalog(store: S) -> Self {
        Self::new(store, default_catalog())
    }
}

impl<'c, S: KeyValueStore> AchievementService<'c, S> {
    pub fn new(store: S, catalog: &'c Catalog) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &'c Catalog {
        self.catalog
    }

    /// Reads the ledger, or empty defaults on first use.
    pub fn ledger(&self) -> AchievementResult<UnlockLedger> {
        Ok(self.read_json(LEDGER_KEY)?.unwrap_or_default())
    }

    /// Computes progress for display. Never writes.
    pub fn progress_only(
        &self,
        history: &[RawMeasurement],
        ctx: &EvaluationContext,
    ) -> AchievementResult<ProgressSnapshot> {
        let ledger = self.ledger()?;
        Ok(evaluate_progress(history, self.catalog, &ledger.unlocked, ctx))
    }

    /// Evaluates `history` and commits any rule that newly reaches its target.
    ///
    /// # Errors
    /// - `Store` when the commit fails; the previous ledger and queue remain
    ///   authoritative and the returned error carries no partial outcome.
    /// - `CorruptState` when the persisted ledger or queue cannot be decoded.
    pub fn evaluate_and_unlock(
        &mut self,
        history: &[RawMeasurement],
        ctx: &EvaluationContext,
    ) -> AchievementResult<UnlockOutcome> {
        let ledger = self.ledger()?;
        let snapshot = evaluate_progress(history, self.catalog, &ledger.unlocked, ctx);

        let Some(plan) = plan_unlocks(&ledger, &snapshot, self.catalog, ctx.now()) else {
            return Ok(UnlockOutcome {
                snapshot,
                newly_unlocked: Vec::new(),
            });
        };

        let mut queue = self.queue_entries()?;
        queue.extend(plan.newly_unlocked.iter().map(CatalogEntry::from));

        let ledger_json = encode(&plan.ledger)?;
        let queue_json = encode(&queue)?;
        if let Err(err) = self.store.set_many(&[
            (LEDGER_KEY, ledger_json),
            (NOTIFICATION_QUEUE_KEY, queue_json),
        ]) {
            error!(
                "event=achievements_unlock module=service status=error pending={} error={}",
                plan.newly_unlocked.len(),
                err
            );
            return Err(err.into());
        }

        info!(
            "event=achievements_unlock module=service status=ok unlocked={} ids={} queue_len={}",
            plan.newly_unlocked.len(),
            plan.newly_unlocked
                .iter()
                .map(|definition| definition.id.as_str())
                .collect::<Vec<_>>()
                .join(","),
            queue.len()
        );

        Ok(UnlockOutcome {
            snapshot,
            newly_unlocked: plan.newly_unlocked,
        })
    }

    /// Rules unlocked but not yet acknowledged, oldest first.
    ///
    /// Entries are resolved against the current catalog; entries whose id
    /// has left the catalog fall back to the persisted copy.
    pub fn pending_notifications(&self) -> AchievementResult<Vec<AchievementDefinition>> {
        Ok(self
            .queue_entries()?
            .into_iter()
            .filter_map(|entry| match self.catalog.get(&entry.id) {
                Some(definition) => Some(definition.clone()),
                None => AchievementDefinition::try_from(entry).ok(),
            })
            .collect())
    }

    pub fn has_pending_notifications(&self) -> AchievementResult<bool> {
        Ok(!self.queue_entries()?.is_empty())
    }

    /// Clears the whole notification queue, returning how many were pending.
    ///
    /// An unreadable queue is overwritten with an empty one and reported as
    /// 0 pending; the ledger is never touched.
    pub fn acknowledge_notifications(&mut self) -> AchievementResult<usize> {
        let pending = match self.queue_entries() {
            Ok(entries) if entries.is_empty() => return Ok(0),
            Ok(entries) => entries.len(),
            Err(AchievementServiceError::CorruptState { .. }) => {
                warn!("event=achievements_ack module=service status=recovered reason=corrupt_queue");
                0
            }
            Err(err) => return Err(err),
        };

        self.store
            .set(NOTIFICATION_QUEUE_KEY, &encode(&Vec::<CatalogEntry>::new())?)?;
        info!("event=achievements_ack module=service status=ok acknowledged={pending}");
        Ok(pending)
    }

    /// Unlocked rules in unlock order.
    pub fn unlocked_achievements(&self) -> AchievementResult<Vec<AchievementDefinition>> {
        let ledger = self.ledger()?;
        Ok(ledger
            .unlocked
            .iter()
            .filter_map(|id| self.catalog.get(id).cloned())
            .collect())
    }

    /// Still-locked rules in catalog order.
    pub fn locked_achievements(&self) -> AchievementResult<Vec<AchievementDefinition>> {
        let ledger = self.ledger()?;
        Ok(self
            .catalog
            .iter()
            .filter(|definition| !ledger.is_unlocked(&definition.id))
            .cloned()
            .collect())
    }

    pub fn achievement_by_id(&self, id: &str) -> Option<&'c AchievementDefinition> {
        self.catalog.get(id)
    }

    pub fn completion(&self) -> AchievementResult<Completion> {
        let ledger = self.ledger()?;
        let unlocked = self
            .catalog
            .iter()
            .filter(|definition| ledger.is_unlocked(&definition.id))
            .count();
        Ok(Completion {
            unlocked,
            total: self.catalog.len(),
        })
    }

    /// Resets ledger and queue to empty defaults (clear-all-data).
    pub fn reset(&mut self) -> AchievementResult<()> {
        self.store.set_many(&[
            (LEDGER_KEY, encode(&UnlockLedger::default())?),
            (NOTIFICATION_QUEUE_KEY, encode(&Vec::<CatalogEntry>::new())?),
        ])?;
        info!("event=achievements_reset module=service status=ok");
        Ok(())
    }

    fn queue_entries(&self) -> AchievementResult<Vec<CatalogEntry>> {
        Ok(self.read_json(NOTIFICATION_QUEUE_KEY)?.unwrap_or_default())
    }

    fn read_json<T: DeserializeOwned>(&self, key: &'static str) -> AchievementResult<Option<T>> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw).map(Some).map_err(|err| {
            error!("event=state_decode module=service status=error key={key} error={err}");
            AchievementServiceError::CorruptState {
                key,
                message: err.to_string(),
            }
        })
    }
}

fn encode<T: Serialize>(value: &T) -> AchievementResult<String> {
    serde_json::to_string(value).map_err(|err| AchievementServiceError::Encode(err.to_string()))
}
