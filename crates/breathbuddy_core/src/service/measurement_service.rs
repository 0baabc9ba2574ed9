//! Measurement use-case service.
//!
//! # Responsibility
//! - Handle `MeasurementReceived` events: validate, append to history, then
//!   run the unlock coordinator over the updated history.
//! - Own the clear-all-data flow across history and achievement state.
//!
//! # Invariants
//! - Malformed events are rejected before anything is written.
//! - Achievement evaluation always sees the full persisted history in
//!   insertion order, including the event just appended.

use crate::engine::progress::{EvaluationContext, ProgressSnapshot};
use crate::model::measurement::{
    MalformedRecord, MeasurementId, MeasurementRecord, MeasurementStatus, RawMeasurement,
    ReadingComparison,
};
use crate::repo::kv_store::KeyValueStore;
use crate::repo::measurement_repo::{MeasurementRepository, RepoError};
use crate::service::achievement_service::{
    AchievementService, AchievementServiceError, UnlockOutcome,
};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for measurement use-cases.
#[derive(Debug)]
pub enum MeasurementServiceError {
    /// Payload is not valid JSON for the device wire shape.
    Decode(String),
    /// Payload decoded but failed validation.
    Malformed(MalformedRecord),
    Repo(RepoError),
    /// Measurement `measurement_id` was stored, but unlocking failed.
    Achievements {
        measurement_id: Option<MeasurementId>,
        source: AchievementServiceError,
    },
}

impl Display for MeasurementServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decode(message) => write!(f, "invalid measurement payload: {message}"),
            Self::Malformed(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Achievements { source, .. } => write!(f, "achievement update failed: {source}"),
        }
    }
}

impl Error for MeasurementServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(_) => None,
            Self::Malformed(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::Achievements { source, .. } => Some(source),
        }
    }
}

impl From<RepoError> for MeasurementServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<MalformedRecord> for MeasurementServiceError {
    fn from(value: MalformedRecord) -> Self {
        Self::Malformed(value)
    }
}

impl From<AchievementServiceError> for MeasurementServiceError {
    fn from(value: AchievementServiceError) -> Self {
        Self::Achievements {
            measurement_id: None,
            source: value,
        }
    }
}

/// What the results screen needs after one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementReceipt {
    pub id: MeasurementId,
    pub record: MeasurementRecord,
    pub status: MeasurementStatus,
    pub comparison: ReadingComparison,
    pub achievements: UnlockOutcome,
}

/// Facade over the measurement log and the achievement coordinator.
pub struct MeasurementService<'c, R: MeasurementRepository, S: KeyValueStore> {
    repo: R,
    achievements: AchievementService<'c, S>,
}

impl<'c, R: MeasurementRepository, S: KeyValueStore> MeasurementService<'c, R, S> {
    pub fn new(repo: R, achievements: AchievementService<'c, S>) -> Self {
        Self { repo, achievements }
    }

    pub fn achievements(&self) -> &AchievementService<'c, S> {
        &self.achievements
    }

    pub fn achievements_mut(&mut self) -> &mut AchievementService<'c, S> {
        &mut self.achievements
    }

    /// Handles a device payload in its JSON wire form.
    pub fn receive_json(
        &mut self,
        payload: &str,
        ctx: &EvaluationContext,
    ) -> Result<MeasurementReceipt, MeasurementServiceError> {
        let raw: RawMeasurement = serde_json::from_str(payload).map_err(|err| {
            warn!("event=measurement_receive module=service status=rejected reason=decode error={err}");
            MeasurementServiceError::Decode(err.to_string())
        })?;
        self.receive(&raw, ctx)
    }

    /// Handles one completed measurement.
    ///
    /// # Errors
    /// - `Malformed` when validation fails; nothing is written.
    /// - `Achievements` when the measurement was stored but the unlock commit
    ///   failed. The ledger is unchanged and the next evaluation retries.
    pub fn receive(
        &mut self,
        raw: &RawMeasurement,
        ctx: &EvaluationContext,
    ) -> Result<MeasurementReceipt, MeasurementServiceError> {
        let record = MeasurementRecord::try_from_raw_in(raw, ctx.offset()).map_err(|err| {
            warn!("event=measurement_receive module=service status=rejected reason=malformed error={err}");
            err
        })?;

        let previous = self.repo.latest()?;
        let id = self.repo.append(&record)?;
        let history = self.repo.list_history()?;

        let achievements = self
            .achievements
            .evaluate_and_unlock(&history, ctx)
            .map_err(|source| MeasurementServiceError::Achievements {
                measurement_id: Some(id),
                source,
            })?;

        let status = record.status();
        info!(
            "event=measurement_receive module=service status=ok id={} result={} history_len={} unlocked={}",
            id,
            status.label(),
            history.len(),
            achievements.newly_unlocked.len()
        );

        Ok(MeasurementReceipt {
            id,
            comparison: record.compare_with(previous.as_ref()),
            status,
            record,
            achievements,
        })
    }

    /// Appends externally sourced history entries as-is, then re-evaluates.
    ///
    /// # Errors
    /// A storage failure on any entry rolls back the whole batch and skips
    /// evaluation.
    pub fn import_history(
        &mut self,
        entries: &[RawMeasurement],
        ctx: &EvaluationContext,
    ) -> Result<UnlockOutcome, MeasurementServiceError> {
        self.repo.import_many(entries)?;
        let history = self.repo.list_history()?;
        info!(
            "event=history_import module=service status=ok imported={} history_len={}",
            entries.len(),
            history.len()
        );
        Ok(self.achievements.evaluate_and_unlock(&history, ctx)?)
    }

    pub fn history(&self) -> Result<Vec<RawMeasurement>, MeasurementServiceError> {
        Ok(self.repo.list_history()?)
    }

    /// Display-only progress for the current history.
    pub fn progress(
        &self,
        ctx: &EvaluationContext,
    ) -> Result<ProgressSnapshot, MeasurementServiceError> {
        let history = self.repo.list_history()?;
        Ok(self.achievements.progress_only(&history, ctx)?)
    }

    /// Deletes history and resets achievement state to empty defaults.
    pub fn clear_all_data(&mut self) -> Result<(), MeasurementServiceError> {
        let removed = self.repo.clear()?;
        self.achievements.reset()?;
        info!("event=data_clear module=service status=ok removed_measurements={removed}");
        Ok(())
    }
}
