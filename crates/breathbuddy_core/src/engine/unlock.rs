//! Unlock planning.
//!
//! # Responsibility
//! - Decide which rules newly cross their target for one progress snapshot.
//! - Produce the next ledger value without touching any store.
//!
//! # Invariants
//! - The next ledger keeps every previously unlocked id, in order, and
//!   appends new ids in catalog order.
//! - No plan is produced when nothing new unlocks, so callers skip writes.

use crate::engine::progress::ProgressSnapshot;
use crate::model::achievement::{AchievementDefinition, Catalog};
use crate::model::ledger::UnlockLedger;
use chrono::{DateTime, Utc};

/// Ledger to commit and the rules it newly unlocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockPlan {
    pub ledger: UnlockLedger,
    /// Newly unlocked definitions in catalog order.
    pub newly_unlocked: Vec<AchievementDefinition>,
}

/// Plans the ledger update for `snapshot`.
///
/// Returns `None` when no rule that is still locked has reached its target.
pub fn plan_unlocks(
    ledger: &UnlockLedger,
    snapshot: &ProgressSnapshot,
    catalog: &Catalog,
    now: DateTime<Utc>,
) -> Option<UnlockPlan> {
    let newly_unlocked: Vec<AchievementDefinition> = catalog
        .iter()
        .filter(|definition| definition.kind.is_supported())
        .filter(|definition| !ledger.is_unlocked(&definition.id))
        .filter(|definition| {
            snapshot
                .get(&definition.id)
                .is_some_and(|value| value >= definition.target)
        })
        .cloned()
        .collect();

    if newly_unlocked.is_empty() {
        return None;
    }

    let mut next = ledger.clone();
    next.unlocked
        .extend(newly_unlocked.iter().map(|definition| definition.id.clone()));
    next.progress = snapshot.to_map();
    next.last_updated = Some(now);

    Some(UnlockPlan {
        ledger: next,
        newly_unlocked,
    })
}
