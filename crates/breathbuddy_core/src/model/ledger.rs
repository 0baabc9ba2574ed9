//! Persisted achievement state.
//!
//! # Responsibility
//! - Define the unlock ledger stored under the `user-achievements` slot.
//!
//! # Invariants
//! - `unlocked` only grows; ids are appended in unlock order and never
//!   repeated. Only a full data reset empties it.
//! - `last_updated` is `None` until the first committed unlock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store key of the unlock ledger.
pub const LEDGER_KEY: &str = "user-achievements";
/// Store key of the pending-notification queue.
pub const NOTIFICATION_QUEUE_KEY: &str = "new-achievements";

/// Which rules are unlocked, plus the progress recorded at the last commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockLedger {
    #[serde(rename = "unlockedAchievements", default)]
    pub unlocked: Vec<String>,
    #[serde(default)]
    pub progress: BTreeMap<String, u32>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

impl UnlockLedger {
    pub fn is_unlocked(&self, id: &str) -> bool {
        self.unlocked.iter().any(|unlocked| unlocked == id)
    }

    pub fn unlocked_count(&self) -> usize {
        self.unlocked.len()
    }
}
