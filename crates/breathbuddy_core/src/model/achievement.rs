//! Achievement rule catalog model.
//!
//! # Responsibility
//! - Define rule definitions as a closed sum type over rule families.
//! - Convert the string-tagged catalog wire shape (`CatalogEntry`) into
//!   typed definitions and back.
//! - Provide the built-in catalog loaded once per process.
//!
//! # Invariants
//! - Catalog order is declaration order and never changes after load.
//! - Every definition has `target > 0`; entries violating this are dropped
//!   at load time.
//! - Unrecognized family/condition pairs survive as `RuleKind::Unsupported`
//!   and can never be unlocked.
//! - Identifier uniqueness is a curation concern and is not checked here.

use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Display tier. Ordered, but has no effect on evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Rarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
        }
    }
}

/// Sub-variants of the performance family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PerformanceCondition {
    /// Count of good readings.
    GoodResult,
    /// Longest run of good readings in history order.
    ConsecutiveGood,
}

/// Sub-variants of the time-window family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeCondition {
    /// Readings taken before 08:00 local time.
    Before8am,
    /// Readings taken at or after 22:00 local time.
    After10pm,
    /// Distinct day-parts (morning/afternoon/evening) touched.
    DifferentTimes,
}

/// Sub-variants of the frequency family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrequencyCondition {
    /// Most readings on a single calendar date.
    SameDay,
    /// Distinct Saturday/Sunday dates with a reading.
    Weekend,
}

/// Rule family with its condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Milestone,
    Streak,
    Performance(PerformanceCondition),
    TimeWindow(TimeCondition),
    Frequency(FrequencyCondition),
    /// Entry this build does not understand. Reports progress 0.
    Unsupported {
        family: String,
        condition: Option<String>,
    },
}

const FAMILY_MILESTONE: &str = "milestone";
const FAMILY_STREAK: &str = "streak";
const FAMILY_PERFORMANCE: &str = "performance";
const FAMILY_TIME: &str = "time";
const FAMILY_FREQUENCY: &str = "frequency";

impl RuleKind {
    /// Resolves the wire `type` + `criteria.condition` pair.
    ///
    /// Families without sub-variants ignore the condition.
    pub fn from_wire(family: &str, condition: Option<&str>) -> Self {
        let resolved = match (family, condition) {
            (FAMILY_MILESTONE, _) => Some(Self::Milestone),
            (FAMILY_STREAK, _) => Some(Self::Streak),
            (FAMILY_PERFORMANCE, Some("good_result")) => {
                Some(Self::Performance(PerformanceCondition::GoodResult))
            }
            (FAMILY_PERFORMANCE, Some("consecutive_good")) => {
                Some(Self::Performance(PerformanceCondition::ConsecutiveGood))
            }
            (FAMILY_TIME, Some("before_8am")) => Some(Self::TimeWindow(TimeCondition::Before8am)),
            (FAMILY_TIME, Some("after_10pm")) => Some(Self::TimeWindow(TimeCondition::After10pm)),
            (FAMILY_TIME, Some("different_times")) => {
                Some(Self::TimeWindow(TimeCondition::DifferentTimes))
            }
            (FAMILY_FREQUENCY, Some("same_day")) => {
                Some(Self::Frequency(FrequencyCondition::SameDay))
            }
            (FAMILY_FREQUENCY, Some("weekend")) => {
                Some(Self::Frequency(FrequencyCondition::Weekend))
            }
            _ => None,
        };

        resolved.unwrap_or_else(|| Self::Unsupported {
            family: family.to_string(),
            condition: condition.map(str::to_string),
        })
    }

    /// Wire family tag (`type`).
    pub fn family(&self) -> &str {
        match self {
            Self::Milestone => FAMILY_MILESTONE,
            Self::Streak => FAMILY_STREAK,
            Self::Performance(_) => FAMILY_PERFORMANCE,
            Self::TimeWindow(_) => FAMILY_TIME,
            Self::Frequency(_) => FAMILY_FREQUENCY,
            Self::Unsupported { family, .. } => family.as_str(),
        }
    }

    /// Wire condition tag (`criteria.condition`).
    pub fn condition(&self) -> Option<&str> {
        match self {
            Self::Milestone | Self::Streak => None,
            Self::Performance(PerformanceCondition::GoodResult) => Some("good_result"),
            Self::Performance(PerformanceCondition::ConsecutiveGood) => Some("consecutive_good"),
            Self::TimeWindow(TimeCondition::Before8am) => Some("before_8am"),
            Self::TimeWindow(TimeCondition::After10pm) => Some("after_10pm"),
            Self::TimeWindow(TimeCondition::DifferentTimes) => Some("different_times"),
            Self::Frequency(FrequencyCondition::SameDay) => Some("same_day"),
            Self::Frequency(FrequencyCondition::Weekend) => Some("weekend"),
            Self::Unsupported { condition, .. } => condition.as_deref(),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }
}

/// Static achievement rule definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementDefinition {
    /// Unique catalog identifier, also the persistence key in the ledger.
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub rarity: Rarity,
    pub kind: RuleKind,
    /// Progress value at which the rule unlocks. Always > 0.
    pub target: u32,
}

/// Criteria block of the wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogCriteria {
    pub target: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// String-tagged wire shape of a definition.
///
/// Used for catalog JSON and for entries persisted in the notification queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub family: String,
    pub rarity: Rarity,
    pub criteria: CatalogCriteria,
}

impl From<&AchievementDefinition> for CatalogEntry {
    fn from(value: &AchievementDefinition) -> Self {
        Self {
            id: value.id.clone(),
            title: value.title.clone(),
            description: value.description.clone(),
            icon: value.icon.clone(),
            family: value.kind.family().to_string(),
            rarity: value.rarity,
            criteria: CatalogCriteria {
                target: value.target,
                condition: value.kind.condition().map(str::to_string),
            },
        }
    }
}

/// Catalog entry rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntryError {
    ZeroTarget(String),
}

impl Display for CatalogEntryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroTarget(id) => write!(f, "achievement `{id}` has target 0"),
        }
    }
}

impl std::error::Error for CatalogEntryError {}

impl TryFrom<CatalogEntry> for AchievementDefinition {
    type Error = CatalogEntryError;

    fn try_from(value: CatalogEntry) -> Result<Self, Self::Error> {
        if value.criteria.target == 0 {
            return Err(CatalogEntryError::ZeroTarget(value.id));
        }

        Ok(Self {
            kind: RuleKind::from_wire(&value.family, value.criteria.condition.as_deref()),
            id: value.id,
            title: value.title,
            description: value.description,
            icon: value.icon,
            rarity: value.rarity,
            target: value.criteria.target,
        })
    }
}

/// Ordered, immutable rule catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    definitions: Vec<AchievementDefinition>,
}

impl Catalog {
    /// Builds a catalog from already-typed definitions, keeping their order.
    ///
    /// Zero-target definitions are dropped and logged.
    pub fn new(definitions: Vec<AchievementDefinition>) -> Self {
        let definitions = definitions
            .into_iter()
            .filter(|definition| {
                if definition.target == 0 {
                    warn!(
                        "event=catalog_load module=achievement status=skipped error={}",
                        CatalogEntryError::ZeroTarget(definition.id.clone())
                    );
                    return false;
                }
                true
            })
            .collect();
        Self { definitions }
    }

    /// Builds a catalog from wire entries.
    ///
    /// Zero-target entries are dropped; unrecognized families/conditions are
    /// kept as `Unsupported`. Both cases are logged.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut definitions = Vec::new();
        for entry in entries {
            match AchievementDefinition::try_from(entry) {
                Ok(definition) => {
                    if let RuleKind::Unsupported { family, condition } = &definition.kind {
                        warn!(
                            "event=catalog_load module=achievement status=unsupported id={} family={} condition={}",
                            definition.id,
                            family,
                            condition.as_deref().unwrap_or("none")
                        );
                    }
                    definitions.push(definition);
                }
                Err(err) => {
                    warn!("event=catalog_load module=achievement status=skipped error={err}");
                }
            }
        }
        Self { definitions }
    }

    /// Parses a JSON array of wire entries.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AchievementDefinition> {
        self.definitions.iter()
    }

    pub fn get(&self, id: &str) -> Option<&AchievementDefinition> {
        self.definitions.iter().find(|definition| definition.id == id)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn to_entries(&self) -> Vec<CatalogEntry> {
        self.definitions.iter().map(CatalogEntry::from).collect()
    }
}

static DEFAULT_CATALOG: Lazy<Catalog> = Lazy::new(|| Catalog::new(builtin_definitions()));

/// Returns the built-in catalog shipped with the app.
pub fn default_catalog() -> &'static Catalog {
    &DEFAULT_CATALOG
}

fn definition(
    id: &str,
    title: &str,
    description: &str,
    icon: &str,
    rarity: Rarity,
    kind: RuleKind,
    target: u32,
) -> AchievementDefinition {
    AchievementDefinition {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        rarity,
        kind,
        target,
    }
}

#[rustfmt::skip]
fn builtin_definitions() -> Vec<AchievementDefinition> {
    use FrequencyCondition::{SameDay, Weekend};
    use PerformanceCondition::{ConsecutiveGood, GoodResult};
    use Rarity::{Bronze, Gold, Platinum, Silver};
    use TimeCondition::{After10pm, Before8am, DifferentTimes};

    vec![
        // milestones
        definition("first_test", "First Breath", "Complete your first test", "🌬️", Bronze, RuleKind::Milestone, 1),
        definition("tests_10", "Regular", "Complete 10 tests", "🔟", Bronze, RuleKind::Milestone, 10),
        definition("tests_50", "Dedicated", "Complete 50 tests", "🎯", Silver, RuleKind::Milestone, 50),
        definition("tests_100", "Centurion", "Complete 100 tests", "💯", Gold, RuleKind::Milestone, 100),
        // streaks
        definition("streak_3", "On a Roll", "Test 3 days in a row", "🔥", Bronze, RuleKind::Streak, 3),
        definition("streak_7", "Week Warrior", "Test 7 days in a row", "📅", Silver, RuleKind::Streak, 7),
        definition("streak_30", "Monthly Master", "Test 30 days in a row", "👑", Platinum, RuleKind::Streak, 30),
        // performance
        definition("clean_breath", "Clean Breath", "Get a good result", "✅", Bronze, RuleKind::Performance(GoodResult), 1),
        definition("clean_10", "Fresh Air", "Get 10 good results", "🍃", Silver, RuleKind::Performance(GoodResult), 10),
        definition("good_streak_3", "Hat Trick", "Get 3 good results in a row", "🎩", Silver, RuleKind::Performance(ConsecutiveGood), 3),
        definition("good_streak_10", "Flawless", "Get 10 good results in a row", "💎", Gold, RuleKind::Performance(ConsecutiveGood), 10),
        // time of day
        definition("early_bird", "Early Bird", "Test before 8 AM", "🐦", Bronze, RuleKind::TimeWindow(Before8am), 1),
        definition("night_owl", "Night Owl", "Test after 10 PM", "🦉", Bronze, RuleKind::TimeWindow(After10pm), 1),
        definition("around_the_clock", "Around the Clock", "Test in the morning, afternoon and evening", "🕒", Silver, RuleKind::TimeWindow(DifferentTimes), 3),
        // frequency
        definition("triple_check", "Triple Check", "Complete 3 tests in one day", "🔁", Bronze, RuleKind::Frequency(SameDay), 3),
        definition("weekend_warrior", "Weekend Warrior", "Test on 4 different weekend days", "🎮", Silver, RuleKind::Frequency(Weekend), 4),
    ]
}
