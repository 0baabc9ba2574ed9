//! Progress evaluator.
//!
//! # Responsibility
//! - Compute one progress value per catalog rule from a history snapshot.
//! - Resolve calendar dates and hours against an explicit clock/timezone.
//!
//! # Invariants
//! - Evaluation is pure: no store access, no clock reads.
//! - Every reported value lies in `[0, target]`; unlocked rules report exactly
//!   `target`.
//! - Malformed history entries are excluded from every rule and counted in
//!   `ProgressSnapshot::skipped_records`.
//! - History is read in the order given. Only the streak rule is insensitive
//!   to that order.

use crate::model::achievement::{
    Catalog, FrequencyCondition, PerformanceCondition, RuleKind, TimeCondition,
};
use crate::model::measurement::{MeasurementRecord, RawMeasurement};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Timelike, Utc, Weekday};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};

const EARLY_HOUR_LIMIT: u32 = 8;
const LATE_HOUR_START: u32 = 22;
const AFTERNOON_START_HOUR: u32 = 12;
const EVENING_START_HOUR: u32 = 18;

/// "Now" and the local timezone used to bucket records into days and hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationContext {
    now: DateTime<Utc>,
    offset: FixedOffset,
}

impl EvaluationContext {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self { now, offset }
    }

    /// Context with a UTC local timezone.
    pub fn utc(now: DateTime<Utc>) -> Self {
        Self::new(now, Utc.fix())
    }

    /// Builds a context from FFI-friendly primitives.
    ///
    /// Returns `None` for an out-of-range instant or an offset beyond ±24h.
    pub fn from_epoch_ms(now_epoch_ms: i64, utc_offset_minutes: i32) -> Option<Self> {
        let now = DateTime::<Utc>::from_timestamp_millis(now_epoch_ms)?;
        let offset = FixedOffset::east_opt(utc_offset_minutes.checked_mul(60)?)?;
        Some(Self::new(now, offset))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local calendar date of "now".
    pub fn today(&self) -> NaiveDate {
        self.local_date(self.now)
    }

    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    pub fn local_hour(&self, instant: DateTime<Utc>) -> u32 {
        instant.with_timezone(&self.offset).hour()
    }
}

/// Progress of one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleProgress {
    pub id: String,
    pub value: u32,
    pub target: u32,
}

impl RuleProgress {
    pub fn is_complete(&self) -> bool {
        self.value >= self.target
    }
}

/// Per-rule progress produced by one evaluation, in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub rules: Vec<RuleProgress>,
    /// History entries excluded because they failed validation.
    pub skipped_records: usize,
}

impl ProgressSnapshot {
    pub fn get(&self, id: &str) -> Option<u32> {
        self.rules
            .iter()
            .find(|rule| rule.id == id)
            .map(|rule| rule.value)
    }

    pub fn to_map(&self) -> BTreeMap<String, u32> {
        self.rules
            .iter()
            .map(|rule| (rule.id.clone(), rule.value))
            .collect()
    }
}

/// Evaluates a raw history snapshot, skipping entries that fail validation.
pub fn evaluate_progress(
    history: &[RawMeasurement],
    catalog: &Catalog,
    unlocked: &[String],
    ctx: &EvaluationContext,
) -> ProgressSnapshot {
    let (records, skipped_records) = validate_history(history, ctx);
    let mut snapshot = evaluate_records(&records, catalog, unlocked, ctx);
    snapshot.skipped_records = skipped_records;
    snapshot
}

/// Evaluates an already-validated history.
pub fn evaluate_records(
    records: &[MeasurementRecord],
    catalog: &Catalog,
    unlocked: &[String],
    ctx: &EvaluationContext,
) -> ProgressSnapshot {
    let rules = catalog
        .iter()
        .map(|definition| {
            let value = if unlocked.iter().any(|id| id == &definition.id) {
                definition.target
            } else {
                raw_progress(&definition.kind, records, ctx).min(definition.target)
            };
            RuleProgress {
                id: definition.id.clone(),
                value,
                target: definition.target,
            }
        })
        .collect();

    ProgressSnapshot {
        rules,
        skipped_records: 0,
    }
}

/// Splits history into valid records and a count of malformed entries.
///
/// Offset-less timestamps are read as wall-clock time in `ctx`'s timezone.
pub fn validate_history(
    history: &[RawMeasurement],
    ctx: &EvaluationContext,
) -> (Vec<MeasurementRecord>, usize) {
    let mut records = Vec::with_capacity(history.len());
    let mut skipped = 0;
    for (index, entry) in history.iter().enumerate() {
        match MeasurementRecord::try_from_raw_in(entry, ctx.offset()) {
            Ok(record) => records.push(record),
            Err(err) => {
                debug!("event=history_validate module=engine status=skipped index={index} error={err}");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        warn!(
            "event=history_validate module=engine status=partial total={} skipped={}",
            history.len(),
            skipped
        );
    }
    (records, skipped)
}

fn raw_progress(kind: &RuleKind, records: &[MeasurementRecord], ctx: &EvaluationContext) -> u32 {
    match kind {
        RuleKind::Milestone => milestone_count(records),
        RuleKind::Streak => current_daily_streak(records, ctx),
        RuleKind::Performance(PerformanceCondition::GoodResult) => good_result_count(records),
        RuleKind::Performance(PerformanceCondition::ConsecutiveGood) => longest_good_run(records),
        RuleKind::TimeWindow(TimeCondition::Before8am) => {
            count_before_hour(records, ctx, EARLY_HOUR_LIMIT)
        }
        RuleKind::TimeWindow(TimeCondition::After10pm) => {
            count_from_hour(records, ctx, LATE_HOUR_START)
        }
        RuleKind::TimeWindow(TimeCondition::DifferentTimes) => distinct_day_parts(records, ctx),
        RuleKind::Frequency(FrequencyCondition::SameDay) => max_records_per_day(records, ctx),
        RuleKind::Frequency(FrequencyCondition::Weekend) => distinct_weekend_dates(records, ctx),
        RuleKind::Unsupported { family, condition } => {
            debug!(
                "event=rule_evaluate module=engine status=unsupported family={} condition={}",
                family,
                condition.as_deref().unwrap_or("none")
            );
            0
        }
    }
}

fn saturating_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Total number of records.
pub fn milestone_count(records: &[MeasurementRecord]) -> u32 {
    saturating_u32(records.len())
}

/// Consecutive local days with at least one record, walking back from today.
///
/// A day without records ends the walk; no record today means 0.
pub fn current_daily_streak(records: &[MeasurementRecord], ctx: &EvaluationContext) -> u32 {
    let active_days: HashSet<NaiveDate> = records
        .iter()
        .map(|record| ctx.local_date(record.recorded_at))
        .collect();

    let mut streak = 0;
    let mut day = Some(ctx.today());
    while let Some(current) = day.filter(|current| active_days.contains(current)) {
        streak += 1;
        day = current.pred_opt();
    }
    streak
}

/// Number of good readings.
pub fn good_result_count(records: &[MeasurementRecord]) -> u32 {
    saturating_u32(records.iter().filter(|record| record.is_good()).count())
}

/// Longest run of consecutive good readings in the given order.
pub fn longest_good_run(records: &[MeasurementRecord]) -> u32 {
    let mut current = 0u32;
    let mut longest = 0u32;
    for record in records {
        if record.is_good() {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Records whose local hour is strictly below `hour`.
pub fn count_before_hour(records: &[MeasurementRecord], ctx: &EvaluationContext, hour: u32) -> u32 {
    saturating_u32(
        records
            .iter()
            .filter(|record| ctx.local_hour(record.recorded_at) < hour)
            .count(),
    )
}

/// Records whose local hour is `hour` or later.
pub fn count_from_hour(records: &[MeasurementRecord], ctx: &EvaluationContext, hour: u32) -> u32 {
    saturating_u32(
        records
            .iter()
            .filter(|record| ctx.local_hour(record.recorded_at) >= hour)
            .count(),
    )
}

/// Part of the local day a reading falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayPart {
    Morning,
    Afternoon,
    Evening,
}

impl DayPart {
    pub fn from_hour(hour: u32) -> Self {
        if hour < AFTERNOON_START_HOUR {
            Self::Morning
        } else if hour < EVENING_START_HOUR {
            Self::Afternoon
        } else {
            Self::Evening
        }
    }
}

/// Number of distinct day-parts touched (at most 3).
pub fn distinct_day_parts(records: &[MeasurementRecord], ctx: &EvaluationContext) -> u32 {
    let parts: HashSet<DayPart> = records
        .iter()
        .map(|record| DayPart::from_hour(ctx.local_hour(record.recorded_at)))
        .collect();
    saturating_u32(parts.len())
}

/// Largest number of records sharing one local calendar date.
pub fn max_records_per_day(records: &[MeasurementRecord], ctx: &EvaluationContext) -> u32 {
    let mut per_day: HashMap<NaiveDate, u32> = HashMap::new();
    for record in records {
        *per_day.entry(ctx.local_date(record.recorded_at)).or_default() += 1;
    }
    per_day.into_values().max().unwrap_or(0)
}

/// Distinct Saturday/Sunday local dates with at least one record.
pub fn distinct_weekend_dates(records: &[MeasurementRecord], ctx: &EvaluationContext) -> u32 {
    let dates: HashSet<NaiveDate> = records
        .iter()
        .map(|record| ctx.local_date(record.recorded_at))
        .filter(|date| matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
        .collect();
    saturating_u32(dates.len())
}
