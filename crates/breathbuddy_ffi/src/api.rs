//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose measurement and achievement use-cases to Dart via FRB.
//! - Translate core errors into flat response envelopes.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Calls that touch achievement state are serialized process-wide, so a
//!   ledger/queue read-modify-write never interleaves with another one.
//! - The clock and timezone come from the caller; nothing here reads them.

use breathbuddy_core::db::open_db;
use breathbuddy_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    AchievementDefinition, AchievementService, EvaluationContext, MeasurementService,
    MeasurementServiceError, SqliteKvStore, SqliteMeasurementRepository,
};
use log::warn;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

const DB_FILE_NAME: &str = "breathbuddy.sqlite3";
static DB_PATH: OnceLock<PathBuf> = OnceLock::new();
static STATE_LOCK: Mutex<()> = Mutex::new(());

type SqliteMeasurementService<'conn> = MeasurementService<
    'static,
    SqliteMeasurementRepository<'conn>,
    SqliteKvStore<'conn>,
>;

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Achievement as shown in lists and unlock popups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AchievementItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    /// `bronze|silver|gold|platinum`.
    pub rarity: String,
    pub target: u32,
}

impl From<&AchievementDefinition> for AchievementItem {
    fn from(value: &AchievementDefinition) -> Self {
        Self {
            id: value.id.clone(),
            title: value.title.clone(),
            description: value.description.clone(),
            icon: value.icon.clone(),
            rarity: value.rarity.as_str().to_string(),
            target: value.target,
        }
    }
}

/// Response envelope for one recorded measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementResponse {
    pub ok: bool,
    /// Stored measurement ID; also set when only the unlock step failed.
    pub measurement_id: Option<String>,
    /// `Good|Elevated|High`.
    pub status: Option<String>,
    /// Comparison with the previous reading, ready for display.
    pub comparison: Option<String>,
    /// Rules unlocked by this measurement, in catalog order.
    pub newly_unlocked: Vec<AchievementItem>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl MeasurementResponse {
    fn failure(message: impl Into<String>, measurement_id: Option<String>) -> Self {
        Self {
            ok: false,
            measurement_id,
            status: None,
            comparison: None,
            newly_unlocked: Vec::new(),
            message: message.into(),
        }
    }
}

/// Progress of one catalog rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressItem {
    pub achievement: AchievementItem,
    pub value: u32,
    pub unlocked: bool,
}

/// Response envelope for the achievements screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressResponse {
    pub ok: bool,
    /// One item per catalog rule, in catalog order.
    pub items: Vec<ProgressItem>,
    pub unlocked_count: u32,
    pub total_count: u32,
    /// History entries ignored because they failed validation.
    pub skipped_records: u32,
    pub message: String,
}

impl ProgressResponse {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            items: Vec::new(),
            unlocked_count: 0,
            total_count: 0,
            skipped_records: 0,
            message: message.into(),
        }
    }
}

/// Response envelope for the pending-notification queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingResponse {
    pub ok: bool,
    /// Unacknowledged unlocks, oldest first.
    pub items: Vec<AchievementItem>,
    pub message: String,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResponse {
    pub ok: bool,
    /// Number of entries the action touched.
    pub affected: u32,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>, affected: u32) -> Self {
        Self {
            ok: true,
            affected,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            affected: 0,
            message: message.into(),
        }
    }
}

/// Records one completed measurement and unlocks what it earns.
///
/// Input semantics:
/// - `payload_json`: device payload (`iaq, co2_eq, voc_eq, temp, hum, pres,
///   gas_kOhm, timestamp`).
/// - `now_epoch_ms` / `utc_offset_minutes`: caller clock and local offset.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - Malformed payloads are rejected without writing anything.
#[flutter_rust_bridge::frb(sync)]
pub fn measurement_record(
    payload_json: String,
    now_epoch_ms: i64,
    utc_offset_minutes: i32,
) -> MeasurementResponse {
    let Some(ctx) = EvaluationContext::from_epoch_ms(now_epoch_ms, utc_offset_minutes) else {
        return MeasurementResponse::failure(
            invalid_clock_message("measurement_record", now_epoch_ms, utc_offset_minutes),
            None,
        );
    };

    let result = with_measurement_service(|service| {
        service
            .receive_json(&payload_json, &ctx)
            .map_err(|err| match &err {
                MeasurementServiceError::Achievements { measurement_id, .. } => (
                    err.to_string(),
                    measurement_id.as_ref().map(|id| id.to_string()),
                ),
                _ => (err.to_string(), None),
            })
    });

    match result {
        Ok(Ok(receipt)) => MeasurementResponse {
            ok: true,
            measurement_id: Some(receipt.id.to_string()),
            status: Some(receipt.status.label().to_string()),
            comparison: Some(receipt.comparison.to_string()),
            newly_unlocked: receipt
                .achievements
                .newly_unlocked
                .iter()
                .map(AchievementItem::from)
                .collect(),
            message: "Measurement recorded.".to_string(),
        },
        Ok(Err((message, measurement_id))) => MeasurementResponse::failure(
            format!("measurement_record failed: {message}"),
            measurement_id,
        ),
        Err(message) => {
            MeasurementResponse::failure(format!("measurement_record failed: {message}"), None)
        }
    }
}

/// Progress for every catalog rule. Never writes.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn achievements_progress(now_epoch_ms: i64, utc_offset_minutes: i32) -> ProgressResponse {
    let Some(ctx) = EvaluationContext::from_epoch_ms(now_epoch_ms, utc_offset_minutes) else {
        return ProgressResponse::failure(invalid_clock_message(
            "achievements_progress",
            now_epoch_ms,
            utc_offset_minutes,
        ));
    };

    let result = with_measurement_service(|service| {
        let snapshot = service.progress(&ctx).map_err(|err| err.to_string())?;
        let ledger = service
            .achievements()
            .ledger()
            .map_err(|err| err.to_string())?;
        Ok::<_, String>((snapshot, ledger))
    });

    let (snapshot, ledger) = match result {
        Ok(Ok(state)) => state,
        Ok(Err(message)) | Err(message) => {
            return ProgressResponse::failure(format!("achievements_progress failed: {message}"));
        }
    };

    let catalog = breathbuddy_core::default_catalog();
    let items: Vec<ProgressItem> = catalog
        .iter()
        .map(|definition| ProgressItem {
            achievement: AchievementItem::from(definition),
            value: snapshot.get(&definition.id).unwrap_or(0),
            unlocked: ledger.is_unlocked(&definition.id),
        })
        .collect();
    let unlocked_count = items.iter().filter(|item| item.unlocked).count();

    ProgressResponse {
        ok: true,
        unlocked_count: to_u32(unlocked_count),
        total_count: to_u32(items.len()),
        skipped_records: to_u32(snapshot.skipped_records),
        items,
        message: format!("{unlocked_count} of {} unlocked.", catalog.len()),
    }
}

/// Unlocks not yet acknowledged by the UI.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - Read-only; the queue is drained by `achievements_acknowledge`.
#[flutter_rust_bridge::frb(sync)]
pub fn achievements_pending() -> PendingResponse {
    let result =
        with_measurement_service(|service| service.achievements().pending_notifications());
    match result {
        Ok(Ok(pending)) => PendingResponse {
            ok: true,
            message: format!("{} pending.", pending.len()),
            items: pending.iter().map(AchievementItem::from).collect(),
        },
        Ok(Err(err)) => PendingResponse {
            ok: false,
            items: Vec::new(),
            message: format!("achievements_pending failed: {err}"),
        },
        Err(message) => PendingResponse {
            ok: false,
            items: Vec::new(),
            message: format!("achievements_pending failed: {message}"),
        },
    }
}

/// Clears the whole pending-notification queue.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
/// - Idempotent; `affected` is 0 when nothing was pending.
#[flutter_rust_bridge::frb(sync)]
pub fn achievements_acknowledge() -> ActionResponse {
    let result = with_measurement_service(|service| {
        service.achievements_mut().acknowledge_notifications()
    });
    match result {
        Ok(Ok(acknowledged)) => {
            ActionResponse::success("Notifications acknowledged.", to_u32(acknowledged))
        }
        Ok(Err(err)) => ActionResponse::failure(format!("achievements_acknowledge failed: {err}")),
        Err(message) => {
            ActionResponse::failure(format!("achievements_acknowledge failed: {message}"))
        }
    }
}

/// Deletes measurement history and resets achievement state.
///
/// # FFI contract
/// - Sync call, DB-backed execution.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn data_clear_all() -> ActionResponse {
    let result = with_measurement_service(|service| {
        let removed = service.history()?.len();
        service.clear_all_data()?;
        Ok::<_, MeasurementServiceError>(removed)
    });
    match result {
        Ok(Ok(removed)) => ActionResponse::success("All data cleared.", to_u32(removed)),
        Ok(Err(err)) => ActionResponse::failure(format!("data_clear_all failed: {err}")),
        Err(message) => ActionResponse::failure(format!("data_clear_all failed: {message}")),
    }
}

fn resolve_db_path() -> PathBuf {
    DB_PATH.get_or_init(default_db_path).clone()
}

#[cfg(not(test))]
fn default_db_path() -> PathBuf {
    if let Ok(raw) = std::env::var("BREATHBUDDY_DB_PATH") {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    std::env::temp_dir().join(DB_FILE_NAME)
}

// Unit tests run against a private directory so they never clear the app DB.
#[cfg(test)]
fn default_db_path() -> PathBuf {
    static TEST_DB_DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
    TEST_DB_DIR
        .get_or_init(|| {
            tempfile::Builder::new()
                .prefix("breathbuddy-ffi-test")
                .tempdir()
                .unwrap()
        })
        .path()
        .join(DB_FILE_NAME)
}

/// Runs `f` against a service over the app database, holding the state lock.
///
/// The outer `Err` covers opening the database; the inner result is `f`'s.
fn with_measurement_service<T>(
    f: impl FnOnce(&mut SqliteMeasurementService<'_>) -> T,
) -> Result<T, String> {
    // A panicking holder cannot leave the DB half-written; keep serving.
    let _guard = STATE_LOCK
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    let db_path = resolve_db_path();
    let conn = open_db(&db_path).map_err(|err| {
        warn!("event=ffi_db_open module=ffi status=error error={err}");
        format!("DB open failed: {err}")
    })?;
    let mut service = MeasurementService::new(
        SqliteMeasurementRepository::new(&conn),
        AchievementService::with_default_catalog(SqliteKvStore::new(&conn)),
    );
    Ok(f(&mut service))
}

fn invalid_clock_message(op: &str, now_epoch_ms: i64, utc_offset_minutes: i32) -> String {
    format!(
        "{op} failed: invalid clock now_epoch_ms={now_epoch_ms} utc_offset_minutes={utc_offset_minutes}"
    )
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{
        achievements_acknowledge, achievements_pending, achievements_progress, core_version,
        data_clear_all, init_logging, measurement_record, ping, resolve_db_path, DB_FILE_NAME,
    };

    const NOW_MS: i64 = 1_718_452_800_000; // 2024-06-15T12:00:00Z

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_empty_log_dir() {
        let error = init_logging("info".to_string(), String::new());
        assert!(!error.is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn measurement_record_rejects_malformed_payload() {
        let response = measurement_record("{\"iaq\":1.0}".to_string(), NOW_MS, 0);
        assert!(!response.ok);
        assert!(response.measurement_id.is_none());
        assert!(response.message.contains("measurement_record failed"));
    }

    #[test]
    fn invalid_clock_is_rejected_before_touching_db() {
        let response = achievements_progress(NOW_MS, 24 * 60 + 1);
        assert!(!response.ok);
        assert!(response.message.contains("invalid clock"));

        let response = measurement_record(payload("2024-06-15T08:00:00Z", 80.0), i64::MAX, 0);
        assert!(!response.ok);
        assert!(response.message.contains("invalid clock"));
    }

    #[test]
    fn test_database_lives_outside_shared_temp_dir() {
        let path = resolve_db_path();
        assert_ne!(path, std::env::temp_dir().join(DB_FILE_NAME));
        assert!(path.ends_with(DB_FILE_NAME));
        assert!(path.parent().is_some_and(|dir| dir.is_dir()));
        assert_eq!(resolve_db_path(), path);
    }

    #[test]
    fn record_progress_acknowledge_and_clear_flow() {
        let cleared = data_clear_all();
        assert!(cleared.ok, "{}", cleared.message);

        let recorded = measurement_record(payload("2024-06-15T07:30:00Z", 80.0), NOW_MS, 0);
        assert!(recorded.ok, "{}", recorded.message);
        assert!(recorded.measurement_id.is_some());
        assert_eq!(recorded.status.as_deref(), Some("Good"));
        assert_eq!(
            recorded.comparison.as_deref(),
            Some("This is your first test!")
        );
        let unlocked: Vec<&str> = recorded
            .newly_unlocked
            .iter()
            .map(|item| item.id.as_str())
            .collect();
        assert_eq!(unlocked, vec!["first_test", "clean_breath", "early_bird"]);

        let progress = achievements_progress(NOW_MS, 0);
        assert!(progress.ok, "{}", progress.message);
        assert_eq!(progress.unlocked_count, 3);
        assert_eq!(progress.total_count as usize, progress.items.len());
        let tests_10 = progress
            .items
            .iter()
            .find(|item| item.achievement.id == "tests_10")
            .expect("tests_10 should be in catalog");
        assert_eq!(tests_10.value, 1);
        assert!(!tests_10.unlocked);

        let pending = achievements_pending();
        assert!(pending.ok, "{}", pending.message);
        assert_eq!(pending.items.len(), 3);

        let acknowledged = achievements_acknowledge();
        assert!(acknowledged.ok, "{}", acknowledged.message);
        assert_eq!(acknowledged.affected, 3);
        assert!(achievements_pending().items.is_empty());

        let cleared = data_clear_all();
        assert!(cleared.ok, "{}", cleared.message);
        assert_eq!(cleared.affected, 1);
        assert_eq!(achievements_progress(NOW_MS, 0).unlocked_count, 0);
    }

    fn payload(timestamp: &str, gas: f64) -> String {
        format!(
            r#"{{"iaq":40.0,"co2_eq":550.0,"voc_eq":0.6,"temp":22.0,"hum":45.0,"pres":1012.0,"gas_kOhm":{gas},"timestamp":"{timestamp}"}}"#
        )
    }
}
