//! Measurement event log contracts and SQLite implementation.
//!
//! # Responsibility
//! - Append completed measurements and read the history back in insertion order.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - History order is insertion order (`seq`), not timestamp order.
//! - `append` only accepts validated records; `import_raw` stores entries as
//!   given so legacy data is never dropped on import.
//! - `import_many` is all-or-nothing.
//! - Rows are never rewritten; `clear` is the only destructive operation.

use crate::db::DbError;
use crate::model::measurement::{MeasurementId, MeasurementRecord, RawMeasurement};
use log::info;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const MEASUREMENT_COLUMNS: &str = "iaq, co2_eq, voc_eq, temp, hum, pres, gas_kohm, recorded_at";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for measurement persistence and queries.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => {
                write!(f, "invalid persisted measurement data: {message}")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the measurement event log.
pub trait MeasurementRepository {
    fn append(&self, record: &MeasurementRecord) -> RepoResult<MeasurementId>;
    fn import_raw(&self, entry: &RawMeasurement) -> RepoResult<MeasurementId>;
    /// Imports a batch as one unit; on error none of `entries` is kept.
    fn import_many(&self, entries: &[RawMeasurement]) -> RepoResult<Vec<MeasurementId>>;
    fn list_history(&self) -> RepoResult<Vec<RawMeasurement>>;
    /// Most recently appended entry that passes validation.
    fn latest(&self) -> RepoResult<Option<MeasurementRecord>>;
    fn count(&self) -> RepoResult<u64>;
    /// Deletes all history, returning the number of removed rows.
    fn clear(&self) -> RepoResult<usize>;
}

/// SQLite-backed measurement repository.
pub struct SqliteMeasurementRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMeasurementRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

fn insert_entry(conn: &Connection, entry: &RawMeasurement) -> RepoResult<MeasurementId> {
    let id = Uuid::new_v4();
    conn.execute(
        &format!(
            "INSERT INTO measurements (uuid, {MEASUREMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);"
        ),
        params![
            id.to_string(),
            entry.iaq,
            entry.co2_eq,
            entry.voc_eq,
            entry.temp,
            entry.hum,
            entry.pres,
            entry.gas_kohm,
            entry.timestamp.as_deref(),
        ],
    )?;
    Ok(id)
}

impl MeasurementRepository for SqliteMeasurementRepository<'_> {
    fn append(&self, record: &MeasurementRecord) -> RepoResult<MeasurementId> {
        insert_entry(self.conn, &record.to_raw())
    }

    fn import_raw(&self, entry: &RawMeasurement) -> RepoResult<MeasurementId> {
        insert_entry(self.conn, entry)
    }

    fn import_many(&self, entries: &[RawMeasurement]) -> RepoResult<Vec<MeasurementId>> {
        let tx = self.conn.unchecked_transaction()?;
        let ids = entries
            .iter()
            .map(|entry| insert_entry(&tx, entry))
            .collect::<RepoResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(ids)
    }

    fn list_history(&self) -> RepoResult<Vec<RawMeasurement>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT uuid, {MEASUREMENT_COLUMNS} FROM measurements ORDER BY seq ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut history = Vec::new();
        while let Some(row) = rows.next()? {
            history.push(parse_measurement_row(row)?.1);
        }
        Ok(history)
    }

    fn latest(&self) -> RepoResult<Option<MeasurementRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT uuid, {MEASUREMENT_COLUMNS} FROM measurements ORDER BY seq DESC;"
        ))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let (_, entry) = parse_measurement_row(row)?;
            if let Ok(record) = MeasurementRecord::try_from_raw(&entry) {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn count(&self) -> RepoResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM measurements;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative measurement count {count}")))
    }

    fn clear(&self) -> RepoResult<usize> {
        let removed = self.conn.execute("DELETE FROM measurements;", [])?;
        info!("event=history_clear module=repo status=ok removed={removed}");
        Ok(removed)
    }
}

fn parse_measurement_row(row: &Row<'_>) -> RepoResult<(MeasurementId, RawMeasurement)> {
    let uuid_text: String = row.get("uuid")?;
    let id = Uuid::parse_str(&uuid_text).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid uuid value `{uuid_text}` in measurements.uuid"
        ))
    })?;

    let entry = RawMeasurement {
        iaq: row.get("iaq")?,
        co2_eq: row.get("co2_eq")?,
        voc_eq: row.get("voc_eq")?,
        temp: row.get("temp")?,
        hum: row.get("hum")?,
        pres: row.get("pres")?,
        gas_kohm: row.get("gas_kohm")?,
        timestamp: row.get("recorded_at")?,
    };
    Ok((id, entry))
}
