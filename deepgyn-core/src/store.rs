//! Scan history store: an append-only table of [`ScanRecord`]s scoped by owner.
//!
//! Records are written once on an explicit save and never updated or deleted.
//! Owner isolation is enforced by the SQL query itself.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{DeepGynError, Result};

/// Identifier assigned by the store; strictly increasing and never reused.
pub type RecordId = i64;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS scans (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        age INTEGER NOT NULL,
        location TEXT NOT NULL,
        category TEXT NOT NULL,
        confidence REAL NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_scans_owner ON scans (owner, id);
";

/// Timestamp format of databases written before RFC 3339 was adopted.
const LEGACY_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Columns renamed since the first schema: `(old, new)`.
const LEGACY_COLUMNS: &[(&str, &str)] = &[("doctor_email", "owner"), ("prediction", "category")];

/// Legacy rows may hold NULLs; they read back as empty values.
const SELECT_RECORD: &str = "SELECT id, COALESCE(owner, ''), COALESCE(name, ''), COALESCE(age, 0),
        COALESCE(location, ''), COALESCE(category, ''), COALESCE(confidence, 0.0), timestamp
     FROM scans";

/// Fields supplied by the caller when saving a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScan {
    #[serde(default, alias = "doctor_email")]
    pub owner: String,
    pub name: String,
    pub age: u32,
    #[serde(default)]
    pub location: String,
    #[serde(alias = "prediction")]
    pub category: String,
    pub confidence: f64,
}

impl NewScan {
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(DeepGynError::invalid_input("owner must not be empty"));
        }
        if self.name.trim().is_empty() {
            return Err(DeepGynError::invalid_input("patient name must not be empty"));
        }
        if self.age == 0 {
            return Err(DeepGynError::invalid_input("age must be a positive integer"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(DeepGynError::invalid_input(format!(
                "confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// A persisted scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: RecordId,
    pub owner: String,
    pub name: String,
    pub age: u32,
    pub location: String,
    pub category: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only, owner-scoped scan log.
///
/// Methods block; async callers should run them on a blocking thread.
pub trait RecordStore: Send + Sync {
    /// Append a record and return its new identifier.
    fn save(&self, scan: &NewScan) -> Result<RecordId>;

    /// All records of `owner`, newest first.
    fn history(&self, owner: &str) -> Result<Vec<ScanRecord>>;
}

/// SQLite implementation of [`RecordStore`].
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore").finish_non_exhaustive()
    }
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path`. `:memory:` opens a private in-memory database.
    pub fn open(path: &Path) -> Result<Self> {
        if path.as_os_str() == ":memory:" {
            return Self::in_memory();
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(DeepGynError::store)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened scan store");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        migrate_legacy_columns(&conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DeepGynError::store("connection mutex poisoned"))
    }
}

/// Rename the columns of a scans table created by the first deployment.
fn migrate_legacy_columns(conn: &Connection) -> Result<()> {
    let columns = {
        let mut stmt = conn.prepare("PRAGMA table_info(scans)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        names
    };
    let has = |name: &str| columns.iter().any(|c| c == name);
    let renames: Vec<String> = LEGACY_COLUMNS
        .iter()
        .filter(|(old, new)| has(old) && !has(new))
        .map(|(old, new)| format!("ALTER TABLE scans RENAME COLUMN {old} TO {new};"))
        .collect();
    if renames.is_empty() {
        return Ok(());
    }
    tracing::info!(columns = renames.len(), "migrating legacy scans table");
    conn.execute_batch(&format!("BEGIN; {} COMMIT;", renames.join(" ")))?;
    Ok(())
}

/// RFC 3339, or the naive legacy format read as UTC.
fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Ok(t.with_timezone(&Utc)),
        Err(e) => NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP)
            .map(|t| t.and_utc())
            .map_err(|_| e),
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanRecord> {
    let timestamp: String = row.get(7)?;
    let timestamp = parse_timestamp(&timestamp).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ScanRecord {
        id: row.get(0)?,
        owner: row.get(1)?,
        name: row.get(2)?,
        age: row.get(3)?,
        location: row.get(4)?,
        category: row.get(5)?,
        confidence: row.get(6)?,
        timestamp,
    })
}

impl RecordStore for SqliteRecordStore {
    fn save(&self, scan: &NewScan) -> Result<RecordId> {
        scan.validate()?;
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO scans (owner, name, age, location, category, confidence, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                scan.owner,
                scan.name,
                scan.age,
                scan.location,
                scan.category,
                scan.confidence,
                now
            ],
        )
        .map_err(|e| {
            tracing::error!(error = %e, "failed to save scan");
            DeepGynError::from(e)
        })?;
        let id = conn.last_insert_rowid();
        tracing::debug!(id, "scan saved");
        Ok(id)
    }

    fn history(&self, owner: &str) -> Result<Vec<ScanRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_RECORD} WHERE owner = ?1 ORDER BY id DESC"
        ))?;
        let records = stmt
            .query_map(params![owner], row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
