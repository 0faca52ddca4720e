//! SQLite-backed durable sample store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::{MetricsError, Result};
use crate::storage::SampleStore;
use crate::types::{format_timestamp, parse_timestamp, Sample};

const UPSERT_SQL: &str = "INSERT OR REPLACE INTO samples \
     (ts, cpu_percent, mem_percent, load_1m, load_5m, load_15m) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const SELECT_COLUMNS: &str = "SELECT ts, cpu_percent, mem_percent, load_1m, load_5m, load_15m FROM samples";

type RawRow = (String, f64, f64, f64, f64, f64);

/// Durable sample store on a single SQLite file.
///
/// The connection is guarded by a mutex that is held only for the duration of
/// one statement or one batch transaction.
#[derive(Debug)]
pub struct SqliteSampleStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteSampleStore {
    /// Opens (creating if needed) the store at `path` and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MetricsError::Io {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.init_schema()?;
        info!(path = %path.display(), journal_mode = %mode, "opened sample store");
        Ok(store)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Creates the samples table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(include_str!("../schema.sql"))?;
        Ok(())
    }

    /// The database file, or `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn into_sample(raw: RawRow) -> Result<Sample> {
        let (ts, cpu_percent, mem_percent, load_1m, load_5m, load_15m) = raw;
        Ok(Sample {
            timestamp: parse_timestamp(&ts)?,
            cpu_percent,
            mem_percent,
            load_1m,
            load_5m,
            load_15m,
        })
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }
}

impl SampleStore for SqliteSampleStore {
    fn prepare(&self) -> Result<()> {
        self.init_schema()
    }

    fn upsert(&self, sample: &Sample) -> Result<()> {
        let key = sample.key();
        {
            let conn = self.conn.lock();
            conn.prepare_cached(UPSERT_SQL)?.execute(params![
                key,
                sample.cpu_percent,
                sample.mem_percent,
                sample.load_1m,
                sample.load_5m,
                sample.load_15m,
            ])?;
        }
        debug!(timestamp = %key, "upserted sample");
        Ok(())
    }

    fn upsert_batch(&self, samples: &[Sample]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for sample in samples {
                stmt.execute(params![
                    sample.key(),
                    sample.cpu_percent,
                    sample.mem_percent,
                    sample.load_1m,
                    sample.load_5m,
                    sample.load_15m,
                ])?;
            }
        }
        tx.commit()?;
        debug!(batch = samples.len(), "upserted sample batch");
        Ok(())
    }

    fn query_since(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        let raw: Vec<RawRow> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE ts >= ?1 ORDER BY ts ASC"))?;
            let rows = stmt.query_map(params![format_timestamp(since)], Self::map_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        raw.into_iter().map(Self::into_sample).collect()
    }

    fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM samples", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    fn latest(&self, n: usize) -> Result<Vec<Sample>> {
        let limit = i64::try_from(n).unwrap_or(i64::MAX);
        let raw: Vec<RawRow> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare_cached(&format!("{SELECT_COLUMNS} ORDER BY ts DESC LIMIT ?1"))?;
            let rows = stmt.query_map(params![limit], Self::map_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        let mut samples = raw
            .into_iter()
            .map(Self::into_sample)
            .collect::<Result<Vec<_>>>()?;
        samples.reverse();
        Ok(samples)
    }
}
