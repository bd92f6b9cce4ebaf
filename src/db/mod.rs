//! SQLite-backed store for master entities, raw imported rows, and derived KPIs.
//!
//! The database lives at `~/.workmetrics/workmetrics.db`. Raw import tables
//! (activities, time_clock, remote_sessions) keep every CSV data row for audit;
//! the dedup engine only flips `is_duplicate` flags, it never deletes. The
//! `daily_kpis` table is derived state and can be rebuilt at any time.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OpenFlags};

pub mod types;
pub use types::*;

mod activities;
mod companies;
mod employees;
mod kpis;
mod records;
mod vehicles;

pub use activities::DuplicateGroup;
pub use records::UpsertOutcome;

/// Timestamp format used for every datetime column. Kept to second precision
/// so recomputed rows compare byte-identical.
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Date format used for the `daily_kpis.date` column.
pub const DATE_FMT: &str = "%Y-%m-%d";

pub(crate) fn fmt_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

pub(crate) fn fmt_date(d: &NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

/// Parse a datetime column value inside a row mapper.
pub(crate) fn column_datetime(idx: usize, value: String) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&value, DATETIME_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a date column value inside a row mapper.
pub(crate) fn column_date(idx: usize, value: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&value, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub struct AnalyticsDb {
    conn: Connection,
}

impl AnalyticsDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    ///
    /// A whole file import or KPI recompute runs inside one of these so a
    /// storage failure never leaves half-resolved employees or partial KPI rows.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default path and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing and the CLI's
    /// `--db` flag.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::init(conn)
    }

    /// Open an in-memory database with the full schema. Test fixture.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        // WAL for concurrent dashboard reads during long imports
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Open the database in read-only mode. Used by dashboard readers polling
    /// progress while an import owns writes.
    pub fn open_readonly_at(path: &std::path::Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.workmetrics/workmetrics.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".workmetrics").join("workmetrics.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_applies_schema() {
        let db = AnalyticsDb::open_in_memory().expect("open");
        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM employees", [], |row| row.get(0))
            .expect("employees table");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let db = AnalyticsDb::open_in_memory().expect("open");

        let result: Result<(), DbError> = db.with_transaction(|db| {
            db.conn_ref().execute(
                "INSERT INTO companies (name, name_norm, created_at)
                 VALUES ('Acme', 'acme', '2026-01-01')",
                [],
            )?;
            // Force a rollback
            Err(DbError::Migration("boom".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM companies", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "insert should have been rolled back");
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let db = AnalyticsDb::open_in_memory().expect("open");

        db.with_transaction(|db| {
            db.conn_ref().execute(
                "INSERT INTO companies (name, name_norm, created_at)
                 VALUES ('Acme', 'acme', '2026-01-01')",
                [],
            )?;
            Ok(())
        })
        .expect("transaction");

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM companies", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
