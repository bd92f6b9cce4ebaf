use chrono::{NaiveDateTime, Utc};
use rusqlite::params;

use super::*;

/// Outcome of an upsert into the clock-in / session tables, where exact
/// re-imports collapse onto the unique key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Ignored,
}

impl AnalyticsDb {
    // =========================================================================
    // Time clock
    // =========================================================================

    /// Upsert a clock-in row. Keyed on (employee, clock_in); a re-import of
    /// the same punch is ignored, unless it now carries a clock_out the stored
    /// row is missing — then the row is completed in place.
    pub fn upsert_time_clock(
        &self,
        employee_id: i64,
        clock_in: &NaiveDateTime,
        clock_out: Option<&NaiveDateTime>,
        source_file: Option<&str>,
    ) -> Result<UpsertOutcome, DbError> {
        let existed: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM time_clock WHERE employee_id = ?1 AND clock_in = ?2)",
            params![employee_id, fmt_datetime(clock_in)],
            |row| row.get(0),
        )?;

        let changed = self.conn.execute(
            "INSERT INTO time_clock (employee_id, clock_in, clock_out, source_file, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(employee_id, clock_in) DO UPDATE SET
                clock_out = COALESCE(time_clock.clock_out, excluded.clock_out)
             WHERE time_clock.clock_out IS NULL AND excluded.clock_out IS NOT NULL",
            params![
                employee_id,
                fmt_datetime(clock_in),
                clock_out.map(fmt_datetime),
                source_file,
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(if !existed {
            UpsertOutcome::Inserted
        } else if changed > 0 {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Ignored
        })
    }

    /// All clock rows for one employee, ascending.
    pub fn list_time_clock_for_employee(
        &self,
        employee_id: i64,
    ) -> Result<Vec<DbTimeClock>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, employee_id, clock_in, clock_out, is_duplicate, source_file
             FROM time_clock WHERE employee_id = ?1 ORDER BY clock_in, id",
        )?;
        let rows = stmt.query_map(params![employee_id], |row| {
            let clock_in: String = row.get(2)?;
            let clock_out: Option<String> = row.get(3)?;
            Ok(DbTimeClock {
                id: row.get(0)?,
                employee_id: row.get(1)?,
                clock_in: column_datetime(2, clock_in)?,
                clock_out: match clock_out {
                    Some(s) => Some(column_datetime(3, s)?),
                    None => None,
                },
                is_duplicate: row.get::<_, i64>(4)? != 0,
                source_file: row.get(5)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // =========================================================================
    // Remote sessions
    // =========================================================================

    /// Insert a remote-session row. Exact re-imports (same employee, start,
    /// host) are ignored via the unique key.
    pub fn insert_remote_session(
        &self,
        employee_id: i64,
        session_start: &NaiveDateTime,
        duration_minutes: i64,
        remote_host: Option<&str>,
        source_file: Option<&str>,
    ) -> Result<UpsertOutcome, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO remote_sessions
                (employee_id, session_start, duration_minutes, remote_host,
                 source_file, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                employee_id,
                fmt_datetime(session_start),
                duration_minutes,
                remote_host,
                source_file,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(if inserted > 0 {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Ignored
        })
    }

    /// All session rows for one employee, ascending.
    pub fn list_sessions_for_employee(
        &self,
        employee_id: i64,
    ) -> Result<Vec<DbRemoteSession>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, employee_id, session_start, duration_minutes, remote_host,
                    is_duplicate, source_file
             FROM remote_sessions WHERE employee_id = ?1 ORDER BY session_start, id",
        )?;
        let rows = stmt.query_map(params![employee_id], |row| {
            let start: String = row.get(2)?;
            Ok(DbRemoteSession {
                id: row.get(0)?,
                employee_id: row.get(1)?,
                session_start: column_datetime(2, start)?,
                duration_minutes: row.get(3)?,
                remote_host: row.get(4)?,
                is_duplicate: row.get::<_, i64>(5)? != 0,
                source_file: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}
