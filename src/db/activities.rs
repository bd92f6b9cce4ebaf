use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::*;

/// A group of activity rows sharing (employee, bucketed start, duration),
/// produced by the retrospective duplicate scan. Ids are ascending, so the
/// first is the one to keep.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub ids: Vec<i64>,
}

impl AnalyticsDb {
    // =========================================================================
    // Activities
    // =========================================================================

    /// Insert a raw activity row. `is_duplicate` is decided by the dedup
    /// engine before this call.
    pub fn insert_activity(
        &self,
        activity: &NewActivity,
        is_duplicate: bool,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "INSERT INTO activities
                (employee_id, company_id, start_time, end_time, duration_hours,
                 description, external_ticket_id, billable, is_duplicate,
                 source_file, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                activity.employee_id,
                activity.company_id,
                fmt_datetime(&activity.start_time),
                activity.end_time.as_ref().map(fmt_datetime),
                activity.duration_hours,
                activity.description,
                activity.external_ticket_id,
                activity.billable as i64,
                is_duplicate as i64,
                activity.source_file,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Candidate rows for insert-time dedup: same employee, start time within
    /// `window_secs` of the given start. Description/duration comparison
    /// happens in the dedup engine.
    pub fn find_activity_matches(
        &self,
        employee_id: i64,
        start_time: &NaiveDateTime,
        window_secs: i64,
    ) -> Result<Vec<ActivityMatchRow>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, duration_hours, description, is_duplicate
             FROM activities
             WHERE employee_id = ?1
               AND ABS(strftime('%s', start_time) - strftime('%s', ?2)) < ?3
             ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![employee_id, fmt_datetime(start_time), window_secs],
            |row| {
                let start: String = row.get(1)?;
                Ok(ActivityMatchRow {
                    id: row.get(0)?,
                    start_time: column_datetime(1, start)?,
                    duration_hours: row.get(2)?,
                    description: row.get(3)?,
                    is_duplicate: row.get::<_, i64>(4)? != 0,
                })
            },
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Flip the duplicate flag on one activity row.
    pub fn set_activity_duplicate(&self, id: i64, is_duplicate: bool) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE activities SET is_duplicate = ?2 WHERE id = ?1",
            params![id, is_duplicate as i64],
        )?;
        Ok(())
    }

    /// Fetch a single activity row.
    pub fn get_activity(&self, id: i64) -> Result<Option<DbActivity>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, employee_id, company_id, start_time, end_time, duration_hours,
                        description, external_ticket_id, billable, is_duplicate,
                        source_file, imported_at
                 FROM activities WHERE id = ?1",
                params![id],
                Self::map_activity_row,
            )
            .optional()?)
    }

    /// All activity rows for one employee, ascending by start time.
    pub fn list_activities_for_employee(&self, employee_id: i64) -> Result<Vec<DbActivity>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, employee_id, company_id, start_time, end_time, duration_hours,
                    description, external_ticket_id, billable, is_duplicate,
                    source_file, imported_at
             FROM activities WHERE employee_id = ?1 ORDER BY start_time, id",
        )?;
        let rows = stmt.query_map(params![employee_id], Self::map_activity_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn map_activity_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbActivity> {
        let start: String = row.get(3)?;
        let end: Option<String> = row.get(4)?;
        Ok(DbActivity {
            id: row.get(0)?,
            employee_id: row.get(1)?,
            company_id: row.get(2)?,
            start_time: column_datetime(3, start)?,
            end_time: match end {
                Some(s) => Some(column_datetime(4, s)?),
                None => None,
            },
            duration_hours: row.get(5)?,
            description: row.get(6)?,
            external_ticket_id: row.get(7)?,
            billable: row.get::<_, i64>(8)? != 0,
            is_duplicate: row.get::<_, i64>(9)? != 0,
            source_file: row.get(10)?,
            imported_at: row.get(11)?,
        })
    }

    /// Groups of rows that collide on (employee, time-bucketed start, duration).
    /// Only multi-row groups are returned; resolved (NULL-employee) rows are
    /// excluded since they can't collide on identity.
    pub fn duplicate_activity_groups(
        &self,
        bucket_secs: i64,
    ) -> Result<Vec<DuplicateGroup>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT GROUP_CONCAT(id)
             FROM activities
             WHERE employee_id IS NOT NULL
             GROUP BY employee_id,
                      CAST(strftime('%s', start_time) AS INTEGER) / ?1,
                      duration_hours
             HAVING COUNT(*) > 1",
        )?;
        let rows = stmt.query_map(params![bucket_secs], |row| row.get::<_, String>(0))?;

        let mut groups = Vec::new();
        for row in rows {
            let concat = row?;
            let mut ids: Vec<i64> = concat.split(',').filter_map(|s| s.parse().ok()).collect();
            ids.sort_unstable();
            groups.push(DuplicateGroup { ids });
        }
        Ok(groups)
    }

    /// Count of activity rows (total, non-duplicate).
    pub fn activity_counts(&self) -> Result<(i64, i64), DbError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN is_duplicate = 0 THEN 1 ELSE 0 END), 0)
             FROM activities",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?)
    }
}
