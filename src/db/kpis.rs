use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::*;

impl AnalyticsDb {
    // =========================================================================
    // Daily KPIs
    // =========================================================================

    /// Overwrite the KPI row for (employee, date). Recompute always goes
    /// through here, so rerunning on unchanged inputs rewrites identical rows.
    pub fn upsert_daily_kpi(&self, kpi: &DbDailyKpi) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO daily_kpis
                (employee_id, date, billable_hours, efficiency_rate, profit_loss, remote_sessions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                kpi.employee_id,
                fmt_date(&kpi.date),
                kpi.billable_hours,
                kpi.efficiency_rate,
                kpi.profit_loss,
                kpi.remote_sessions,
            ],
        )?;
        Ok(())
    }

    /// Fetch one KPI row.
    pub fn get_daily_kpi(
        &self,
        employee_id: i64,
        date: &NaiveDate,
    ) -> Result<Option<DbDailyKpi>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT employee_id, date, billable_hours, efficiency_rate,
                        profit_loss, remote_sessions
                 FROM daily_kpis WHERE employee_id = ?1 AND date = ?2",
                params![employee_id, fmt_date(date)],
                Self::map_kpi_row,
            )
            .optional()?)
    }

    /// All KPI rows for one employee, ascending by date.
    pub fn list_daily_kpis(&self, employee_id: i64) -> Result<Vec<DbDailyKpi>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT employee_id, date, billable_hours, efficiency_rate,
                    profit_loss, remote_sessions
             FROM daily_kpis WHERE employee_id = ?1 ORDER BY date",
        )?;
        let rows = stmt.query_map(params![employee_id], Self::map_kpi_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn map_kpi_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbDailyKpi> {
        let date: String = row.get(1)?;
        Ok(DbDailyKpi {
            employee_id: row.get(0)?,
            date: column_date(1, date)?,
            billable_hours: row.get(2)?,
            efficiency_rate: row.get(3)?,
            profit_loss: row.get(4)?,
            remote_sessions: row.get(5)?,
        })
    }

    /// Every (employee, date) pair observed in the raw tables, excluding
    /// duplicate-flagged rows. With `only_missing`, restricted to pairs that
    /// have no KPI row yet (the "incomplete days" of an incremental recompute).
    pub fn observed_kpi_pairs(
        &self,
        only_missing: bool,
    ) -> Result<Vec<(i64, NaiveDate)>, DbError> {
        let base = "SELECT DISTINCT employee_id, d FROM (
                SELECT employee_id, date(start_time) AS d
                  FROM activities WHERE employee_id IS NOT NULL AND is_duplicate = 0
                UNION
                SELECT employee_id, date(clock_in) AS d
                  FROM time_clock WHERE is_duplicate = 0
                UNION
                SELECT employee_id, date(session_start) AS d
                  FROM remote_sessions WHERE is_duplicate = 0
             ) AS src";
        let sql = if only_missing {
            format!(
                "{base}
                 WHERE NOT EXISTS (
                    SELECT 1 FROM daily_kpis k
                    WHERE k.employee_id = src.employee_id AND k.date = src.d
                 )
                 ORDER BY employee_id, d"
            )
        } else {
            format!("{base} ORDER BY employee_id, d")
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let d: String = row.get(1)?;
            Ok((row.get::<_, i64>(0)?, column_date(1, d)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Billable hours for one (employee, date): sum of non-duplicate billable
    /// activity durations.
    pub fn day_billable_hours(
        &self,
        employee_id: i64,
        date: &NaiveDate,
    ) -> Result<f64, DbError> {
        Ok(self.conn.query_row(
            "SELECT COALESCE(SUM(duration_hours), 0)
             FROM activities
             WHERE employee_id = ?1 AND date(start_time) = ?2
               AND billable = 1 AND is_duplicate = 0",
            params![employee_id, fmt_date(date)],
            |row| row.get(0),
        )?)
    }

    /// Remote-session count for one (employee, date).
    pub fn day_session_count(&self, employee_id: i64, date: &NaiveDate) -> Result<i64, DbError> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*)
             FROM remote_sessions
             WHERE employee_id = ?1 AND date(session_start) = ?2 AND is_duplicate = 0",
            params![employee_id, fmt_date(date)],
            |row| row.get(0),
        )?)
    }

    /// Materialized KPI row count (progress-endpoint numerator).
    pub fn count_daily_kpis(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM daily_kpis", [], |row| row.get(0))?)
    }

    /// Observed (min, max) date across the raw tables, or None if nothing has
    /// been imported yet.
    pub fn observed_period(&self) -> Result<Option<(NaiveDate, NaiveDate)>, DbError> {
        let row: (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(d), MAX(d) FROM (
                SELECT date(start_time) AS d FROM activities WHERE employee_id IS NOT NULL
                UNION ALL SELECT date(clock_in) FROM time_clock
                UNION ALL SELECT date(session_start) FROM remote_sessions
             )",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        match row {
            (Some(min), Some(max)) => Ok(Some((
                column_date(0, min)?,
                column_date(1, max)?,
            ))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seed_activity(db: &AnalyticsDb, emp: i64, start: &str, hours: f64, billable: bool) {
        db.insert_activity(
            &NewActivity {
                employee_id: Some(emp),
                company_id: None,
                start_time: dt(start),
                end_time: None,
                duration_hours: hours,
                description: String::new(),
                external_ticket_id: None,
                billable,
                source_file: None,
            },
            false,
        )
        .unwrap();
    }

    #[test]
    fn test_day_billable_hours_excludes_duplicates_and_nonbillable() {
        let db = AnalyticsDb::open_in_memory().unwrap();
        let (emp, _) = db
            .insert_employee_if_absent("Franco", "Fiorellino", "technician", 120.0, None)
            .unwrap();

        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.5, true);
        seed_activity(&db, emp, "2026-01-05 14:00:00", 1.0, false); // non-billable
        db.insert_activity(
            &NewActivity {
                employee_id: Some(emp),
                company_id: None,
                start_time: dt("2026-01-05 16:00:00"),
                end_time: None,
                duration_hours: 3.0,
                description: String::new(),
                external_ticket_id: None,
                billable: true,
                source_file: None,
            },
            true, // duplicate
        )
        .unwrap();

        let hours = db.day_billable_hours(emp, &day("2026-01-05")).unwrap();
        assert_eq!(hours, 2.5);
    }

    #[test]
    fn test_observed_pairs_and_only_missing() {
        let db = AnalyticsDb::open_in_memory().unwrap();
        let (emp, _) = db
            .insert_employee_if_absent("Franco", "Fiorellino", "technician", 120.0, None)
            .unwrap();

        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.0, true);
        seed_activity(&db, emp, "2026-01-06 09:00:00", 3.0, true);

        let all = db.observed_kpi_pairs(false).unwrap();
        assert_eq!(all.len(), 2);

        db.upsert_daily_kpi(&DbDailyKpi {
            employee_id: emp,
            date: day("2026-01-05"),
            billable_hours: 2.0,
            efficiency_rate: 25.0,
            profit_loss: -50.0,
            remote_sessions: 0,
        })
        .unwrap();

        let missing = db.observed_kpi_pairs(true).unwrap();
        assert_eq!(missing, vec![(emp, day("2026-01-06"))]);
    }

    #[test]
    fn test_observed_period() {
        let db = AnalyticsDb::open_in_memory().unwrap();
        assert!(db.observed_period().unwrap().is_none());

        let (emp, _) = db
            .insert_employee_if_absent("Franco", "Fiorellino", "technician", 120.0, None)
            .unwrap();
        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.0, true);
        seed_activity(&db, emp, "2026-01-10 09:00:00", 2.0, true);

        let (min, max) = db.observed_period().unwrap().unwrap();
        assert_eq!(min, day("2026-01-05"));
        assert_eq!(max, day("2026-01-10"));
    }
}
