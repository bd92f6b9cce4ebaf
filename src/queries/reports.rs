use chrono::NaiveDate;
use rusqlite::params;
use serde::Serialize;

use crate::db::{AnalyticsDb, DbError};

/// Aggregated KPI figures over a date range, company-wide or per employee.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub avg_efficiency_rate: f64,
    pub total_billable_hours: f64,
    pub total_profit_loss: f64,
    /// Distinct dates with at least one KPI row in range.
    pub working_days: i64,
    pub total_remote_sessions: i64,
}

/// Summarize `daily_kpis` between `from` and `to` inclusive, optionally
/// restricted to one employee. Empty ranges yield zeros.
pub fn kpi_summary(
    db: &AnalyticsDb,
    employee_id: Option<i64>,
    from: &NaiveDate,
    to: &NaiveDate,
) -> Result<KpiSummary, DbError> {
    let from = from.format("%Y-%m-%d").to_string();
    let to = to.format("%Y-%m-%d").to_string();

    let map = |row: &rusqlite::Row<'_>| {
        Ok(KpiSummary {
            avg_efficiency_rate: row.get(0)?,
            total_billable_hours: row.get(1)?,
            total_profit_loss: row.get(2)?,
            working_days: row.get(3)?,
            total_remote_sessions: row.get(4)?,
        })
    };

    let summary = match employee_id {
        Some(id) => db.conn_ref().query_row(
            "SELECT COALESCE(AVG(efficiency_rate), 0),
                    COALESCE(SUM(billable_hours), 0),
                    COALESCE(SUM(profit_loss), 0),
                    COUNT(DISTINCT date),
                    COALESCE(SUM(remote_sessions), 0)
             FROM daily_kpis
             WHERE employee_id = ?1 AND date BETWEEN ?2 AND ?3",
            params![id, from, to],
            map,
        )?,
        None => db.conn_ref().query_row(
            "SELECT COALESCE(AVG(efficiency_rate), 0),
                    COALESCE(SUM(billable_hours), 0),
                    COALESCE(SUM(profit_loss), 0),
                    COUNT(DISTINCT date),
                    COALESCE(SUM(remote_sessions), 0)
             FROM daily_kpis
             WHERE date BETWEEN ?1 AND ?2",
            params![from, to],
            map,
        )?,
    };

    Ok(summary)
}

/// One row of the top-performers ranking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub employee_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub avg_efficiency_rate: f64,
    pub total_billable_hours: f64,
    pub total_profit_loss: f64,
}

/// Rank active employees by average efficiency over a date range.
pub fn top_performers(
    db: &AnalyticsDb,
    from: &NaiveDate,
    to: &NaiveDate,
    limit: usize,
) -> Result<Vec<TopPerformer>, DbError> {
    let mut stmt = db.conn_ref().prepare(
        "SELECT k.employee_id, e.first_name, e.last_name,
                AVG(k.efficiency_rate), SUM(k.billable_hours), SUM(k.profit_loss)
         FROM daily_kpis k
         JOIN employees e ON e.id = k.employee_id
         WHERE e.active = 1 AND k.date BETWEEN ?1 AND ?2
         GROUP BY k.employee_id
         ORDER BY AVG(k.efficiency_rate) DESC, e.last_name
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(
        params![
            from.format("%Y-%m-%d").to_string(),
            to.format("%Y-%m-%d").to_string(),
            limit as i64,
        ],
        |row| {
            Ok(TopPerformer {
                employee_id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                avg_efficiency_rate: row.get(3)?,
                total_billable_hours: row.get(4)?,
                total_profit_loss: row.get(5)?,
            })
        },
    )?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
