//! Daily KPI aggregation.
//!
//! Every `daily_kpis` row is a pure function of the non-duplicate raw rows
//! for that (employee, date), so recomputation just overwrites. Values are
//! rounded to two decimals and timestamps are second-precision, which makes a
//! rerun on unchanged inputs produce byte-identical rows.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::config::AnalyticsConfig;
use crate::db::{AnalyticsDb, DbDailyKpi, DbError};

/// Cooperative cancellation handle for long batch operations. Cheap to clone;
/// the CLI hands one copy to the recompute task and keeps the other for its
/// ctrl-c handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of one recompute run.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeOutcome {
    /// (employee, date) rows written.
    pub written: usize,
    /// True when the run stopped early on a cancellation request. Rows
    /// already written are kept — each is complete on its own.
    pub cancelled: bool,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Recompute daily KPI rows.
///
/// Covers every (employee, date) pair observed in the raw tables; with
/// `force_full` the whole historical range, otherwise only pairs that have no
/// KPI row yet. Runs in one transaction so a storage failure leaves no
/// half-written rows.
pub fn recompute_all(
    db: &AnalyticsDb,
    config: &AnalyticsConfig,
    force_full: bool,
    cancel: &CancelFlag,
) -> Result<RecomputeOutcome, DbError> {
    let outcome = db.with_transaction(|db| {
        let pairs = db.observed_kpi_pairs(!force_full)?;
        let mut daily_costs: HashMap<i64, f64> = HashMap::new();
        let mut written = 0usize;

        for (employee_id, date) in pairs {
            if cancel.is_cancelled() {
                return Ok(RecomputeOutcome {
                    written,
                    cancelled: true,
                });
            }

            let daily_cost = match daily_costs.get(&employee_id) {
                Some(&cost) => cost,
                None => {
                    let cost = db
                        .get_employee(employee_id)?
                        .map(|e| e.daily_cost)
                        .unwrap_or(config.default_daily_cost);
                    daily_costs.insert(employee_id, cost);
                    cost
                }
            };

            let billable_hours = db.day_billable_hours(employee_id, &date)?;
            let remote_sessions = db.day_session_count(employee_id, &date)?;

            // No clamp: >100% is a real (and interesting) value
            let efficiency_rate = billable_hours / config.standard_workday_hours * 100.0;
            let profit_loss = billable_hours * config.billing_hourly_rate - daily_cost;

            db.upsert_daily_kpi(&DbDailyKpi {
                employee_id,
                date,
                billable_hours: round2(billable_hours),
                efficiency_rate: round2(efficiency_rate),
                profit_loss: round2(profit_loss),
                remote_sessions,
            })?;
            written += 1;
        }

        Ok(RecomputeOutcome {
            written,
            cancelled: false,
        })
    })?;

    info!(
        written = outcome.written,
        cancelled = outcome.cancelled,
        force_full,
        "KPI recompute finished"
    );
    Ok(outcome)
}

/// Observed date range of the raw tables, as shown by the progress endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPeriod {
    pub min_date: NaiveDate,
    pub max_date: NaiveDate,
    /// Inclusive day count of the range.
    pub total_days: i64,
}

/// Snapshot for the polling progress endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProgress {
    /// `current_kpis / expected_total * 100`; 0 when nothing is imported.
    pub progress: f64,
    /// KPI rows materialized so far.
    pub current_kpis: i64,
    /// Expected rows: days in the observed range times active employees.
    pub expected_total: i64,
    /// None until the first raw row lands.
    pub period: Option<ProgressPeriod>,
    /// Active employee count (the expected-total denominator factor).
    pub employees: i64,
}

pub fn import_progress(db: &AnalyticsDb) -> Result<ImportProgress, DbError> {
    let current_kpis = db.count_daily_kpis()?;
    let employees = db.count_active_employees()?;

    let period = db
        .observed_period()?
        .map(|(min_date, max_date)| ProgressPeriod {
            min_date,
            max_date,
            total_days: (max_date - min_date).num_days() + 1,
        });

    let expected_total = period.map_or(0, |p| p.total_days * employees);
    let progress = if expected_total > 0 {
        current_kpis as f64 / expected_total as f64 * 100.0
    } else {
        0.0
    };

    Ok(ImportProgress {
        progress,
        current_kpis,
        expected_total,
        period,
        employees,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::db::NewActivity;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn seed_activity(db: &AnalyticsDb, emp: i64, start: &str, hours: f64) {
        db.insert_activity(
            &NewActivity {
                employee_id: Some(emp),
                company_id: None,
                start_time: dt(start),
                end_time: None,
                duration_hours: hours,
                description: String::new(),
                external_ticket_id: None,
                billable: true,
                source_file: None,
            },
            false,
        )
        .unwrap();
    }

    fn fixture() -> (AnalyticsDb, AnalyticsConfig, i64) {
        let db = AnalyticsDb::open_in_memory().unwrap();
        let (emp, _) = db
            .insert_employee_if_absent("Franco", "Fiorellino", "technician", 120.0, None)
            .unwrap();
        (db, AnalyticsConfig::default(), emp)
    }

    #[test]
    fn test_full_day_is_exactly_100_percent() {
        let (db, config, emp) = fixture();
        seed_activity(&db, emp, "2026-01-05 09:00:00", 8.0);

        let outcome = recompute_all(&db, &config, false, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.written, 1);

        let kpi = db.get_daily_kpi(emp, &day("2026-01-05")).unwrap().unwrap();
        assert_eq!(kpi.efficiency_rate, 100.0);
        assert_eq!(kpi.billable_hours, 8.0);
        // 8h * 35/h - 120 daily cost
        assert_eq!(kpi.profit_loss, 160.0);
    }

    #[test]
    fn test_over_100_percent_not_clamped() {
        let (db, config, emp) = fixture();
        seed_activity(&db, emp, "2026-01-05 08:00:00", 10.0);

        recompute_all(&db, &config, false, &CancelFlag::new()).unwrap();
        let kpi = db.get_daily_kpi(emp, &day("2026-01-05")).unwrap().unwrap();
        assert_eq!(kpi.efficiency_rate, 125.0);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let (db, config, emp) = fixture();
        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.5);
        seed_activity(&db, emp, "2026-01-06 09:00:00", 7.0);

        recompute_all(&db, &config, true, &CancelFlag::new()).unwrap();
        let first = db.list_daily_kpis(emp).unwrap();

        recompute_all(&db, &config, true, &CancelFlag::new()).unwrap();
        let second = db.list_daily_kpis(emp).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_incremental_only_fills_missing_days() {
        let (db, config, emp) = fixture();
        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.0);
        recompute_all(&db, &config, false, &CancelFlag::new()).unwrap();

        seed_activity(&db, emp, "2026-01-06 09:00:00", 3.0);
        let outcome = recompute_all(&db, &config, false, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.written, 1);

        assert_eq!(db.list_daily_kpis(emp).unwrap().len(), 2);
    }

    #[test]
    fn test_force_full_rewrites_everything() {
        let (db, config, emp) = fixture();
        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.0);
        seed_activity(&db, emp, "2026-01-06 09:00:00", 3.0);
        recompute_all(&db, &config, false, &CancelFlag::new()).unwrap();

        let outcome = recompute_all(&db, &config, true, &CancelFlag::new()).unwrap();
        assert_eq!(outcome.written, 2);
    }

    #[test]
    fn test_cancelled_flag_stops_immediately() {
        let (db, config, emp) = fixture();
        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.0);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = recompute_all(&db, &config, false, &cancel).unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.written, 0);
    }

    #[test]
    fn test_progress_ratio() {
        let (db, _config, emp) = fixture();
        let empty = import_progress(&db).unwrap();
        assert_eq!(empty.progress, 0.0);
        assert!(empty.period.is_none());

        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.0);
        seed_activity(&db, emp, "2026-01-06 09:00:00", 3.0);

        // 2 observed days x 1 active employee, 0 rows materialized
        let before = import_progress(&db).unwrap();
        assert_eq!(before.expected_total, 2);
        assert_eq!(before.employees, 1);
        assert_eq!(before.progress, 0.0);
        let period = before.period.unwrap();
        assert_eq!(period.min_date, day("2026-01-05"));
        assert_eq!(period.max_date, day("2026-01-06"));
        assert_eq!(period.total_days, 2);

        // Materialize one of two expected rows
        db.upsert_daily_kpi(&DbDailyKpi {
            employee_id: emp,
            date: day("2026-01-05"),
            billable_hours: 2.0,
            efficiency_rate: 25.0,
            profit_loss: -50.0,
            remote_sessions: 0,
        })
        .unwrap();

        let half = import_progress(&db).unwrap();
        assert_eq!(half.current_kpis, 1);
        assert_eq!(half.progress, 50.0);
    }

    #[test]
    fn test_progress_serialization_shape() {
        let (db, _config, emp) = fixture();
        seed_activity(&db, emp, "2026-01-05 09:00:00", 2.0);

        let json = serde_json::to_value(import_progress(&db).unwrap()).unwrap();
        assert_eq!(json["currentKpis"], 0);
        assert_eq!(json["expectedTotal"], 1);
        assert_eq!(json["employees"], 1);
        assert_eq!(json["progress"], 0.0);
        assert_eq!(json["period"]["minDate"], "2026-01-05");
        assert_eq!(json["period"]["maxDate"], "2026-01-05");
        assert_eq!(json["period"]["totalDays"], 1);
    }
}
