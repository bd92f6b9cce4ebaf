//! Activity deduplication.
//!
//! Exports overlap: the same intervention shows up in a weekly export and
//! again in the monthly one, sometimes with the description retyped. Two
//! defenses:
//!
//! - insert-time check ([`insert_with_dedup`]): every candidate row is
//!   compared against stored rows for the same employee before insert
//! - retrospective scan ([`scan_duplicates`]): sweeps rows already in the
//!   table, for data imported before the insert-time check existed or with a
//!   narrower window
//!
//! Soft mode (the default) keeps duplicate rows, flagged `is_duplicate`, so a
//! bad match can be undone by flipping the flag. Hard mode drops them.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::AnalyticsConfig;
use crate::db::{AnalyticsDb, DbError, NewActivity};

/// What happened to one candidate row at insert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupOutcome {
    /// No match; inserted normally.
    Inserted(i64),
    /// Matched a stored row; inserted with the duplicate flag (soft mode).
    MarkedDuplicate(i64),
    /// Matched a stored row; not inserted (hard mode).
    Skipped,
}

impl DedupOutcome {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, DedupOutcome::Inserted(_))
    }
}

/// Two rows are duplicates when they belong to the same employee and either:
/// - their start times are within the window AND their descriptions are
///   identical or near-identical, or
/// - start time and duration match exactly (same event, description retyped
///   beyond recognition).
fn is_duplicate_of(
    candidate: &NewActivity,
    stored_start: &chrono::NaiveDateTime,
    stored_duration: f64,
    stored_description: &str,
    window_secs: i64,
    similarity_threshold: f64,
) -> bool {
    let delta = (candidate.start_time - *stored_start).num_seconds().abs();

    if delta < window_secs {
        let a = candidate.description.trim().to_lowercase();
        let b = stored_description.trim().to_lowercase();
        if a == b || strsim::jaro_winkler(&a, &b) >= similarity_threshold {
            return true;
        }
    }

    delta == 0 && (candidate.duration_hours - stored_duration).abs() < f64::EPSILON
}

/// Insert an activity candidate, checking it against stored rows first.
///
/// Rows without a resolved employee can't collide on identity and are always
/// inserted plain.
pub fn insert_with_dedup(
    db: &AnalyticsDb,
    config: &AnalyticsConfig,
    candidate: &NewActivity,
) -> Result<DedupOutcome, DbError> {
    let Some(employee_id) = candidate.employee_id else {
        let id = db.insert_activity(candidate, false)?;
        return Ok(DedupOutcome::Inserted(id));
    };

    // Exact-triple matches can sit outside the window, so query with at least
    // one second of slack even when the window is zero.
    let window = config.dedup_window_secs.max(1);
    let matches = db.find_activity_matches(employee_id, &candidate.start_time, window)?;

    let duplicate = matches.iter().any(|m| {
        !m.is_duplicate
            && is_duplicate_of(
                candidate,
                &m.start_time,
                m.duration_hours,
                &m.description,
                config.dedup_window_secs,
                config.similarity_threshold,
            )
    });

    if !duplicate {
        let id = db.insert_activity(candidate, false)?;
        return Ok(DedupOutcome::Inserted(id));
    }

    if config.soft_dedup {
        let id = db.insert_activity(candidate, true)?;
        debug!(activity_id = id, "candidate marked duplicate");
        Ok(DedupOutcome::MarkedDuplicate(id))
    } else {
        debug!(start = %candidate.start_time, "duplicate candidate skipped");
        Ok(DedupOutcome::Skipped)
    }
}

/// Report from the retrospective duplicate scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupScanReport {
    /// Groups of colliding rows found.
    pub groups: usize,
    /// Rows newly flagged as duplicates (0 on a dry run).
    pub flagged: usize,
    /// Rows that would be flagged (dry run only mirrors this into `flagged=0`).
    pub candidates: usize,
    pub dry_run: bool,
}

/// Sweep stored activities for rows colliding on (employee, time-bucketed
/// start, duration). The earliest row of each group is kept; the rest get the
/// duplicate flag. With `dry_run`, nothing is written.
pub fn scan_duplicates(
    db: &AnalyticsDb,
    bucket_secs: i64,
    dry_run: bool,
) -> Result<DedupScanReport, DbError> {
    let groups = db.duplicate_activity_groups(bucket_secs)?;

    let mut candidates = 0;
    let mut flagged = 0;

    for group in &groups {
        // ids are ascending; first one wins
        for &id in &group.ids[1..] {
            candidates += 1;
            if !dry_run {
                db.set_activity_duplicate(id, true)?;
                flagged += 1;
            }
        }
    }

    info!(
        groups = groups.len(),
        candidates, flagged, dry_run, "duplicate scan finished"
    );

    Ok(DedupScanReport {
        groups: groups.len(),
        flagged,
        candidates,
        dry_run,
    })
}
