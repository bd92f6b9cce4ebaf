//! Shared type definitions for the database layer.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
///
/// Anything surfacing as `Sqlite` or `CreateDir` means the store itself is
/// unavailable or broken — callers treat these as fatal and roll back the
/// operation in flight.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// A row from the `employees` master table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEmployee {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub daily_cost: f64,
    pub active: bool,
    /// Where this row came from: "manual" or the CSV file that auto-created it.
    pub source: Option<String>,
    pub created_at: String,
}

/// A row from `employee_aliases`. Never authoritative on its own — always
/// resolves back to an employee id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAlias {
    pub id: i64,
    pub employee_id: i64,
    pub alias_first_name: String,
    pub alias_last_name: String,
    pub alias_norm: String,
    pub source: Option<String>,
    pub created_at: String,
}

/// A row from the `companies` master table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCompany {
    pub id: i64,
    pub name: String,
    pub short_name: Option<String>,
    pub active: bool,
    pub created_at: String,
}

/// A row from the `vehicles` table. Exists to be excluded from the employee
/// identity space — vehicle names must never resolve to an employee.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbVehicle {
    pub id: i64,
    pub name: String,
    pub plate: Option<String>,
    pub cost_per_km: f64,
}

/// A raw imported activity row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbActivity {
    pub id: i64,
    pub employee_id: Option<i64>,
    pub company_id: Option<i64>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub duration_hours: f64,
    pub description: String,
    pub external_ticket_id: Option<String>,
    pub billable: bool,
    pub is_duplicate: bool,
    pub source_file: Option<String>,
    pub imported_at: String,
}

/// Candidate activity row produced by the ingestion pipeline, before
/// deduplication decides its fate.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub employee_id: Option<i64>,
    pub company_id: Option<i64>,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>,
    pub duration_hours: f64,
    pub description: String,
    pub external_ticket_id: Option<String>,
    pub billable: bool,
    pub source_file: Option<String>,
}

/// A raw clock-in/clock-out row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbTimeClock {
    pub id: i64,
    pub employee_id: i64,
    pub clock_in: NaiveDateTime,
    pub clock_out: Option<NaiveDateTime>,
    pub is_duplicate: bool,
    pub source_file: Option<String>,
}

/// A raw remote-session row (TeamViewer export).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRemoteSession {
    pub id: i64,
    pub employee_id: i64,
    pub session_start: NaiveDateTime,
    pub duration_minutes: i64,
    pub remote_host: Option<String>,
    pub is_duplicate: bool,
    pub source_file: Option<String>,
}

/// A derived row from `daily_kpis`. Pure function of the raw tables for that
/// (employee, date); fully overwritten on recompute.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbDailyKpi {
    pub employee_id: i64,
    pub date: NaiveDate,
    pub billable_hours: f64,
    pub efficiency_rate: f64,
    pub profit_loss: f64,
    pub remote_sessions: i64,
}

/// Minimal activity projection used by the dedup candidate query.
#[derive(Debug, Clone)]
pub struct ActivityMatchRow {
    pub id: i64,
    pub start_time: NaiveDateTime,
    pub duration_hours: f64,
    pub description: String,
    pub is_duplicate: bool,
}
