//! workmetrics: employee analytics over CSV exports.
//!
//! Ingests activity, clock-in and remote-session CSV exports into SQLite,
//! resolving free-text name fields against an employee master list (with
//! alias learning and fuzzy matching), deduplicating re-imported rows, and
//! materializing daily KPI rows (billable hours, efficiency rate,
//! profit/loss, session counts) that dashboards read.
//!
//! Pipeline: CSV file → [`import::Importer`] → [`resolver::NameResolver`]
//! per row → [`dedup`] per candidate → store → [`kpi::recompute_all`] →
//! `daily_kpis`.

pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod import;
pub mod kpi;
pub mod migrations;
pub mod queries;
pub mod resolver;
pub mod util;
