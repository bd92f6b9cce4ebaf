//! Read-side queries over the derived KPI table. Dashboards and the CLI
//! consume these; nothing here mutates.

mod reports;

pub use reports::*;
