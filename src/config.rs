//! Runtime configuration for the analytics engine.
//!
//! Loaded from a JSON file (the CLI looks at `~/.workmetrics/config.json` by
//! default); every field has a sensible default so an empty `{}` is valid.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(String, serde_json::Error),
}

/// Policy for a CSV row whose name field resolves to multiple employees.
///
/// The source data is ambiguous about whether "Franco Fiorellino/Matteo Signo,
/// 3h" means 3 hours each or 3 hours split. `SplitEvenly` is the default;
/// `DuplicateFull` reproduces the legacy behavior of crediting the full
/// duration to every resolved employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutPolicy {
    DuplicateFull,
    SplitEvenly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsConfig {
    /// Standard workday length, denominator of the efficiency rate.
    pub standard_workday_hours: f64,
    /// Daily cost assigned to auto-created employees.
    pub default_daily_cost: f64,
    /// Effective hourly rate billed to clients.
    pub billing_hourly_rate: f64,
    /// Efficiency below this is flagged as a warning on dashboards.
    pub efficiency_warning_threshold: f64,
    /// Efficiency below this is flagged as critical.
    pub efficiency_critical_threshold: f64,
    /// Two activity rows within this window are dedup candidates.
    pub dedup_window_secs: i64,
    /// Jaro-Winkler threshold shared by the resolver's fuzzy name match and
    /// the dedup engine's description comparison.
    pub similarity_threshold: f64,
    /// Soft dedup inserts duplicates flagged `is_duplicate`; hard dedup skips
    /// them entirely.
    pub soft_dedup: bool,
    /// See [`FanOutPolicy`].
    pub fan_out_policy: FanOutPolicy,
    /// Minimum length for a name fragment to be considered a person.
    pub min_name_len: usize,
    /// Non-person tokens rejected by the resolver's validity screen, in
    /// addition to names found in the vehicles table. Compared lowercased.
    pub name_blacklist: Vec<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            standard_workday_hours: 8.0,
            default_daily_cost: 120.0,
            billing_hourly_rate: 35.0,
            efficiency_warning_threshold: 60.0,
            efficiency_critical_threshold: 40.0,
            dedup_window_secs: 180,
            similarity_threshold: 0.85,
            soft_dedup: true,
            fan_out_policy: FanOutPolicy::SplitEvenly,
            min_name_len: 3,
            name_blacklist: default_blacklist(),
        }
    }
}

fn default_blacklist() -> Vec<String> {
    [
        // System accounts seen in exports
        "admin", "info", "system", "test", "support", "supporto", "helpdesk",
        "reception", "magazzino",
        // Vehicle model names that polluted the legacy employee table
        "punto", "ducato", "panda", "fiorino", "doblo",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl AnalyticsConfig {
    /// Load config from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(display.clone(), e))?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(display, e))
    }

    /// Load config if the file exists, otherwise defaults. Used by the CLI so
    /// a fresh install works without writing a config first.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_all_defaults() {
        let config: AnalyticsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.standard_workday_hours, 8.0);
        assert_eq!(config.dedup_window_secs, 180);
        assert_eq!(config.fan_out_policy, FanOutPolicy::SplitEvenly);
        assert!(config.soft_dedup);
    }

    #[test]
    fn test_partial_override() {
        let config: AnalyticsConfig = serde_json::from_str(
            r#"{"standardWorkdayHours": 7.5, "fanOutPolicy": "duplicate_full"}"#,
        )
        .unwrap();
        assert_eq!(config.standard_workday_hours, 7.5);
        assert_eq!(config.fan_out_policy, FanOutPolicy::DuplicateFull);
        // untouched fields keep defaults
        assert_eq!(config.similarity_threshold, 0.85);
    }

    #[test]
    fn test_blacklist_contains_vehicles_and_system_accounts() {
        let config = AnalyticsConfig::default();
        for token in ["punto", "admin", "info", "test"] {
            assert!(config.name_blacklist.iter().any(|b| b == token), "{token}");
        }
    }
}
