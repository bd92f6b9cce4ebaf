//! Name/entity resolution for free-text name fields in CSV imports.
//!
//! A name cell may encode several people ("Franco Fiorellino/Matteo Signo"),
//! an abbreviation ("F. Fiorellino"), or something that is not a person at all
//! (a vehicle model, a system account, a hostname). Resolution order:
//!
//! 1. split on multi-name separators
//! 2. normalize each fragment
//! 3. validity screen — rejected fragments never create anything
//! 4. exact match against employees and aliases (cache first)
//! 5. fuzzy match (jaro_winkler) — a hit writes back an alias row so the next
//!    lookup is exact
//! 6. auto-create, logged for audit
//!
//! The cache is rebuilt per batch run and owned by the resolver instance;
//! there is deliberately no process-wide name map.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::AnalyticsConfig;
use crate::db::{AnalyticsDb, DbError};
use crate::util::{collapse_whitespace, is_numeric_token, normalize_name, split_first_last};

/// Words that separate multiple names inside one field. Checked as whole
/// tokens, case-insensitive. Italian exports use "e"/"con".
const SEPARATOR_WORDS: &[&str] = &["e", "and", "with", "con"];

fn hostname_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9_-]*(\.[a-z0-9_-]+)+$").expect("valid hostname regex")
    })
}

/// Why a fragment was rejected by the validity screen (or left unresolved).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    TooShort,
    Email,
    Numeric,
    HostLike,
    Blacklisted,
    Vehicle,
    /// Single token matching more than one employee's last name.
    Ambiguous,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty fragment",
            RejectReason::TooShort => "fragment too short",
            RejectReason::Email => "looks like an email address",
            RejectReason::Numeric => "purely numeric",
            RejectReason::HostLike => "looks like a hostname",
            RejectReason::Blacklisted => "blacklisted non-person token",
            RejectReason::Vehicle => "matches a vehicle name",
            RejectReason::Ambiguous => "matches more than one employee",
        }
    }
}

/// Result of resolving one raw name field (which may contain several names).
#[derive(Debug, Default)]
pub struct FieldResolution {
    /// Resolved employee ids, in field order, deduplicated.
    pub employee_ids: Vec<i64>,
    /// Fragments the screen rejected, with reasons. These never create rows.
    pub rejected: Vec<(String, RejectReason)>,
    /// Employees auto-created by this call.
    pub created: usize,
    /// Alias rows written back by fuzzy matches.
    pub aliased: usize,
}

/// In-memory name maps, rebuilt at the start of each batch run.
struct ResolverCache {
    /// Normalized "first last" AND "last first" → employee id.
    employees: HashMap<String, i64>,
    /// Canonical normalized full names, for the fuzzy scan.
    canonical: Vec<(String, i64)>,
    /// Normalized alias string → employee id.
    aliases: HashMap<String, i64>,
    /// Normalized last name → ids (single-token lookups).
    last_names: HashMap<String, Vec<i64>>,
    /// Normalized company name → id.
    companies: HashMap<String, i64>,
    /// Normalized vehicle names.
    vehicles: HashSet<String>,
}

impl ResolverCache {
    fn load(db: &AnalyticsDb) -> Result<Self, DbError> {
        let mut employees = HashMap::new();
        let mut canonical = Vec::new();
        let mut last_names: HashMap<String, Vec<i64>> = HashMap::new();

        for emp in db.list_employees(false)? {
            let first = normalize_name(&emp.first_name);
            let last = normalize_name(&emp.last_name);
            let full = collapse_whitespace(&format!("{first} {last}"));
            let reversed = collapse_whitespace(&format!("{last} {first}"));
            employees.insert(full.clone(), emp.id);
            employees.insert(reversed, emp.id);
            canonical.push((full, emp.id));
            if !last.is_empty() {
                last_names.entry(last).or_default().push(emp.id);
            }
        }

        let mut aliases = HashMap::new();
        for alias in db.list_aliases()? {
            aliases.insert(alias.alias_norm, alias.employee_id);
        }

        let mut companies = HashMap::new();
        for company in db.list_companies(false)? {
            companies.insert(normalize_name(&company.name), company.id);
        }

        let vehicles = db.list_vehicle_names()?.into_iter().collect();

        Ok(Self {
            employees,
            canonical,
            aliases,
            last_names,
            companies,
            vehicles,
        })
    }

    fn insert_employee(&mut self, first_norm: &str, last_norm: &str, id: i64) {
        let full = collapse_whitespace(&format!("{first_norm} {last_norm}"));
        let reversed = collapse_whitespace(&format!("{last_norm} {first_norm}"));
        self.employees.insert(full.clone(), id);
        self.employees.insert(reversed, id);
        self.canonical.push((full, id));
        if !last_norm.is_empty() {
            let ids = self.last_names.entry(last_norm.to_string()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
}

pub struct NameResolver<'a> {
    db: &'a AnalyticsDb,
    config: &'a AnalyticsConfig,
    cache: ResolverCache,
}

impl<'a> NameResolver<'a> {
    /// Build a resolver with a fresh cache. One per batch run.
    pub fn new(db: &'a AnalyticsDb, config: &'a AnalyticsConfig) -> Result<Self, DbError> {
        let cache = ResolverCache::load(db)?;
        Ok(Self { db, config, cache })
    }

    /// Split a raw name field into candidate fragments. Splits on `/ , ; & +`
    /// and on standalone separator words.
    pub fn split_name_field(raw: &str) -> Vec<String> {
        let mut fragments = Vec::new();
        for piece in raw.split(['/', ',', ';', '&', '+']) {
            let mut current: Vec<&str> = Vec::new();
            for token in piece.split_whitespace() {
                if SEPARATOR_WORDS.contains(&token.to_lowercase().as_str()) {
                    if !current.is_empty() {
                        fragments.push(current.join(" "));
                        current.clear();
                    }
                } else {
                    current.push(token);
                }
            }
            if !current.is_empty() {
                fragments.push(current.join(" "));
            }
        }
        fragments
    }

    /// Validity screen. Runs before any lookup; a rejected fragment must not
    /// create an employee, an alias, or anything else.
    fn screen(&self, norm: &str) -> Option<RejectReason> {
        if norm.is_empty() {
            return Some(RejectReason::Empty);
        }
        if norm.chars().count() < self.config.min_name_len {
            return Some(RejectReason::TooShort);
        }
        if norm.contains('@') {
            return Some(RejectReason::Email);
        }
        if is_numeric_token(norm) {
            return Some(RejectReason::Numeric);
        }
        // Single-token only: "f. fiorellino" must not look like a domain
        if !norm.contains(' ') && hostname_re().is_match(norm) {
            return Some(RejectReason::HostLike);
        }
        if self.config.name_blacklist.iter().any(|b| b == norm) {
            return Some(RejectReason::Blacklisted);
        }
        if self.cache.vehicles.contains(norm) {
            return Some(RejectReason::Vehicle);
        }
        None
    }

    /// Resolve one raw name field to zero or more employee ids.
    ///
    /// Never fails on a bad name — bad fragments land in `rejected` and the
    /// caller decides what to do with the row. Only storage errors propagate.
    pub fn resolve_field(
        &mut self,
        raw: &str,
        source_file: &str,
    ) -> Result<FieldResolution, DbError> {
        let mut result = FieldResolution::default();

        for fragment in Self::split_name_field(raw) {
            let norm = normalize_name(&fragment);

            if let Some(reason) = self.screen(&norm) {
                debug!(fragment = %fragment, reason = reason.as_str(), "name fragment rejected");
                result.rejected.push((fragment, reason));
                continue;
            }

            match self.resolve_fragment(&fragment, &norm, source_file, &mut result)? {
                Some(id) => {
                    if !result.employee_ids.contains(&id) {
                        result.employee_ids.push(id);
                    }
                }
                None => result.rejected.push((fragment, RejectReason::Ambiguous)),
            }
        }

        Ok(result)
    }

    fn resolve_fragment(
        &mut self,
        fragment: &str,
        norm: &str,
        source_file: &str,
        result: &mut FieldResolution,
    ) -> Result<Option<i64>, DbError> {
        // Exact: alias table first (it exists to make repeat lookups exact),
        // then both orderings of the employee name.
        if let Some(&id) = self.cache.aliases.get(norm) {
            return Ok(Some(id));
        }
        if let Some(&id) = self.cache.employees.get(norm) {
            return Ok(Some(id));
        }

        // Single token: unique last-name match, ambiguity rejects.
        if !norm.contains(' ') {
            if let Some(ids) = self.cache.last_names.get(norm) {
                if ids.len() == 1 {
                    return Ok(Some(ids[0]));
                }
                return Ok(None);
            }
        }

        // Fuzzy: best Jaro-Winkler over canonical names and known aliases.
        if let Some(id) = self.fuzzy_match(norm) {
            let (first, last) = split_first_last(&collapse_whitespace(fragment));
            self.db.insert_alias(id, &first, &last, Some(source_file))?;
            self.cache.aliases.insert(norm.to_string(), id);
            result.aliased += 1;
            info!(alias = %fragment, employee_id = id, "fuzzy match recorded as alias");
            return Ok(Some(id));
        }

        // Miss: auto-create. Logged loudly — spurious auto-creations polluted
        // the legacy master list, and the log is how they get audited.
        let (first, last) = split_first_last(&collapse_whitespace(fragment));
        let (id, created) = self.db.insert_employee_if_absent(
            &first,
            &last,
            "technician",
            self.config.default_daily_cost,
            Some(source_file),
        )?;
        if created {
            warn!(
                name = %fragment,
                employee_id = id,
                source_file = %source_file,
                "auto-created employee from unresolved name"
            );
            result.created += 1;
        }
        self.cache.insert_employee(&normalize_name(&first), &normalize_name(&last), id);
        Ok(Some(id))
    }

    fn fuzzy_match(&self, norm: &str) -> Option<i64> {
        let threshold = self.config.similarity_threshold;
        let mut best: Option<(f64, i64)> = None;

        for (name, id) in &self.cache.canonical {
            let score = strsim::jaro_winkler(norm, name);
            if score >= threshold && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, *id));
            }
        }
        for (alias, id) in &self.cache.aliases {
            let score = strsim::jaro_winkler(norm, alias);
            if score >= threshold && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, *id));
            }
        }

        best.map(|(_, id)| id)
    }

    /// Resolve a company field: exact → fuzzy → auto-create.
    ///
    /// Companies have no alias table; a fuzzy hit just returns the id.
    pub fn resolve_company(
        &mut self,
        raw: &str,
        _source_file: &str,
    ) -> Result<Option<i64>, DbError> {
        let norm = normalize_name(raw);
        if norm.is_empty() || is_numeric_token(&norm) {
            return Ok(None);
        }

        if let Some(&id) = self.cache.companies.get(&norm) {
            return Ok(Some(id));
        }

        let threshold = self.config.similarity_threshold;
        let mut best: Option<(f64, i64)> = None;
        for (name, id) in &self.cache.companies {
            let score = strsim::jaro_winkler(&norm, name);
            if score >= threshold && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, *id));
            }
        }
        if let Some((_, id)) = best {
            return Ok(Some(id));
        }

        let display_name = collapse_whitespace(raw);
        let (id, created) = self.db.insert_company_if_absent(&display_name, None)?;
        if created {
            info!(company = %display_name, company_id = id, "auto-created company from import");
        }
        self.cache.companies.insert(norm, id);
        Ok(Some(id))
    }
}
