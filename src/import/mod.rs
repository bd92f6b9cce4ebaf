//! CSV ingestion pipeline.
//!
//! One [`Importer::process_file`] call handles one export file: detect its
//! kind, sniff delimiter and encoding, resolve names and companies per row,
//! fan candidate rows out per resolved employee, and dispatch activity
//! candidates through the dedup engine. The whole file runs inside a single
//! transaction; a storage failure rolls everything back, while bad rows only
//! accumulate warnings.

pub mod detect;
pub mod parse;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AnalyticsConfig, FanOutPolicy};
use crate::db::{AnalyticsDb, DbError, NewActivity, UpsertOutcome};
use crate::dedup::{insert_with_dedup, DedupOutcome};
use crate::error::{ImportError, ImportWarning, WarningKind};
use crate::resolver::NameResolver;

pub use detect::FileKind;

/// Aggregate counters for one imported file.
///
/// `processed` counts data rows read; the other counters count stored rows,
/// so a multi-name activity row can contribute more than one insert.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub warnings: Vec<ImportWarning>,
}

/// Result of a batch run over a drop directory: one entry per CSV file, in
/// name order. Per-file failures don't abort the batch.
pub struct FileReport {
    pub path: PathBuf,
    pub result: Result<ImportSummary, ImportError>,
}

enum ColumnMap {
    Activity(ActivityColumns),
    TimeClock(TimeClockColumns),
    Session(SessionColumns),
}

impl ColumnMap {
    /// Bind header columns for the detected kind. A signature match with a
    /// missing required column still means the layout is unknown to us.
    fn from_headers(kind: FileKind, headers: &[String]) -> Option<Self> {
        match kind {
            FileKind::Activity => ActivityColumns::from_headers(headers).map(Self::Activity),
            FileKind::TimeClock => TimeClockColumns::from_headers(headers).map(Self::TimeClock),
            FileKind::RemoteSession => SessionColumns::from_headers(headers).map(Self::Session),
        }
    }
}

struct ActivityColumns {
    name: usize,
    start: usize,
    end: Option<usize>,
    duration: usize,
    description: Option<usize>,
    company: Option<usize>,
    ticket: Option<usize>,
    billable: Option<usize>,
}

struct TimeClockColumns {
    name: usize,
    date: usize,
    time_in: usize,
    time_out: Option<usize>,
}

struct SessionColumns {
    name: usize,
    start: usize,
    minutes: usize,
    host: Option<usize>,
}

fn find_col(headers: &[String], candidates: &[&str]) -> Option<usize> {
    let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
    candidates
        .iter()
        .find_map(|c| lower.iter().position(|h| h == c))
}

impl ActivityColumns {
    fn from_headers(headers: &[String]) -> Option<Self> {
        Some(Self {
            name: find_col(headers, &["operatore", "tecnico", "dipendente", "utente", "nome"])?,
            start: find_col(headers, &["iniziata il", "inizio", "data inizio", "data"])?,
            end: find_col(headers, &["terminata il", "fine", "data fine"]),
            duration: find_col(headers, &["durata", "ore", "durata ore"])?,
            description: find_col(headers, &["descrizione", "attivita", "note"]),
            company: find_col(headers, &["azienda", "cliente", "societa", "ragione sociale"]),
            ticket: find_col(headers, &["ticket", "id ticket", "numero ticket"]),
            billable: find_col(headers, &["fatturabile", "billable"]),
        })
    }
}

impl TimeClockColumns {
    fn from_headers(headers: &[String]) -> Option<Self> {
        Some(Self {
            name: find_col(headers, &["dipendente", "operatore", "nome"])?,
            date: find_col(headers, &["data", "giorno"])?,
            time_in: find_col(headers, &["ora_inizio"])?,
            time_out: find_col(headers, &["ora_fine"]),
        })
    }
}

impl SessionColumns {
    fn from_headers(headers: &[String]) -> Option<Self> {
        Some(Self {
            name: find_col(headers, &["utente", "operatore", "assegnatario", "nome"])?,
            start: find_col(headers, &["inizio", "data inizio", "iniziata il", "data"])?,
            minutes: find_col(headers, &["durata_minuti"])?,
            host: find_col(headers, &["computer", "host", "dispositivo"]),
        })
    }
}

pub struct Importer<'a> {
    db: &'a AnalyticsDb,
    config: &'a AnalyticsConfig,
}

impl<'a> Importer<'a> {
    pub fn new(db: &'a AnalyticsDb, config: &'a AnalyticsConfig) -> Self {
        Self { db, config }
    }

    /// Import one CSV file. `declared` overrides detection when the caller
    /// already knows the file kind.
    pub fn process_file(
        &self,
        path: &Path,
        declared: Option<FileKind>,
    ) -> Result<ImportSummary, ImportError> {
        let bytes = std::fs::read(path).map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let text = detect::decode_bytes(&bytes);

        let header_line = text
            .lines()
            .next()
            .ok_or_else(|| ImportError::UnknownFileType(path.to_path_buf()))?;
        let delimiter = detect::sniff_delimiter(header_line);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| ImportError::Csv {
                path: path.to_path_buf(),
                source,
            })?
            .iter()
            .map(String::from)
            .collect();

        let kind = declared
            .or_else(|| detect::kind_from_filename(path))
            .or_else(|| detect::kind_from_header(&headers))
            .ok_or_else(|| ImportError::UnknownFileType(path.to_path_buf()))?;

        let source_file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let cols = ColumnMap::from_headers(kind, &headers)
            .ok_or_else(|| ImportError::UnknownFileType(path.to_path_buf()))?;

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record.map_err(|source| ImportError::Csv {
                path: path.to_path_buf(),
                source,
            })?);
        }

        let summary = self.db.with_transaction(|db| {
            let mut resolver = NameResolver::new(db, self.config)?;
            match &cols {
                ColumnMap::Activity(cols) => {
                    self.import_activities(db, &mut resolver, &rows, cols, &source_file)
                }
                ColumnMap::TimeClock(cols) => {
                    self.import_time_clock(db, &mut resolver, &rows, cols, &source_file)
                }
                ColumnMap::Session(cols) => {
                    self.import_sessions(db, &mut resolver, &rows, cols, &source_file)
                }
            }
        })?;

        info!(
            file = %source_file,
            kind = kind.as_str(),
            processed = summary.processed,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            "file import finished"
        );
        Ok(summary)
    }

    /// Import every `.csv` file in a drop directory, in name order. A file
    /// that fails detection or parsing is reported and skipped; only storage
    /// failures abort the batch.
    pub fn process_dir(&self, dir: &Path) -> Result<Vec<FileReport>, ImportError> {
        let entries = std::fs::read_dir(dir).map_err(|source| ImportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut reports = Vec::with_capacity(paths.len());
        for path in paths {
            match self.process_file(&path, None) {
                Err(e) if e.is_fatal() => return Err(e),
                result => {
                    if let Err(e) = &result {
                        warn!(file = %path.display(), error = %e, "file skipped");
                    }
                    reports.push(FileReport { path, result });
                }
            }
        }
        Ok(reports)
    }

    fn import_activities(
        &self,
        db: &AnalyticsDb,
        resolver: &mut NameResolver<'_>,
        rows: &[csv::StringRecord],
        cols: &ActivityColumns,
        source_file: &str,
    ) -> Result<ImportSummary, DbError> {
        let mut summary = ImportSummary::default();

        for (i, record) in rows.iter().enumerate() {
            let row_no = i + 1;
            summary.processed += 1;
            let cell = |idx: usize| record.get(idx).unwrap_or("");

            let name_raw = cell(cols.name);
            let resolution = resolver.resolve_field(name_raw, source_file)?;
            for (fragment, reason) in &resolution.rejected {
                summary.warnings.push(
                    ImportWarning::new(
                        row_no,
                        WarningKind::NameRejected,
                        format!("name fragment rejected: {}", reason.as_str()),
                    )
                    .with_value(fragment.clone()),
                );
            }
            if resolution.employee_ids.is_empty() {
                summary.skipped += 1;
                continue;
            }

            let Some(start_time) = parse::parse_datetime(cell(cols.start)) else {
                summary.skipped += 1;
                summary.warnings.push(
                    ImportWarning::new(row_no, WarningKind::RowParse, "unparseable start time")
                        .with_value(cell(cols.start)),
                );
                continue;
            };
            let Some(total_hours) = parse::parse_duration_hours(cell(cols.duration)) else {
                summary.skipped += 1;
                summary.warnings.push(
                    ImportWarning::new(row_no, WarningKind::RowParse, "unparseable duration")
                        .with_value(cell(cols.duration)),
                );
                continue;
            };
            let end_time = cols.end.and_then(|idx| parse::parse_datetime(cell(idx)));

            let company_id = match cols.company {
                Some(idx) if !cell(idx).trim().is_empty() => {
                    let raw = cell(idx);
                    let resolved = resolver.resolve_company(raw, source_file)?;
                    if resolved.is_none() {
                        summary.warnings.push(
                            ImportWarning::new(
                                row_no,
                                WarningKind::CompanyUnresolved,
                                "company field could not be resolved",
                            )
                            .with_value(raw),
                        );
                    }
                    resolved
                }
                _ => None,
            };

            let n = resolution.employee_ids.len() as f64;
            let per_employee_hours = match self.config.fan_out_policy {
                FanOutPolicy::DuplicateFull => total_hours,
                FanOutPolicy::SplitEvenly => total_hours / n,
            };

            for &employee_id in &resolution.employee_ids {
                let candidate = NewActivity {
                    employee_id: Some(employee_id),
                    company_id,
                    start_time,
                    end_time,
                    duration_hours: per_employee_hours,
                    description: cols
                        .description
                        .map(|idx| cell(idx).to_string())
                        .unwrap_or_default(),
                    external_ticket_id: cols
                        .ticket
                        .map(|idx| cell(idx).trim())
                        .filter(|t| !t.is_empty())
                        .map(String::from),
                    billable: cols
                        .billable
                        .map(|idx| parse::parse_billable(cell(idx)))
                        .unwrap_or(true),
                    source_file: Some(source_file.to_string()),
                };

                match insert_with_dedup(db, self.config, &candidate)? {
                    DedupOutcome::Inserted(_) => summary.inserted += 1,
                    DedupOutcome::MarkedDuplicate(_) | DedupOutcome::Skipped => {
                        summary.duplicates += 1
                    }
                }
            }
        }

        Ok(summary)
    }

    fn import_time_clock(
        &self,
        db: &AnalyticsDb,
        resolver: &mut NameResolver<'_>,
        rows: &[csv::StringRecord],
        cols: &TimeClockColumns,
        source_file: &str,
    ) -> Result<ImportSummary, DbError> {
        let mut summary = ImportSummary::default();

        for (i, record) in rows.iter().enumerate() {
            let row_no = i + 1;
            summary.processed += 1;
            let cell = |idx: usize| record.get(idx).unwrap_or("");

            let resolution = resolver.resolve_field(cell(cols.name), source_file)?;
            for (fragment, reason) in &resolution.rejected {
                summary.warnings.push(
                    ImportWarning::new(
                        row_no,
                        WarningKind::NameRejected,
                        format!("name fragment rejected: {}", reason.as_str()),
                    )
                    .with_value(fragment.clone()),
                );
            }
            if resolution.employee_ids.is_empty() {
                summary.skipped += 1;
                continue;
            }

            let Some(clock_in) = parse::parse_date_time_pair(cell(cols.date), cell(cols.time_in))
            else {
                summary.skipped += 1;
                summary.warnings.push(
                    ImportWarning::new(row_no, WarningKind::RowParse, "unparseable clock-in")
                        .with_value(format!("{} {}", cell(cols.date), cell(cols.time_in))),
                );
                continue;
            };
            let clock_out = cols
                .time_out
                .and_then(|idx| parse::parse_date_time_pair(cell(cols.date), cell(idx)));

            for &employee_id in &resolution.employee_ids {
                match db.upsert_time_clock(
                    employee_id,
                    &clock_in,
                    clock_out.as_ref(),
                    Some(source_file),
                )? {
                    UpsertOutcome::Inserted => summary.inserted += 1,
                    UpsertOutcome::Updated => summary.updated += 1,
                    UpsertOutcome::Ignored => summary.duplicates += 1,
                }
            }
        }

        Ok(summary)
    }

    fn import_sessions(
        &self,
        db: &AnalyticsDb,
        resolver: &mut NameResolver<'_>,
        rows: &[csv::StringRecord],
        cols: &SessionColumns,
        source_file: &str,
    ) -> Result<ImportSummary, DbError> {
        let mut summary = ImportSummary::default();

        for (i, record) in rows.iter().enumerate() {
            let row_no = i + 1;
            summary.processed += 1;
            let cell = |idx: usize| record.get(idx).unwrap_or("");

            let resolution = resolver.resolve_field(cell(cols.name), source_file)?;
            for (fragment, reason) in &resolution.rejected {
                summary.warnings.push(
                    ImportWarning::new(
                        row_no,
                        WarningKind::NameRejected,
                        format!("name fragment rejected: {}", reason.as_str()),
                    )
                    .with_value(fragment.clone()),
                );
            }
            if resolution.employee_ids.is_empty() {
                summary.skipped += 1;
                continue;
            }

            let Some(session_start) = parse::parse_datetime(cell(cols.start)) else {
                summary.skipped += 1;
                summary.warnings.push(
                    ImportWarning::new(row_no, WarningKind::RowParse, "unparseable session start")
                        .with_value(cell(cols.start)),
                );
                continue;
            };
            let Some(duration_minutes) = parse::parse_duration_minutes(cell(cols.minutes)) else {
                summary.skipped += 1;
                summary.warnings.push(
                    ImportWarning::new(row_no, WarningKind::RowParse, "unparseable duration")
                        .with_value(cell(cols.minutes)),
                );
                continue;
            };
            let host = cols
                .host
                .map(|idx| cell(idx).trim())
                .filter(|h| !h.is_empty());

            for &employee_id in &resolution.employee_ids {
                match db.insert_remote_session(
                    employee_id,
                    &session_start,
                    duration_minutes,
                    host,
                    Some(source_file),
                )? {
                    UpsertOutcome::Inserted => summary.inserted += 1,
                    UpsertOutcome::Updated => summary.updated += 1,
                    UpsertOutcome::Ignored => summary.duplicates += 1,
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn fixture() -> (AnalyticsDb, AnalyticsConfig) {
        let db = AnalyticsDb::open_in_memory().unwrap();
        db.insert_employee_if_absent("Franco", "Fiorellino", "technician", 120.0, None)
            .unwrap();
        db.insert_employee_if_absent("Matteo", "Signo", "technician", 120.0, None)
            .unwrap();
        (db, AnalyticsConfig::default())
    }

    #[test]
    fn test_activity_import_known_employee_and_vehicle_row() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "export.csv",
            "Operatore;Iniziata il;Durata;Descrizione\n\
             Franco Fiorellino;05/01/2026 09:00;2,5;Firewall\n\
             Punto;05/01/2026 10:00;1;Trasferta\n",
        );

        let importer = Importer::new(&db, &config);
        let summary = importer.process_file(&path, None).unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.warnings.len(), 1);
        // The vehicle name must not have created an employee
        assert_eq!(db.list_employees(false).unwrap().len(), 2);
    }

    #[test]
    fn test_multi_name_row_splits_duration() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "attivita.csv",
            "Operatore;Iniziata il;Durata;Descrizione\n\
             Franco Fiorellino/Matteo Signo;05/01/2026 09:00;3;Install\n",
        );

        let importer = Importer::new(&db, &config);
        let summary = importer.process_file(&path, None).unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.inserted, 2);

        let mut hours: Vec<f64> = Vec::new();
        for emp in db.list_employees(false).unwrap() {
            for a in db.list_activities_for_employee(emp.id).unwrap() {
                hours.push(a.duration_hours);
            }
        }
        assert_eq!(hours, vec![1.5, 1.5]);
    }

    #[test]
    fn test_duplicate_full_policy_keeps_whole_duration() {
        let (db, mut config) = fixture();
        config.fan_out_policy = FanOutPolicy::DuplicateFull;
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "attivita.csv",
            "Operatore;Iniziata il;Durata;Descrizione\n\
             Franco Fiorellino/Matteo Signo;05/01/2026 09:00;3;Install\n",
        );

        let summary = Importer::new(&db, &config).process_file(&path, None).unwrap();
        assert_eq!(summary.inserted, 2);

        for emp in db.list_employees(false).unwrap() {
            let acts = db.list_activities_for_employee(emp.id).unwrap();
            assert_eq!(acts.len(), 1);
            assert_eq!(acts[0].duration_hours, 3.0);
        }
    }

    #[test]
    fn test_reimport_marks_duplicates() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "attivita.csv",
            "Operatore;Iniziata il;Durata;Descrizione\n\
             Franco Fiorellino;05/01/2026 09:00;2,5;Firewall\n",
        );

        let importer = Importer::new(&db, &config);
        let first = importer.process_file(&path, None).unwrap();
        assert_eq!(first.inserted, 1);

        let second = importer.process_file(&path, None).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 1);

        let (total, non_dup) = db.activity_counts().unwrap();
        assert_eq!((total, non_dup), (2, 1));
    }

    #[test]
    fn test_bad_duration_is_skipped_with_warning() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "attivita.csv",
            "Operatore;Iniziata il;Durata;Descrizione\n\
             Franco Fiorellino;05/01/2026 09:00;boh;Firewall\n",
        );

        let summary = Importer::new(&db, &config).process_file(&path, None).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.warnings[0].kind, WarningKind::RowParse);
    }

    #[test]
    fn test_time_clock_import_and_reimport() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "timbrature.csv",
            "dipendente;data;ora_inizio;ora_fine\n\
             Franco Fiorellino;05/01/2026;08:30;17:30\n",
        );

        let importer = Importer::new(&db, &config);
        let first = importer.process_file(&path, None).unwrap();
        assert_eq!(first.inserted, 1);

        let second = importer.process_file(&path, None).unwrap();
        assert_eq!(second.duplicates, 1);
    }

    #[test]
    fn test_session_import() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            &dir,
            "sessions.csv",
            "utente;inizio;durata_minuti;computer\n\
             Matteo Signo;2026-01-05 10:00:00;42;CLIENT-PC\n",
        );

        let summary = Importer::new(&db, &config).process_file(&path, None).unwrap();
        assert_eq!(summary.inserted, 1);

        let emp = db.list_employees(false).unwrap();
        let signo = emp.iter().find(|e| e.last_name == "Signo").unwrap();
        let sessions = db.list_sessions_for_employee(signo.id).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration_minutes, 42);
        assert_eq!(sessions[0].remote_host.as_deref(), Some("CLIENT-PC"));
    }

    #[test]
    fn test_unknown_file_type() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(&dir, "misc.csv", "a;b;c\n1;2;3\n");

        let err = Importer::new(&db, &config)
            .process_file(&path, None)
            .unwrap_err();
        assert!(matches!(err, ImportError::UnknownFileType(_)));
    }

    #[test]
    fn test_process_dir_continues_past_unknown_files() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        write_csv(&dir, "a_misc.csv", "a;b;c\n1;2;3\n");
        write_csv(
            &dir,
            "b_attivita.csv",
            "Operatore;Iniziata il;Durata;Descrizione\n\
             Franco Fiorellino;05/01/2026 09:00;2,5;Firewall\n",
        );

        let reports = Importer::new(&db, &config).process_dir(dir.path()).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].result.is_err());
        let ok = reports[1].result.as_ref().unwrap();
        assert_eq!(ok.inserted, 1);
    }

    #[test]
    fn test_latin1_file_decodes() {
        let (db, config) = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attivita.csv");
        let mut content = b"Operatore;Iniziata il;Durata;Descrizione\n\
             Franco Fiorellino;05/01/2026 09:00;1;attivit"
            .to_vec();
        content.push(0xE0); // Latin-1 'à'
        content.push(b'\n');
        std::fs::write(&path, content).unwrap();

        let summary = Importer::new(&db, &config).process_file(&path, None).unwrap();
        assert_eq!(summary.inserted, 1);

        let emp = db.list_employees(false).unwrap();
        let franco = emp.iter().find(|e| e.first_name == "Franco").unwrap();
        let acts = db.list_activities_for_employee(franco.id).unwrap();
        assert_eq!(acts[0].description, "attività");
    }
}
