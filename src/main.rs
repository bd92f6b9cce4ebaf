//! workmetrics CLI.
//!
//! Subcommands mirror the operations dashboards trigger: `import` a file or
//! drop directory, `recompute` KPIs (as a cancellable background task with
//! progress polling), `dedup-scan` the activity table, `progress`, and
//! `summary` reports.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use tracing::error;
use tracing_subscriber::EnvFilter;

use workmetrics::config::AnalyticsConfig;
use workmetrics::db::AnalyticsDb;
use workmetrics::dedup;
use workmetrics::import::{FileKind, Importer};
use workmetrics::kpi::{self, CancelFlag};
use workmetrics::queries;

const USAGE: &str = "\
workmetrics - employee analytics over CSV exports

USAGE:
    workmetrics [--db PATH] [--config PATH] <COMMAND>

COMMANDS:
    import <path> [--type activity|time_clock|remote_session]
        Import one CSV file, or every .csv in a directory.
    recompute [--full]
        Recompute daily KPI rows (incomplete days only, or --full).
        Runs in the background; ctrl-c cancels cleanly.
    dedup-scan [--bucket-secs N] [--apply]
        Retrospective duplicate scan. Dry run unless --apply.
    progress
        KPI materialization progress (current / expected rows).
    summary [--employee ID] [--from YYYY-MM-DD] [--to YYYY-MM-DD] [--top N]
        KPI summary and top performers over a date range.
";

type CliError = Box<dyn std::error::Error>;

struct Args {
    db_path: Option<PathBuf>,
    config_path: Option<PathBuf>,
    command: Vec<String>,
}

impl Args {
    fn parse(mut raw: Vec<String>) -> Result<Self, CliError> {
        let mut db_path = None;
        let mut config_path = None;
        let mut command = Vec::new();

        while !raw.is_empty() {
            let arg = raw.remove(0);
            match arg.as_str() {
                "--db" => {
                    if raw.is_empty() {
                        return Err("--db requires a path".into());
                    }
                    db_path = Some(PathBuf::from(raw.remove(0)));
                }
                "--config" => {
                    if raw.is_empty() {
                        return Err("--config requires a path".into());
                    }
                    config_path = Some(PathBuf::from(raw.remove(0)));
                }
                _ => command.push(arg),
            }
        }

        Ok(Self {
            db_path,
            config_path,
            command,
        })
    }

    /// Value of `--flag VALUE` inside the command tail, if present.
    fn flag_value(&self, flag: &str) -> Option<&str> {
        self.command
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.command.get(i + 1))
            .map(String::as_str)
    }

    fn has_flag(&self, flag: &str) -> bool {
        self.command.iter().any(|a| a == flag)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), CliError> {
    let args = Args::parse(std::env::args().skip(1).collect())?;
    let Some(command) = args.command.first().cloned() else {
        print!("{USAGE}");
        return Ok(());
    };

    let config_path = match &args.config_path {
        Some(p) => p.clone(),
        None => AnalyticsDb::default_path()?
            .with_file_name("config.json"),
    };
    let config = AnalyticsConfig::load_or_default(&config_path)?;

    let db_path = match &args.db_path {
        Some(p) => p.clone(),
        None => AnalyticsDb::default_path()?,
    };

    match command.as_str() {
        "import" => cmd_import(&args, &config, db_path),
        "recompute" => cmd_recompute(&args, config, db_path).await,
        "dedup-scan" => cmd_dedup_scan(&args, db_path),
        "progress" => cmd_progress(db_path),
        "summary" => cmd_summary(&args, db_path),
        other => {
            print!("{USAGE}");
            Err(format!("unknown command: {other}").into())
        }
    }
}

fn parse_kind(raw: &str) -> Result<FileKind, CliError> {
    match raw {
        "activity" => Ok(FileKind::Activity),
        "time_clock" => Ok(FileKind::TimeClock),
        "remote_session" => Ok(FileKind::RemoteSession),
        other => Err(format!("unknown file type: {other}").into()),
    }
}

fn cmd_import(args: &Args, config: &AnalyticsConfig, db_path: PathBuf) -> Result<(), CliError> {
    let path = args
        .command
        .get(1)
        .filter(|p| !p.starts_with("--"))
        .ok_or("import requires a file or directory path")?;
    let path = PathBuf::from(path);
    let declared = args.flag_value("--type").map(parse_kind).transpose()?;

    let db = AnalyticsDb::open_at(db_path)?;
    let importer = Importer::new(&db, config);

    if path.is_dir() {
        let reports = importer.process_dir(&path)?;
        for report in reports {
            match report.result {
                Ok(summary) => {
                    println!("{}:", report.path.display());
                    println!("{}", serde_json::to_string_pretty(&summary)?);
                }
                Err(e) => println!("{}: skipped ({e})", report.path.display()),
            }
        }
    } else {
        let summary = importer.process_file(&path, declared)?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

async fn cmd_recompute(
    args: &Args,
    config: AnalyticsConfig,
    db_path: PathBuf,
) -> Result<(), CliError> {
    let force_full = args.has_flag("--full");
    let cancel = CancelFlag::new();

    let task_cancel = cancel.clone();
    let task_path = db_path.clone();
    let mut task = tokio::task::spawn_blocking(move || {
        let db = AnalyticsDb::open_at(task_path)?;
        kpi::recompute_all(&db, &config, force_full, &task_cancel)
    });

    let mut poll = tokio::time::interval(std::time::Duration::from_secs(2));
    poll.tick().await; // first tick fires immediately

    let outcome = loop {
        tokio::select! {
            res = &mut task => break res??,
            _ = poll.tick() => {
                // The recompute transaction commits at the end, so this shows
                // rows from before the run until it finishes.
                if let Ok(db) = AnalyticsDb::open_readonly_at(&db_path) {
                    if let Ok(p) = kpi::import_progress(&db) {
                        eprintln!(
                            "progress: {:.1}% ({}/{} rows)",
                            p.progress, p.current_kpis, p.expected_total
                        );
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("cancellation requested");
                cancel.cancel();
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn cmd_dedup_scan(args: &Args, db_path: PathBuf) -> Result<(), CliError> {
    let bucket_secs: i64 = match args.flag_value("--bucket-secs") {
        Some(raw) => raw.parse()?,
        None => 180,
    };
    let dry_run = !args.has_flag("--apply");

    let db = AnalyticsDb::open_at(db_path)?;
    let report = db.with_transaction(|db| dedup::scan_duplicates(db, bucket_secs, dry_run))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_progress(db_path: PathBuf) -> Result<(), CliError> {
    let db = AnalyticsDb::open_readonly_at(&db_path)?;
    let progress = kpi::import_progress(&db)?;
    println!("{}", serde_json::to_string_pretty(&progress)?);
    Ok(())
}

fn cmd_summary(args: &Args, db_path: PathBuf) -> Result<(), CliError> {
    let db = AnalyticsDb::open_readonly_at(&db_path)?;

    let employee_id: Option<i64> = args.flag_value("--employee").map(str::parse).transpose()?;
    let top: usize = match args.flag_value("--top") {
        Some(raw) => raw.parse()?,
        None => 5,
    };

    let (from, to) = match (args.flag_value("--from"), args.flag_value("--to")) {
        (Some(f), Some(t)) => (parse_day(f)?, parse_day(t)?),
        (from, to) => {
            let (min, max) = db
                .observed_period()?
                .ok_or("no data imported yet; specify --from and --to")?;
            (
                from.map(parse_day).transpose()?.unwrap_or(min),
                to.map(parse_day).transpose()?.unwrap_or(max),
            )
        }
    };

    let summary = queries::kpi_summary(&db, employee_id, &from, &to)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if employee_id.is_none() {
        let performers = queries::top_performers(&db, &from, &to, top)?;
        println!("{}", serde_json::to_string_pretty(&performers)?);
    }
    Ok(())
}

fn parse_day(raw: &str) -> Result<NaiveDate, CliError> {
    Ok(NaiveDate::parse_from_str(raw, "%Y-%m-%d")?)
}
