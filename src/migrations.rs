//! Schema migrations.
//!
//! The raw import tables are the audit trail for every CSV ever ingested, so
//! migrations are deliberately cautious: before anything pending runs, a
//! file-backed database is snapshotted with SQLite's online backup API.
//! Versions are numbered SQL scripts embedded at build time and stamped into
//! a `schema_version` table; each runs at most once.

use rusqlite::Connection;

const MIGRATIONS: &[(i32, &str)] = &[(1, include_str!("migrations/001_baseline.sql"))];

/// Apply pending migrations, returning how many ran (0 when up to date).
///
/// Refuses to touch a database stamped with a version this build doesn't
/// know — running old code against a newer schema is how audit data gets
/// mangled.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("schema_version table: {e}"))?;

    let stamped: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| format!("schema version lookup: {e}"))?;

    let newest = MIGRATIONS.last().map(|(v, _)| *v).unwrap_or(0);
    if stamped > newest {
        return Err(format!(
            "database schema v{stamped} is newer than this version of workmetrics \
             understands (v{newest}); update workmetrics"
        ));
    }

    let pending: Vec<&(i32, &str)> = MIGRATIONS.iter().filter(|(v, _)| *v > stamped).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    snapshot_file_db(conn)?;

    for &(version, sql) in &pending {
        conn.execute_batch(sql)
            .map_err(|e| format!("migration v{version}: {e}"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| format!("recording migration v{version}: {e}"))?;
        tracing::info!(version, "schema migration applied");
    }

    Ok(pending.len())
}

/// Hot-copy a file-backed database to `<path>.pre-migration.bak`. In-memory
/// databases (tests) have nothing worth snapshotting and are skipped.
fn snapshot_file_db(conn: &Connection) -> Result<(), String> {
    let path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("database path lookup: {e}"))?;
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }

    let backup_path = format!("{path}.pre-migration.bak");
    let mut target =
        Connection::open(&backup_path).map_err(|e| format!("opening {backup_path}: {e}"))?;
    rusqlite::backup::Backup::new(conn, &mut target)
        .and_then(|b| b.step(-1))
        .map_err(|e| format!("pre-migration snapshot: {e}"))?;

    tracing::info!(path = %backup_path, "pre-migration snapshot written");
    Ok(())
}
