//! Versioned schema for the office database.
//!
//! Each step is a SQL file compiled into the binary. Steps are applied in
//! order, each inside its own transaction together with its row in
//! `schema_version`, so a failed step leaves the previous version intact.

use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(
        "database schema v{found} is newer than this build understands (v{known}); upgrade officedir"
    )]
    SchemaTooNew { found: u32, known: u32 },

    #[error("backup to {path} failed: {source}")]
    Backup {
        path: String,
        source: rusqlite::Error,
    },

    #[error("step v{version} failed: {source}")]
    Step {
        version: u32,
        source: rusqlite::Error,
    },
}

struct SchemaStep {
    version: u32,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        sql: include_str!("migrations/001_baseline.sql"),
    },
    SchemaStep {
        version: 2,
        sql: include_str!("migrations/002_office_search_indexes.sql"),
    },
    SchemaStep {
        version: 3,
        sql: include_str!("migrations/003_office_name_nocase_index.sql"),
    },
];

fn latest_known() -> u32 {
    STEPS.iter().map(|s| s.version).max().unwrap_or(0)
}

fn schema_version(conn: &Connection) -> Result<u32, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

/// Hot-copy a file-backed database to `<path>.v<version>.bak` before upgrading it.
fn snapshot(conn: &Connection, version: u32) -> Result<(), MigrationError> {
    let Some(path) = conn.path().filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let target = format!("{}.v{}.bak", path, version);

    conn.backup(rusqlite::DatabaseName::Main, &target, None)
        .map_err(|source| MigrationError::Backup {
            path: target.clone(),
            source,
        })?;

    log::info!("Office database v{} backed up to {}", version, target);
    Ok(())
}

/// Bring the schema up to date. Returns the number of steps applied.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    let current = schema_version(conn)?;
    let known = latest_known();
    if current > known {
        return Err(MigrationError::SchemaTooNew {
            found: current,
            known,
        });
    }

    let pending: Vec<&SchemaStep> = STEPS.iter().filter(|s| s.version > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    if current > 0 {
        snapshot(conn, current)?;
    }

    for step in &pending {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(step.sql)
            .and_then(|_| {
                tx.execute(
                    "INSERT INTO schema_version (version) VALUES (?1)",
                    [step.version],
                )
            })
            .map_err(|source| MigrationError::Step {
                version: step.version,
                source,
            })?;
        tx.commit()?;
        log::info!("Office database schema now at v{}", step.version);
    }

    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_latest() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), STEPS.len());
        assert_eq!(schema_version(&conn).unwrap(), latest_known());

        conn.execute(
            "INSERT INTO offices (office_national_association_id, office_name) VALUES ('1', 'X')",
            [],
        )
        .unwrap();
        let (phone, website): (String, String) = conn
            .query_row(
                "SELECT office_phone_normalized, website_url FROM offices",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((phone.as_str(), website.as_str()), ("", ""));
    }

    #[test]
    fn test_second_run_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert_eq!(run_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        schema_version(&conn).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (99)", [])
            .unwrap();

        match run_migrations(&conn) {
            Err(MigrationError::SchemaTooNew { found, known }) => {
                assert_eq!(found, 99);
                assert_eq!(known, latest_known());
            }
            other => panic!("expected SchemaTooNew, got {other:?}"),
        }
    }

    #[test]
    fn test_upgrade_snapshots_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offices.db");
        let conn = Connection::open(&path).unwrap();

        schema_version(&conn).unwrap();
        conn.execute_batch(STEPS[0].sql).unwrap();
        conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])
            .unwrap();

        assert_eq!(run_migrations(&conn).unwrap(), STEPS.len() - 1);
        assert!(dir.path().join("offices.db.v1.bak").exists());
    }

    #[test]
    fn test_name_index_is_case_insensitive() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let collation: String = conn
            .query_row(
                "SELECT coll FROM pragma_index_xinfo('idx_offices_name_nocase') WHERE seqno = 0",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(collation, "NOCASE");

        let stale: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND name = 'idx_offices_name'",
                [],
                |row| row.get(0),
            )
            .optional()
            .unwrap();
        assert_eq!(stale, None);

        let plan: Vec<String> = conn
            .prepare(
                "EXPLAIN QUERY PLAN SELECT office_name FROM offices \
                 ORDER BY office_name COLLATE NOCASE, office_national_association_id",
            )
            .unwrap()
            .query_map([], |row| row.get::<_, String>(3))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert!(
            plan.iter().all(|step| !step.contains("TEMP B-TREE")),
            "listing should not sort: {plan:?}"
        );
    }
}
