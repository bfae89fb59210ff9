//! Per-example state reset

use rusqlite::Connection;
use std::path::PathBuf;
use tracing::debug;

use crate::error::E2eResult;

/// Wipes persisted state before each example
pub trait StateCleaner: Send + Sync {
    fn clean(&self) -> E2eResult<()>;
}

/// Cleaner for sessions with no database
#[derive(Debug, Default)]
pub struct NoopCleaner;

impl StateCleaner for NoopCleaner {
    fn clean(&self) -> E2eResult<()> {
        Ok(())
    }
}

/// Empties every table of a SQLite database except `keep_tables`.
///
/// SQLite has no `TRUNCATE`, so rows are deleted and autoincrement
/// counters reset, which is what a truncation leaves behind.
#[derive(Debug, Clone)]
pub struct TruncationCleaner {
    path: PathBuf,
    keep_tables: Vec<String>,
}

impl TruncationCleaner {
    pub fn new(path: impl Into<PathBuf>, keep_tables: Vec<String>) -> Self {
        Self {
            path: path.into(),
            keep_tables,
        }
    }

    fn tables(&self, conn: &Connection) -> E2eResult<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(names
            .into_iter()
            .filter(|name| !self.keep_tables.iter().any(|keep| keep == name))
            .collect())
    }
}

impl StateCleaner for TruncationCleaner {
    fn clean(&self) -> E2eResult<()> {
        let mut conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;

        let tables = self.tables(&conn)?;
        let has_sequence: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence')",
            [],
            |row| row.get(0),
        )?;

        let tx = conn.transaction()?;
        for table in &tables {
            tx.execute(&format!("DELETE FROM \"{}\"", table.replace('"', "\"\"")), [])?;
            if has_sequence {
                tx.execute("DELETE FROM sqlite_sequence WHERE name = ?1", [table])?;
            }
        }
        tx.commit()?;

        debug!("Truncated {} table(s) in {}", tables.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(path: &std::path::Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            r#"
CREATE TABLE sail_settings (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, value TEXT);
CREATE TABLE sail_profiles (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
CREATE TABLE schema_migrations (version TEXT PRIMARY KEY);
INSERT INTO sail_settings (name, value) VALUES ('feature_enabled', 'true'), ('max', '3');
INSERT INTO sail_profiles (name) VALUES ('default');
INSERT INTO schema_migrations (version) VALUES ('20180101000000');
"#,
        )
        .unwrap();
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_truncates_all_but_kept_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("test.sqlite3");
        seed(&db);

        TruncationCleaner::new(&db, vec!["schema_migrations".to_string()])
            .clean()
            .unwrap();

        let conn = Connection::open(&db).unwrap();
        assert_eq!(count(&conn, "sail_settings"), 0);
        assert_eq!(count(&conn, "sail_profiles"), 0);
        assert_eq!(count(&conn, "schema_migrations"), 1);
    }

    #[test]
    fn test_resets_autoincrement() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("test.sqlite3");
        seed(&db);

        TruncationCleaner::new(&db, vec![]).clean().unwrap();

        let conn = Connection::open(&db).unwrap();
        conn.execute("INSERT INTO sail_settings (name, value) VALUES ('x', 'y')", [])
            .unwrap();
        let id: i64 = conn
            .query_row("SELECT id FROM sail_settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_noop_cleaner() {
        assert!(NoopCleaner.clean().is_ok());
    }
}
