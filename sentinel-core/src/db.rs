use crate::error::StoreError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    CREATE TABLE IF NOT EXISTS alerts (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        incident_type TEXT NOT NULL,
        location TEXT NOT NULL,
        severity TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS alert_actions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        alert_id TEXT NOT NULL REFERENCES alerts(id),
        kind TEXT NOT NULL,
        details TEXT NOT NULL,
        polyline TEXT,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_actions_alert ON alert_actions(alert_id);
    CREATE TABLE IF NOT EXISTS records (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        collection TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection, seq);
";

/// Path to the SQLite file; every operation opens its own connection.
#[derive(Clone, Debug)]
pub struct Database {
    path: Arc<PathBuf>,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Self {
            path: Arc::new(path.to_path_buf()),
        };
        db.connect()?.execute_batch(SCHEMA)?;
        Ok(db)
    }

    pub(crate) fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&*self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }
}

/// Runs a store call on tokio's blocking pool.
pub async fn blocking<T, F>(op: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

#[cfg(test)]
pub(crate) fn test_db(name: &str) -> Database {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    Database::open(format!("/tmp/sentinel-tests/{name}-{nanos}.db")).expect("open")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_returns_store_results() {
        let db = test_db("blocking");
        let conn_db = db.clone();
        let tables: i64 = blocking(move || {
            let conn = conn_db.connect()?;
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('alerts', 'alert_actions', 'records')",
                [],
                |row| row.get(0),
            )?)
        })
        .await
        .expect("count");
        assert_eq!(tables, 3);

        let err = blocking(|| -> Result<(), StoreError> { Err(StoreError::Corrupt("bad row".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn blocking_reports_panicked_store_call() {
        let err = blocking(|| -> Result<(), StoreError> { panic!("store call panicked") })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Task(_)));
    }
}
