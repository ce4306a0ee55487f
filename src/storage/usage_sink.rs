//! Usage sinks.
//!
//! A sink receives every [`UsageRecord`] after the accountant has counted
//! it. Sinks are best-effort: the accountant drives them from a background
//! task and only logs their failures.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::{Connection, OpenFlags, params};

use crate::core::models::UsageRecord;
use crate::error::{Result, RouteError};

/// Namespace used for rows in the shared store.
pub const STORE_NAMESPACE: &str = "infroute";

/// Destination for usage records. Called from a blocking thread.
pub trait UsageSink: Send + Sync {
    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be written.
    fn append(&self, record: &UsageRecord) -> Result<()>;
}

// =============================================================================
// SQLite shared store
// =============================================================================

/// Appends records to an existing shared store's `mcp_storage` table.
///
/// The store is owned by whoever installed it; this sink never creates the
/// file or its schema.
pub struct SqliteUsageSink {
    conn: Mutex<Connection>,
    path: PathBuf,
    seq: AtomicU64,
}

impl std::fmt::Debug for SqliteUsageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteUsageSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteUsageSink {
    /// Open an existing store for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            RouteError::Other(anyhow::anyhow!(
                "open usage store {}: {e}",
                path.display()
            ))
        })?;
        conn.busy_timeout(std::time::Duration::from_secs(2))?;

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            seq: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn next_key(&self, record: &UsageRecord) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!(
            "usage:{}:{seq}",
            record.timestamp.timestamp_nanos_opt().unwrap_or_default()
        )
    }
}

impl UsageSink for SqliteUsageSink {
    fn append(&self, record: &UsageRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        let key = self.next_key(record);
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        conn.prepare_cached(
            "INSERT OR REPLACE INTO mcp_storage (mcp_name, key, value) VALUES (?1, ?2, ?3)",
        )?
        .execute(params![STORE_NAMESPACE, key, value])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::ProviderId;
    use crate::test_utils::shared_usage_store;
    use tempfile::TempDir;

    #[test]
    fn appends_json_rows_under_namespace() {
        let dir = TempDir::new().unwrap();
        let path = shared_usage_store(&dir);
        let sink = SqliteUsageSink::open(&path).unwrap();

        let record = UsageRecord::priced(ProviderId::OpenAI, "gpt-4o", 500, 0.03);
        sink.append(&record).unwrap();
        sink.append(&record).unwrap();

        let conn = Connection::open(&path).unwrap();
        let rows: Vec<(String, String)> = conn
            .prepare("SELECT key, value FROM mcp_storage WHERE mcp_name = 'infroute'")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].0.starts_with("usage:"));
        let stored: UsageRecord = serde_json::from_str(&rows[0].1).unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn missing_store_is_not_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.db");
        assert!(SqliteUsageSink::open(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn missing_schema_fails_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path).unwrap();
        let sink = SqliteUsageSink::open(&path).unwrap();
        let record = UsageRecord::priced(ProviderId::Ollama, "llama3", 10, 0.0);
        assert!(matches!(sink.append(&record), Err(RouteError::Database(_))));
    }
}
