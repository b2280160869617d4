use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use smartopen_config::smartopen_dir;
use smartopen_core::{
    MAX_ACCESS_COUNT, PrunedRecord, RetentionPolicy, UsageRecord, UsageSnapshot, prune,
    record_access,
};
use thiserror::Error;

mod json;

pub use json::{export_snapshot_json, import_snapshot_json, merge_snapshots, parse_snapshot_json};

pub const USAGE_DB_FILE_NAME: &str = "usage.sqlite";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid usage record for '{id}': {reason}")]
    InvalidRecord { id: String, reason: String },
}

/// Persistent usage metadata keyed by candidate id.
///
/// Implementations are single-writer: readers take a point-in-time
/// [`UsageSnapshot`] and never observe a half-applied write.
pub trait UsageStore {
    fn snapshot(&self) -> Result<UsageSnapshot, StoreError>;
    fn get(&self, id: &str) -> Result<Option<UsageRecord>, StoreError>;
    fn record_access(&self, id: &str, now_ms: i64) -> Result<UsageRecord, StoreError>;
    fn remove(&self, id: &str) -> Result<bool, StoreError>;
    fn replace_all(&self, snapshot: &UsageSnapshot) -> Result<(), StoreError>;

    /// Folds `incoming` into the stored mapping with [`merge_snapshots`]
    /// semantics and returns the resulting record count.
    fn merge_all(&self, incoming: UsageSnapshot) -> Result<usize, StoreError> {
        let merged = merge_snapshots(self.snapshot()?, incoming);
        self.replace_all(&merged)?;
        Ok(merged.len())
    }

    fn prune(
        &self,
        now_ms: i64,
        policy: &RetentionPolicy,
    ) -> Result<Vec<PrunedRecord>, StoreError>;

    fn list_recent(&self, limit: u32) -> Result<Vec<(String, UsageRecord)>, StoreError> {
        let mut entries = self.snapshot()?.into_iter().collect::<Vec<_>>();
        entries.sort_by(|(left_id, left), (right_id, right)| {
            right
                .last_accessed
                .cmp(&left.last_accessed)
                .then_with(|| left_id.cmp(right_id))
        });
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

/// SQLite-backed store. Multi-step writes run under `BEGIN IMMEDIATE` so
/// another process cannot slip a write between the read and the write back.
pub struct SqliteUsageStore {
    conn: Connection,
}

impl SqliteUsageStore {
    pub fn open(workspace_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = smartopen_dir(workspace_root);
        fs::create_dir_all(&dir)?;
        Self::open_at(dir.join(USAGE_DB_FILE_NAME))
    }

    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;

        tracing::debug!(path = %path.display(), "opened usage store");

        Ok(Self { conn })
    }

    fn write_transaction(&self) -> Result<Transaction<'_>, StoreError> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }
}

impl UsageStore for SqliteUsageStore {
    fn snapshot(&self) -> Result<UsageSnapshot, StoreError> {
        read_snapshot(&self.conn)
    }

    fn get(&self, id: &str) -> Result<Option<UsageRecord>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT last_accessed, access_count FROM usage WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        row.map(|(last_accessed, access_count)| {
            usage_record_from_row(id, last_accessed, access_count)
        })
        .transpose()
    }

    fn record_access(&self, id: &str, now_ms: i64) -> Result<UsageRecord, StoreError> {
        let (last_accessed, access_count) = self.conn.query_row(
            r#"
            INSERT INTO usage (id, last_accessed, access_count)
            VALUES (?1, ?2, 1)
            ON CONFLICT(id) DO UPDATE SET
                last_accessed = excluded.last_accessed,
                access_count = MIN(usage.access_count + 1, ?3)
            RETURNING last_accessed, access_count
            "#,
            params![id, now_ms, i64::from(MAX_ACCESS_COUNT)],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        usage_record_from_row(id, last_accessed, access_count)
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM usage WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn replace_all(&self, snapshot: &UsageSnapshot) -> Result<(), StoreError> {
        let tx = self.write_transaction()?;
        tx.execute("DELETE FROM usage", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO usage (id, last_accessed, access_count) VALUES (?1, ?2, ?3)",
            )?;
            for (id, record) in snapshot {
                stmt.execute(params![
                    id,
                    record.last_accessed,
                    i64::from(record.access_count.min(MAX_ACCESS_COUNT)),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn merge_all(&self, incoming: UsageSnapshot) -> Result<usize, StoreError> {
        let tx = self.write_transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO usage (id, last_accessed, access_count)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    last_accessed = MAX(usage.last_accessed, excluded.last_accessed),
                    access_count = MIN(MAX(usage.access_count, excluded.access_count), ?4)
                "#,
            )?;
            for (id, record) in &incoming {
                stmt.execute(params![
                    id,
                    record.last_accessed,
                    i64::from(record.access_count.min(MAX_ACCESS_COUNT)),
                    i64::from(MAX_ACCESS_COUNT),
                ])?;
            }
        }
        let total = tx.query_row("SELECT COUNT(*) FROM usage", [], |row| row.get::<_, i64>(0))?;
        tx.commit()?;

        Ok(usize::try_from(total).unwrap_or_default())
    }

    fn prune(
        &self,
        now_ms: i64,
        policy: &RetentionPolicy,
    ) -> Result<Vec<PrunedRecord>, StoreError> {
        let tx = self.write_transaction()?;
        let mut snapshot = read_snapshot(&tx)?;
        let pruned = prune(&mut snapshot, now_ms, policy);
        if pruned.is_empty() {
            return Ok(pruned);
        }

        {
            let mut stmt = tx.prepare("DELETE FROM usage WHERE id = ?1")?;
            for entry in &pruned {
                stmt.execute(params![entry.id])?;
            }
        }
        tx.commit()?;

        Ok(pruned)
    }

    fn list_recent(&self, limit: u32) -> Result<Vec<(String, UsageRecord)>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, last_accessed, access_count
            FROM usage
            ORDER BY last_accessed DESC, id ASC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![i64::from(limit)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, last_accessed, access_count) = row?;
            let record = usage_record_from_row(&id, last_accessed, access_count)?;
            entries.push((id, record));
        }

        Ok(entries)
    }
}

/// Volatile store used when no workspace directory should be touched.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    records: RefCell<UsageSnapshot>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: UsageSnapshot) -> Self {
        Self {
            records: RefCell::new(snapshot),
        }
    }
}

impl UsageStore for MemoryUsageStore {
    fn snapshot(&self) -> Result<UsageSnapshot, StoreError> {
        Ok(self.records.borrow().clone())
    }

    fn get(&self, id: &str) -> Result<Option<UsageRecord>, StoreError> {
        Ok(self.records.borrow().get(id).copied())
    }

    fn record_access(&self, id: &str, now_ms: i64) -> Result<UsageRecord, StoreError> {
        Ok(record_access(&mut self.records.borrow_mut(), id, now_ms))
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.records.borrow_mut().remove(id).is_some())
    }

    fn replace_all(&self, snapshot: &UsageSnapshot) -> Result<(), StoreError> {
        *self.records.borrow_mut() = snapshot.clone();
        Ok(())
    }

    fn prune(
        &self,
        now_ms: i64,
        policy: &RetentionPolicy,
    ) -> Result<Vec<PrunedRecord>, StoreError> {
        Ok(prune(&mut self.records.borrow_mut(), now_ms, policy))
    }
}

fn read_snapshot(conn: &Connection) -> Result<UsageSnapshot, StoreError> {
    let mut stmt = conn.prepare("SELECT id, last_accessed, access_count FROM usage ORDER BY id")?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut snapshot = UsageSnapshot::new();
    for row in rows {
        let (id, last_accessed, access_count) = row?;
        let record = usage_record_from_row(&id, last_accessed, access_count)?;
        snapshot.insert(id, record);
    }

    Ok(snapshot)
}

fn usage_record_from_row(
    id: &str,
    last_accessed: i64,
    access_count: i64,
) -> Result<UsageRecord, StoreError> {
    let access_count = u32::try_from(access_count).map_err(|_| StoreError::InvalidRecord {
        id: id.to_owned(),
        reason: format!("access_count {access_count} out of range"),
    })?;

    Ok(UsageRecord {
        last_accessed,
        access_count: access_count.min(MAX_ACCESS_COUNT),
    })
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS usage (
            id TEXT PRIMARY KEY,
            last_accessed INTEGER NOT NULL,
            access_count INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_usage_last_accessed
            ON usage (last_accessed DESC);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::thread;

    use tempfile::tempdir;

    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    fn usage_db(workspace: &Path) -> PathBuf {
        smartopen_dir(workspace).join(USAGE_DB_FILE_NAME)
    }

    /// A second connection holding an uncommitted write.
    fn hold_write(db: &Path, sql: &str) -> Connection {
        let conn = Connection::open(db).expect("second connection");
        conn.execute_batch(&format!("BEGIN IMMEDIATE; {sql}"))
            .expect("begin held write");
        conn
    }

    #[test]
    fn store_creates_layout_and_persists_across_reopen() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();

        let store = SqliteUsageStore::open(workspace).expect("open store");
        assert!(workspace.join(".smartopen/usage.sqlite").exists());

        let first = store
            .record_access("src/foo.ts", NOW)
            .expect("first access");
        assert_eq!(first, UsageRecord::first_access(NOW));

        let second = store
            .record_access("src/foo.ts", NOW + 5)
            .expect("second access");
        assert_eq!(second.access_count, 2);
        assert_eq!(second.last_accessed, NOW + 5);

        drop(store);

        let reopened = SqliteUsageStore::open(workspace).expect("reopen store");
        let record = reopened.get("src/foo.ts").expect("get record");
        assert_eq!(record, Some(second));
        assert_eq!(reopened.get("missing.ts").expect("get missing"), None);
    }

    #[test]
    fn record_access_caps_access_count() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteUsageStore::open(temp.path()).expect("open store");

        let mut snapshot = UsageSnapshot::new();
        snapshot.insert(
            "hot.rs".to_owned(),
            UsageRecord {
                last_accessed: NOW,
                access_count: MAX_ACCESS_COUNT,
            },
        );
        store.replace_all(&snapshot).expect("seed");

        let updated = store.record_access("hot.rs", NOW + 1).expect("access");
        assert_eq!(updated.access_count, MAX_ACCESS_COUNT);
        assert_eq!(updated.last_accessed, NOW + 1);
    }

    #[test]
    fn prune_removes_only_expired_records() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteUsageStore::open(temp.path()).expect("open store");

        let mut snapshot = UsageSnapshot::new();
        snapshot.insert(
            "stale.rs".to_owned(),
            UsageRecord {
                last_accessed: NOW - 45 * DAY_MS,
                access_count: 10,
            },
        );
        snapshot.insert(
            "frequent.rs".to_owned(),
            UsageRecord {
                last_accessed: NOW - 45 * DAY_MS,
                access_count: 900,
            },
        );
        snapshot.insert(
            "fresh.rs".to_owned(),
            UsageRecord {
                last_accessed: NOW,
                access_count: 1,
            },
        );
        store.replace_all(&snapshot).expect("seed");

        let pruned = store
            .prune(NOW, &RetentionPolicy::default())
            .expect("prune");
        assert_eq!(
            pruned.iter().map(|entry| entry.id.as_str()).collect::<Vec<_>>(),
            vec!["stale.rs"]
        );

        let remaining = store.snapshot().expect("snapshot");
        assert_eq!(
            remaining.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["frequent.rs", "fresh.rs"]
        );
    }

    #[test]
    fn list_recent_orders_by_last_access() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteUsageStore::open(temp.path()).expect("open store");

        store.record_access("a.rs", NOW).expect("a");
        store.record_access("b.rs", NOW + 20).expect("b");
        store.record_access("c.rs", NOW + 10).expect("c");

        let recent = store.list_recent(2).expect("list recent");
        assert_eq!(
            recent.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
            vec!["b.rs", "c.rs"]
        );
    }

    #[test]
    fn remove_and_replace_all_round_out_the_mapping_api() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteUsageStore::open(temp.path()).expect("open store");

        store.record_access("a.rs", NOW).expect("a");
        assert!(store.remove("a.rs").expect("remove"));
        assert!(!store.remove("a.rs").expect("remove again"));

        store.record_access("old.rs", NOW).expect("old");
        let mut replacement = UsageSnapshot::new();
        replacement.insert("new.rs".to_owned(), UsageRecord::first_access(NOW));
        store.replace_all(&replacement).expect("replace");

        assert_eq!(store.snapshot().expect("snapshot"), replacement);
    }

    #[test]
    fn memory_store_matches_sqlite_semantics() {
        let store = MemoryUsageStore::new();

        store.record_access("a.rs", NOW - 60 * DAY_MS).expect("a");
        store.record_access("b.rs", NOW).expect("b");
        let again = store.record_access("b.rs", NOW + 1).expect("b again");
        assert_eq!(again.access_count, 2);

        let recent = store.list_recent(10).expect("recent");
        assert_eq!(recent[0].0, "b.rs");

        let pruned = store
            .prune(NOW, &RetentionPolicy::default())
            .expect("prune");
        assert_eq!(pruned.len(), 1);
        assert_eq!(store.get("a.rs").expect("get"), None);
    }

    #[test]
    fn prune_keeps_record_refreshed_by_another_connection() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        let store = SqliteUsageStore::open(workspace).expect("open store");

        let stale = UsageRecord {
            last_accessed: NOW - 45 * DAY_MS,
            access_count: 1,
        };
        let mut snapshot = UsageSnapshot::new();
        snapshot.insert("x.rs".to_owned(), stale);
        snapshot.insert("old.rs".to_owned(), stale);
        store.replace_all(&snapshot).expect("seed");

        let pruner = SqliteUsageStore::open(workspace).expect("open pruner");
        let writer = hold_write(
            &usage_db(workspace),
            &format!(
                "UPDATE usage SET last_accessed = {NOW}, access_count = access_count + 1 \
                 WHERE id = 'x.rs';"
            ),
        );

        let handle = thread::spawn(move || {
            pruner
                .prune(NOW, &RetentionPolicy::default())
                .expect("prune")
        });
        thread::sleep(Duration::from_millis(150));
        writer.execute_batch("COMMIT").expect("commit refresh");

        let pruned = handle.join().expect("prune thread");
        assert_eq!(
            pruned.iter().map(|entry| entry.id.as_str()).collect::<Vec<_>>(),
            vec!["old.rs"]
        );
        assert_eq!(
            store.get("x.rs").expect("get x"),
            Some(UsageRecord {
                last_accessed: NOW,
                access_count: 2,
            })
        );
    }

    #[test]
    fn merge_import_keeps_rows_written_by_another_connection() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        let store = SqliteUsageStore::open(workspace).expect("open store");
        store.record_access("shared.rs", NOW).expect("shared");

        let importer = SqliteUsageStore::open(workspace).expect("open importer");
        let writer = hold_write(
            &usage_db(workspace),
            &format!(
                "INSERT INTO usage (id, last_accessed, access_count) \
                 VALUES ('src/new.rs', {NOW}, 1);"
            ),
        );

        let handle = thread::spawn(move || {
            import_snapshot_json(
                &importer,
                r#"{"shared.rs": {"last_accessed": 1700000000500, "access_count": 4}}"#,
                true,
            )
            .expect("merge import")
        });
        thread::sleep(Duration::from_millis(150));
        writer.execute_batch("COMMIT").expect("commit insert");
        assert_eq!(handle.join().expect("import thread"), 1);

        let snapshot = store.snapshot().expect("snapshot");
        assert_eq!(
            snapshot.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["shared.rs", "src/new.rs"]
        );
        assert_eq!(
            snapshot["shared.rs"],
            UsageRecord {
                last_accessed: NOW + 500,
                access_count: 4,
            }
        );
    }

    #[test]
    fn merge_all_keeps_latest_timestamp_and_highest_count() {
        let temp = tempdir().expect("tempdir");
        let store = SqliteUsageStore::open(temp.path()).expect("open store");
        store.record_access("a.rs", NOW + 10).expect("a");
        store.record_access("a.rs", NOW + 20).expect("a again");

        let mut incoming = UsageSnapshot::new();
        incoming.insert(
            "a.rs".to_owned(),
            UsageRecord {
                last_accessed: NOW,
                access_count: 1,
            },
        );
        incoming.insert(
            "b.rs".to_owned(),
            UsageRecord {
                last_accessed: NOW,
                access_count: 5_000,
            },
        );

        assert_eq!(store.merge_all(incoming).expect("merge"), 2);
        assert_eq!(
            store.get("a.rs").expect("get a"),
            Some(UsageRecord {
                last_accessed: NOW + 20,
                access_count: 2,
            })
        );
        assert_eq!(
            store.get("b.rs").expect("get b").map(|record| record.access_count),
            Some(MAX_ACCESS_COUNT)
        );
    }
}
