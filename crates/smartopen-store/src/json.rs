use smartopen_core::{MAX_ACCESS_COUNT, UsageRecord, UsageSnapshot};

use crate::{StoreError, UsageStore};

pub fn export_snapshot_json<S: UsageStore + ?Sized>(store: &S) -> Result<String, StoreError> {
    let snapshot = store.snapshot()?;
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

/// Parses `{"<id>": {"last_accessed": ms, "access_count": n}}`. Counts above
/// the cap are clamped; zero counts and negative timestamps are rejected.
pub fn parse_snapshot_json(raw: &str) -> Result<UsageSnapshot, StoreError> {
    let mut snapshot: UsageSnapshot = serde_json::from_str(raw)?;

    for (id, record) in snapshot.iter_mut() {
        if id.trim().is_empty() {
            return Err(StoreError::InvalidRecord {
                id: id.clone(),
                reason: "id must not be empty".to_owned(),
            });
        }
        if record.last_accessed < 0 {
            return Err(StoreError::InvalidRecord {
                id: id.clone(),
                reason: format!("last_accessed {} is negative", record.last_accessed),
            });
        }
        if record.access_count == 0 {
            return Err(StoreError::InvalidRecord {
                id: id.clone(),
                reason: "access_count must be at least 1".to_owned(),
            });
        }
        record.access_count = record.access_count.min(MAX_ACCESS_COUNT);
    }

    Ok(snapshot)
}

/// Keeps the later timestamp and the larger count for ids present in both.
pub fn merge_snapshots(mut base: UsageSnapshot, incoming: UsageSnapshot) -> UsageSnapshot {
    for (id, record) in incoming {
        base.entry(id)
            .and_modify(|existing| {
                *existing = UsageRecord {
                    last_accessed: existing.last_accessed.max(record.last_accessed),
                    access_count: existing
                        .access_count
                        .max(record.access_count)
                        .min(MAX_ACCESS_COUNT),
                };
            })
            .or_insert(record);
    }
    base
}

pub fn import_snapshot_json<S: UsageStore + ?Sized>(
    store: &S,
    raw: &str,
    merge: bool,
) -> Result<usize, StoreError> {
    let incoming = parse_snapshot_json(raw)?;
    let imported = incoming.len();

    let total = if merge {
        store.merge_all(incoming)?
    } else {
        store.replace_all(&incoming)?;
        imported
    };

    tracing::info!(imported, total, merge, "imported usage records");
    Ok(imported)
}
