use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use smartopen_core::{PrunedRecord, UsageRecord, days_between};
use smartopen_rank::SmartOpenService;
use smartopen_store::{UsageStore, export_snapshot_json, import_snapshot_json};

use crate::cli::{ExportArgs, ImportArgs, OpenArgs, PruneArgs, UsageArgs};
use crate::enumerate::candidate_id_for;

pub fn run_open<S: UsageStore>(
    workspace: &Path,
    service: &SmartOpenService<S>,
    args: &OpenArgs,
    now_ms: i64,
    out: &mut dyn Write,
) -> Result<()> {
    let id = candidate_id_for(workspace, &args.path);
    if !workspace.join(&id).is_file() {
        tracing::warn!(id = %id, "recording selection for a path that is not a workspace file");
    }

    let record = service
        .record_selection(&id, args.now_ms.unwrap_or(now_ms))
        .with_context(|| format!("failed to record selection of {id}"))?;
    writeln!(out, "{}", record_json(&id, &record))?;
    Ok(())
}

pub fn run_prune<S: UsageStore>(
    service: &SmartOpenService<S>,
    args: &PruneArgs,
    now_ms: i64,
    out: &mut dyn Write,
) -> Result<()> {
    let now_ms = args.now_ms.unwrap_or(now_ms);
    let expired = if args.dry_run {
        expired_records(service, now_ms)?
    } else {
        service
            .prune_stale(now_ms)
            .context("failed to prune usage records")?
    };

    writeln!(out, "id\tlast_accessed\taccess_count\tretention_days")?;
    for entry in &expired {
        writeln!(
            out,
            "{}\t{}\t{}\t{:.2}",
            entry.id,
            format_timestamp(entry.record.last_accessed),
            entry.record.access_count,
            entry.retention_days
        )?;
    }

    tracing::info!(
        expired = expired.len(),
        dry_run = args.dry_run,
        "prune complete"
    );
    Ok(())
}

pub fn run_usage<S: UsageStore>(
    store: &S,
    args: &UsageArgs,
    now_ms: i64,
    out: &mut dyn Write,
) -> Result<()> {
    let records = store
        .list_recent(args.limit)
        .context("failed to list usage records")?;

    writeln!(out, "id\taccess_count\tlast_accessed\tage_days")?;
    for (id, record) in records {
        writeln!(
            out,
            "{}\t{}\t{}\t{:.1}",
            id,
            record.access_count,
            format_timestamp(record.last_accessed),
            days_between(record.last_accessed, now_ms).max(0.0)
        )?;
    }
    Ok(())
}

pub fn run_export<S: UsageStore>(store: &S, args: &ExportArgs, out: &mut dyn Write) -> Result<()> {
    let raw = export_snapshot_json(store).context("failed to export usage records")?;
    match &args.out {
        Some(path) => {
            fs::write(path, format!("{raw}\n"))
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "exported usage records");
        }
        None => writeln!(out, "{raw}")?,
    }
    Ok(())
}

pub fn run_import<S: UsageStore>(store: &S, args: &ImportArgs) -> Result<usize> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    import_snapshot_json(store, &raw, args.merge)
        .with_context(|| format!("failed to import {}", args.file.display()))
}

fn expired_records<S: UsageStore>(
    service: &SmartOpenService<S>,
    now_ms: i64,
) -> Result<Vec<PrunedRecord>> {
    let policy = service.retention();
    let snapshot = service
        .store()
        .snapshot()
        .context("failed to read usage records")?;

    Ok(snapshot
        .into_iter()
        .filter(|(_, record)| policy.is_expired(record, now_ms))
        .map(|(id, record)| PrunedRecord {
            retention_days: policy.retention_days(&record),
            id,
            record,
        })
        .collect())
}

pub(crate) fn record_json(id: &str, record: &UsageRecord) -> serde_json::Value {
    json!({
        "id": id,
        "last_accessed": record.last_accessed,
        "access_count": record.access_count,
    })
}

fn format_timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}
