use smartopen_config::SmartOpenConfig;
use smartopen_core::{Candidate, PrunedRecord, RetentionPolicy, UsageRecord};
use smartopen_store::UsageStore;

use crate::RankError;
use crate::session::{RankedResult, RankingOptions, RankingSession};

/// Binds a usage store to ranking. Reads take a snapshot per call; the only
/// write is [`SmartOpenService::record_selection`].
pub struct SmartOpenService<S: UsageStore> {
    store: S,
    options: RankingOptions,
    retention: RetentionPolicy,
}

impl<S: UsageStore> SmartOpenService<S> {
    pub fn new(store: S, options: RankingOptions, retention: RetentionPolicy) -> Self {
        Self {
            store,
            options,
            retention,
        }
    }

    pub fn from_config(store: S, config: &SmartOpenConfig) -> Self {
        Self::new(store, RankingOptions::from(config), config.retention.policy())
    }

    pub fn rank(
        &self,
        query: &str,
        candidates: &[Candidate],
        active: Option<&str>,
        now_ms: i64,
    ) -> Result<Vec<RankedResult>, RankError> {
        let usage = self.store.snapshot()?;
        let session = RankingSession::new(&self.options, &usage, active, now_ms);
        Ok(session.rank(query, candidates))
    }

    pub fn record_selection(&self, id: &str, now_ms: i64) -> Result<UsageRecord, RankError> {
        if id.trim().is_empty() {
            return Err(RankError::InvalidInput(
                "selection id must not be empty".to_owned(),
            ));
        }

        let record = self.store.record_access(id, now_ms)?;
        tracing::debug!(
            id,
            access_count = record.access_count,
            "recorded selection"
        );
        Ok(record)
    }

    pub fn prune_stale(&self, now_ms: i64) -> Result<Vec<PrunedRecord>, RankError> {
        let pruned = self.store.prune(now_ms, &self.retention)?;
        for entry in &pruned {
            tracing::info!(
                id = %entry.id,
                last_accessed = entry.record.last_accessed,
                access_count = entry.record.access_count,
                retention_days = entry.retention_days,
                "pruned stale usage record"
            );
        }
        Ok(pruned)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options_mut(&mut self) -> &mut RankingOptions {
        &mut self.options
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }
}
