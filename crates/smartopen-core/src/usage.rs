use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CandidateId, MS_PER_DAY};

pub const MAX_ACCESS_COUNT: u32 = 1000;
pub const DEFAULT_DECAY_RATE: f64 = 0.001;

const DEFAULT_RETENTION_BASE_DAYS: f64 = 30.0;
const DEFAULT_RETENTION_DAYS_PER_ACCESS: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub last_accessed: i64,
    pub access_count: u32,
}

impl UsageRecord {
    pub fn first_access(now_ms: i64) -> Self {
        Self {
            last_accessed: now_ms,
            access_count: 1,
        }
    }

    pub fn touch(&mut self, now_ms: i64) {
        self.last_accessed = now_ms;
        self.access_count = self.access_count.saturating_add(1).min(MAX_ACCESS_COUNT);
    }
}

pub type UsageSnapshot = BTreeMap<CandidateId, UsageRecord>;

pub fn days_between(earlier_ms: i64, later_ms: i64) -> f64 {
    later_ms.saturating_sub(earlier_ms) as f64 / MS_PER_DAY
}

/// Exponential decay of a last-access timestamp. A missing or zero timestamp
/// means "never accessed" and scores 0.
pub fn recency_score(last_accessed: Option<i64>, now_ms: i64, decay_rate: f64) -> f64 {
    let Some(last_accessed) = last_accessed.filter(|value| *value != 0) else {
        return 0.0;
    };

    let days = days_between(last_accessed, now_ms).max(0.0);
    let score = (-decay_rate * days).exp();
    if score.is_finite() { score } else { 0.0 }
}

pub fn frequency_score(record: Option<&UsageRecord>) -> u32 {
    record
        .map(|record| record.access_count.min(MAX_ACCESS_COUNT))
        .unwrap_or(0)
}

pub fn record_access(records: &mut UsageSnapshot, id: &str, now_ms: i64) -> UsageRecord {
    match records.get_mut(id) {
        Some(record) => {
            record.touch(now_ms);
            *record
        }
        None => {
            let record = UsageRecord::first_access(now_ms);
            records.insert(id.to_owned(), record);
            record
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub base_days: f64,
    pub days_per_access: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            base_days: DEFAULT_RETENTION_BASE_DAYS,
            days_per_access: DEFAULT_RETENTION_DAYS_PER_ACCESS,
        }
    }
}

impl RetentionPolicy {
    /// Frequently opened files earn extra grace: at the access cap this is
    /// 30 + 1000 / 50 = 50 days with the default policy.
    pub fn retention_days(&self, record: &UsageRecord) -> f64 {
        let bonus = if self.days_per_access > 0.0 {
            f64::from(record.access_count) / self.days_per_access
        } else {
            0.0
        };
        self.base_days + bonus
    }

    pub fn is_expired(&self, record: &UsageRecord, now_ms: i64) -> bool {
        days_between(record.last_accessed, now_ms) > self.retention_days(record)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrunedRecord {
    pub id: CandidateId,
    pub record: UsageRecord,
    pub retention_days: f64,
}

pub fn prune(
    records: &mut UsageSnapshot,
    now_ms: i64,
    policy: &RetentionPolicy,
) -> Vec<PrunedRecord> {
    let mut pruned = Vec::new();

    records.retain(|id, record| {
        if policy.is_expired(record, now_ms) {
            pruned.push(PrunedRecord {
                id: id.clone(),
                record: *record,
                retention_days: policy.retention_days(record),
            });
            false
        } else {
            true
        }
    });

    pruned
}
