use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

mod usage;

pub use usage::{
    DEFAULT_DECAY_RATE, MAX_ACCESS_COUNT, PrunedRecord, RetentionPolicy, UsageRecord,
    UsageSnapshot, days_between, frequency_score, prune, recency_score, record_access,
};

pub const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

pub type CandidateId = String;

/// A rankable file. `label` is the workspace-relative, `/`-separated path the
/// matcher runs against; `id` resolves back to the file and keys usage records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub label: String,
}

impl Candidate {
    pub fn new(id: impl Into<String>, label: impl AsRef<str>) -> Self {
        Self {
            id: id.into(),
            label: normalize_path(label.as_ref()),
        }
    }

    /// Candidate whose identifier and label are the same relative path.
    pub fn from_relative(path: impl AsRef<str>) -> Self {
        let label = normalize_path(path.as_ref());
        Self {
            id: label.clone(),
            label,
        }
    }

    pub fn file_name(&self) -> &str {
        file_name(&self.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_match_quality_weight")]
    pub match_quality: f64,
    #[serde(default = "default_recency_weight")]
    pub recency: f64,
    #[serde(default = "default_frequency_weight")]
    pub frequency: f64,
    #[serde(default = "default_close_weight")]
    pub close: f64,
}

impl ScoreWeights {
    pub fn as_array(&self) -> [f64; 4] {
        [self.match_quality, self.recency, self.frequency, self.close]
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            match_quality: default_match_quality_weight(),
            recency: default_recency_weight(),
            frequency: default_frequency_weight(),
            close: default_close_weight(),
        }
    }
}

fn default_match_quality_weight() -> f64 {
    0.5
}

fn default_recency_weight() -> f64 {
    0.3
}

fn default_frequency_weight() -> f64 {
    0.2
}

fn default_close_weight() -> f64 {
    0.1
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
}

pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn current_unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}
