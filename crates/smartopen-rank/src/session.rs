use std::time::Instant;

use serde::{Deserialize, Serialize};
use smartopen_config::{ActiveFilePolicy, DEFAULT_ACTIVE_FILE_PENALTY, SmartOpenConfig};
use smartopen_core::{
    Candidate, CandidateId, DEFAULT_DECAY_RATE, MAX_ACCESS_COUNT, ScoreWeights, UsageSnapshot,
    file_name, frequency_score, normalize_path, recency_score,
};

use crate::fzy;
use crate::ranking::{
    NormalizationTargets, ScoreRange, active_segment_count, apply_penalty, close_score,
    compare_ranked, composite_score,
};

pub const HINT_LABEL: &str = "Use at least 2 characters to search files...";

#[derive(Debug, Clone, PartialEq)]
pub struct RankingOptions {
    pub weights: ScoreWeights,
    pub decay_rate: f64,
    pub active_file_policy: ActiveFilePolicy,
    pub active_file_penalty: f64,
    pub limit: Option<usize>,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            decay_rate: DEFAULT_DECAY_RATE,
            active_file_policy: ActiveFilePolicy::default(),
            active_file_penalty: DEFAULT_ACTIVE_FILE_PENALTY,
            limit: None,
        }
    }
}

impl From<&SmartOpenConfig> for RankingOptions {
    fn from(config: &SmartOpenConfig) -> Self {
        Self {
            weights: config.ranking.weights,
            decay_rate: config.ranking.decay_rate,
            active_file_policy: config.ranking.active_file,
            active_file_penalty: config.ranking.active_file_penalty,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankedKind {
    File,
    /// Disabled placeholder asking for a longer query.
    Hint,
}

/// Per-factor scores of one result. Everything except `raw` is already
/// remapped onto the session's shared scale.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub raw: f64,
    pub recency: f64,
    pub frequency: f64,
    pub close: f64,
    #[serde(rename = "final")]
    pub final_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub rank: usize,
    pub kind: RankedKind,
    pub id: Option<CandidateId>,
    pub relative_path: String,
    pub label: String,
    pub description: String,
    pub positions: Vec<usize>,
    pub scores: ScoreBreakdown,
}

impl RankedResult {
    pub fn hint() -> Self {
        Self {
            rank: 0,
            kind: RankedKind::Hint,
            id: None,
            relative_path: String::new(),
            label: HINT_LABEL.to_owned(),
            description: String::new(),
            positions: Vec::new(),
            scores: ScoreBreakdown::default(),
        }
    }

    pub fn is_hint(&self) -> bool {
        self.kind == RankedKind::Hint
    }
}

/// One ranking pass over a fixed candidate set and usage snapshot. Holds no
/// state between calls to [`RankingSession::rank`].
pub struct RankingSession<'a> {
    options: &'a RankingOptions,
    usage: &'a UsageSnapshot,
    active: Option<String>,
    now_ms: i64,
}

struct Scored<'c> {
    candidate: &'c Candidate,
    raw: f64,
    positions: Vec<usize>,
    recency: f64,
    frequency: f64,
    close: f64,
}

impl<'a> RankingSession<'a> {
    pub fn new(
        options: &'a RankingOptions,
        usage: &'a UsageSnapshot,
        active: Option<&str>,
        now_ms: i64,
    ) -> Self {
        Self {
            options,
            usage,
            active: active
                .map(normalize_path)
                .filter(|path| !path.is_empty()),
            now_ms,
        }
    }

    pub fn rank(&self, query: &str, candidates: &[Candidate]) -> Vec<RankedResult> {
        if query.chars().count() == 1 {
            return vec![RankedResult::hint()];
        }

        let started = Instant::now();
        let active = self.active.as_deref();

        let scored = candidates
            .iter()
            .filter(|candidate| fzy::has_match(query, &candidate.label))
            .map(|candidate| {
                let record = self.usage.get(&candidate.id);
                let alignment = fzy::align(query, &candidate.label);
                Scored {
                    candidate,
                    raw: alignment.score,
                    positions: alignment.positions,
                    recency: recency_score(
                        record.map(|record| record.last_accessed),
                        self.now_ms,
                        self.options.decay_rate,
                    ),
                    frequency: f64::from(frequency_score(record)),
                    close: close_score(&candidate.label, active),
                }
            })
            .collect::<Vec<_>>();

        let match_range = ScoreRange::of(scored.iter().map(|entry| entry.raw)).unwrap_or_default();
        let recency_range =
            ScoreRange::of(scored.iter().map(|entry| entry.recency)).unwrap_or_default();
        let frequency_range = ScoreRange::new(0.0, f64::from(MAX_ACCESS_COUNT));
        let close_range = ScoreRange::new(0.0, active_segment_count(active) as f64);
        let targets = NormalizationTargets::for_match_range(match_range, frequency_range.high);

        let survivors = scored.len();
        let weights = &self.options.weights;
        let mut ranked = scored
            .into_iter()
            .map(|entry| {
                let recency = recency_range.map(&targets.recency, entry.recency);
                let frequency = frequency_range.map(&targets.frequency, entry.frequency);
                let close = close_range.map(&targets.close, entry.close);

                let mut final_score =
                    composite_score(entry.raw, recency, frequency, close, weights);
                if self.is_active(entry.candidate)
                    && self.options.active_file_policy == ActiveFilePolicy::Penalize
                {
                    final_score = apply_penalty(final_score, self.options.active_file_penalty);
                }

                let scores = ScoreBreakdown {
                    raw: entry.raw,
                    recency,
                    frequency,
                    close,
                    final_score,
                };
                (entry, scores)
            })
            .collect::<Vec<_>>();

        ranked.sort_by(|(left, left_scores), (right, right_scores)| {
            compare_ranked(
                sort_key(left.candidate, left_scores),
                sort_key(right.candidate, right_scores),
            )
        });
        if let Some(limit) = self.options.limit {
            ranked.truncate(limit);
        }

        let results = ranked
            .into_iter()
            .enumerate()
            .map(|(rank, (entry, scores))| RankedResult {
                rank,
                kind: RankedKind::File,
                id: Some(entry.candidate.id.clone()),
                relative_path: entry.candidate.label.clone(),
                label: file_name(&entry.candidate.label).to_owned(),
                description: describe(&entry.candidate.label, &scores, weights),
                positions: entry.positions,
                scores,
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            query_len = query.chars().count(),
            candidates = candidates.len(),
            survivors,
            returned = results.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "ranked candidates"
        );

        results
    }

    fn is_active(&self, candidate: &Candidate) -> bool {
        self.active
            .as_deref()
            .is_some_and(|active| candidate.id == active || candidate.label == active)
    }
}

fn sort_key<'c>(candidate: &'c Candidate, scores: &ScoreBreakdown) -> (f64, &'c str, &'c str) {
    (
        scores.final_score,
        candidate.label.as_str(),
        candidate.id.as_str(),
    )
}

/// `path - (fnl:F)=(raw:R)(rec:C)(frq:Q)(cls:L)`, each factor shown with its
/// weight applied. Parts that round to zero are left out.
fn describe(path: &str, scores: &ScoreBreakdown, weights: &ScoreWeights) -> String {
    let parts = [
        ("fnl", scores.final_score, ")="),
        ("raw", scores.raw * weights.match_quality, ")"),
        ("rec", scores.recency * weights.recency, ")"),
        ("frq", scores.frequency * weights.frequency, ")"),
        ("cls", scores.close * weights.close, ")"),
    ];

    let mut description = format!("{path} - ");
    for (tag, value, suffix) in parts {
        let rendered = format!("{value:.2}");
        if rendered == "0.00" || rendered == "-0.00" {
            continue;
        }
        description.push_str(&format!("({tag}:{rendered}{suffix}"));
    }
    description
}
