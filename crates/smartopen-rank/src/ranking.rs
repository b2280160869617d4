use std::cmp::Ordering;
use std::collections::HashSet;

use smartopen_core::{ScoreWeights, path_segments};

pub(crate) const FALLBACK_RANGE_HIGH: f64 = 100.0;

/// Weighted linear sum; inputs must already share a scale.
pub fn composite_score(
    match_quality: f64,
    recency: f64,
    frequency: f64,
    close: f64,
    weights: &ScoreWeights,
) -> f64 {
    weights.match_quality * match_quality
        + weights.recency * recency
        + weights.frequency * frequency
        + weights.close * close
}

/// Linear remap from `[from_low, from_high]` to `[to_low, to_high]`. A
/// zero-width source range yields 0 instead of NaN.
pub fn map_range(from_low: f64, from_high: f64, to_low: f64, to_high: f64, value: f64) -> f64 {
    let mapped = to_low + ((value - from_low) * (to_high - to_low)) / (from_high - from_low);
    if mapped.is_finite() { mapped } else { 0.0 }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub low: f64,
    pub high: f64,
}

impl ScoreRange {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Min/max of the finite values; `None` when there are none.
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values
            .into_iter()
            .filter(|value| value.is_finite())
            .fold(None, |range: Option<Self>, value| {
                Some(match range {
                    Some(range) => Self::new(range.low.min(value), range.high.max(value)),
                    None => Self::new(value, value),
                })
            })
    }

    pub fn collapsed(&self) -> bool {
        self.high - self.low == 0.0
    }

    pub fn map(&self, target: &ScoreRange, value: f64) -> f64 {
        map_range(self.low, self.high, target.low, target.high, value)
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Target ranges every secondary factor is remapped into for one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationTargets {
    pub recency: ScoreRange,
    pub frequency: ScoreRange,
    pub close: ScoreRange,
}

impl NormalizationTargets {
    /// Secondary factors land on the observed match-score scale. When that
    /// scale has no width (empty query, identical scores) fixed ranges keep
    /// the factors meaningful.
    pub fn for_match_range(match_range: ScoreRange, frequency_cap: f64) -> Self {
        if match_range.collapsed() {
            Self {
                recency: ScoreRange::new(0.0, FALLBACK_RANGE_HIGH),
                frequency: ScoreRange::new(0.0, frequency_cap),
                close: ScoreRange::new(0.0, FALLBACK_RANGE_HIGH),
            }
        } else {
            Self {
                recency: match_range,
                frequency: match_range,
                close: match_range,
            }
        }
    }
}

/// Path proximity to the focused file: candidate segments shared with the
/// active path minus those that are not, floored at zero.
pub fn close_score(candidate_path: &str, active_path: Option<&str>) -> f64 {
    let Some(active_path) = active_path else {
        return 0.0;
    };

    let active_segments = path_segments(active_path).collect::<HashSet<_>>();
    let (shared, distinct) =
        path_segments(candidate_path).fold((0usize, 0usize), |(shared, distinct), segment| {
            if active_segments.contains(segment) {
                (shared + 1, distinct)
            } else {
                (shared, distinct + 1)
            }
        });

    shared.saturating_sub(distinct) as f64
}

pub fn active_segment_count(active_path: Option<&str>) -> usize {
    active_path
        .map(|path| path_segments(path).count())
        .unwrap_or(0)
}

/// Lowers a score by `factor` regardless of its sign.
pub fn apply_penalty(score: f64, factor: f64) -> f64 {
    if score >= 0.0 {
        score * factor
    } else {
        score * (2.0 - factor)
    }
}

/// Descending score, then ascending path, then ascending id.
pub fn compare_ranked(
    (left_score, left_path, left_id): (f64, &str, &str),
    (right_score, right_path, right_id): (f64, &str, &str),
) -> Ordering {
    right_score
        .total_cmp(&left_score)
        .then_with(|| left_path.cmp(right_path))
        .then_with(|| left_id.cmp(right_id))
}
