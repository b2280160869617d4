//! Subsequence fuzzy matching in the style of fzy: a Smith-Waterman-like
//! alignment that rewards consecutive runs and matches at token boundaries.
//!
//! Constants are the usual fzy values scaled by 1000 so scores stay
//! integral. Degenerate input (empty, oversized, equal length) scores
//! a neutral 0 rather than a sentinel.

pub const SCORE_GAP_LEADING: f64 = -5.0;
pub const SCORE_GAP_TRAILING: f64 = -5.0;
pub const SCORE_GAP_INNER: f64 = -10.0;
pub const SCORE_MATCH_CONSECUTIVE: f64 = 1000.0;
pub const SCORE_MATCH_SLASH: f64 = 900.0;
pub const SCORE_MATCH_WORD: f64 = 800.0;
pub const SCORE_MATCH_DOT: f64 = 700.0;
pub const SCORE_MATCH_CAPITAL: f64 = 600.0;

pub const SCORE_MIN: f64 = f64::NEG_INFINITY;
pub const SCORE_MAX: f64 = f64::INFINITY;
pub const MATCH_MAX_LENGTH: usize = 1024;

const PATH_SEPARATOR: char = '/';

pub fn score_min() -> f64 {
    SCORE_MIN
}

pub fn score_max() -> f64 {
    SCORE_MAX
}

/// Lowest score a matching pair can reach: every position an inner gap.
pub fn score_floor() -> f64 {
    (MATCH_MAX_LENGTH + 1) as f64 * SCORE_GAP_INNER
}

pub fn has_match(needle: &str, haystack: &str) -> bool {
    let mut cursor = haystack.chars().map(fold_case);
    needle
        .chars()
        .map(fold_case)
        .all(|wanted| cursor.any(|candidate| candidate == wanted))
}

/// Match quality of `needle` against `haystack`, never a sentinel.
pub fn score(needle: &str, haystack: &str) -> f64 {
    let raw = score_raw(needle, haystack);
    if raw.is_finite() { raw } else { 0.0 }
}

/// Like [`score`] but a failed alignment yields [`SCORE_MIN`].
pub fn score_raw(needle: &str, haystack: &str) -> f64 {
    let needle = needle.chars().collect::<Vec<_>>();
    let haystack = haystack.chars().collect::<Vec<_>>();
    let (n, m) = (needle.len(), haystack.len());

    if is_degenerate(n, m) || n == m {
        return 0.0;
    }

    let matrix = ScoreMatrix::compute(&needle, &haystack);
    matrix.best(n - 1, m - 1)
}

/// Haystack index of each needle character in the best alignment.
pub fn positions(needle: &str, haystack: &str) -> Vec<usize> {
    align(needle, haystack).positions
}

/// Score and match positions read off one set of DP tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub score: f64,
    pub positions: Vec<usize>,
}

/// Equivalent to calling [`score`] and [`positions`], with a single DP pass.
pub fn align(needle: &str, haystack: &str) -> Alignment {
    let needle = needle.chars().collect::<Vec<_>>();
    let haystack = haystack.chars().collect::<Vec<_>>();
    let (n, m) = (needle.len(), haystack.len());

    if is_degenerate(n, m) {
        return Alignment {
            score: 0.0,
            positions: Vec::new(),
        };
    }
    if n == m {
        return Alignment {
            score: 0.0,
            positions: (0..n).collect(),
        };
    }

    let matrix = ScoreMatrix::compute(&needle, &haystack);
    let best = matrix.best(n - 1, m - 1);
    if best == SCORE_MIN {
        return Alignment {
            score: 0.0,
            positions: Vec::new(),
        };
    }

    Alignment {
        score: best,
        positions: matrix.trace(n, m),
    }
}

/// Bonus for matching at each haystack position, from the preceding char.
pub fn precompute_bonus(haystack: &[char]) -> Vec<f64> {
    let mut last = PATH_SEPARATOR;
    haystack
        .iter()
        .map(|&current| {
            let bonus = match last {
                PATH_SEPARATOR => SCORE_MATCH_SLASH,
                '-' | '_' | ' ' => SCORE_MATCH_WORD,
                '.' => SCORE_MATCH_DOT,
                _ if last.is_ascii_lowercase() && current.is_ascii_uppercase() => {
                    SCORE_MATCH_CAPITAL
                }
                _ => 0.0,
            };
            last = current;
            bonus
        })
        .collect()
}

fn is_degenerate(n: usize, m: usize) -> bool {
    n == 0 || m == 0 || n > MATCH_MAX_LENGTH || m > MATCH_MAX_LENGTH
}

fn fold_case(ch: char) -> char {
    ch.to_lowercase().next().unwrap_or(ch)
}

/// `D` holds the best score with needle[i] matched exactly at haystack[j];
/// `M` the best score for needle[..=i] within haystack[..=j].
struct ScoreMatrix {
    width: usize,
    diagonal: Vec<f64>,
    best: Vec<f64>,
}

impl ScoreMatrix {
    fn compute(needle: &[char], haystack: &[char]) -> Self {
        let n = needle.len();
        let m = haystack.len();
        let bonus = precompute_bonus(haystack);
        let needle = needle.iter().copied().map(fold_case).collect::<Vec<_>>();
        let haystack = haystack.iter().copied().map(fold_case).collect::<Vec<_>>();

        let mut matrix = Self {
            width: m,
            diagonal: vec![SCORE_MIN; n * m],
            best: vec![SCORE_MIN; n * m],
        };

        for (i, &needle_char) in needle.iter().enumerate() {
            let gap_score = if i == n - 1 {
                SCORE_GAP_TRAILING
            } else {
                SCORE_GAP_INNER
            };
            let mut prev_score = SCORE_MIN;

            for (j, &haystack_char) in haystack.iter().enumerate() {
                if needle_char == haystack_char {
                    let score = if i == 0 {
                        j as f64 * SCORE_GAP_LEADING + bonus[j]
                    } else if j > 0 {
                        let after_gap = matrix.best(i - 1, j - 1) + bonus[j];
                        let consecutive =
                            matrix.diagonal(i - 1, j - 1) + SCORE_MATCH_CONSECUTIVE;
                        after_gap.max(consecutive)
                    } else {
                        SCORE_MIN
                    };
                    matrix.diagonal[i * m + j] = score;
                    prev_score = score.max(prev_score + gap_score);
                } else {
                    prev_score += gap_score;
                }
                matrix.best[i * m + j] = prev_score;
            }
        }

        matrix
    }

    /// Walks back from the bottom-right corner; the alignment must exist.
    fn trace(&self, n: usize, m: usize) -> Vec<usize> {
        let mut positions = vec![0; n];
        let mut match_required = false;
        let mut remaining = m;

        for i in (0..n).rev() {
            while remaining > 0 {
                let j = remaining - 1;
                remaining -= 1;

                let diagonal = self.diagonal(i, j);
                if diagonal != SCORE_MIN && (match_required || diagonal == self.best(i, j)) {
                    match_required = i > 0
                        && j > 0
                        && diagonal == self.diagonal(i - 1, j - 1) + SCORE_MATCH_CONSECUTIVE;
                    positions[i] = j;
                    break;
                }
            }
        }

        positions
    }

    fn diagonal(&self, i: usize, j: usize) -> f64 {
        self.diagonal[i * self.width + j]
    }

    fn best(&self, i: usize, j: usize) -> f64 {
        self.best[i * self.width + j]
    }
}
