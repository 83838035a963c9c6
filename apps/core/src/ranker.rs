use std::cmp::Ordering;

use crate::config::RankWeights;
use crate::model::Candidate;

/// Floor for any real subsequence match, so gap penalties never push a hit
/// to zero or below and the priority multiplier keeps its direction.
pub const MIN_MATCH_SCORE: f64 = 0.01;

/// A candidate together with the priority of the registration that produced it.
#[derive(Debug, Clone)]
pub struct RankEntry {
    pub candidate: Candidate,
    pub priority: i32,
}

impl RankEntry {
    pub fn new(candidate: Candidate, priority: i32) -> Self {
        Self {
            candidate,
            priority,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ranker {
    weights: RankWeights,
}

impl Ranker {
    pub fn new(weights: RankWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &RankWeights {
        &self.weights
    }

    /// Scores, filters and orders `entries` for `query`.
    ///
    /// Order: final score descending, then priority descending, then the
    /// input order. Identical input always yields identical output.
    pub fn rank(&self, entries: Vec<RankEntry>, query: &str) -> Vec<Candidate> {
        let needle = fold_query(query);

        let mut scored: Vec<(f64, i32, Candidate)> = entries
            .into_iter()
            .filter_map(|entry| {
                let score = self.score(&entry.candidate, &needle, entry.priority)?;
                Some((score, entry.priority, entry.candidate))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.cmp(&a.1))
                .then(Ordering::Equal)
        });

        scored
            .into_iter()
            .map(|(score, _, mut candidate)| {
                candidate.score = score;
                candidate
            })
            .collect()
    }

    fn score(&self, candidate: &Candidate, needle: &[char], priority: i32) -> Option<f64> {
        let fuzzy = if candidate.always_show {
            if candidate.score > 0.0 {
                candidate.score
            } else {
                self.weights.pinned
            }
        } else {
            fuzzy_score(&candidate.title, needle, &self.weights)?
        };

        let recency_bonus = candidate.recency.unwrap_or(0.0).clamp(0.0, 1.0) * self.weights.recency;
        Some(fuzzy * priority_weight(priority) + recency_bonus)
    }
}

pub fn priority_weight(priority: i32) -> f64 {
    f64::from(priority.max(1)) / 100.0
}

fn fold_query(query: &str) -> Vec<char> {
    query
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(fold_char)
        .collect()
}

fn fold_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Case-insensitive subsequence score of `needle` against `title`, or `None`
/// when `needle` is not a subsequence. A match always scores at least
/// [`MIN_MATCH_SCORE`]. Whitespace in the query is ignored.
pub fn fuzzy_score(title: &str, needle: &[char], weights: &RankWeights) -> Option<f64> {
    if needle.is_empty() {
        return Some(weights.match_char);
    }

    let original: Vec<char> = title.chars().collect();
    if original.len() < needle.len() {
        return None;
    }
    let folded: Vec<char> = original.iter().copied().map(fold_char).collect();
    let latest = latest_positions(&folded, needle)?;

    let mut best: Option<f64> = None;
    for start in 0..=latest[0] {
        if folded[start] != needle[0] {
            continue;
        }
        let positions = align_from(&original, &folded, needle, &latest, start);
        let score = alignment_score(&original, &positions, weights);
        if best.map_or(true, |current| score > current) {
            best = Some(score);
        }
    }
    best
}

/// For each needle char, the rightmost position it can take while the rest
/// of the needle still fits after it. `None` when there is no match at all.
fn latest_positions(haystack: &[char], needle: &[char]) -> Option<Vec<usize>> {
    let mut latest = vec![0; needle.len()];
    let mut end = haystack.len();
    for (index, needle_char) in needle.iter().enumerate().rev() {
        let position = haystack[..end].iter().rposition(|c| c == needle_char)?;
        latest[index] = position;
        end = position;
    }
    Some(latest)
}

/// Walks left to right taking a contiguous match when available, otherwise
/// the first word-boundary occurrence that still leaves room for the rest.
fn align_from(
    original: &[char],
    folded: &[char],
    needle: &[char],
    latest: &[usize],
    start: usize,
) -> Vec<usize> {
    let mut positions = Vec::with_capacity(needle.len());
    positions.push(start);
    let mut previous = start;

    for (index, needle_char) in needle.iter().enumerate().skip(1) {
        let window = previous + 1..=latest[index];
        let mut first = None;
        let mut boundary = None;
        for position in window {
            if folded[position] != *needle_char {
                continue;
            }
            if first.is_none() {
                first = Some(position);
                if position == previous + 1 {
                    break;
                }
            }
            if is_word_boundary(original, position) {
                boundary = Some(position);
                break;
            }
        }
        let chosen = match (first, boundary) {
            (Some(first), _) if first == previous + 1 => first,
            (_, Some(boundary)) => boundary,
            (Some(first), None) => first,
            // latest[index] itself always matches, so the window is never empty.
            (None, None) => latest[index],
        };
        positions.push(chosen);
        previous = chosen;
    }
    positions
}

fn alignment_score(original: &[char], positions: &[usize], weights: &RankWeights) -> f64 {
    let mut score = 0.0;
    let mut previous: Option<usize> = None;

    for &position in positions {
        score += weights.match_char;
        if is_word_boundary(original, position) {
            score += weights.word_boundary;
        }
        if let Some(prev) = previous {
            if position == prev + 1 {
                score += weights.contiguous;
            } else {
                let gap = (position - prev - 1) as f64;
                score -= (gap * weights.gap_penalty).min(weights.max_gap_penalty);
            }
        }
        previous = Some(position);
    }

    if positions.first() == Some(&0) {
        score += weights.start;
    }
    score.max(MIN_MATCH_SCORE)
}

fn is_word_boundary(chars: &[char], index: usize) -> bool {
    if index == 0 {
        return true;
    }
    let prev = chars[index - 1];
    let current = chars[index];
    !prev.is_alphanumeric() || (prev.is_lowercase() && current.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::{fold_query, fuzzy_score, is_word_boundary};
    use crate::config::RankWeights;

    fn score(title: &str, query: &str) -> Option<f64> {
        fuzzy_score(title, &fold_query(query), &RankWeights::default())
    }

    #[test]
    fn non_subsequence_scores_none() {
        assert!(score("find", "fix").is_none());
        assert!(score("ab", "abc").is_none());
    }

    #[test]
    fn prefix_beats_inner_match() {
        assert!(score("code", "co").unwrap() > score("vscode", "co").unwrap());
    }

    #[test]
    fn contiguous_beats_scattered() {
        assert!(score("terminal", "term").unwrap() > score("txexrxm", "term").unwrap());
    }

    #[test]
    fn best_alignment_prefers_word_start() {
        // "m" at the start of "manager" beats the "m" buried in "firmware".
        let boundary = score("firmware manager", "fm").unwrap();
        let greedy_only = score("firmwaremanager", "fm").unwrap();
        assert!(boundary > greedy_only);
    }

    #[test]
    fn scattered_match_stays_positive() {
        let scattered = score("xaxxxxxxxxxxxxbxxxxxxxxxxxxxc", "abc").unwrap();
        assert!(scattered >= super::MIN_MATCH_SCORE);
    }

    #[test]
    fn detects_camel_case_and_separator_boundaries() {
        let chars: Vec<char> = "openFile_now".chars().collect();
        assert!(is_word_boundary(&chars, 0));
        assert!(is_word_boundary(&chars, 4));
        assert!(is_word_boundary(&chars, 9));
        assert!(!is_word_boundary(&chars, 2));
    }

    #[test]
    fn query_whitespace_is_ignored() {
        assert_eq!(score("file manager", "fm"), score("file manager", "f m"));
    }
}
