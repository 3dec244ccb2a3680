//! Gap report: source keys missing from the target, with the closest
//! target key as a suggestion.
//!
//! Similarity is the matching-blocks ratio `2*M / (|a| + |b|)`, where `M` is
//! the number of characters covered by recursively finding the longest
//! common substring and repeating on both sides of it.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::key::TargetKey;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityMatch {
    pub key: String,
    /// Closest target key at or above the threshold.
    pub best_match: Option<String>,
    /// Score of `best_match`, or the best score seen when none qualified.
    pub score: f64,
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
/// Returns `(i, j, len)`.
fn longest_match(
    a: &[char],
    b2j: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_len) = (alo, blo, 0usize);
    // Length of the match ending at a[i-1], b[j], keyed by j.
    let mut run_len: HashMap<usize, usize> = HashMap::new();

    for (i, ch) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut next_run: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b2j.get(ch) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = j.checked_sub(1).and_then(|p| run_len.get(&p)).copied().unwrap_or(0) + 1;
                next_run.insert(j, k);
                if k > best_len {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_len = k;
                }
            }
        }
        run_len = next_run;
    }

    (best_i, best_j, best_len)
}

/// Total length of all matching blocks between `a` and `b`.
fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, ch) in b.iter().enumerate() {
        b2j.entry(*ch).or_default().push(j);
    }

    let mut total = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, &b2j, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    total
}

/// Similarity ratio in [0, 1]. Two empty strings are identical.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let len = a.len() + b.len();
    if len == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / len as f64
}

/// Highest-scoring candidate for `key`. Ties keep the earlier candidate.
fn best_candidate<'a>(key: &str, candidates: &'a BTreeSet<String>) -> Option<(&'a str, f64)> {
    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let score = ratio(key, candidate);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate.as_str(), score));
        }
    }
    best
}

/// One entry per source key with no text match among `target_keys`, sorted
/// by key.
///
/// Suggestions are drawn from every target key by its displayed text, so a
/// numeric cell `1200` shows up as the suggestion for an unmatched `"1200"`.
pub fn find_gaps(
    source_keys: &BTreeSet<String>,
    target_keys: &BTreeSet<TargetKey>,
    threshold: f64,
) -> Vec<SimilarityMatch> {
    let matched: BTreeSet<&str> = target_keys.iter().filter_map(TargetKey::as_text).collect();
    let candidates: BTreeSet<String> = target_keys.iter().map(ToString::to_string).collect();

    source_keys
        .iter()
        .filter(|key| !matched.contains(key.as_str()))
        .map(|key| match best_candidate(key, &candidates) {
            Some((candidate, score)) if score >= threshold => SimilarityMatch {
                key: key.clone(),
                best_match: Some(candidate.to_string()),
                score,
            },
            Some((_, score)) => SimilarityMatch { key: key.clone(), best_match: None, score },
            None => SimilarityMatch { key: key.clone(), best_match: None, score: 0.0 },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|s| s.to_string()).collect()
    }

    fn targets(keys: &[&str]) -> BTreeSet<TargetKey> {
        keys.iter().map(|s| TargetKey::Text(s.to_string())).collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn ratio_known_values() {
        assert!(close(ratio("abcd", "abcd"), 1.0));
        assert!(close(ratio("abcd", "wxyz"), 0.0));
        assert!(close(ratio("", ""), 1.0));
        assert!(close(ratio("abc", ""), 0.0));
        // "M100" vs "M1000": 4 matching chars, 2*4/9
        assert!(close(ratio("M100", "M1000"), 8.0 / 9.0));
        // No block longer than one char: "a", then "b", then "d".
        assert!(close(ratio("abcd", "acbd"), 2.0 * 3.0 / 8.0));
    }

    #[test]
    fn ratio_uses_recursive_blocks() {
        // "qabxcd" vs "abycdf": blocks "ab" and "cd" -> 2*4/12
        assert!(close(ratio("qabxcd", "abycdf"), 8.0 / 12.0));
    }

    #[test]
    fn ratio_counts_characters_not_bytes() {
        assert!(close(ratio("型号A1", "型号A2"), 2.0 * 3.0 / 8.0));
    }

    #[test]
    fn one_entry_per_missing_key() {
        let source = set(&["M100", "M200", "M300"]);
        let target = targets(&["M100", "X1"]);
        let gaps = find_gaps(&source, &target, 0.8);
        let keys: Vec<_> = gaps.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["M200", "M300"]);
    }

    #[test]
    fn suggests_best_match_above_threshold() {
        let source = set(&["AB-1000"]);
        let target = targets(&["AB-100", "XYZ"]);
        let gaps = find_gaps(&source, &target, 0.8);
        assert_eq!(gaps[0].best_match.as_deref(), Some("AB-100"));
        assert!(close(gaps[0].score, 12.0 / 13.0));
    }

    #[test]
    fn no_match_below_threshold_keeps_best_score() {
        let source = set(&["M200"]);
        let target = targets(&["M100", "Q9"]);
        let gaps = find_gaps(&source, &target, 0.8);
        assert_eq!(gaps[0].best_match, None);
        assert!(close(gaps[0].score, 0.75));
        let gaps = find_gaps(&source, &target, 0.6);
        assert_eq!(gaps[0].best_match.as_deref(), Some("M100"));
    }

    #[test]
    fn empty_target_reports_zero() {
        let gaps = find_gaps(&set(&["M1"]), &BTreeSet::new(), 0.0);
        assert_eq!(gaps, vec![SimilarityMatch { key: "M1".into(), best_match: None, score: 0.0 }]);
    }

    #[test]
    fn ties_keep_lexicographically_first() {
        let source = set(&["AB"]);
        let target = targets(&["AC", "AD"]);
        let gaps = find_gaps(&source, &target, 0.5);
        assert_eq!(gaps[0].best_match.as_deref(), Some("AC"));
    }

    #[test]
    fn higher_threshold_matches_are_a_subset() {
        let source = set(&["M100", "M2000", "K-77", "Z"]);
        let target = targets(&["M10", "M200", "K-78", "Q"]);
        let loose = find_gaps(&source, &target, 0.5);
        let strict = find_gaps(&source, &target, 0.8);
        assert_eq!(loose.len(), strict.len());
        for (l, s) in loose.iter().zip(&strict) {
            assert_eq!(l.key, s.key);
            if s.best_match.is_some() {
                assert_eq!(l.best_match, s.best_match);
            }
        }
    }

    #[test]
    fn numeric_target_cell_does_not_close_the_gap() {
        let source = set(&["1200", "M100"]);
        let mut target = targets(&["M100"]);
        target.insert(TargetKey::Number(crate::key::NumericKey(1200.0)));
        let gaps = find_gaps(&source, &target, 0.8);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].key, "1200");
        assert_eq!(gaps[0].best_match.as_deref(), Some("1200"));
        assert!(close(gaps[0].score, 1.0));
    }
}
