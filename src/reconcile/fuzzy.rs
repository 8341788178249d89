//! Approximate string matching for OCR correction
//!
//! Scores are the maximum of a normalized Levenshtein similarity and a
//! Jaro-Winkler similarity, both computed on trimmed, uppercased text.

/// Winkler prefix scaling factor
const PREFIX_SCALE: f64 = 0.1;

/// Maximum prefix length rewarded by Jaro-Winkler
const MAX_PREFIX: usize = 4;

/// `1 - distance / max_len`, 1.0 when both strings are empty
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / max_len as f64
}

/// Jaro-Winkler similarity with a `max_len / 2 - 1` matching window
pub fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
    let s: Vec<char> = a.chars().collect();
    let t: Vec<char> = b.chars().collect();

    if s.is_empty() && t.is_empty() {
        return 1.0;
    }
    if s.is_empty() || t.is_empty() {
        return 0.0;
    }
    if s == t {
        return 1.0;
    }

    let window = (s.len().max(t.len()) / 2).saturating_sub(1);
    let mut s_matched = vec![false; s.len()];
    let mut t_matched = vec![false; t.len()];
    let mut matches = 0usize;

    for (i, sc) in s.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(t.len());
        for j in start..end {
            if !t_matched[j] && *sc == t[j] {
                s_matched[i] = true;
                t_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    // Half-transpositions: matched characters that appear in a different order
    let s_seq = s.iter().zip(&s_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let t_seq = t.iter().zip(&t_matched).filter(|(_, m)| **m).map(|(c, _)| c);
    let half_transpositions = s_seq.zip(t_seq).filter(|(x, y)| x != y).count();

    let m = matches as f64;
    let jaro = (m / s.len() as f64
        + m / t.len() as f64
        + (m - half_transpositions as f64 / 2.0) / m)
        / 3.0;

    let prefix = s
        .iter()
        .zip(&t)
        .take(MAX_PREFIX)
        .take_while(|(x, y)| x == y)
        .count();

    jaro + prefix as f64 * PREFIX_SCALE * (1.0 - jaro)
}

/// Best of both similarities on normalized (trimmed, uppercased) input
pub fn combined_similarity(a: &str, b: &str) -> f64 {
    let na = a.trim().to_uppercase();
    let nb = b.trim().to_uppercase();
    levenshtein_similarity(&na, &nb).max(jaro_winkler_similarity(&na, &nb))
}

/// Highest-scoring candidate at or above `min_score`
///
/// Ties keep the earliest candidate. Returns `("", 0.0)` when nothing qualifies.
pub fn best_match<'a, S: AsRef<str>>(
    text: &str,
    candidates: &'a [S],
    min_score: f64,
) -> (&'a str, f64) {
    if text.is_empty() {
        return ("", 0.0);
    }

    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let candidate = candidate.as_ref();
        let score = combined_similarity(text, candidate);
        if score < min_score {
            continue;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }

    best.unwrap_or(("", 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAIRS: &[(&str, &str)] = &[
        ("", ""),
        ("", "ABC"),
        ("MIDNIGHT", "MIDNIGHT"),
        ("MIDNIGHT", "M1DNIGHT"),
        ("3T", "3"),
        ("340", "043"),
        ("A", "B"),
        ("MARTHA", "MARHTA"),
        ("NAVY", "NAVY BLUE"),
    ];

    #[test]
    fn test_similarities_are_bounded() {
        for (a, b) in PAIRS {
            let lev = levenshtein_similarity(a, b);
            let jw = jaro_winkler_similarity(a, b);
            assert!((0.0..=1.0).contains(&lev), "lev({a:?}, {b:?}) = {lev}");
            assert!((0.0..=1.0).contains(&jw), "jw({a:?}, {b:?}) = {jw}");
        }
    }

    #[test]
    fn test_identity_scores_one() {
        assert_eq!(levenshtein_similarity("", ""), 1.0);
        assert_eq!(jaro_winkler_similarity("", ""), 1.0);
        assert_eq!(levenshtein_similarity("MIDNIGHT", "MIDNIGHT"), 1.0);
        assert_eq!(jaro_winkler_similarity("MIDNIGHT", "MIDNIGHT"), 1.0);
        assert!(levenshtein_similarity("MIDNIGHT", "M1DNIGHT") < 1.0);
        assert!(jaro_winkler_similarity("MIDNIGHT", "M1DNIGHT") < 1.0);
    }

    #[test]
    fn test_jaro_winkler_classic_value() {
        // MARTHA / MARHTA: jaro 0.944, prefix 3
        let jw = jaro_winkler_similarity("MARTHA", "MARHTA");
        assert!((jw - 0.9611).abs() < 1e-3, "got {jw}");
    }

    #[test]
    fn test_levenshtein_similarity_value() {
        assert!((levenshtein_similarity("MIDNIGHT", "M1DNIGHT") - 0.875).abs() < 1e-9);
        assert_eq!(levenshtein_similarity("", "ABC"), 0.0);
    }

    #[test]
    fn test_combined_normalizes_case_and_whitespace() {
        assert_eq!(combined_similarity("  midnight ", "MIDNIGHT"), 1.0);
    }

    #[test]
    fn test_best_match() {
        let colors = ["MIDNIGHT", "WHITE", "NAVY"];
        let (found, score) = best_match("M1DNIGHT", &colors, 0.8);
        assert_eq!(found, "MIDNIGHT");
        assert!(score >= 0.8);

        assert_eq!(best_match("ZZZZ", &colors, 0.9), ("", 0.0));
        assert_eq!(best_match("", &colors, 0.0), ("", 0.0));

        let empty: [&str; 0] = [];
        assert_eq!(best_match("NAVY", &empty, 0.5), ("", 0.0));
    }

    #[test]
    fn test_best_match_ties_keep_first_and_accept_threshold() {
        let candidates = ["NAVY", "navy"];
        let (found, score) = best_match("NAVY", &candidates, 1.0);
        assert_eq!(found, "NAVY");
        assert_eq!(score, 1.0);
    }
}
