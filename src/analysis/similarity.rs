//! Near-duplicate detection for extracted key points.
//!
//! Two views of each string are compared with the Dice coefficient and the
//! higher score wins: character trigrams of the normalised text, and stemmed
//! content tokens. Trigrams catch small edits, tokens catch reworded
//! sentences that keep the same words ("harms" / "are harmed by"). Both
//! scores are symmetric, so the verdict does not depend on which string
//! arrived first.

use std::collections::{HashMap, HashSet};

pub const DEFAULT_THRESHOLD: f64 = 0.7;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "are", "is", "was", "were", "be", "by", "of", "to", "in", "on", "and",
    "or", "for", "with", "that", "this", "it", "as", "at", "from",
];

/// Lowercases and collapses punctuation and whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    let spaced: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    spaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trigrams(normalized: &str) -> HashMap<String, usize> {
    let padded: Vec<char> = format!("  {normalized} ").chars().collect();
    let mut grams = HashMap::new();
    for window in padded.windows(3) {
        *grams.entry(window.iter().collect::<String>()).or_insert(0) += 1;
    }
    grams
}

fn stem(word: &str) -> &str {
    for suffix in ["ing", "ed", "es", "s"] {
        if let Some(stripped) = word.strip_suffix(suffix) {
            if stripped.len() >= 3 {
                return stripped;
            }
        }
    }
    word
}

fn content_tokens(normalized: &str) -> HashSet<&str> {
    normalized
        .split(' ')
        .filter(|word| !word.is_empty() && !STOPWORDS.contains(word))
        .map(stem)
        .collect()
}

fn trigram_dice(a: &str, b: &str) -> f64 {
    let (left, right) = (trigrams(a), trigrams(b));
    let total: usize = left.values().sum::<usize>() + right.values().sum::<usize>();
    if total == 0 {
        return 0.0;
    }
    let shared: usize = left
        .iter()
        .map(|(gram, count)| right.get(gram).map_or(0, |other| (*count).min(*other)))
        .sum();
    2.0 * shared as f64 / total as f64
}

fn token_dice(a: &str, b: &str) -> f64 {
    let (left, right) = (content_tokens(a), content_tokens(b));
    let total = left.len() + right.len();
    if total == 0 {
        return 0.0;
    }
    2.0 * left.intersection(&right).count() as f64 / total as f64
}

/// Case-insensitive similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize(a), normalize(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    trigram_dice(&a, &b).max(token_dice(&a, &b))
}

/// Keeps the candidates that are not near-duplicates of `existing` or of an
/// earlier accepted candidate. Blank candidates are dropped.
pub fn filter_novel(existing: &[String], candidates: Vec<String>, threshold: f64) -> Vec<String> {
    let mut seen: Vec<String> = existing.to_vec();
    let mut accepted = Vec::new();

    for candidate in candidates {
        let candidate = candidate.trim().to_string();
        if candidate.is_empty() {
            continue;
        }
        if seen
            .iter()
            .any(|point| similarity(point, &candidate) >= threshold)
        {
            tracing::debug!("Rejected near-duplicate point: {}", candidate);
            continue;
        }
        seen.push(candidate.clone());
        accepted.push(candidate);
    }

    accepted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reworded_duplicate_rejected() {
        let score = similarity(
            "Plastic harms turtles",
            "Turtles are harmed by plastic pollution",
        );
        assert!(score >= DEFAULT_THRESHOLD, "score {score}");
    }

    #[test]
    fn test_unrelated_point_accepted() {
        let score = similarity("Plastic harms turtles", "AI reduces tutor workload");
        assert!(score < 0.3, "score {score}");
    }

    #[test]
    fn test_discussion_example_scores() {
        let existing = vec!["Plastic harms turtles".to_string()];
        let accepted = filter_novel(
            &existing,
            vec![
                "Turtles are harmed by plastic pollution".to_string(),
                "AI reduces teacher workload".to_string(),
            ],
            DEFAULT_THRESHOLD,
        );
        assert_eq!(accepted, vec!["AI reduces teacher workload".to_string()]);
        assert!(similarity("Plastic harms turtles", "AI reduces teacher workload") < 0.3);
    }

    #[test]
    fn test_case_and_punctuation_ignored() {
        assert_eq!(similarity("Plastic harms turtles!", "plastic  HARMS turtles"), 1.0);
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("Plastic harms turtles", "Turtles are harmed by plastic pollution"),
            ("Remote work helps focus", "Working remotely hurts collaboration"),
            ("abc", "abcd"),
        ];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }

    #[test]
    fn test_empty_strings_never_match() {
        assert_eq!(similarity("", "anything"), 0.0);
        assert_eq!(similarity("!!!", "???"), 0.0);
    }

    #[test]
    fn test_filter_against_existing_and_batch() {
        let existing = vec!["Plastic harms turtles".to_string()];
        let candidates = vec![
            "Turtles are harmed by plastic pollution".to_string(),
            "AI reduces tutor workload".to_string(),
            "  ".to_string(),
            "AI reduces tutors' workload".to_string(),
        ];
        let accepted = filter_novel(&existing, candidates, DEFAULT_THRESHOLD);
        assert_eq!(accepted, vec!["AI reduces tutor workload".to_string()]);
    }

    #[test]
    fn test_order_independent_rejection() {
        let a = "Plastic harms turtles".to_string();
        let b = "Turtles are harmed by plastic pollution".to_string();

        let first = filter_novel(&[], vec![a.clone(), b.clone()], DEFAULT_THRESHOLD);
        let second = filter_novel(&[], vec![b.clone(), a.clone()], DEFAULT_THRESHOLD);
        assert_eq!(first, vec![a]);
        assert_eq!(second, vec![b]);
    }
}
