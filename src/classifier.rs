//! Lightweight signal-based classification of free text
//!
//! Text is matched against a fixed table of phrase detectors. Each detector
//! belongs to one record kind and carries a weight; the kind with the
//! highest summed weight wins. There is no language model involved, so the
//! result is cheap and fully deterministic.
//!
//! Tag extraction is a separate pass and does not influence the kind.

use crate::types::RecordKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Maximum number of tags returned by [`extract_tags`]
pub const MAX_TAGS: usize = 8;

/// Result of classifying a piece of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: RecordKind,
    /// Within [0, 1]
    pub confidence: f64,
    /// Matched detector names (`kind.detector`), in table order
    pub signals: Vec<String>,
}

impl Classification {
    /// Classification supplied by the caller instead of detected
    pub fn explicit(kind: RecordKind) -> Self {
        Self {
            kind,
            confidence: 1.0,
            signals: vec!["explicit".to_string()],
        }
    }
}

struct Detector {
    kind: RecordKind,
    name: &'static str,
    weight: f64,
    pattern: Regex,
}

const DETECTOR_TABLE: &[(RecordKind, &str, f64, &str)] = &[
    // Commitment phrasing
    (RecordKind::Decision, "lets", 0.8, r"\b(?:let(?:'|’)s|let us)\b"),
    (RecordKind::Decision, "we_will", 0.7, r"\bwe(?:\s+will|(?:'|’)ll|\s+are\s+going\s+to)\b"),
    (RecordKind::Decision, "decided", 0.8, r"\b(?:decided|decision|we\s+agreed)\b"),
    (RecordKind::Decision, "going_with", 0.7, r"\b(?:going\s+with|settled\s+on)\b"),
    (RecordKind::Decision, "chose", 0.6, r"\b(?:chose|chosen|choosing|opted\s+for)\b"),
    (RecordKind::Decision, "switch_to", 0.5, r"\b(?:switch(?:ing)?|migrat(?:e|ing))\s+to\b"),
    (RecordKind::Decision, "instead_of", 0.3, r"\binstead\s+of\b"),
    (RecordKind::Decision, "must", 0.4, r"\b(?:must|shall)\b"),
    // Speculative framing
    (RecordKind::Idea, "what_if", 0.9, r"\bwhat\s+if\b"),
    (RecordKind::Idea, "maybe_could", 0.9, r"\bmaybe\s+(?:we|i|you)\s+could\b"),
    (RecordKind::Idea, "maybe", 0.4, r"\b(?:maybe|perhaps)\b"),
    (RecordKind::Idea, "how_about", 0.7, r"\bhow\s+about\b"),
    (RecordKind::Idea, "could_we", 0.5, r"\b(?:could\s+we|we\s+could)\b"),
    (RecordKind::Idea, "might", 0.3, r"\bmight\b"),
    (RecordKind::Idea, "idea", 0.4, r"\bidea\b"),
    (RecordKind::Idea, "question", 0.3, r"\?\s*$"),
    // Retrospective or universal framing
    (RecordKind::Learning, "always", 0.6, r"\balways\b"),
    (RecordKind::Learning, "never", 0.6, r"\bnever\b"),
    (RecordKind::Learning, "til", 1.0, r"\btil\b"),
    (RecordKind::Learning, "turns_out", 0.8, r"\bturns\s+out\b"),
    (RecordKind::Learning, "learned", 0.8, r"\b(?:learned|learnt|lesson)\b"),
    (RecordKind::Learning, "realized", 0.6, r"\breali[sz]ed\b"),
    (RecordKind::Learning, "gotcha", 0.7, r"\bgotcha\b"),
    (RecordKind::Learning, "root_cause", 0.6, r"\bthe\s+(?:issue|problem|bug|trick|fix)\s+(?:is|was)\b"),
];

static DETECTORS: Lazy<Vec<Detector>> = Lazy::new(|| {
    DETECTOR_TABLE
        .iter()
        .map(|&(kind, name, weight, pattern)| Detector {
            kind,
            name,
            weight,
            pattern: Regex::new(&format!("(?i){}", pattern)).expect("valid detector pattern"),
        })
        .collect()
});

static BACKTICK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`\s][^`]*)`").expect("valid backtick pattern"));

static FILE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[\w./-]*\w\.[A-Za-z][A-Za-z0-9]{0,4}\b").expect("valid file token pattern")
});

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9_-]{2,}").expect("valid word pattern"));

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "all", "also", "always", "and", "any", "are", "because", "been",
    "before", "but", "can", "could", "decided", "did", "does", "doing", "each", "for", "from",
    "going", "had", "has", "have", "how", "idea", "instead", "into", "its", "just", "let",
    "lets", "like", "make", "maybe", "might", "more", "most", "must", "need", "never", "not",
    "now", "only", "other", "our", "out", "over", "perhaps", "really", "should", "some", "such",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "thing",
    "things", "this", "those", "til", "too", "turns", "use", "used", "using", "very", "want",
    "was", "way", "we", "were", "what", "when", "where", "which", "while", "who", "why", "will",
    "with", "would", "you", "your",
];

/// Classify text into a record kind
///
/// Ties, including text that matches no detector at all, resolve to
/// [`RecordKind::Idea`], the lowest-consequence kind.
pub fn classify(text: &str) -> Classification {
    let mut scores = [0.0_f64; 3];
    let mut signals = Vec::new();

    for detector in DETECTORS.iter() {
        if detector.pattern.is_match(text) {
            scores[kind_index(detector.kind)] += detector.weight;
            signals.push(format!("{}.{}", detector.kind, detector.name));
        }
    }

    let total: f64 = scores.iter().sum();
    let top = scores.iter().cloned().fold(0.0_f64, f64::max);
    let leaders: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] == top).collect();

    let kind = if top == 0.0 || leaders.len() > 1 {
        RecordKind::Idea
    } else {
        KINDS[leaders[0]]
    };

    let confidence = if total == 0.0 {
        0.0
    } else {
        ((top / total) * top.min(1.0)).clamp(0.0, 1.0)
    };

    Classification {
        kind,
        confidence,
        signals,
    }
}

const KINDS: [RecordKind; 3] = [RecordKind::Idea, RecordKind::Decision, RecordKind::Learning];

fn kind_index(kind: RecordKind) -> usize {
    match kind {
        RecordKind::Idea => 0,
        RecordKind::Decision => 1,
        RecordKind::Learning => 2,
    }
}

/// Pull salient keywords out of text for later filtering
///
/// Backticked identifiers come first, then file-name-like tokens, then
/// ordinary words of three or more characters that are not stop words.
/// Tags are lowercase, unique and capped at [`MAX_TAGS`].
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    let push = |candidate: &str, tags: &mut Vec<String>| {
        let tag = candidate
            .trim_matches(|c: char| c == '.' || c == '-' || c == '/')
            .to_lowercase();
        if tag.len() >= 3 && !tags.contains(&tag) && tags.len() < MAX_TAGS {
            tags.push(tag);
        }
    };

    for cap in BACKTICK_RE.captures_iter(text) {
        push(cap[1].trim(), &mut tags);
    }
    for m in FILE_TOKEN_RE.find_iter(text) {
        push(m.as_str(), &mut tags);
    }
    for m in WORD_RE.find_iter(text) {
        let word = m.as_str().to_lowercase();
        if !STOP_WORDS.contains(&word.as_str()) {
            push(&word, &mut tags);
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_commitment_is_decision() {
        let c = classify("Let's use JWT for authentication");
        assert_eq!(c.kind, RecordKind::Decision);
        assert!(c.confidence > 0.5);
        assert_eq!(c.signals, vec!["decision.lets".to_string()]);
    }

    #[test]
    fn test_speculation_is_idea() {
        let c = classify("What if we add caching?");
        assert_eq!(c.kind, RecordKind::Idea);
        assert!(c.signals.contains(&"idea.what_if".to_string()));
        assert!(c.signals.contains(&"idea.question".to_string()));
        assert!((c.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_retrospective_is_learning() {
        let c = classify("TIL sqlite needs WAL mode for concurrent readers");
        assert_eq!(c.kind, RecordKind::Learning);

        let c = classify("Turns out you should always close the pool first");
        assert_eq!(c.kind, RecordKind::Learning);
        assert!(c.signals.contains(&"learning.always".to_string()));
    }

    #[test]
    fn test_no_signal_defaults_to_idea() {
        let c = classify("refactor the parser");
        assert_eq!(c.kind, RecordKind::Idea);
        assert_eq!(c.confidence, 0.0);
        assert!(c.signals.is_empty());
    }

    #[test]
    fn test_tie_defaults_to_idea() {
        // "always" (learning 0.6) against "chose" (decision 0.6)
        let c = classify("we chose this, always");
        assert_eq!(c.kind, RecordKind::Idea);
        assert!(c.confidence > 0.0);
    }

    #[test]
    fn test_curly_apostrophe() {
        let c = classify("Let’s move the cache into redis");
        assert_eq!(c.kind, RecordKind::Decision);
    }

    #[test]
    fn test_explicit_classification() {
        let c = Classification::explicit(RecordKind::Learning);
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.signals, vec!["explicit".to_string()]);
    }

    #[test]
    fn test_extract_tags() {
        let tags = extract_tags("Let's use JWT for authentication");
        assert_eq!(tags, vec!["jwt".to_string(), "authentication".to_string()]);

        let tags = extract_tags("The bug was in `parse_header` inside src/http/codec.rs");
        assert_eq!(tags[0], "parse_header");
        assert_eq!(tags[1], "src/http/codec.rs");
        assert!(tags.contains(&"bug".to_string()));
    }

    #[test]
    fn test_extract_tags_caps_and_dedupes() {
        let text = "alpha beta gamma delta epsilon zeta theta iota kappa lambda alpha";
        let tags = extract_tags(text);
        assert_eq!(tags.len(), MAX_TAGS);
        assert_eq!(tags.iter().filter(|t| *t == "alpha").count(), 1);
    }

    proptest! {
        #[test]
        fn prop_confidence_in_unit_range(text in ".{0,200}") {
            let c = classify(&text);
            prop_assert!((0.0..=1.0).contains(&c.confidence));
        }

        #[test]
        fn prop_classify_is_deterministic(text in ".{0,200}") {
            prop_assert_eq!(classify(&text), classify(&text));
        }
    }
}
