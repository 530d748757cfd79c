//! A ranked suggestion.
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::cmp::Ordering;
use std::cmp::Ordering::Equal;

/// Where a candidate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// The user's learned vocabulary
    Learned,
    /// A dictionary word within edit distance 2
    Dictionary,
    /// A dictionary word the input is a prefix of
    Completion,
    /// A word often typed after the previous one
    Bigram,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
/// Suggestion for a correction or completion
pub struct SuggestionCandidate {
    /// the suggested word, normalized
    pub word: SmolStr,
    /// relevance in `[0, 1]`
    pub confidence: f64,
    /// zero-based position in the final list
    pub rank: usize,
    /// which source produced it
    pub source: SourceKind,
}

impl SuggestionCandidate {
    pub fn new(word: SmolStr, confidence: f64, source: SourceKind) -> SuggestionCandidate {
        SuggestionCandidate {
            word,
            confidence,
            rank: 0,
            source,
        }
    }

    /// gets the suggested word
    pub fn value(&self) -> &str {
        &self.word
    }
}

/// Most confident first; ties broken alphabetically.
impl PartialOrd for SuggestionCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SuggestionCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        let x = other.confidence.partial_cmp(&self.confidence).unwrap_or(Equal);

        if let Equal = x {
            return self.word.cmp(&other.word);
        }

        x
    }
}

impl PartialEq for SuggestionCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.word == other.word && self.confidence == other.confidence
    }
}

impl Eq for SuggestionCandidate {}

/// Sorts `candidates`, keeps the first `limit` and numbers them.
pub fn finalize(mut candidates: Vec<SuggestionCandidate>, limit: usize) -> Vec<SuggestionCandidate> {
    candidates.sort();
    candidates.truncate(limit);
    for (rank, c) in candidates.iter_mut().enumerate() {
        c.rank = rank;
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_confidence_then_word() {
        let list = finalize(
            vec![
                SuggestionCandidate::new("b".into(), 0.5, SourceKind::Dictionary),
                SuggestionCandidate::new("c".into(), 0.9, SourceKind::Learned),
                SuggestionCandidate::new("a".into(), 0.5, SourceKind::Completion),
            ],
            2,
        );
        let words: Vec<&str> = list.iter().map(|c| c.value()).collect();
        assert_eq!(words, vec!["c", "a"]);
        assert_eq!(list[1].rank, 1);
    }

    #[test]
    fn serializes_source_in_snake_case() {
        let c = SuggestionCandidate::new("hello".into(), 0.75, SourceKind::Dictionary);
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["source"], "dictionary");
        assert_eq!(json["word"], "hello");
    }
}
