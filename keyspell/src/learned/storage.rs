//! Persistent storage interface for learned words.
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::StorageError;

/// How a learned word entered the vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMethod {
    Typed,
    Gesture,
    SuggestionAccepted,
    Imported,
}

impl Default for InputMethod {
    fn default() -> InputMethod {
        InputMethod::Typed
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedWordEntry {
    /// The word as the user last typed it.
    pub display_word: SmolStr,
    pub normalized_word: SmolStr,
    pub language: SmolStr,
    /// Always at least 1.
    pub frequency: u32,
    pub source: InputMethod,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// A word to upsert.
#[derive(Clone, Debug)]
pub struct WordUpsert<'a> {
    pub display_word: &'a str,
    pub normalized_word: &'a str,
    pub language: &'a str,
    pub source: InputMethod,
    pub now: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    pub total_words: usize,
    pub average_frequency: f64,
    pub by_source: HashMap<InputMethod, usize>,
}

/// Storage backend for learned words.
///
/// Implementations must be safe under concurrent writers: `upsert` in
/// particular is an atomic read-increment-write.
pub trait VocabularyStorage: Send + Sync {
    /// Inserts the word with frequency 1, or increments an existing entry's
    /// frequency and refreshes its display form and `last_used`.
    fn upsert(&self, word: &WordUpsert<'_>) -> Result<LearnedWordEntry, StorageError>;

    fn find(&self, language: &str, normalized: &str)
        -> Result<Option<LearnedWordEntry>, StorageError>;

    /// All stored entries among `normalized`, in one round-trip.
    fn find_many(
        &self,
        language: &str,
        normalized: &[SmolStr],
    ) -> Result<Vec<LearnedWordEntry>, StorageError>;

    /// Up to `limit` entries whose normalized word starts with `prefix`,
    /// most frequent first.
    fn find_by_prefix(
        &self,
        language: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<LearnedWordEntry>, StorageError>;

    /// The `limit` most frequent entries for `language`.
    fn top_by_frequency(
        &self,
        language: &str,
        limit: usize,
    ) -> Result<Vec<LearnedWordEntry>, StorageError>;

    /// Returns whether an entry was removed.
    fn delete(&self, language: &str, normalized: &str) -> Result<bool, StorageError>;

    /// Removes entries with `frequency <= max_frequency` not used since
    /// `unused_since`, returning how many went.
    fn delete_stale(
        &self,
        max_frequency: u32,
        unused_since: DateTime<Utc>,
    ) -> Result<usize, StorageError>;

    /// Aggregates over one language, or all when `language` is `None`.
    fn stats(&self, language: Option<&str>) -> Result<LearningStats, StorageError>;
}

/// Orders entries most frequent first, then alphabetically.
pub(crate) fn by_frequency(a: &LearnedWordEntry, b: &LearnedWordEntry) -> std::cmp::Ordering {
    b.frequency
        .cmp(&a.frequency)
        .then_with(|| a.normalized_word.cmp(&b.normalized_word))
}
