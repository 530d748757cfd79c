use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use super::storage::{by_frequency, LearnedWordEntry, LearningStats, VocabularyStorage, WordUpsert};
use crate::error::StorageError;

type Key = (SmolStr, SmolStr);

/// In-memory storage ordered by `(language, normalized word)`, which makes
/// prefix queries a range scan.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<Key, LearnedWordEntry>>,
    capacity: Option<usize>,
}

/// Serialized form of a [`MemoryStorage`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub entries: Vec<LearnedWordEntry>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    /// A store that refuses new words once it holds `capacity` entries.
    pub fn with_capacity(capacity: usize) -> MemoryStorage {
        MemoryStorage {
            entries: RwLock::new(BTreeMap::new()),
            capacity: Some(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn from_snapshot(snapshot: Snapshot) -> MemoryStorage {
        MemoryStorage {
            entries: RwLock::new(Self::index(snapshot)),
            capacity: None,
        }
    }

    /// Replaces every entry with the contents of `snapshot`.
    pub(crate) fn restore(&self, snapshot: Snapshot) {
        *self.entries.write() = Self::index(snapshot);
    }

    fn index(snapshot: Snapshot) -> BTreeMap<Key, LearnedWordEntry> {
        snapshot
            .entries
            .into_iter()
            .filter(|e| e.frequency >= 1)
            .map(|e| ((e.language.clone(), e.normalized_word.clone()), e))
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries.read().values().cloned().collect(),
        }
    }

    fn prefix_range<'a>(
        map: &'a BTreeMap<Key, LearnedWordEntry>,
        language: &str,
        prefix: &str,
    ) -> impl Iterator<Item = &'a LearnedWordEntry> + 'a {
        let language = SmolStr::new(language);
        let prefix = SmolStr::new(prefix);
        let start: Key = (language.clone(), prefix.clone());

        map.range((Bound::Included(start), Bound::Unbounded))
            .take_while(move |((lang, word), _)| lang == &language && word.starts_with(prefix.as_str()))
            .map(|(_, e)| e)
    }
}

impl VocabularyStorage for MemoryStorage {
    fn upsert(&self, word: &WordUpsert<'_>) -> Result<LearnedWordEntry, StorageError> {
        let mut entries = self.entries.write();
        let key: Key = (word.language.into(), word.normalized_word.into());

        if let Some(entry) = entries.get_mut(&key) {
            entry.frequency = entry.frequency.saturating_add(1);
            entry.display_word = word.display_word.into();
            entry.last_used = word.now;
            return Ok(entry.clone());
        }

        if let Some(capacity) = self.capacity {
            if entries.len() >= capacity {
                return Err(StorageError::Full);
            }
        }

        let entry = LearnedWordEntry {
            display_word: word.display_word.into(),
            normalized_word: word.normalized_word.into(),
            language: word.language.into(),
            frequency: 1,
            source: word.source,
            created_at: word.now,
            last_used: word.now,
        };
        entries.insert(key, entry.clone());
        Ok(entry)
    }

    fn find(
        &self,
        language: &str,
        normalized: &str,
    ) -> Result<Option<LearnedWordEntry>, StorageError> {
        let key: Key = (language.into(), normalized.into());
        Ok(self.entries.read().get(&key).cloned())
    }

    fn find_many(
        &self,
        language: &str,
        normalized: &[SmolStr],
    ) -> Result<Vec<LearnedWordEntry>, StorageError> {
        let entries = self.entries.read();
        let language = SmolStr::new(language);
        Ok(normalized
            .iter()
            .filter_map(|w| entries.get(&(language.clone(), w.clone())).cloned())
            .collect())
    }

    fn find_by_prefix(
        &self,
        language: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<LearnedWordEntry>, StorageError> {
        let entries = self.entries.read();
        let mut out: Vec<LearnedWordEntry> =
            Self::prefix_range(&entries, language, prefix).cloned().collect();
        out.sort_by(by_frequency);
        out.truncate(limit);
        Ok(out)
    }

    fn top_by_frequency(
        &self,
        language: &str,
        limit: usize,
    ) -> Result<Vec<LearnedWordEntry>, StorageError> {
        let entries = self.entries.read();
        let mut out: Vec<LearnedWordEntry> =
            Self::prefix_range(&entries, language, "").cloned().collect();
        out.sort_by(by_frequency);
        out.truncate(limit);
        Ok(out)
    }

    fn delete(&self, language: &str, normalized: &str) -> Result<bool, StorageError> {
        let key: Key = (language.into(), normalized.into());
        Ok(self.entries.write().remove(&key).is_some())
    }

    fn delete_stale(
        &self,
        max_frequency: u32,
        unused_since: DateTime<Utc>,
    ) -> Result<usize, StorageError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.frequency > max_frequency || e.last_used >= unused_since);
        Ok(before - entries.len())
    }

    fn stats(&self, language: Option<&str>) -> Result<LearningStats, StorageError> {
        let entries = self.entries.read();
        let mut stats = LearningStats::default();
        let mut total_frequency: u64 = 0;

        for entry in entries
            .values()
            .filter(|e| language.map_or(true, |l| e.language == l))
        {
            stats.total_words += 1;
            total_frequency += u64::from(entry.frequency);
            *stats.by_source.entry(entry.source).or_insert(0) += 1;
        }

        if stats.total_words > 0 {
            stats.average_frequency = total_frequency as f64 / stats.total_words as f64;
        }

        Ok(stats)
    }
}
