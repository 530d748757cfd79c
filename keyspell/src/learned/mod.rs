//! The user's personal vocabulary.
//!
//! [`LearnedVocabularyStore`] sits between the engine and a
//! [`VocabularyStorage`] backend. It validates and normalizes words, keeps a
//! per-language membership cache in front of storage, and absorbs classified
//! storage failures through a [`CircuitBreaker`] so a broken store degrades to
//! "nothing learned" instead of failing keystrokes.
use std::sync::Arc;

use chrono::{Duration, Utc};
use hashbrown::{HashMap, HashSet};
use log::{debug, trace, warn};
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;

use crate::config::ResilienceConfig;
use crate::distance::bounded_levenshtein;
use crate::error::{EngineError, StorageError, StorageFailure};
use crate::normalize::{grapheme_len, normalize, validate_word};
use crate::resilience::CircuitBreaker;

mod file;
mod memory;
pub mod storage;

pub use self::file::JsonFileStorage;
pub use self::memory::MemoryStorage;
pub use self::storage::{
    InputMethod, LearnedWordEntry, LearningStats, VocabularyStorage, WordUpsert,
};

use self::storage::by_frequency;

/// Most frequent words considered by the fuzzy tier of
/// [`get_similar_words`](LearnedVocabularyStore::get_similar_words).
pub const FUZZY_CANDIDATE_LIMIT: usize = 30;

/// Largest edit distance accepted by the fuzzy tier.
pub const FUZZY_MAX_DISTANCE: usize = 2;

/// Entries at or below this frequency are eligible for capacity cleanup.
const CLEANUP_MAX_FREQUENCY: u32 = 1;
const CLEANUP_UNUSED_DAYS: i64 = 30;

pub struct LearnedVocabularyStore {
    storage: Arc<dyn VocabularyStorage>,
    membership: RwLock<HashMap<SmolStr, HashSet<SmolStr>>>,
    write_lock: Mutex<()>,
    breaker: CircuitBreaker,
}

impl LearnedVocabularyStore {
    pub fn new(storage: Arc<dyn VocabularyStorage>, config: &ResilienceConfig) -> Self {
        LearnedVocabularyStore {
            storage,
            membership: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
            breaker: CircuitBreaker::new(config),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Records one use of `word` under `language`.
    ///
    /// Returns the stored entry, or `None` when storage was skipped or failed
    /// in a known way.
    pub fn learn_word(
        &self,
        word: &str,
        language: &str,
        method: InputMethod,
    ) -> Result<Option<LearnedWordEntry>, EngineError> {
        if self.breaker.is_destroyed() {
            return Ok(None);
        }
        if let Err(e) = validate_word(word) {
            debug!("not learning {:?}: {}", word, e);
            return Err(e.into());
        }
        if self.breaker.is_open() {
            debug!("not learning {:?} while storage backs off", word);
            return Ok(None);
        }

        let normalized = normalize(word, language);
        let _guard = self.write_lock.lock();

        let result = self.storage.upsert(&WordUpsert {
            display_word: &normalized.standard_form,
            normalized_word: &normalized.user_form,
            language,
            source: method,
            now: Utc::now(),
        });

        match result {
            Ok(entry) => {
                self.breaker.record_success();
                self.membership
                    .write()
                    .entry(SmolStr::new(language))
                    .or_insert_with(HashSet::new)
                    .insert(entry.normalized_word.clone());
                trace!("learned {:?} ({}), frequency {}", entry.display_word, language, entry.frequency);
                Ok(Some(entry))
            }
            Err(e) => self.degrade("learn_word", e, None),
        }
    }

    pub fn is_word_learned(&self, word: &str, language: &str) -> Result<bool, EngineError> {
        if self.breaker.is_destroyed() {
            return Ok(false);
        }
        let normalized = normalize(word, language).user_form;
        if normalized.is_empty() {
            return Ok(false);
        }
        if self.cached(language, &normalized) {
            return Ok(true);
        }
        if self.breaker.is_open() {
            return Ok(false);
        }

        match self.storage.find(language, &normalized) {
            Ok(found) => {
                self.breaker.record_success();
                if found.is_some() {
                    self.backfill(language, std::iter::once(normalized));
                }
                Ok(found.is_some())
            }
            Err(e) => self.degrade("is_word_learned", e, false),
        }
    }

    /// Batched [`is_word_learned`](Self::is_word_learned); cache misses go to
    /// storage in a single query.
    pub fn are_words_learned(
        &self,
        words: &[&str],
        language: &str,
    ) -> Result<Vec<bool>, EngineError> {
        if self.breaker.is_destroyed() {
            return Ok(vec![false; words.len()]);
        }

        let normalized: Vec<SmolStr> = words
            .iter()
            .map(|w| normalize(w, language).user_form)
            .collect();

        let mut result: Vec<bool> = normalized
            .iter()
            .map(|w| !w.is_empty() && self.cached(language, w))
            .collect();

        let mut misses: Vec<SmolStr> = normalized
            .iter()
            .zip(result.iter())
            .filter(|(w, hit)| !**hit && !w.is_empty())
            .map(|(w, _)| w.clone())
            .collect();
        misses.sort();
        misses.dedup();

        if misses.is_empty() || self.breaker.is_open() {
            return Ok(result);
        }

        let found = match self.storage.find_many(language, &misses) {
            Ok(found) => {
                self.breaker.record_success();
                found
            }
            Err(e) => return self.degrade("are_words_learned", e, result),
        };

        let found: HashSet<SmolStr> = found.into_iter().map(|e| e.normalized_word).collect();
        for (hit, word) in result.iter_mut().zip(normalized.iter()) {
            if found.contains(word) {
                *hit = true;
            }
        }
        self.backfill(language, found.into_iter());

        Ok(result)
    }

    /// Stored frequencies of already-normalized `words`; absent words are
    /// left out.
    pub fn frequencies(
        &self,
        words: &[SmolStr],
        language: &str,
    ) -> Result<HashMap<SmolStr, u32>, EngineError> {
        if words.is_empty() || self.breaker.is_open() {
            return Ok(HashMap::new());
        }

        match self.storage.find_many(language, words) {
            Ok(entries) => {
                self.breaker.record_success();
                Ok(entries
                    .into_iter()
                    .map(|e| (e.normalized_word, e.frequency))
                    .collect())
            }
            Err(e) => self.degrade("frequencies", e, HashMap::new()),
        }
    }

    /// Learned words resembling `word`, most frequent first.
    ///
    /// Tiers are tried in order and the search stops once `max_results`
    /// entries are found: the exact word, words it is a prefix of, then
    /// words within edit distance 2 among the most frequent entries.
    pub fn get_similar_words(
        &self,
        word: &str,
        language: &str,
        max_results: usize,
    ) -> Result<Vec<LearnedWordEntry>, EngineError> {
        if max_results == 0 || self.breaker.is_open() {
            return Ok(Vec::new());
        }
        let query = normalize(word, language).user_form;
        if query.is_empty() {
            return Ok(Vec::new());
        }

        match self.similar_words(&query, language, max_results) {
            Ok(mut found) => {
                self.breaker.record_success();
                found.sort_by(by_frequency);
                found.truncate(max_results);
                Ok(found)
            }
            Err(e) => self.degrade("get_similar_words", e, Vec::new()),
        }
    }

    fn similar_words(
        &self,
        query: &str,
        language: &str,
        max_results: usize,
    ) -> Result<Vec<LearnedWordEntry>, StorageError> {
        let mut seen: HashSet<SmolStr> = HashSet::new();
        let mut found: Vec<LearnedWordEntry> = Vec::new();

        if let Some(entry) = self.storage.find(language, query)? {
            seen.insert(entry.normalized_word.clone());
            found.push(entry);
        }
        if found.len() >= max_results {
            return Ok(found);
        }

        if grapheme_len(query) >= 2 {
            let needed = max_results - found.len();
            for entry in self.storage.find_by_prefix(language, query, needed + seen.len())? {
                if found.len() >= max_results {
                    break;
                }
                if seen.insert(entry.normalized_word.clone()) {
                    found.push(entry);
                }
            }
        }
        if found.len() >= max_results {
            return Ok(found);
        }

        let query_len = grapheme_len(query);
        for entry in self.storage.top_by_frequency(language, FUZZY_CANDIDATE_LIMIT)? {
            if found.len() >= max_results {
                break;
            }
            let len = grapheme_len(&entry.normalized_word);
            if len.max(query_len) - len.min(query_len) > FUZZY_MAX_DISTANCE
                || seen.contains(&entry.normalized_word)
            {
                continue;
            }

            match bounded_levenshtein(query, &entry.normalized_word, FUZZY_MAX_DISTANCE) {
                Some(d) if d >= 1 => {
                    seen.insert(entry.normalized_word.clone());
                    found.push(entry);
                }
                _ => {}
            }
        }

        Ok(found)
    }

    /// Forgets `word`. Returns whether anything was stored for it.
    ///
    /// An explicit removal is attempted even while the breaker backs off, and
    /// the word leaves the membership cache whatever storage reports.
    pub fn remove_word(&self, word: &str, language: &str) -> Result<bool, EngineError> {
        if self.breaker.is_destroyed() {
            return Ok(false);
        }
        let normalized = normalize(word, language).user_form;
        if normalized.is_empty() {
            return Ok(false);
        }

        let _guard = self.write_lock.lock();
        if let Some(set) = self.membership.write().get_mut(language) {
            set.remove(&normalized);
        }

        match self.storage.delete(language, &normalized) {
            Ok(removed) => {
                self.breaker.record_success();
                debug!("removed {:?} from learned words ({})", normalized, language);
                Ok(removed)
            }
            Err(e) => self.degrade("remove_word", e, false),
        }
    }

    pub fn learning_stats(&self, language: Option<&str>) -> Result<LearningStats, EngineError> {
        if self.breaker.is_open() {
            return Ok(LearningStats::default());
        }

        match self.storage.stats(language) {
            Ok(stats) => {
                self.breaker.record_success();
                Ok(stats)
            }
            Err(e) => self.degrade("learning_stats", e, LearningStats::default()),
        }
    }

    pub fn clear_cache(&self) {
        self.membership.write().clear();
    }

    /// Stops all further storage access. Irreversible.
    pub fn destroy(&self) {
        self.breaker.destroy();
        self.clear_cache();
    }

    fn cached(&self, language: &str, normalized: &str) -> bool {
        self.membership
            .read()
            .get(language)
            .map_or(false, |set| set.contains(normalized))
    }

    fn backfill<I: Iterator<Item = SmolStr>>(&self, language: &str, words: I) {
        let mut membership = self.membership.write();
        let set = membership
            .entry(SmolStr::new(language))
            .or_insert_with(HashSet::new);
        set.extend(words);
    }

    /// Routes a storage error through the breaker, returning `fallback` for
    /// classified failures.
    fn degrade<T>(&self, op: &str, error: StorageError, fallback: T) -> Result<T, EngineError> {
        let kind = match error.classify() {
            Some(kind) => kind,
            None => return Err(error.into()),
        };

        let count = self.breaker.record_failure(kind);
        warn!("{} failed ({:?}, {} in a row): {}", op, kind, count, error);

        if kind == StorageFailure::CapacityExhausted {
            self.cleanup();
        }

        Ok(fallback)
    }

    fn cleanup(&self) {
        let cutoff = Utc::now() - Duration::days(CLEANUP_UNUSED_DAYS);
        match self.storage.delete_stale(CLEANUP_MAX_FREQUENCY, cutoff) {
            Ok(n) => debug!("cleaned up {} stale learned words", n),
            Err(e) => warn!("cleanup of stale learned words failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> LearnedVocabularyStore {
        LearnedVocabularyStore::new(Arc::new(MemoryStorage::new()), &ResilienceConfig::default())
    }

    #[test]
    fn learns_and_counts() {
        let store = store();
        for n in 1..=3 {
            let entry = store.learn_word("myapi", "en", InputMethod::Typed).unwrap().unwrap();
            assert_eq!(entry.frequency, n);
        }
        assert!(store.is_word_learned("myapi", "en").unwrap());
        assert!(store.is_word_learned("MYAPI", "en").unwrap());
        assert!(!store.is_word_learned("myapi", "fr").unwrap());

        let similar = store.get_similar_words("myap", "en", 3).unwrap();
        assert!(similar.iter().any(|e| e.normalized_word == "myapi"));
    }

    #[test]
    fn rejects_invalid_words() {
        let store = store();
        assert!(matches!(
            store.learn_word("   ", "en", InputMethod::Typed),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            store.learn_word("1234", "en", InputMethod::Typed),
            Err(EngineError::Validation(_))
        ));
        assert_eq!(store.breaker().failure_count(), 0);
    }

    #[test]
    fn similar_words_tiers() {
        let store = store();
        for _ in 0..3 {
            store.learn_word("testing", "en", InputMethod::Typed).unwrap();
        }
        store.learn_word("test", "en", InputMethod::Typed).unwrap();
        store.learn_word("tast", "en", InputMethod::Typed).unwrap();
        store.learn_word("unrelated", "en", InputMethod::Typed).unwrap();

        let words: Vec<SmolStr> = store
            .get_similar_words("test", "en", 5)
            .unwrap()
            .into_iter()
            .map(|e| e.normalized_word)
            .collect();
        assert_eq!(words, vec!["testing", "tast", "test"]);

        assert_eq!(store.get_similar_words("test", "en", 1).unwrap().len(), 1);
        assert!(store.get_similar_words("zzzzzz", "en", 5).unwrap().is_empty());
    }

    #[test]
    fn remove_forgets() {
        let store = store();
        store.learn_word("gonna", "en", InputMethod::Gesture).unwrap();
        assert!(store.remove_word("gonna", "en").unwrap());
        assert!(!store.is_word_learned("gonna", "en").unwrap());
        assert!(store.get_similar_words("gonna", "en", 5).unwrap().is_empty());
        assert!(!store.remove_word("gonna", "en").unwrap());
    }

    #[test]
    fn batched_membership() {
        let backing = Arc::new(MemoryStorage::new());
        backing
            .upsert(&WordUpsert {
                display_word: "yeet",
                normalized_word: "yeet",
                language: "en",
                source: InputMethod::Imported,
                now: Utc::now(),
            })
            .unwrap();
        let store = LearnedVocabularyStore::new(backing, &ResilienceConfig::default());
        store.learn_word("myapi", "en", InputMethod::Typed).unwrap();

        let learned = store.are_words_learned(&["myapi", "yeet", "nope", ""], "en").unwrap();
        assert_eq!(learned, vec![true, true, false, false]);
        assert!(store.cached("en", "yeet"));
    }

    /// Storage that fails every call with a fixed error.
    struct FailingStorage {
        touches: AtomicUsize,
        error: fn() -> StorageError,
    }

    impl FailingStorage {
        fn fail<T>(&self) -> Result<T, StorageError> {
            self.touches.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    impl VocabularyStorage for FailingStorage {
        fn upsert(&self, _: &WordUpsert<'_>) -> Result<LearnedWordEntry, StorageError> {
            self.fail()
        }
        fn find(&self, _: &str, _: &str) -> Result<Option<LearnedWordEntry>, StorageError> {
            self.fail()
        }
        fn find_many(&self, _: &str, _: &[SmolStr]) -> Result<Vec<LearnedWordEntry>, StorageError> {
            self.fail()
        }
        fn find_by_prefix(&self, _: &str, _: &str, _: usize) -> Result<Vec<LearnedWordEntry>, StorageError> {
            self.fail()
        }
        fn top_by_frequency(&self, _: &str, _: usize) -> Result<Vec<LearnedWordEntry>, StorageError> {
            self.fail()
        }
        fn delete(&self, _: &str, _: &str) -> Result<bool, StorageError> {
            self.fail()
        }
        fn delete_stale(&self, _: u32, _: DateTime<Utc>) -> Result<usize, StorageError> {
            self.fail()
        }
        fn stats(&self, _: Option<&str>) -> Result<LearningStats, StorageError> {
            self.fail()
        }
    }

    fn failing(error: fn() -> StorageError) -> (Arc<FailingStorage>, LearnedVocabularyStore) {
        let storage = Arc::new(FailingStorage {
            touches: AtomicUsize::new(0),
            error,
        });
        let store = LearnedVocabularyStore::new(storage.clone(), &ResilienceConfig::default());
        (storage, store)
    }

    #[test]
    fn corruption_opens_breaker() {
        let (storage, store) = failing(|| StorageError::Corrupted("bad page".into()));

        for _ in 0..5 {
            assert!(store.learn_word("myapi", "en", InputMethod::Typed).unwrap().is_none());
        }
        assert_eq!(storage.touches.load(Ordering::SeqCst), 5);

        assert!(store.learn_word("myapi", "en", InputMethod::Typed).unwrap().is_none());
        assert!(store.get_similar_words("myapi", "en", 3).unwrap().is_empty());
        assert_eq!(store.learning_stats(None).unwrap(), LearningStats::default());
        assert_eq!(storage.touches.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn capacity_failure_triggers_cleanup() {
        let (storage, store) = failing(|| StorageError::Full);
        assert!(store.learn_word("myapi", "en", InputMethod::Typed).unwrap().is_none());
        // One upsert plus one cleanup attempt.
        assert_eq!(storage.touches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unexpected_errors_propagate() {
        let (_, store) = failing(|| StorageError::Unexpected("driver bug".into()));
        assert!(matches!(
            store.learn_word("myapi", "en", InputMethod::Typed),
            Err(EngineError::Storage(StorageError::Unexpected(_)))
        ));
        assert!(store.is_word_learned("myapi", "en").is_err());
    }

    #[test]
    fn fuzzy_tier_counts_graphemes() {
        let store = store();
        let learned = "aq\u{307}q\u{307}q\u{307}";
        store.learn_word(learned, "en", InputMethod::Typed).unwrap();

        let similar = store.get_similar_words("q\u{307}q\u{307}", "en", 3).unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].normalized_word, learned);
    }

    #[test]
    fn concurrent_learning_is_serialized() {
        let store = Arc::new(store());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.learn_word("myapi", "en", InputMethod::Typed).unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let entry = store.get_similar_words("myapi", "en", 1).unwrap();
        assert_eq!(entry[0].frequency, 200);
    }

    /// In-memory storage whose every call can be switched to fail.
    struct FlakyStorage {
        inner: MemoryStorage,
        broken: std::sync::atomic::AtomicBool,
    }

    impl FlakyStorage {
        fn check(&self) -> Result<(), StorageError> {
            if self.broken.load(Ordering::SeqCst) {
                Err(StorageError::Corrupted("bad page".into()))
            } else {
                Ok(())
            }
        }
    }

    impl VocabularyStorage for FlakyStorage {
        fn upsert(&self, word: &WordUpsert<'_>) -> Result<LearnedWordEntry, StorageError> {
            self.check()?;
            self.inner.upsert(word)
        }
        fn find(&self, l: &str, w: &str) -> Result<Option<LearnedWordEntry>, StorageError> {
            self.check()?;
            self.inner.find(l, w)
        }
        fn find_many(&self, l: &str, w: &[SmolStr]) -> Result<Vec<LearnedWordEntry>, StorageError> {
            self.check()?;
            self.inner.find_many(l, w)
        }
        fn find_by_prefix(&self, l: &str, p: &str, n: usize) -> Result<Vec<LearnedWordEntry>, StorageError> {
            self.check()?;
            self.inner.find_by_prefix(l, p, n)
        }
        fn top_by_frequency(&self, l: &str, n: usize) -> Result<Vec<LearnedWordEntry>, StorageError> {
            self.check()?;
            self.inner.top_by_frequency(l, n)
        }
        fn delete(&self, l: &str, w: &str) -> Result<bool, StorageError> {
            self.check()?;
            self.inner.delete(l, w)
        }
        fn delete_stale(&self, f: u32, t: DateTime<Utc>) -> Result<usize, StorageError> {
            self.check()?;
            self.inner.delete_stale(f, t)
        }
        fn stats(&self, l: Option<&str>) -> Result<LearningStats, StorageError> {
            self.check()?;
            self.inner.stats(l)
        }
    }

    fn flaky() -> (Arc<FlakyStorage>, LearnedVocabularyStore) {
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            broken: std::sync::atomic::AtomicBool::new(false),
        });
        let store = LearnedVocabularyStore::new(storage.clone(), &ResilienceConfig::default());
        (storage, store)
    }

    #[test]
    fn removal_goes_through_while_backing_off() {
        let (storage, store) = flaky();
        store.learn_word("test", "en", InputMethod::Typed).unwrap();

        storage.broken.store(true, Ordering::SeqCst);
        for _ in 0..5 {
            assert!(store.get_similar_words("zzz", "en", 3).unwrap().is_empty());
        }
        assert!(store.breaker().is_open());
        storage.broken.store(false, Ordering::SeqCst);

        assert!(store.remove_word("test", "en").unwrap());
        assert_eq!(store.breaker().failure_count(), 0);
        assert!(!store.is_word_learned("test", "en").unwrap());
        assert!(storage.inner.find("en", "test").unwrap().is_none());
    }

    #[test]
    fn failed_removal_evicts_cache() {
        let (storage, store) = flaky();
        store.learn_word("test", "en", InputMethod::Typed).unwrap();
        assert!(store.cached("en", "test"));

        storage.broken.store(true, Ordering::SeqCst);
        assert!(!store.remove_word("test", "en").unwrap());
        assert!(!store.cached("en", "test"));
    }

    #[test]
    fn destroyed_store_is_inert() {
        let (storage, store) = failing(|| StorageError::Locked);
        store.destroy();
        assert!(store.learn_word("myapi", "en", InputMethod::Typed).unwrap().is_none());
        assert!(!store.is_word_learned("myapi", "en").unwrap());
        assert!(!store.remove_word("myapi", "en").unwrap());
        assert_eq!(store.are_words_learned(&["a"], "en").unwrap(), vec![false]);
        assert_eq!(storage.touches.load(Ordering::SeqCst), 0);
    }
}
