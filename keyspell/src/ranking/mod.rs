//! Merging and scoring suggestions from every source.
//!
//! A suggestion request is handled in three steps so the engine can run the
//! middle one for each language in parallel:
//!
//! 1. [`Ranker::prepare`] normalizes the input and fixes the cache key and
//!    cache generation.
//! 2. [`Ranker::gather`] collects learned, completion and dictionary
//!    candidates for one language. It is itself split into
//!    [`Ranker::fetch`], which does the storage and asset reads, and
//!    [`Ranker::score`], which only computes.
//! 3. [`Ranker::finish`] merges the per-language lists and caches the result,
//!    unless the caches were invalidated while the request was running.
//!
//! [`Ranker::suggest`] runs all three in sequence.
use std::sync::{Arc, OnceLock};

use hashbrown::{HashMap, HashSet};
use log::{debug, trace};
use parking_lot::RwLock;
use smol_str::SmolStr;

use crate::bigram::BigramModel;
use crate::cache::Cache;
use crate::cancel::CancellationToken;
use crate::config::EngineConfig;
use crate::dictionary::{DictionaryEntry, DictionaryIndex, DictionaryRegistry, MAX_EDIT_DISTANCE};
use crate::error::EngineError;
use crate::keyboard::{is_adjacent_substitution, KeyPositions, KeyboardGeometry};
use crate::learned::{LearnedVocabularyStore, LearnedWordEntry};
use crate::normalize::{grapheme_len, is_contraction_of, normalize};

mod candidate;
pub mod confidence;

pub use self::candidate::{finalize, SourceKind, SuggestionCandidate};
use self::confidence::{CompletionInput, DictionaryInput};

/// Completions requested from the dictionary per query.
pub const COMPLETION_LIMIT: usize = 10;

/// Previous words remembered by the bigram model.
pub const BIGRAM_CAPACITY: usize = 4096;

/// `(normalized word, sorted active languages)`
pub type SuggestionKey = (SmolStr, Vec<SmolStr>);

/// `(normalized word, language)`
pub type DictionaryKey = (SmolStr, SmolStr);

/// A suggestion request pinned to the configuration it started with.
#[derive(Debug, Clone)]
pub struct SuggestionQuery {
    pub input: SmolStr,
    pub key: SuggestionKey,
    pub languages: Vec<SmolStr>,
    pub suggestion_count: usize,
    pub min_completion_length: usize,
    generation: u64,
}

/// Storage and asset reads for one language of a query.
pub struct LanguageEvidence {
    word: SmolStr,
    index: Arc<DictionaryIndex>,
    learned: Vec<LearnedWordEntry>,
    completions: Vec<DictionaryEntry>,
    user_frequencies: HashMap<SmolStr, u32>,
}

pub struct Ranker {
    registry: Arc<DictionaryRegistry>,
    learned: Arc<LearnedVocabularyStore>,
    bigrams: BigramModel,
    suggestions: Cache<SuggestionKey, Vec<SuggestionCandidate>>,
    dictionary: Cache<DictionaryKey, bool>,
    blacklist: RwLock<HashSet<SmolStr>>,
    /// Bumped on every invalidation. Writers hold the read side while
    /// caching so an invalidation cannot interleave with a write.
    generation: RwLock<u64>,
    geometry: Option<Arc<dyn KeyboardGeometry>>,
    positions: OnceLock<Option<KeyPositions>>,
}

impl Ranker {
    pub fn new(
        registry: Arc<DictionaryRegistry>,
        learned: Arc<LearnedVocabularyStore>,
        geometry: Option<Arc<dyn KeyboardGeometry>>,
        config: &EngineConfig,
    ) -> Ranker {
        Ranker {
            registry,
            learned,
            bigrams: BigramModel::new(BIGRAM_CAPACITY),
            suggestions: Cache::new(config.suggestion_cache_capacity),
            dictionary: Cache::new(config.dictionary_cache_capacity),
            blacklist: RwLock::new(HashSet::new()),
            generation: RwLock::new(0),
            geometry,
            positions: OnceLock::new(),
        }
    }

    pub fn prepare(&self, word: &str, config: &EngineConfig) -> SuggestionQuery {
        let languages = config.sorted_languages();
        let normalized = normalize(word, &config.primary_language()).user_form;

        SuggestionQuery {
            input: SmolStr::new(word.trim()),
            key: (normalized, languages),
            languages: config.languages.clone(),
            suggestion_count: config.suggestion_count,
            min_completion_length: config.min_completion_length,
            generation: *self.generation.read(),
        }
    }

    /// A cached list for `query`, minus anything blacklisted since.
    pub fn cached(&self, query: &SuggestionQuery) -> Option<Vec<SuggestionCandidate>> {
        let list = self.suggestions.get(&query.key)?;
        let blacklist = self.blacklist.read();
        if list.iter().any(|c| blacklist.contains(&c.word)) {
            let kept = list.into_iter().filter(|c| !blacklist.contains(&c.word)).collect();
            return Some(finalize(kept, query.suggestion_count));
        }
        Some(list)
    }

    /// Reads what one language contributes to `query` from storage and
    /// assets. Everything touching I/O for a request happens here.
    pub fn fetch(
        &self,
        query: &SuggestionQuery,
        language: &str,
    ) -> Result<LanguageEvidence, EngineError> {
        let word = normalize(&query.input, language).user_form;
        let index = self.registry.index_for(language);
        if word.is_empty() {
            return Ok(LanguageEvidence {
                word,
                index,
                learned: Vec::new(),
                completions: Vec::new(),
                user_frequencies: HashMap::new(),
            });
        }

        let learned = self
            .learned
            .get_similar_words(&word, language, query.suggestion_count)?;

        let (completions, user_frequencies) = if grapheme_len(&word) >= query.min_completion_length {
            let completions = index.completions(&word, COMPLETION_LIMIT);
            let words: Vec<SmolStr> = completions.iter().map(|e| e.word.clone()).collect();
            let user = self.learned.frequencies(&words, language)?;
            (completions, user)
        } else {
            (Vec::new(), HashMap::new())
        };

        Ok(LanguageEvidence {
            word,
            index,
            learned,
            completions,
            user_frequencies,
        })
    }

    /// Scores fetched evidence into candidates. Pure computation.
    pub fn score(&self, evidence: LanguageEvidence) -> Vec<SuggestionCandidate> {
        let LanguageEvidence {
            word,
            index,
            learned,
            completions,
            user_frequencies,
        } = evidence;
        if word.is_empty() {
            return Vec::new();
        }

        let blacklist = self.blacklist.read().clone();
        let mut claimed: HashSet<SmolStr> = HashSet::new();
        let mut out = Vec::new();

        for (rank, entry) in learned.into_iter().enumerate() {
            if blacklist.contains(&entry.normalized_word) || !claimed.insert(entry.normalized_word.clone()) {
                continue;
            }
            let contraction = is_contraction_of(&entry.normalized_word, &word);
            let score = confidence::learned(rank, entry.frequency, contraction);
            trace!("learned {:?} -> {:.3}", entry.normalized_word, score);
            out.push(SuggestionCandidate::new(entry.normalized_word, score, SourceKind::Learned));
        }

        let query_len = grapheme_len(&word);
        for entry in completions {
            if blacklist.contains(&entry.word) || !claimed.insert(entry.word.clone()) {
                continue;
            }
            let score = confidence::completion(&CompletionInput {
                query_len,
                candidate_len: grapheme_len(&entry.word),
                frequency: entry.frequency,
                max_frequency: index.max_frequency(),
                user_frequency: user_frequencies.get(&entry.word).copied(),
                contraction: is_contraction_of(&entry.word, &word),
            });
            trace!("completion {:?} -> {:.3}", entry.word, score);
            out.push(SuggestionCandidate::new(entry.word, score, SourceKind::Completion));
        }

        let positions = self.key_positions();
        let first = word.chars().next();
        let last = word.chars().last();

        for m in index.lookup(&word, MAX_EDIT_DISTANCE) {
            if blacklist.contains(&m.word) || !claimed.insert(m.word.clone()) {
                continue;
            }
            let score = confidence::dictionary(&DictionaryInput {
                distance: m.distance,
                frequency: m.frequency,
                max_frequency: index.max_frequency(),
                same_length: grapheme_len(&m.word) == query_len,
                same_first: m.word.chars().next() == first,
                same_last: m.word.chars().last() == last,
                adjacent_key: positions.map_or(false, |p| is_adjacent_substitution(p, &word, &m.word)),
                apostrophe_inserted: is_contraction_of(&m.word, &word),
            });
            trace!("dictionary {:?} (distance {}) -> {:.3}", m.word, m.distance, score);
            out.push(SuggestionCandidate::new(m.word, score, SourceKind::Dictionary));
        }

        out
    }

    /// [`fetch`](Self::fetch) followed by [`score`](Self::score).
    pub fn gather(
        &self,
        query: &SuggestionQuery,
        language: &str,
    ) -> Result<Vec<SuggestionCandidate>, EngineError> {
        Ok(self.score(self.fetch(query, language)?))
    }

    /// Merges per-language lists, keeping each word's best score.
    pub fn merge(
        per_language: Vec<Vec<SuggestionCandidate>>,
        limit: usize,
    ) -> Vec<SuggestionCandidate> {
        let mut best: HashMap<SmolStr, SuggestionCandidate> = HashMap::new();
        for candidate in per_language.into_iter().flatten() {
            match best.get(&candidate.word) {
                Some(existing) if existing.confidence >= candidate.confidence => {}
                _ => {
                    best.insert(candidate.word.clone(), candidate);
                }
            }
        }
        finalize(best.into_iter().map(|(_, c)| c).collect(), limit)
    }

    /// Merges and caches. Returns `None` if `cancel` fired first.
    pub fn finish(
        &self,
        query: &SuggestionQuery,
        per_language: Vec<Vec<SuggestionCandidate>>,
        cancel: &CancellationToken,
    ) -> Option<Vec<SuggestionCandidate>> {
        let merged = Ranker::merge(per_language, query.suggestion_count);
        if cancel.is_cancelled() {
            return None;
        }

        let generation = self.generation.read();
        if *generation == query.generation {
            self.suggestions.put(query.key.clone(), merged.clone());
        } else {
            debug!("not caching suggestions for {:?}: caches changed", query.key.0);
        }
        Some(merged)
    }

    /// Runs a whole suggestion request on the calling thread.
    pub fn suggest(
        &self,
        word: &str,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<SuggestionCandidate>>, EngineError> {
        if !config.spell_check_enabled {
            return Ok(Some(Vec::new()));
        }
        let query = self.prepare(word, config);
        if let Some(hit) = self.cached(&query) {
            return Ok(Some(hit));
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let mut per_language = Vec::with_capacity(query.languages.len());
        for language in query.languages.iter() {
            per_language.push(self.gather(&query, language)?);
        }
        if cancel.is_cancelled() {
            return Ok(None);
        }

        Ok(self.finish(&query, per_language, cancel))
    }

    /// True if `word` is learned in, or an exact dictionary word of, any of
    /// `languages`. Learned words are checked first.
    pub fn is_word_in_dictionary(&self, word: &str, languages: &[SmolStr]) -> Result<bool, EngineError> {
        for language in languages {
            if self.learned.is_word_learned(word, language)? {
                return Ok(true);
            }
        }
        Ok(self.is_dictionary_word(word, languages))
    }

    /// Exact dictionary membership in any of `languages`, through the
    /// dictionary cache.
    pub fn is_dictionary_word(&self, word: &str, languages: &[SmolStr]) -> bool {
        for language in languages {
            let normalized = normalize(word, language).user_form;
            if normalized.is_empty() {
                continue;
            }
            let key = (normalized, language.clone());
            let known = match self.dictionary.get(&key) {
                Some(known) => known,
                None => {
                    let known = self.registry.index_for(language).contains(&key.0);
                    self.dictionary.put(key, known);
                    known
                }
            };
            if known {
                return true;
            }
        }
        false
    }

    pub fn is_blacklisted(&self, normalized: &str) -> bool {
        self.blacklist.read().contains(normalized)
    }

    /// Stops `word` from being suggested in any of `languages`.
    pub fn blacklist(&self, word: &str, languages: &[SmolStr]) {
        let forms = blacklist_forms(word, languages);
        self.blacklist.write().extend(forms.iter().cloned());
        debug!("blacklisted {:?}", forms);
        self.invalidate_for(&forms);
    }

    pub fn unblacklist(&self, word: &str, languages: &[SmolStr]) {
        let forms = blacklist_forms(word, languages);
        {
            let mut blacklist = self.blacklist.write();
            for form in forms.iter() {
                blacklist.remove(form);
            }
        }
        debug!("removed {:?} from blacklist", forms);
        self.invalidate_for(&forms);
    }

    /// Drops every cached suggestion list plus dictionary entries for
    /// `forms`.
    pub fn invalidate_for(&self, forms: &HashSet<SmolStr>) {
        let mut generation = self.generation.write();
        *generation += 1;
        self.suggestions.clear();
        let removed = self.dictionary.retain_keys(|(w, _)| !forms.contains(w));
        debug!("suggestion cache cleared, {} dictionary entries dropped", removed);
    }

    pub fn invalidate_all(&self) {
        let mut generation = self.generation.write();
        *generation += 1;
        self.suggestions.clear();
        self.dictionary.clear();
        debug!("all suggestion caches cleared");
    }

    /// Counts `next` as following `previous`.
    pub fn record_pair(&self, previous: &str, next: &str, language: &str) {
        let previous = normalize(previous, language).user_form;
        let next = normalize(next, language).user_form;
        if !previous.is_empty() && !next.is_empty() {
            self.bigrams.record(&previous, &next);
        }
    }

    /// Words likely to follow `previous`.
    pub fn predict(&self, previous: &str, language: &str, limit: usize) -> Vec<SuggestionCandidate> {
        let previous = normalize(previous, language).user_form;
        let blacklist = self.blacklist.read().clone();
        let candidates = self
            .bigrams
            .predict(&previous, limit, |w| blacklist.contains(w))
            .into_iter()
            .map(|(word, count)| SuggestionCandidate::new(word, confidence::bigram(count), SourceKind::Bigram))
            .collect();
        finalize(candidates, limit)
    }

    /// Forgets bigrams involving `word`.
    pub fn forget(&self, word: &str, language: &str) {
        let normalized = normalize(word, language).user_form;
        self.bigrams.remove_word(&normalized);
    }

    pub fn clear(&self) {
        self.invalidate_all();
        self.bigrams.clear();
    }

    pub fn cached_suggestion_count(&self) -> usize {
        self.suggestions.len()
    }

    fn key_positions(&self) -> Option<&KeyPositions> {
        self.positions
            .get_or_init(|| self.geometry.as_ref().and_then(|g| g.key_positions()))
            .as_ref()
    }
}

fn blacklist_forms(word: &str, languages: &[SmolStr]) -> HashSet<SmolStr> {
    languages
        .iter()
        .map(|l| normalize(word, l).user_form)
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResilienceConfig;
    use crate::dictionary::MemoryAssets;
    use crate::keyboard::QwertyGeometry;
    use crate::learned::{InputMethod, MemoryStorage};

    fn ranker(files: &[(&str, &str)]) -> (Arc<LearnedVocabularyStore>, Ranker) {
        let assets = MemoryAssets::new();
        for (lang, contents) in files {
            assets.insert(lang, contents);
        }
        let resilience = ResilienceConfig::default();
        let registry = Arc::new(DictionaryRegistry::new(Arc::new(assets), &resilience));
        let learned = Arc::new(LearnedVocabularyStore::new(
            Arc::new(MemoryStorage::new()),
            &resilience,
        ));
        let ranker = Ranker::new(
            registry,
            learned.clone(),
            Some(Arc::new(QwertyGeometry)),
            &EngineConfig::default(),
        );
        (learned, ranker)
    }

    fn words(list: &[SuggestionCandidate]) -> Vec<&str> {
        list.iter().map(|c| c.value()).collect()
    }

    fn suggest(ranker: &Ranker, word: &str) -> Vec<SuggestionCandidate> {
        ranker
            .suggest(word, &EngineConfig::default(), &CancellationToken::new())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn frequent_correction_ranks_first() {
        let (_, ranker) = ranker(&[("en", "hello 1000000\nhelp 5000\nhell 300\nheld 200\n")]);
        let list = suggest(&ranker, "helo");

        assert_eq!(list[0].word, "hello");
        assert_eq!(list[0].source, SourceKind::Dictionary);
        assert!(list[0].confidence > 0.4);
        assert!(list.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        for (i, c) in list.iter().enumerate() {
            assert_eq!(c.rank, i);
        }
    }

    #[test]
    fn scoring_needs_no_storage() {
        let (learned, ranker) = ranker(&[("en", "testing 500\ntest 900\n")]);
        learned.learn_word("tests", "en", InputMethod::Typed).unwrap();

        let query = ranker.prepare("test", &EngineConfig::default());
        let evidence = ranker.fetch(&query, "en").unwrap();
        learned.destroy();

        let list = ranker.score(evidence);
        let tests = list.iter().find(|c| c.word == "tests").unwrap();
        assert_eq!(tests.source, SourceKind::Learned);
        assert!(words(&list).contains(&"testing"));
    }

    #[test]
    fn sources_are_deduplicated() {
        let (learned, ranker) = ranker(&[("en", "testing 500\ntest 900\ntester 50\n")]);
        learned.learn_word("testing", "en", InputMethod::Typed).unwrap();

        let list = suggest(&ranker, "test");
        let mut seen = HashSet::new();
        assert!(list.iter().all(|c| seen.insert(c.word.clone())));

        let testing = list.iter().find(|c| c.word == "testing").unwrap();
        assert_eq!(testing.source, SourceKind::Learned);
        let tester = list.iter().find(|c| c.word == "tester").unwrap();
        assert_eq!(tester.source, SourceKind::Completion);
        assert_eq!(list[0].word, "testing");
    }

    #[test]
    fn removed_and_blacklisted_word_is_not_suggested() {
        let (learned, ranker) = ranker(&[("en", "test 900\ntost 10\n")]);
        learned.learn_word("test", "en", InputMethod::Typed).unwrap();
        assert!(words(&suggest(&ranker, "tst")).contains(&"test"));

        learned.remove_word("test", "en").unwrap();
        ranker.blacklist("test", &["en".into()]);
        let list = suggest(&ranker, "tst");
        assert!(!words(&list).contains(&"test"));
        assert!(words(&list).contains(&"tost"));

        ranker.unblacklist("Test", &["en".into()]);
        assert!(words(&suggest(&ranker, "tst")).contains(&"test"));
    }

    #[test]
    fn blacklist_reaches_cached_lists() {
        let (_, ranker) = ranker(&[("en", "hello 100\nhelp 50\n")]);
        suggest(&ranker, "helo");
        assert_eq!(ranker.cached_suggestion_count(), 1);

        ranker.blacklist("hello", &["en".into()]);
        assert_eq!(ranker.cached_suggestion_count(), 0);
        assert!(!words(&suggest(&ranker, "helo")).contains(&"hello"));
    }

    #[test]
    fn stale_request_is_not_cached() {
        let (_, ranker) = ranker(&[("en", "hello 100\n")]);
        let config = EngineConfig::default();
        let query = ranker.prepare("helo", &config);
        let gathered = ranker.gather(&query, "en").unwrap();

        ranker.invalidate_all();
        let list = ranker.finish(&query, vec![gathered], &CancellationToken::new()).unwrap();
        assert_eq!(words(&list), vec!["hello"]);
        assert_eq!(ranker.cached_suggestion_count(), 0);
    }

    #[test]
    fn cancelled_request_returns_none() {
        let (_, ranker) = ranker(&[("en", "hello 100\n")]);
        let token = CancellationToken::new();
        token.cancel();
        assert!(ranker.suggest("helo", &EngineConfig::default(), &token).unwrap().is_none());
        assert_eq!(ranker.cached_suggestion_count(), 0);
    }

    #[test]
    fn merges_languages_by_best_score() {
        let merged = Ranker::merge(
            vec![
                vec![
                    SuggestionCandidate::new("hus".into(), 0.4, SourceKind::Dictionary),
                    SuggestionCandidate::new("haus".into(), 0.3, SourceKind::Dictionary),
                ],
                vec![SuggestionCandidate::new("haus".into(), 0.9, SourceKind::Learned)],
            ],
            5,
        );
        assert_eq!(words(&merged), vec!["haus", "hus"]);
        assert_eq!(merged[0].source, SourceKind::Learned);
    }

    #[test]
    fn dictionary_membership() {
        let (learned, ranker) = ranker(&[("en", "hello 100\n")]);
        let en = vec![SmolStr::new("en")];
        assert!(ranker.is_word_in_dictionary("Hello", &en).unwrap());
        assert!(!ranker.is_word_in_dictionary("myapi", &en).unwrap());

        learned.learn_word("myapi", "en", InputMethod::Typed).unwrap();
        assert!(ranker.is_word_in_dictionary("myapi", &en).unwrap());
    }

    #[test]
    fn bigram_predictions() {
        let (_, ranker) = ranker(&[]);
        ranker.record_pair("Good", "morning", "en");
        ranker.record_pair("good", "morning", "en");
        ranker.record_pair("good", "night", "en");

        let list = ranker.predict("good", "en", 5);
        assert_eq!(words(&list), vec!["morning", "night"]);
        assert!(list.iter().all(|c| c.source == SourceKind::Bigram));

        ranker.blacklist("night", &["en".into()]);
        assert_eq!(words(&ranker.predict("good", "en", 5)), vec!["morning"]);
    }
}
