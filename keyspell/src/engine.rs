//! The engine consumers talk to.
//!
//! [`KeyboardEngine`] owns one instance of every component and exposes them
//! as async operations. Storage and asset access run on tokio's blocking pool
//! behind an I/O semaphore; ranking runs there too behind a separate CPU
//! semaphore, so neither can starve the interactive path.
//!
//! ```no_run
//! use std::sync::Arc;
//! use keyspell::{EngineConfig, KeyboardEngine};
//! use keyspell::dictionary::DirectoryAssets;
//! use keyspell::learned::MemoryStorage;
//!
//! # async fn run() -> Result<(), keyspell::EngineError> {
//! let engine = KeyboardEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(DirectoryAssets::new("/usr/share/keyspell")),
//!     Arc::new(MemoryStorage::new()),
//! );
//! for suggestion in engine.get_spelling_suggestions_with_confidence("helo").await? {
//!     println!("{} {:.2}", suggestion.word, suggestion.confidence);
//! }
//! # Ok(())
//! # }
//! ```
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use smol_str::SmolStr;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use crate::cancel::CancellationToken;
use crate::case::CaseMutation;
use crate::config::EngineConfig;
use crate::dictionary::{AssetSource, DictionaryRegistry};
use crate::error::{AssetError, EngineError};
use crate::keyboard::{KeyboardGeometry, QwertyGeometry};
use crate::learned::{InputMethod, LearnedVocabularyStore, LearnedWordEntry, LearningStats, VocabularyStorage};
use crate::ranking::{Ranker, SuggestionCandidate};

#[derive(Debug, Clone, Copy)]
enum Pool {
    Io,
    Cpu,
}

struct Inner {
    config: RwLock<EngineConfig>,
    registry: Arc<DictionaryRegistry>,
    learned: Arc<LearnedVocabularyStore>,
    ranker: Ranker,
    io: Arc<Semaphore>,
    cpu: Arc<Semaphore>,
    destroyed: AtomicBool,
    shutdown: CancellationToken,
    config_task: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    /// Runs `f` on the blocking pool once a permit from `pool` is free.
    async fn run<T, F>(inner: &Arc<Inner>, pool: Pool, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Inner) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = match pool {
            Pool::Io => inner.io.clone(),
            Pool::Cpu => inner.cpu.clone(),
        };
        let _permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Cancelled)?;

        let inner = inner.clone();
        tokio::task::spawn_blocking(move || f(&inner)).await?
    }

    fn config(&self) -> EngineConfig {
        self.config.read().clone()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

/// Spelling suggestions and word learning for a keyboard.
///
/// Cloning is cheap and every clone drives the same engine.
#[derive(Clone)]
pub struct KeyboardEngine {
    inner: Arc<Inner>,
}

impl KeyboardEngine {
    /// An engine using the built-in QWERTY geometry for proximity scoring.
    pub fn new(
        config: EngineConfig,
        assets: Arc<dyn AssetSource>,
        storage: Arc<dyn VocabularyStorage>,
    ) -> KeyboardEngine {
        KeyboardEngine::with_geometry(config, assets, storage, Some(Arc::new(QwertyGeometry)))
    }

    pub fn with_geometry(
        config: EngineConfig,
        assets: Arc<dyn AssetSource>,
        storage: Arc<dyn VocabularyStorage>,
        geometry: Option<Arc<dyn KeyboardGeometry>>,
    ) -> KeyboardEngine {
        let registry = Arc::new(DictionaryRegistry::new(assets, &config.resilience));
        let learned = Arc::new(LearnedVocabularyStore::new(storage, &config.resilience));
        let ranker = Ranker::new(registry.clone(), learned.clone(), geometry, &config);

        KeyboardEngine {
            inner: Arc::new(Inner {
                io: Arc::new(Semaphore::new(config.io_concurrency.max(1))),
                cpu: Arc::new(Semaphore::new(config.cpu_concurrency.max(1))),
                config: RwLock::new(config),
                registry,
                learned,
                ranker,
                destroyed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                config_task: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.inner.config()
    }

    /// Learns `word` under the primary language.
    ///
    /// Returns `None` when learning is disabled, the engine is destroyed, or
    /// storage is unavailable.
    pub async fn learn_word(
        &self,
        word: &str,
        method: InputMethod,
    ) -> Result<Option<LearnedWordEntry>, EngineError> {
        if self.inner.is_destroyed() {
            return Ok(None);
        }
        let config = self.inner.config();
        if !config.word_learning_enabled {
            return Ok(None);
        }

        let word = word.to_owned();
        let language = config.primary_language();
        Inner::run(&self.inner, Pool::Io, move |inner| {
            inner.learned.learn_word(&word, &language, method)
        })
        .await
    }

    /// Learns `word` and counts it as following `previous`.
    pub async fn learn_word_pair(
        &self,
        previous: &str,
        word: &str,
        method: InputMethod,
    ) -> Result<Option<LearnedWordEntry>, EngineError> {
        let entry = self.learn_word(word, method).await?;
        if entry.is_some() {
            let language = self.inner.config().primary_language();
            self.inner.ranker.record_pair(previous, word, &language);
        }
        Ok(entry)
    }

    /// True if `word` is learned under any active language.
    pub async fn is_word_learned(&self, word: &str) -> Result<bool, EngineError> {
        if self.inner.is_destroyed() {
            return Ok(false);
        }
        let word = word.to_owned();
        let languages = self.inner.config().languages;
        Inner::run(&self.inner, Pool::Io, move |inner| {
            for language in languages.iter() {
                if inner.learned.is_word_learned(&word, language)? {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await
    }

    /// Forgets `word` in every active language. Returns whether anything was
    /// removed.
    pub async fn remove_word(&self, word: &str) -> Result<bool, EngineError> {
        if self.inner.is_destroyed() {
            return Ok(false);
        }
        let word = word.to_owned();
        let languages = self.inner.config().languages;
        let removed = Inner::run(&self.inner, Pool::Io, move |inner| {
            let mut removed = false;
            for language in languages.iter() {
                removed |= inner.learned.remove_word(&word, language)?;
                inner.ranker.forget(&word, language);
            }
            Ok(removed)
        })
        .await?;

        // Cached lists may still carry the word as a learned suggestion.
        self.inner.ranker.invalidate_all();
        Ok(removed)
    }

    /// Ranked corrections and completions for `word`.
    pub async fn get_spelling_suggestions_with_confidence(
        &self,
        word: &str,
    ) -> Result<Vec<SuggestionCandidate>, EngineError> {
        let token = self.inner.shutdown.linked_with(&CancellationToken::new());
        Ok(suggest(&self.inner, word, &token).await?.unwrap_or_default())
    }

    /// Plain suggestions for the keyboard's suggestion strip.
    ///
    /// With an empty `input` these are predictions for the word after
    /// `previous_word`; otherwise spelling suggestions cased like `input`.
    pub async fn generate_suggestions(
        &self,
        input: &str,
        previous_word: Option<&str>,
    ) -> Result<Vec<SmolStr>, EngineError> {
        if self.inner.is_destroyed() {
            return Ok(Vec::new());
        }

        if input.trim().is_empty() {
            let config = self.inner.config();
            return Ok(match previous_word {
                Some(previous) => self
                    .inner
                    .ranker
                    .predict(previous, &config.primary_language(), config.suggestion_count)
                    .into_iter()
                    .map(|c| c.word)
                    .collect(),
                None => Vec::new(),
            });
        }

        let mutation = CaseMutation::detect(input);
        let suggestions = self.get_spelling_suggestions_with_confidence(input).await?;
        Ok(suggestions.iter().map(|c| mutation.apply(&c.word)).collect())
    }

    /// True if `word` is learned or an exact dictionary word in any active
    /// language. Always true while spell checking is disabled.
    pub async fn is_word_in_dictionary(&self, word: &str) -> Result<bool, EngineError> {
        if self.inner.is_destroyed() {
            return Ok(false);
        }
        let config = self.inner.config();
        if !config.spell_check_enabled {
            return Ok(true);
        }

        let word = word.to_owned();
        Inner::run(&self.inner, Pool::Io, move |inner| {
            inner.ranker.is_word_in_dictionary(&word, &config.languages)
        })
        .await
    }

    /// Batched [`is_word_in_dictionary`](Self::is_word_in_dictionary).
    pub async fn are_words_in_dictionary(&self, words: &[&str]) -> Result<Vec<bool>, EngineError> {
        if self.inner.is_destroyed() {
            return Ok(vec![false; words.len()]);
        }
        let config = self.inner.config();
        if !config.spell_check_enabled {
            return Ok(vec![true; words.len()]);
        }

        let words: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        Inner::run(&self.inner, Pool::Io, move |inner| {
            let refs: Vec<&str> = words.iter().map(String::as_str).collect();
            let mut known = vec![false; refs.len()];

            for language in config.languages.iter() {
                let learned = inner.learned.are_words_learned(&refs, language)?;
                for (k, l) in known.iter_mut().zip(learned) {
                    *k |= l;
                }
            }
            for (k, word) in known.iter_mut().zip(refs.iter()) {
                if !*k {
                    *k = inner.ranker.is_dictionary_word(word, &config.languages);
                }
            }

            Ok(known)
        })
        .await
    }

    /// Never suggest `word` again until it is removed from the blacklist.
    pub async fn blacklist_suggestion(&self, word: &str) -> Result<(), EngineError> {
        if self.inner.is_destroyed() {
            return Ok(());
        }
        let languages = self.inner.config().languages;
        self.inner.ranker.blacklist(word, &languages);
        Ok(())
    }

    pub async fn remove_from_blacklist(&self, word: &str) -> Result<(), EngineError> {
        if self.inner.is_destroyed() {
            return Ok(());
        }
        let languages = self.inner.config().languages;
        self.inner.ranker.unblacklist(word, &languages);
        Ok(())
    }

    pub async fn get_learning_stats(&self) -> Result<LearningStats, EngineError> {
        if self.inner.is_destroyed() {
            return Ok(LearningStats::default());
        }
        Inner::run(&self.inner, Pool::Io, |inner| inner.learned.learning_stats(None)).await
    }

    /// Like [`get_learning_stats`](Self::get_learning_stats), restricted to
    /// one language.
    pub async fn get_language_stats(&self, language: &str) -> Result<LearningStats, EngineError> {
        if self.inner.is_destroyed() {
            return Ok(LearningStats::default());
        }
        let language = SmolStr::new(language);
        Inner::run(&self.inner, Pool::Io, move |inner| {
            inner.learned.learning_stats(Some(&language))
        })
        .await
    }

    /// Builds the dictionary for `language` ahead of the first keystroke.
    pub async fn preload_language(&self, language: &str) -> Result<(), EngineError> {
        if self.inner.is_destroyed() {
            return Err(EngineError::Cancelled);
        }
        let language = SmolStr::new(language);
        Inner::run(&self.inner, Pool::Io, move |inner| {
            match inner.registry.resolve(&language, &inner.shutdown) {
                Ok(index) => {
                    info!("dictionary for '{}' ready ({} words)", language, index.len());
                    Ok(())
                }
                Err(AssetError::Cancelled) => Err(EngineError::Cancelled),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    /// A debounced suggestion stream for one input field.
    pub fn session(&self) -> SuggestionSession {
        SuggestionSession {
            engine: self.clone(),
            current: Mutex::new(None),
        }
    }

    /// Replaces the configuration, dropping cached results it invalidates.
    pub fn apply_config(&self, config: EngineConfig) {
        if self.inner.is_destroyed() {
            return;
        }
        let invalidates = {
            let mut current = self.inner.config.write();
            let invalidates = current.invalidates_caches(&config);
            *current = config;
            invalidates
        };

        if invalidates {
            debug!("configuration change invalidates cached suggestions");
            self.inner.ranker.invalidate_all();
        }
    }

    /// Applies every configuration published on `rx` until the sender goes
    /// away or the engine is destroyed. Must be called within a tokio
    /// runtime.
    pub fn watch_config(&self, mut rx: watch::Receiver<EngineConfig>) {
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            let initial = (*rx.borrow_and_update()).clone();
            engine.apply_config(initial);
            while rx.changed().await.is_ok() {
                let config = (*rx.borrow_and_update()).clone();
                engine.apply_config(config);
            }
            debug!("configuration stream closed");
        });

        if let Some(previous) = self.inner.config_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Tears the engine down. Every later call returns an empty result
    /// without touching storage or dictionaries.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("destroying keyboard engine");

        self.inner.shutdown.cancel();
        if let Some(task) = self.inner.config_task.lock().take() {
            task.abort();
        }
        self.inner.learned.destroy();
        self.inner.registry.destroy();
        self.inner.ranker.clear();
        self.inner.io.close();
        self.inner.cpu.close();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }
}

/// Runs a suggestion request, returning `None` once `cancel` fires.
async fn suggest(
    inner: &Arc<Inner>,
    word: &str,
    cancel: &CancellationToken,
) -> Result<Option<Vec<SuggestionCandidate>>, EngineError> {
    if cancel.is_cancelled() {
        return Ok(None);
    }
    if inner.is_destroyed() {
        return Ok(Some(Vec::new()));
    }
    let config = inner.config();
    if !config.spell_check_enabled {
        return Ok(Some(Vec::new()));
    }

    let query = Arc::new(inner.ranker.prepare(word, &config));
    if let Some(hit) = inner.ranker.cached(&query) {
        return Ok(Some(hit));
    }

    let mut tasks = JoinSet::new();
    for language in query.languages.iter().cloned() {
        let inner = inner.clone();
        let query = query.clone();
        let cancel = cancel.clone();

        tasks.spawn(async move {
            if cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            let evidence = Inner::run(&inner, Pool::Io, move |inner| {
                inner.ranker.fetch(&query, &language)
            })
            .await?;
            if cancel.is_cancelled() {
                return Ok(Vec::new());
            }
            Inner::run(&inner, Pool::Cpu, move |inner| Ok(inner.ranker.score(evidence))).await
        });
    }

    let mut per_language = Vec::with_capacity(query.languages.len());
    while let Some(joined) = tasks.join_next().await {
        per_language.push(joined??);
    }

    if cancel.is_cancelled() {
        return Ok(None);
    }
    Ok(inner.ranker.finish(&query, per_language, cancel))
}

/// Debounces suggestion requests from one input field: each request
/// cancels the one before it.
pub struct SuggestionSession {
    engine: KeyboardEngine,
    current: Mutex<Option<CancellationToken>>,
}

impl SuggestionSession {
    /// Starts a request for `word`, superseding any earlier one.
    ///
    /// The earlier request is cancelled immediately, before the returned
    /// future is first polled. A superseded request resolves to `Ok(None)`.
    pub fn request(
        &self,
        word: &str,
    ) -> impl Future<Output = Result<Option<Vec<SuggestionCandidate>>, EngineError>> + Send + 'static {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        let inner = self.engine.inner.clone();
        let token = token.linked_with(&inner.shutdown);
        let word = word.to_owned();
        async move { suggest(&inner, &word, &token).await }
    }

    /// Cancels the in-flight request, if any.
    pub fn cancel(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::MemoryAssets;
    use crate::learned::MemoryStorage;

    fn engine() -> KeyboardEngine {
        let assets = MemoryAssets::new();
        assets.insert("en", "hello 1000000\nhelp 500\n");
        KeyboardEngine::new(
            EngineConfig::default(),
            Arc::new(assets),
            Arc::new(MemoryStorage::new()),
        )
    }

    #[tokio::test]
    async fn learning_can_be_disabled() {
        let engine = engine();
        engine.apply_config(EngineConfig {
            word_learning_enabled: false,
            ..EngineConfig::default()
        });
        assert!(engine.learn_word("myapi", InputMethod::Typed).await.unwrap().is_none());
        assert!(!engine.is_word_learned("myapi").await.unwrap());
    }

    #[tokio::test]
    async fn stats_per_language() {
        let engine = engine();
        engine.learn_word("myapi", InputMethod::Imported).await.unwrap();
        assert_eq!(engine.get_language_stats("en").await.unwrap().total_words, 1);
        assert_eq!(engine.get_language_stats("fr").await.unwrap().total_words, 0);
    }

    #[tokio::test]
    async fn spell_check_can_be_disabled() {
        let engine = engine();
        engine.apply_config(EngineConfig {
            spell_check_enabled: false,
            ..EngineConfig::default()
        });
        assert!(engine.get_spelling_suggestions_with_confidence("helo").await.unwrap().is_empty());
        assert!(engine.is_word_in_dictionary("qwzx").await.unwrap());
    }

    #[tokio::test]
    async fn recases_suggestions() {
        let engine = engine();
        let words = engine.generate_suggestions("HELO", None).await.unwrap();
        assert_eq!(words.first().map(|w| w.as_str()), Some("HELLO"));

        let words = engine.generate_suggestions("Helo", None).await.unwrap();
        assert_eq!(words.first().map(|w| w.as_str()), Some("Hello"));
    }

    #[tokio::test]
    async fn predicts_next_word() {
        let engine = engine();
        engine.learn_word_pair("good", "morning", InputMethod::Typed).await.unwrap();
        let words = engine.generate_suggestions("", Some("Good")).await.unwrap();
        assert_eq!(words, vec![SmolStr::new("morning")]);
        assert!(engine.generate_suggestions(" ", None).await.unwrap().is_empty());
    }
}
