//! Lazily-built, shared per-language dictionaries.
//!
//! Indexes are built outside of any lock and published with insert-if-absent,
//! so two callers racing to build the same language both succeed and one of
//! the two indexes is simply dropped. Once published an index is never
//! replaced or removed until the registry is destroyed.
use std::sync::Arc;

use hashbrown::HashMap;
use log::{debug, warn};
use parking_lot::RwLock;
use smol_str::SmolStr;

use super::asset::AssetSource;
use super::builtin;
use super::DictionaryIndex;
use crate::cancel::CancellationToken;
use crate::config::ResilienceConfig;
use crate::error::AssetError;
use crate::normalize::locale_of;
use crate::resilience::ErrorTracker;

pub struct DictionaryRegistry {
    assets: Arc<dyn AssetSource>,
    indexes: RwLock<HashMap<SmolStr, Arc<DictionaryIndex>>>,
    builtin: RwLock<HashMap<SmolStr, Arc<DictionaryIndex>>>,
    tracker: ErrorTracker,
    shutdown: CancellationToken,
}

impl DictionaryRegistry {
    pub fn new(assets: Arc<dyn AssetSource>, config: &ResilienceConfig) -> DictionaryRegistry {
        DictionaryRegistry {
            assets,
            indexes: RwLock::new(HashMap::new()),
            builtin: RwLock::new(HashMap::new()),
            tracker: ErrorTracker::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// The index for exactly `language`, if it has been built.
    pub fn get(&self, language: &str) -> Option<Arc<DictionaryIndex>> {
        self.indexes.read().get(language).cloned()
    }

    /// Languages with a published index.
    pub fn loaded_languages(&self) -> Vec<SmolStr> {
        let mut langs: Vec<SmolStr> = self.indexes.read().keys().cloned().collect();
        langs.sort();
        langs
    }

    /// Builds and publishes the index for exactly `language`.
    ///
    /// Aborts between batches when `cancel` or the registry's own shutdown
    /// token fires. Failures other than cancellation are recorded against
    /// the language.
    pub fn build(
        &self,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<DictionaryIndex>, AssetError> {
        if let Some(index) = self.get(language) {
            return Ok(index);
        }
        if cancel.is_cancelled() || self.shutdown.is_cancelled() {
            return Err(AssetError::Cancelled);
        }

        let token = cancel.linked_with(&self.shutdown);
        let result = self
            .assets
            .open(language)
            .and_then(|reader| DictionaryIndex::from_reader(language, reader, &token));

        match result {
            Ok(index) => {
                if self.shutdown.is_cancelled() {
                    return Err(AssetError::Cancelled);
                }
                self.tracker.record_success(language);
                let mut indexes = self.indexes.write();
                let published = indexes
                    .entry(SmolStr::new(language))
                    .or_insert_with(|| Arc::new(index))
                    .clone();
                Ok(published)
            }
            Err(AssetError::Cancelled) => Err(AssetError::Cancelled),
            Err(e) => {
                warn!("dictionary for '{}' failed to load: {}", language, e);
                self.tracker.record_failure(language);
                Err(e)
            }
        }
    }

    /// Resolves an index for `tag`, never failing.
    ///
    /// Tries the full tag, then its primary language, skipping any language
    /// still cooling down from earlier failures. When nothing loads, the
    /// built-in list for the primary language is used. A destroyed registry
    /// hands out an empty index and caches nothing.
    pub fn index_for(&self, tag: &str) -> Arc<DictionaryIndex> {
        match self.resolve(tag, &self.shutdown) {
            Ok(index) => index,
            Err(_) if self.shutdown.is_cancelled() => Arc::new(DictionaryIndex::from_entries(
                &locale_of(tag),
                std::iter::empty::<(&str, u64)>(),
            )),
            Err(_) => self.builtin_for(tag),
        }
    }

    /// Like [`index_for`](Self::index_for) but reports the last asset error
    /// instead of falling back to the built-in list.
    pub fn resolve(
        &self,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<DictionaryIndex>, AssetError> {
        let mut last_error = AssetError::NotFound(tag.into());

        for language in fallback_chain(tag) {
            if let Some(index) = self.get(&language) {
                return Ok(index);
            }
            if self.tracker.should_skip(&language) {
                debug!("skipping '{}' while it cools down", language);
                continue;
            }

            match self.build(&language, cancel) {
                Ok(index) => return Ok(index),
                Err(AssetError::Cancelled) => return Err(AssetError::Cancelled),
                Err(e) => last_error = e,
            }
        }

        Err(last_error)
    }

    fn builtin_for(&self, tag: &str) -> Arc<DictionaryIndex> {
        let locale = locale_of(tag);
        if let Some(index) = self.builtin.read().get(&locale) {
            return index.clone();
        }

        debug!("using built-in word list for '{}'", tag);
        let index = Arc::new(DictionaryIndex::from_entries(
            &locale,
            builtin::entries_for(&locale).iter().copied(),
        ));
        self.builtin
            .write()
            .entry(locale)
            .or_insert(index)
            .clone()
    }

    pub fn tracker(&self) -> &ErrorTracker {
        &self.tracker
    }

    /// Cancels in-flight builds and drops every index.
    pub fn destroy(&self) {
        self.shutdown.cancel();
        self.indexes.write().clear();
        self.builtin.write().clear();
        self.tracker.clear();
    }
}

/// Languages to try for `tag`, most specific first.
pub fn fallback_chain(tag: &str) -> Vec<SmolStr> {
    let tag = tag.trim();
    let mut chain = vec![SmolStr::new(tag)];

    let locale = locale_of(tag);
    if locale != tag {
        chain.push(locale);
    }

    chain
}
