//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document (or none at all)
//! yields a working configuration:
//!
//! ```
//! use keyspell::config::EngineConfig;
//!
//! let config = EngineConfig::from_json(r#"{ "languages": ["en-US", "nb"], "suggestionCount": 3 }"#).unwrap();
//! assert_eq!(config.suggestion_count, 3);
//! assert!(config.word_learning_enabled);
//! ```
use std::path::Path;
use std::time::Duration;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Active languages, primary first. Learned words are written under the
    /// primary language.
    pub languages: Vec<SmolStr>,
    /// Maximum number of suggestions returned per query.
    pub suggestion_count: usize,
    pub word_learning_enabled: bool,
    pub spell_check_enabled: bool,
    /// Minimum normalized query length before completions are offered.
    pub min_completion_length: usize,
    pub suggestion_cache_capacity: usize,
    pub dictionary_cache_capacity: usize,
    /// Concurrent blocking storage and asset operations.
    pub io_concurrency: usize,
    /// Concurrent ranking operations.
    pub cpu_concurrency: usize,
    pub resilience: ResilienceConfig,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            languages: vec![SmolStr::new("en")],
            suggestion_count: 5,
            word_learning_enabled: true,
            spell_check_enabled: true,
            min_completion_length: 4,
            suggestion_cache_capacity: 256,
            dictionary_cache_capacity: 1024,
            io_concurrency: 2,
            cpu_concurrency: 2,
            resilience: ResilienceConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<EngineConfig, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_path(path: &Path) -> Result<EngineConfig, std::io::Error> {
        let file = std::fs::File::open(path)?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(std::io::Error::from)
    }

    /// The primary language, which receives learned words.
    pub fn primary_language(&self) -> SmolStr {
        self.languages
            .first()
            .cloned()
            .unwrap_or_else(|| SmolStr::new(crate::normalize::DEFAULT_LOCALE))
    }

    /// Active languages, sorted and de-duplicated, as used in cache keys.
    pub fn sorted_languages(&self) -> Vec<SmolStr> {
        self.languages.iter().cloned().sorted().dedup().collect()
    }

    /// True if moving from `self` to `other` can change the result of a
    /// suggestion or dictionary query that is already cached.
    pub fn invalidates_caches(&self, other: &EngineConfig) -> bool {
        self.sorted_languages() != other.sorted_languages()
            || self.suggestion_count != other.suggestion_count
            || self.spell_check_enabled != other.spell_check_enabled
            || self.min_completion_length != other.min_completion_length
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResilienceConfig {
    /// Failures per key before that key is skipped.
    pub retry_threshold: u32,
    /// How long a failing key is skipped; also the breaker's base backoff.
    pub cooldown_ms: u64,
    pub tracker_capacity: usize,
    /// Tracker entries older than this are swept.
    pub expiry_ms: u64,
    pub sweep_interval_ms: u64,
    /// Consecutive storage failures before the breaker opens.
    pub breaker_threshold: u32,
    pub breaker_max_cooldown_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> ResilienceConfig {
        ResilienceConfig {
            retry_threshold: 3,
            cooldown_ms: 30_000,
            tracker_capacity: 128,
            expiry_ms: 600_000,
            sweep_interval_ms: 60_000,
            breaker_threshold: 5,
            breaker_max_cooldown_ms: 300_000,
        }
    }
}

impl ResilienceConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn expiry(&self) -> Duration {
        Duration::from_millis(self.expiry_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn breaker_max_cooldown(&self) -> Duration {
        Duration::from_millis(self.breaker_max_cooldown_ms.max(self.cooldown_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_json() {
        let config = EngineConfig::from_json("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.primary_language(), "en");
    }

    #[test]
    fn nested_partial() {
        let config =
            EngineConfig::from_json(r#"{ "resilience": { "breakerThreshold": 2 } }"#).unwrap();
        assert_eq!(config.resilience.breaker_threshold, 2);
        assert_eq!(config.resilience.retry_threshold, 3);
    }

    #[test]
    fn cache_invalidation() {
        let a = EngineConfig::default();
        let mut b = a.clone();
        b.word_learning_enabled = false;
        assert!(!a.invalidates_caches(&b));

        b.languages = vec!["en".into(), "en".into()];
        assert!(!a.invalidates_caches(&b));

        b.languages.push("de".into());
        assert!(a.invalidates_caches(&b));

        let mut c = a.clone();
        c.suggestion_count = 3;
        assert!(a.invalidates_caches(&c));
    }
}
