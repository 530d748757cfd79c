//! Next-word counts learned from committed word pairs.
use std::num::NonZeroUsize;

use hashbrown::HashMap;
use lru::LruCache;
use parking_lot::Mutex;
use smol_str::SmolStr;

/// Followers kept per previous word; the least frequent is dropped beyond it.
pub const MAX_FOLLOWERS: usize = 32;

/// In-memory bigram counts, bounded by the number of distinct previous
/// words. Callers pass normalized forms.
pub struct BigramModel {
    table: Mutex<LruCache<SmolStr, HashMap<SmolStr, u32>>>,
}

impl BigramModel {
    pub fn new(capacity: usize) -> BigramModel {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        BigramModel {
            table: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Counts one occurrence of `next` following `previous`, returning the
    /// new count.
    pub fn record(&self, previous: &str, next: &str) -> u32 {
        let mut table = self.table.lock();
        let followers = table.get_or_insert_mut(SmolStr::new(previous), HashMap::new);

        if !followers.contains_key(next) && followers.len() >= MAX_FOLLOWERS {
            let weakest = followers
                .iter()
                .min_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
                .map(|(w, _)| w.clone());
            if let Some(weakest) = weakest {
                followers.remove(&weakest);
            }
        }

        let count = followers.entry(SmolStr::new(next)).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Up to `limit` words seen after `previous`, most frequent first,
    /// skipping any for which `exclude` is true.
    pub fn predict<F>(&self, previous: &str, limit: usize, exclude: F) -> Vec<(SmolStr, u32)>
    where
        F: Fn(&str) -> bool,
    {
        let mut table = self.table.lock();
        let followers = match table.get(previous) {
            Some(f) => f,
            None => return Vec::new(),
        };

        let mut out: Vec<(SmolStr, u32)> = followers
            .iter()
            .filter(|(w, _)| !exclude(w))
            .map(|(w, c)| (w.clone(), *c))
            .collect();
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(limit);
        out
    }

    pub fn remove_word(&self, word: &str) {
        let mut table = self.table.lock();
        table.pop(word);
        for (_, followers) in table.iter_mut() {
            followers.remove(word);
        }
    }

    pub fn clear(&self) {
        self.table.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicts_by_count() {
        let model = BigramModel::new(8);
        model.record("good", "morning");
        model.record("good", "night");
        assert_eq!(model.record("good", "morning"), 2);

        let words: Vec<SmolStr> = model
            .predict("good", 5, |_| false)
            .into_iter()
            .map(|(w, _)| w)
            .collect();
        assert_eq!(words, vec!["morning", "night"]);

        let filtered = model.predict("good", 5, |w| w == "morning");
        assert_eq!(filtered, vec![(SmolStr::new("night"), 1)]);
        assert!(model.predict("bad", 5, |_| false).is_empty());
    }

    #[test]
    fn bounded() {
        let model = BigramModel::new(1);
        model.record("a", "b");
        model.record("c", "d");
        assert!(model.predict("a", 5, |_| false).is_empty());

        for i in 0..MAX_FOLLOWERS + 1 {
            model.record("c", &format!("w{}", i));
        }
        assert_eq!(model.predict("c", 100, |_| false).len(), MAX_FOLLOWERS);
    }

    #[test]
    fn forgets_words() {
        let model = BigramModel::new(4);
        model.record("good", "morning");
        model.record("morning", "coffee");
        model.remove_word("morning");
        assert!(model.predict("good", 5, |_| false).is_empty());
        assert!(model.predict("morning", 5, |_| false).is_empty());
    }
}
