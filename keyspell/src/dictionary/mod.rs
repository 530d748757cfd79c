//! Per-language fuzzy dictionary.
//!
//! Lookup uses the symmetric delete approach: every dictionary word is
//! stored under each string obtainable by deleting up to
//! [`MAX_EDIT_DISTANCE`] characters from it, and a query probes the same
//! table with its own deletes. Two words within distance `k` always share a
//! delete of at most `k` characters, so the candidate set is complete and
//! only needs verifying with a real edit distance.
use std::cmp::Reverse;
use std::io::BufRead;

use hashbrown::{HashMap, HashSet};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::cancel::CancellationToken;
use crate::error::AssetError;
use crate::normalize::normalize;

pub mod asset;
mod builtin;
pub mod registry;

pub use self::asset::{AssetSource, DirectoryAssets, MemoryAssets};
pub use self::registry::DictionaryRegistry;

/// Largest edit distance the index is built for.
pub const MAX_EDIT_DISTANCE: usize = 2;

/// Lines read between cancellation checks.
pub const BATCH_SIZE: usize = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub word: SmolStr,
    pub frequency: u64,
}

/// A dictionary word within the requested edit distance of a query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuzzyMatch {
    pub word: SmolStr,
    pub distance: usize,
    pub frequency: u64,
}

/// Immutable fuzzy index over one language's word list.
#[derive(Debug)]
pub struct DictionaryIndex {
    language: SmolStr,
    entries: Vec<DictionaryEntry>,
    ids: HashMap<SmolStr, u32>,
    deletes: HashMap<SmolStr, Vec<u32>>,
    /// Entry ids in lexicographic order of their word.
    sorted: Vec<u32>,
    max_frequency: u64,
}

impl DictionaryIndex {
    /// Streams `word frequency` lines from `reader`, checking `cancel`
    /// between batches. A cancelled or failed build returns an error and
    /// nothing of the partial index survives.
    pub fn from_reader<R: BufRead>(
        language: &str,
        reader: R,
        cancel: &CancellationToken,
    ) -> Result<DictionaryIndex, AssetError> {
        let mut builder = DictionaryBuilder::new(language);
        let mut batch: Vec<(SmolStr, u64)> = Vec::with_capacity(BATCH_SIZE);

        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = line.map_err(|e| match e.kind() {
                std::io::ErrorKind::InvalidData => AssetError::Malformed {
                    language: language.into(),
                    line: line_no,
                    reason: "not valid UTF-8".into(),
                },
                _ => AssetError::from_io(language, e),
            })?;

            if let Some(entry) = parse_line(language, &line, line_no)? {
                batch.push(entry);
            }

            if batch.len() == BATCH_SIZE {
                if cancel.is_cancelled() {
                    debug!("build of '{}' cancelled at line {}", language, line_no);
                    return Err(AssetError::Cancelled);
                }
                builder.extend(batch.drain(..));
            }
        }

        if cancel.is_cancelled() {
            return Err(AssetError::Cancelled);
        }
        builder.extend(batch.drain(..));

        let index = builder.build();
        info!("built '{}' dictionary with {} words", language, index.len());
        Ok(index)
    }

    /// Builds an index from in-memory entries.
    pub fn from_entries<I, S>(language: &str, entries: I) -> DictionaryIndex
    where
        I: IntoIterator<Item = (S, u64)>,
        S: AsRef<str>,
    {
        let mut builder = DictionaryBuilder::new(language);
        builder.extend(
            entries
                .into_iter()
                .map(|(w, f)| (SmolStr::new(w.as_ref()), f)),
        );
        builder.build()
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_frequency(&self) -> u64 {
        self.max_frequency
    }

    /// Frequency of `word`, which must already be normalized.
    pub fn frequency(&self, word: &str) -> Option<u64> {
        self.ids
            .get(word)
            .map(|&id| self.entries[id as usize].frequency)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.ids.contains_key(word)
    }

    /// Dictionary words within `max_edit_distance` of the normalized `word`,
    /// nearest first, then most frequent.
    pub fn lookup(&self, word: &str, max_edit_distance: usize) -> Vec<FuzzyMatch> {
        let max = max_edit_distance.min(MAX_EDIT_DISTANCE);
        if word.is_empty() {
            return vec![];
        }

        let input_len = word.chars().count();
        let mut seen: HashSet<u32> = HashSet::new();
        let mut out = vec![];

        for variant in delete_variants(word, max) {
            let ids = match self.deletes.get(&variant) {
                Some(ids) => ids,
                None => continue,
            };

            for &id in ids {
                if !seen.insert(id) {
                    continue;
                }

                let entry = &self.entries[id as usize];
                let len = entry.word.chars().count();
                if len.max(input_len) - len.min(input_len) > max {
                    continue;
                }

                let distance = strsim::levenshtein(word, &entry.word);
                if distance <= max {
                    out.push(FuzzyMatch {
                        word: entry.word.clone(),
                        distance,
                        frequency: entry.frequency,
                    });
                }
            }
        }

        out.sort_by(|a, b| {
            (a.distance, Reverse(a.frequency), &a.word).cmp(&(b.distance, Reverse(b.frequency), &b.word))
        });
        out
    }

    /// Words that extend `prefix`, most frequent first.
    pub fn completions(&self, prefix: &str, limit: usize) -> Vec<DictionaryEntry> {
        if prefix.is_empty() || limit == 0 {
            return vec![];
        }

        let start = self
            .sorted
            .partition_point(|&id| self.entries[id as usize].word.as_str() < prefix);

        let mut out: Vec<DictionaryEntry> = self.sorted[start..]
            .iter()
            .map(|&id| &self.entries[id as usize])
            .take_while(|e| e.word.starts_with(prefix))
            .filter(|e| e.word.len() > prefix.len())
            .cloned()
            .collect();

        out.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.word.cmp(&b.word)));
        out.truncate(limit);
        out
    }
}

struct DictionaryBuilder {
    language: SmolStr,
    entries: Vec<DictionaryEntry>,
    ids: HashMap<SmolStr, u32>,
    deletes: HashMap<SmolStr, Vec<u32>>,
}

impl DictionaryBuilder {
    fn new(language: &str) -> DictionaryBuilder {
        DictionaryBuilder {
            language: language.into(),
            entries: vec![],
            ids: HashMap::new(),
            deletes: HashMap::new(),
        }
    }

    fn extend<I: Iterator<Item = (SmolStr, u64)>>(&mut self, entries: I) {
        for (word, frequency) in entries {
            self.add(&word, frequency);
        }
    }

    fn add(&mut self, raw: &str, frequency: u64) {
        let word = normalize(raw, &self.language).user_form;
        if word.is_empty() {
            return;
        }

        if let Some(&id) = self.ids.get(&word) {
            let entry = &mut self.entries[id as usize];
            entry.frequency = entry.frequency.max(frequency);
            return;
        }

        let id = self.entries.len() as u32;
        for variant in delete_variants(&word, MAX_EDIT_DISTANCE) {
            self.deletes.entry(variant).or_default().push(id);
        }
        self.ids.insert(word.clone(), id);
        self.entries.push(DictionaryEntry { word, frequency });
    }

    fn build(self) -> DictionaryIndex {
        let mut sorted: Vec<u32> = (0..self.entries.len() as u32).collect();
        sorted.sort_by(|&a, &b| self.entries[a as usize].word.cmp(&self.entries[b as usize].word));
        let max_frequency = self.entries.iter().map(|e| e.frequency).max().unwrap_or(0);

        DictionaryIndex {
            language: self.language,
            entries: self.entries,
            ids: self.ids,
            deletes: self.deletes,
            sorted,
            max_frequency,
        }
    }
}

fn parse_line(
    language: &str,
    line: &str,
    line_no: usize,
) -> Result<Option<(SmolStr, u64)>, AssetError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let malformed = |reason: &str| AssetError::Malformed {
        language: language.into(),
        line: line_no,
        reason: reason.into(),
    };

    let mut parts = line.split_whitespace();
    let word = parts.next().ok_or_else(|| malformed("missing word"))?;
    let frequency = parts
        .next()
        .ok_or_else(|| malformed("missing frequency"))?
        .parse::<u64>()
        .map_err(|_| malformed("frequency is not an unsigned integer"))?;
    if parts.next().is_some() {
        return Err(malformed("trailing fields"));
    }

    Ok(Some((SmolStr::new(word), frequency)))
}

/// `word` and every string reachable by deleting up to `max` characters.
pub(crate) fn delete_variants(word: &str, max: usize) -> HashSet<SmolStr> {
    let mut out: HashSet<SmolStr> = HashSet::new();
    out.insert(SmolStr::new(word));

    let mut frontier: Vec<Vec<char>> = vec![word.chars().collect()];
    for _ in 0..max {
        let mut next = vec![];
        for chars in frontier.iter() {
            for i in 0..chars.len() {
                let mut variant = chars.clone();
                variant.remove(i);
                if out.insert(SmolStr::new(variant.iter().collect::<String>())) {
                    next.push(variant);
                }
            }
        }
        frontier = next;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> DictionaryIndex {
        DictionaryIndex::from_entries(
            "en",
            vec![
                ("hello", 1_000_000),
                ("help", 50_000),
                ("hell", 20_000),
                ("held", 10_000),
                ("test", 80_000),
                ("testing", 30_000),
                ("tester", 2_000),
                ("don't", 40_000),
            ],
        )
    }

    #[test]
    fn delete_variants_distance_one() {
        let v = delete_variants("abc", 1);
        let mut v: Vec<_> = v.into_iter().map(|s| s.to_string()).collect();
        v.sort();
        assert_eq!(v, vec!["ab", "abc", "ac", "bc"]);
    }

    #[test]
    fn exact_lookup_is_distance_zero() {
        let index = sample();
        let m = index.lookup("hello", 0);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].distance, 0);
        assert!(index.contains("hello"));
        assert_eq!(index.frequency("help"), Some(50_000));
    }

    #[test]
    fn fuzzy_lookup_respects_distance() {
        let index = sample();
        let m = index.lookup("helo", 2);
        assert!(m.iter().all(|x| x.distance <= 2));
        assert!(m.iter().all(|x| strsim::levenshtein("helo", &x.word) == x.distance));
        assert_eq!(m[0].word, "hello");
        assert_eq!(m[0].distance, 1);

        let words: Vec<&str> = m.iter().map(|x| x.word.as_str()).collect();
        assert!(words.contains(&"help"));
        assert!(words.contains(&"hell"));
        assert!(!words.contains(&"testing"));
    }

    #[test]
    fn lookup_finds_every_word_within_two() {
        let index = sample();
        for query in ["tst", "tets", "tesst", "hlelo", "dont", "xyz"] {
            let found: HashSet<SmolStr> = index.lookup(query, 2).into_iter().map(|m| m.word).collect();
            for entry in index.entries.iter() {
                let d = strsim::levenshtein(query, &entry.word);
                assert_eq!(found.contains(&entry.word), d <= 2, "{} vs {}", query, entry.word);
            }
        }
    }

    #[test]
    fn completions_by_frequency() {
        let index = sample();
        let c: Vec<_> = index.completions("test", 5).into_iter().map(|e| e.word).collect();
        assert_eq!(c, vec!["testing", "tester"]);
        assert!(index.completions("zzz", 5).is_empty());
        assert_eq!(index.completions("hel", 2).len(), 2);
    }

    #[test]
    fn reader_normalizes_and_merges() {
        let data = "# comment\nHello 10\n\nhello 30\nWORLD 5\n";
        let index =
            DictionaryIndex::from_reader("en", Cursor::new(data), &CancellationToken::new())
                .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.frequency("hello"), Some(30));
        assert_eq!(index.frequency("world"), Some(5));
        assert_eq!(index.max_frequency(), 30);
    }

    #[test]
    fn malformed_lines_are_reported() {
        let data = "hello 10\nworld many\n";
        let err = DictionaryIndex::from_reader("en", Cursor::new(data), &CancellationToken::new())
            .unwrap_err();
        match err {
            AssetError::Malformed { line, .. } => assert_eq!(line, 2),
            e => panic!("unexpected error {:?}", e),
        }

        let err = DictionaryIndex::from_reader("en", Cursor::new("lonely\n"), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, AssetError::Malformed { line: 1, .. }));
    }

    #[test]
    fn cancelled_build_fails() {
        let mut data = String::new();
        for i in 0..(BATCH_SIZE * 3) {
            data.push_str(&format!("word{} {}\n", i, i));
        }
        let token = CancellationToken::new();
        token.cancel();
        let err = DictionaryIndex::from_reader("en", Cursor::new(data), &token).unwrap_err();
        assert!(matches!(err, AssetError::Cancelled));
    }
}
