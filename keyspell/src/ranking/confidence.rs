//! Confidence scores for each candidate source.
//!
//! Every source has its own band; results are always clamped into it so a
//! weak learned word still outranks the best dictionary correction.

/// Fixed confidence for a candidate that is the query plus apostrophes.
pub const CONTRACTION_CONFIDENCE: f64 = 0.97;

pub const LEARNED_BAND: (f64, f64) = (0.85, 0.99);
pub const COMPLETION_BAND: (f64, f64) = (0.50, 0.99);
pub const DICTIONARY_BAND: (f64, f64) = (0.10, 0.85);
pub const BIGRAM_BAND: (f64, f64) = (0.30, 0.80);

const SAME_LENGTH_BONUS: f64 = 0.05;
const SAME_FIRST_LETTER_BONUS: f64 = 0.05;
const SAME_LAST_LETTER_BONUS: f64 = 0.03;
const PROXIMITY_BONUS: f64 = 0.05;
const APOSTROPHE_BONUS: f64 = 0.10;
const MAX_USER_BOOST: f64 = 0.10;

#[inline]
fn clamp(value: f64, (lo, hi): (f64, f64)) -> f64 {
    value.max(lo).min(hi)
}

/// `ln(freq + 1) / ln(max + 1)`, or zero for an empty corpus.
pub fn log_frequency_score(frequency: u64, max_frequency: u64) -> f64 {
    if max_frequency == 0 {
        return 0.0;
    }
    ((frequency as f64 + 1.0).ln() / (max_frequency as f64 + 1.0).ln()).min(1.0)
}

/// Learned words: earlier similarity rank and higher frequency score more.
pub fn learned(rank: usize, frequency: u32, contraction: bool) -> f64 {
    if contraction {
        return CONTRACTION_CONFIDENCE;
    }
    let score = 0.95 - 0.02 * rank as f64 + (f64::from(frequency) + 1.0).ln() * 0.02;
    clamp(score, LEARNED_BAND)
}

pub struct CompletionInput {
    pub query_len: usize,
    pub candidate_len: usize,
    pub frequency: u64,
    pub max_frequency: u64,
    /// How often the user has learned the candidate, if ever.
    pub user_frequency: Option<u32>,
    pub contraction: bool,
}

pub fn completion(input: &CompletionInput) -> f64 {
    if input.contraction {
        return CONTRACTION_CONFIDENCE;
    }
    let length_ratio = input.query_len as f64 / input.candidate_len.max(1) as f64;
    let user_boost = input
        .user_frequency
        .map_or(0.0, |f| ((f64::from(f) + 1.0).ln() * 0.03).min(MAX_USER_BOOST));

    let score = 0.70 * length_ratio
        + 0.30 * log_frequency_score(input.frequency, input.max_frequency)
        + user_boost;
    clamp(score, COMPLETION_BAND)
}

pub struct DictionaryInput {
    pub distance: usize,
    pub frequency: u64,
    pub max_frequency: u64,
    pub same_length: bool,
    pub same_first: bool,
    pub same_last: bool,
    pub adjacent_key: bool,
    pub apostrophe_inserted: bool,
}

pub fn dictionary(input: &DictionaryInput) -> f64 {
    let closeness = (2.0 - input.distance.min(2) as f64) / 2.0;
    let mut score = 0.60 * closeness + 0.40 * log_frequency_score(input.frequency, input.max_frequency);

    if input.same_length {
        score += SAME_LENGTH_BONUS;
    }
    if input.same_first {
        score += SAME_FIRST_LETTER_BONUS;
    }
    if input.same_last {
        score += SAME_LAST_LETTER_BONUS;
    }
    if input.adjacent_key {
        score += PROXIMITY_BONUS;
    }
    if input.apostrophe_inserted {
        score += APOSTROPHE_BONUS;
    }

    clamp(score, DICTIONARY_BAND)
}

pub fn bigram(count: u32) -> f64 {
    clamp(0.30 + 0.10 * (f64::from(count) + 1.0).ln(), BIGRAM_BAND)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_band(v: f64, (lo, hi): (f64, f64)) -> bool {
        v >= lo && v <= hi
    }

    #[test]
    fn learned_band() {
        assert!(in_band(learned(0, 1, false), LEARNED_BAND));
        assert!(in_band(learned(20, 1, false), LEARNED_BAND));
        assert_eq!(learned(20, 1, false), 0.85);
        assert_eq!(learned(0, u32::MAX, false), 0.99);
        assert!(learned(0, 10, false) > learned(1, 10, false));
        assert_eq!(learned(3, 1, true), CONTRACTION_CONFIDENCE);
    }

    #[test]
    fn completion_prefers_short_and_frequent() {
        let base = CompletionInput {
            query_len: 4,
            candidate_len: 5,
            frequency: 100,
            max_frequency: 1000,
            user_frequency: None,
            contraction: false,
        };
        let longer = CompletionInput {
            candidate_len: 9,
            ..base
        };
        assert!(completion(&base) > completion(&longer));
        assert!(in_band(completion(&longer), COMPLETION_BAND));

        let boosted = CompletionInput {
            user_frequency: Some(1000),
            ..base
        };
        let boost = completion(&boosted) - completion(&base);
        assert!(boost > 0.0 && boost <= MAX_USER_BOOST + 1e-9);
    }

    #[test]
    fn dictionary_distance_dominates() {
        let near = DictionaryInput {
            distance: 1,
            frequency: 10,
            max_frequency: 1_000_000,
            same_length: false,
            same_first: false,
            same_last: false,
            adjacent_key: false,
            apostrophe_inserted: false,
        };
        let far = DictionaryInput { distance: 2, ..near };
        assert!(dictionary(&near) > dictionary(&far));
        assert!(in_band(dictionary(&far), DICTIONARY_BAND));

        let everything = DictionaryInput {
            distance: 0,
            frequency: 1_000_000,
            same_length: true,
            same_first: true,
            same_last: true,
            adjacent_key: true,
            apostrophe_inserted: true,
            ..near
        };
        assert_eq!(dictionary(&everything), 0.85);
    }

    #[test]
    fn bigram_band() {
        assert!((bigram(0) - 0.30).abs() < 1e-9);
        assert!(bigram(5) > bigram(1));
        assert_eq!(bigram(u32::MAX), 0.80);
    }
}
