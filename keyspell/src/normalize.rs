//! Text canonicalization shared by every lookup and storage path.
//!
//! A word typed on the keyboard may arrive decomposed, wrapped in stray
//! whitespace, or with any of several apostrophe look-alikes depending on the
//! host platform. [`normalize`] reduces all of these to one canonical pair of
//! forms so that dictionary, learned-word and cache keys agree.
use language_tags::LanguageTag;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use unic_segment::Graphemes;
use unic_ucd_category::GeneralCategory;
use unicode_normalization::UnicodeNormalization;

use crate::error::ValidationError;

/// Locale used when a language tag cannot be parsed.
pub const DEFAULT_LOCALE: &str = "en";

/// Maximum number of grapheme clusters in a learnable word.
pub const MAX_WORD_GRAPHEMES: usize = 100;

/// Characters rendered as apostrophes that are folded into `'`.
const APOSTROPHE_LOOKALIKES: [char; 4] = [
    '\u{2019}', // right single quotation mark
    '\u{201A}', // single low-9 quotation mark
    '\u{02BC}', // modifier letter apostrophe
    '\u{2032}', // prime
];

/// Punctuation allowed to stand in for letters inside a word.
const WORD_PUNCTUATION: [char; 2] = ['\'', '-'];

/// The two canonical forms of a word.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedWord {
    /// Trimmed, NFC composed, apostrophes canonicalized. Case is preserved.
    pub standard_form: SmolStr,
    /// `standard_form` lowercased for the word's locale.
    pub user_form: SmolStr,
}

/// Normalizes `word` for the locale named by `language_tag`.
///
/// The result depends only on the two arguments, and feeding either form
/// back through `normalize` yields the same pair.
pub fn normalize(word: &str, language_tag: &str) -> NormalizedWord {
    let standard: String = word
        .trim()
        .nfc()
        .map(|ch| {
            if APOSTROPHE_LOOKALIKES.contains(&ch) {
                '\''
            } else {
                ch
            }
        })
        .collect();

    let lowered = lowercase_for_locale(&standard, locale_of(language_tag).as_str());
    let user: String = lowered.nfc().collect();

    NormalizedWord {
        standard_form: SmolStr::new(standard),
        user_form: SmolStr::new(user),
    }
}

/// Primary language subtag of `language_tag`, or [`DEFAULT_LOCALE`].
pub fn locale_of(language_tag: &str) -> SmolStr {
    match LanguageTag::parse(language_tag.trim()) {
        Ok(tag) => SmolStr::new(tag.primary_language().to_ascii_lowercase()),
        Err(_) => SmolStr::new(DEFAULT_LOCALE),
    }
}

fn lowercase_for_locale(s: &str, locale: &str) -> String {
    match locale {
        // Dotted and dotless i are distinct letters here.
        "tr" | "az" => s
            .chars()
            .map(|ch| match ch {
                'I' => "ı".to_string(),
                'İ' => "i".to_string(),
                _ => ch.to_lowercase().collect(),
            })
            .collect(),
        _ => s.to_lowercase(),
    }
}

/// Number of user-perceived characters in `word`.
#[inline]
pub fn grapheme_len(word: &str) -> usize {
    Graphemes::new(word).count()
}

/// Checks that `word` is something worth learning.
pub fn validate_word(word: &str) -> Result<(), ValidationError> {
    let len = grapheme_len(word.trim());
    if len == 0 {
        return Err(ValidationError::Empty);
    }
    if len > MAX_WORD_GRAPHEMES {
        return Err(ValidationError::TooLong(len));
    }

    let has_word_char = word
        .chars()
        .any(|ch| GeneralCategory::of(ch).is_letter() || WORD_PUNCTUATION.contains(&ch));
    if !has_word_char {
        return Err(ValidationError::NoLetters);
    }

    Ok(())
}

/// `word` with every ASCII apostrophe removed, for contraction matching.
pub fn strip_apostrophes(word: &str) -> String {
    word.chars().filter(|&ch| ch != '\'').collect()
}

/// True when `candidate` is `query` spelled with its apostrophes, like
/// "dont" and "don't".
pub fn is_contraction_of(candidate: &str, query: &str) -> bool {
    candidate.contains('\'') && strip_apostrophes(candidate) == strip_apostrophes(query)
}
