//! Carrying the user's capitalization over to suggestions.
//!
//! Suggestions are generated from lowercased forms; before they are shown the
//! casing pattern of the typed input is re-applied, so `Helo` offers `Hello`
//! and `HELO` offers `HELLO`.
use smol_str::SmolStr;

#[inline(always)]
pub fn upper_case(s: &str) -> SmolStr {
    s.chars()
        .map(|c| c.to_uppercase().collect::<String>())
        .collect::<SmolStr>()
}

#[inline(always)]
pub fn upper_first(s: &str) -> SmolStr {
    let mut c = s.chars();
    match c.next() {
        None => SmolStr::new(""),
        Some(f) => SmolStr::from(f.to_uppercase().collect::<String>() + c.as_str()),
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Case {
    Upper,
    Lower,
    Neither,
}

impl Case {
    #[inline(always)]
    fn new(ch: char) -> Case {
        if ch.is_lowercase() {
            Case::Lower
        } else if ch.is_uppercase() {
            Case::Upper
        } else {
            Case::Neither
        }
    }
}

/// True for words like `iPhone` or `McDonald` whose casing carries meaning
/// beyond a leading capital.
pub fn is_mixed_case(word: &str) -> bool {
    let mut chars = word.chars();
    let mut last_case = match chars.next() {
        Some(ch) => Case::new(ch),
        None => return false,
    };

    if last_case == Case::Neither {
        return false;
    }

    let mut case_changes = 0;

    for ch in chars {
        let next_case = Case::new(ch);

        match (last_case, next_case) {
            (_, Case::Neither) => return false,
            (_, Case::Upper) => case_changes += 2,
            (Case::Upper, Case::Lower) => case_changes += 1,
            _ => {}
        }

        last_case = next_case;
    }

    case_changes > 1
}

/// True when every cased character is uppercase and there are at least two.
pub fn is_all_caps(word: &str) -> bool {
    word.chars().filter(|c| c.is_uppercase()).take(2).count() == 2 && upper_case(word) == word
}

pub fn is_first_caps(word: &str) -> bool {
    word.chars().next().map_or(false, char::is_uppercase)
}

/// Casing pattern of typed input. Mixed-case input has no pattern to carry
/// over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseMutation {
    FirstCaps,
    AllCaps,
    None,
}

impl CaseMutation {
    pub fn detect(input: &str) -> CaseMutation {
        let input = input.trim();
        if is_all_caps(input) {
            CaseMutation::AllCaps
        } else if is_mixed_case(input) {
            CaseMutation::None
        } else if is_first_caps(input) {
            CaseMutation::FirstCaps
        } else {
            CaseMutation::None
        }
    }

    pub fn apply(self, word: &str) -> SmolStr {
        match self {
            CaseMutation::AllCaps => upper_case(word),
            CaseMutation::FirstCaps => upper_first(word),
            CaseMutation::None => SmolStr::new(word),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_patterns() {
        assert_eq!(CaseMutation::detect("HELO"), CaseMutation::AllCaps);
        assert_eq!(CaseMutation::detect("Helo"), CaseMutation::FirstCaps);
        assert_eq!(CaseMutation::detect("helo"), CaseMutation::None);
        assert_eq!(CaseMutation::detect("I"), CaseMutation::FirstCaps);
        assert_eq!(CaseMutation::detect("DON'T"), CaseMutation::AllCaps);
        assert_eq!(CaseMutation::detect("42"), CaseMutation::None);
    }

    #[test]
    fn applies_patterns() {
        assert_eq!(CaseMutation::AllCaps.apply("don't"), "DON'T");
        assert_eq!(CaseMutation::FirstCaps.apply("élan"), "Élan");
        assert_eq!(CaseMutation::None.apply("hello"), "hello");
    }

    #[test]
    fn mixed_case() {
        assert!(is_mixed_case("iPhone"));
        assert!(is_mixed_case("McDonald"));
        assert!(!is_mixed_case("Hello"));
        assert_eq!(CaseMutation::detect("McDonals"), CaseMutation::None);
    }
}
