//! Edit distance with an upper bound.
use unic_segment::Graphemes;

/// Levenshtein distance between `a` and `b` if it is at most `max`, counted
/// in grapheme clusters.
///
/// Rows are computed one at a time and the computation stops as soon as
/// every cell of a row exceeds `max`, since no later row can get below it.
pub fn bounded_levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<&str> = Graphemes::new(a).collect();
    let b: Vec<&str> = Graphemes::new(b).collect();

    if a.len().max(b.len()) - a.len().min(b.len()) > max {
        return None;
    }
    if a.is_empty() || b.is_empty() {
        let d = a.len().max(b.len());
        return if d <= max { Some(d) } else { None };
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];

        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
            row_min = row_min.min(curr[j + 1]);
        }

        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let d = prev[b.len()];
    if d <= max {
        Some(d)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agrees_with_full_levenshtein() {
        let words = ["", "a", "ab", "kitten", "sitting", "myapi", "myap", "test", "tst", "tset", "über", "uber"];
        for a in words.iter() {
            for b in words.iter() {
                let full = strsim::levenshtein(a, b);
                for max in 0..4 {
                    let expected = if full <= max { Some(full) } else { None };
                    assert_eq!(bounded_levenshtein(a, b, max), expected, "{:?} {:?} {}", a, b, max);
                }
            }
        }
    }

    #[test]
    fn exits_early() {
        assert_eq!(bounded_levenshtein("abcdef", "uvwxyz", 2), None);
        assert_eq!(bounded_levenshtein("kitten", "sitting", 3), Some(3));
    }

    #[test]
    fn counts_combining_sequences_once() {
        assert_eq!(bounded_levenshtein("q\u{307}", "q", 2), Some(1));
        assert_eq!(bounded_levenshtein("q\u{307}q\u{307}", "aq\u{307}q\u{307}q\u{307}", 2), Some(2));
    }
}
