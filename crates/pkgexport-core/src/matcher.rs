/// Levenshtein distance between `a` and `b`, counted in Unicode scalar values.
///
/// Keeps two rows of the DP table sized by the shorter input, so extra space
/// is O(min(n, m)).
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return long.len();
    }

    let mut prev: Vec<usize> = (0..=short.len()).collect();
    let mut curr = vec![0; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        curr[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let substitution = prev[j] + usize::from(lc != sc);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_distances() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("flaw", "lawn"), 2);
        assert_eq!(edit_distance("foobar", "foo"), 3);
        assert_eq!(edit_distance("foo", "bar"), 3);
    }

    #[test]
    fn identity_is_zero() {
        for s in ["", "a", "test-package", "ünïcödé"] {
            assert_eq!(edit_distance(s, s), 0);
        }
    }

    #[test]
    fn empty_input_is_length_of_other() {
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("abcd", ""), 4);
        assert_eq!(edit_distance("", "日本"), 2);
    }

    #[test]
    fn symmetric() {
        let words = ["", "foo", "foobar", "foobaz", "bar", "test-package", "tset-pakcage"];
        for a in words {
            for b in words {
                assert_eq!(edit_distance(a, b), edit_distance(b, a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn counts_chars_not_bytes() {
        assert_eq!(edit_distance("é", "e"), 1);
        assert_eq!(edit_distance("naïve", "naive"), 1);
    }
}
