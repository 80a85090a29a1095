//! Key pattern matching for the NoSQL-style search operations.
//!
//! A deliberately small glob dialect:
//! - optional `(?i)` prefix folds ASCII case for the whole pattern
//! - `^rest` matches a key equal to `rest` (anchored both ends)
//! - `rest$` matches a key ending in `rest`
//! - exactly one `*` splits the pattern into a required head and tail
//! - anything else matches as a substring
//!
//! Matching is byte-wise with ASCII case folding, so non-ASCII bytes
//! compare raw and can never panic. Everything works on index arithmetic
//! over the original slices; no temporary allocations.

/// Does `key` match `pattern`?
///
/// The empty pattern matches every key. A pattern with more than one `*`
/// is malformed and matches nothing.
pub fn key_matches(key: &str, pattern: &str) -> bool {
    let key = key.as_bytes();
    let mut pattern = pattern.as_bytes();

    let fold = pattern.starts_with(b"(?i)");
    if fold {
        pattern = &pattern[4..];
    }

    if pattern.is_empty() {
        return true;
    }

    // Anchored: ^rest requires the whole key to equal the remainder.
    if pattern[0] == b'^' {
        return bytes_eq(key, &pattern[1..], fold);
    }

    // Suffix: rest$ requires the key to end in the remainder.
    if pattern[pattern.len() - 1] == b'$' {
        let suffix = &pattern[..pattern.len() - 1];
        if key.len() < suffix.len() {
            return false;
        }
        return bytes_eq(&key[key.len() - suffix.len()..], suffix, fold);
    }

    // Wildcard: head*tail. Exactly one star is supported.
    let stars = pattern.iter().filter(|&&b| b == b'*').count();
    if stars > 1 {
        return false;
    }
    if stars == 1 {
        let star = pattern.iter().position(|&b| b == b'*').unwrap_or(0);
        let head = &pattern[..star];
        let tail = &pattern[star + 1..];

        if key.len() < head.len() + tail.len() {
            return false;
        }
        return bytes_eq(&key[..head.len()], head, fold)
            && bytes_eq(&key[key.len() - tail.len()..], tail, fold);
    }

    // Default: substring search.
    if pattern.len() > key.len() {
        return false;
    }
    (0..=key.len() - pattern.len()).any(|i| bytes_eq(&key[i..i + pattern.len()], pattern, fold))
}

fn bytes_eq(a: &[u8], b: &[u8], fold: bool) -> bool {
    if a.len() != b.len() {
        return false;
    }
    if fold {
        a.iter()
            .zip(b)
            .all(|(x, y)| x.to_ascii_lowercase() == y.to_ascii_lowercase())
    } else {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pattern_matches_everything() {
        assert!(key_matches("anything", ""));
        assert!(key_matches("", ""));
        assert!(key_matches("x", "(?i)"));
    }

    #[test]
    fn test_substring_default() {
        assert!(key_matches("user_profile", "profile"));
        assert!(key_matches("user_profile", "er_pro"));
        assert!(!key_matches("user_profile", "admin"));
        assert!(!key_matches("ab", "abc"));
    }

    #[test]
    fn test_anchor_is_exact() {
        assert!(key_matches("users", "^users"));
        assert!(!key_matches("users_extra", "^users"));
        assert!(!key_matches("user", "^users"));
    }

    #[test]
    fn test_suffix() {
        assert!(key_matches("backup_2024", "2024$"));
        assert!(key_matches("2024", "2024$"));
        assert!(!key_matches("2024_backup", "2024$"));
        assert!(!key_matches("24", "2024$"));
        // Bare "$" means an empty suffix, which every key has.
        assert!(key_matches("anything", "$"));
    }

    #[test]
    fn test_single_wildcard() {
        assert!(key_matches("user_1", "user_*"));
        assert!(key_matches("user_", "user_*"));
        assert!(!key_matches("admin_1", "user_*"));

        assert!(key_matches("img_001.png", "img_*.png"));
        assert!(!key_matches("img_001.jpg", "img_*.png"));
        // Head and tail may not overlap.
        assert!(!key_matches("ab", "ab*b"));
        assert!(key_matches("abb", "ab*b"));
    }

    #[test]
    fn test_multiple_wildcards_are_malformed() {
        assert!(!key_matches("foobarbaz", "foo*bar*baz"));
        assert!(!key_matches("anything", "**"));
    }

    #[test]
    fn test_case_fold() {
        assert!(key_matches("UserName", "(?i)username"));
        assert!(key_matches("CONFIG", "(?i)^config"));
        assert!(key_matches("readme.MD", "(?i)md$"));
        assert!(key_matches("UsEr_42", "(?i)user_*"));
        assert!(!key_matches("UserName", "username"));
    }

    #[test]
    fn test_non_ascii_bytes_do_not_fold_or_crash() {
        assert!(key_matches("café", "café"));
        assert!(!key_matches("café", "(?i)CAFÉ"));
        assert!(key_matches("日本語キー", "本語"));
    }

    #[test]
    fn test_empty_key() {
        assert!(key_matches("", ""));
        assert!(!key_matches("", "x"));
        assert!(key_matches("", "*"));
        assert!(!key_matches("", "a*b"));
    }
}
