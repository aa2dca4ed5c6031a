//! Fasset key patterns.
//!
//! Keys are dot-separated segments (`MainPage.cart.link`). Import declarations
//! may use `*` as a wildcard matching any run of characters, dots included, so
//! `MainPage.*.link` matches every feature's `link` under `MainPage`.

/// Wildcard character accepted in import keys.
pub const WILDCARD: char = '*';

/// Returns `true` if the key contains at least one wildcard.
#[must_use]
pub fn is_wildcard(key: &str) -> bool {
    key.contains(WILDCARD)
}

/// Returns `true` if a single segment character is allowed in a fasset key.
#[must_use]
pub const fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Checks the shape of a key or pattern.
///
/// Segments must be non-empty and made of `[A-Za-z0-9_-]` (plus `*` when
/// `allow_wildcard` is set). Returns a description of the first problem found.
#[must_use]
pub fn check_key(key: &str, allow_wildcard: bool) -> Option<String> {
    if key.is_empty() {
        return Some("key cannot be empty".to_owned());
    }
    for segment in key.split('.') {
        if segment.is_empty() {
            return Some(format!("key '{key}' contains an empty segment"));
        }
        if let Some(bad) =
            segment.chars().find(|&c| !(is_key_char(c) || (allow_wildcard && c == WILDCARD)))
        {
            return Some(format!("key '{key}' contains invalid character '{bad}'"));
        }
    }
    None
}

/// Matches `key` against a pattern where `*` stands for any (possibly empty) run of characters.
///
/// A pattern without wildcards matches only the identical key.
#[must_use]
pub fn matches(pattern: &str, key: &str) -> bool {
    let pattern = pattern.as_bytes();
    let key = key.as_bytes();

    let (mut p, mut k) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while k < key.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            resume = k;
            p += 1;
        } else if p < pattern.len() && pattern[p] == key[k] {
            p += 1;
            k += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            k = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&b| b == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_keys_match_only_themselves() {
        assert!(matches("logger", "logger"));
        assert!(!matches("logger", "logger.sink"));
        assert!(!matches("logger.sink", "logger"));
    }

    #[test]
    fn wildcard_spans_segments() {
        assert!(matches("MainPage.*.link", "MainPage.cart.link"));
        assert!(matches("MainPage.*.link", "MainPage.a.b.link"));
        assert!(!matches("MainPage.*.link", "MainPage.cart.body"));
        assert!(matches("state.*", "state.currentView"));
        assert!(matches("*", "anything.at.all"));
    }

    #[test]
    fn key_shape_is_checked() {
        assert!(check_key("currentView.selectors.current", false).is_none());
        assert!(check_key("", false).is_some());
        assert!(check_key("a..b", false).is_some());
        assert!(check_key("a.*", false).is_some());
        assert!(check_key("a.*", true).is_none());
        assert!(check_key("a b", true).is_some());
    }
}
