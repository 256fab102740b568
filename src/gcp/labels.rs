//! Label Sanitization
//!
//! Kubernetes label keys and values are far more permissive than GCE label
//! constraints. This module translates arbitrary Kubernetes labels into
//! GCE-legal form:
//!
//! - keys must start with a lowercase letter (international characters are
//!   allowed), contain only lowercase letters, digits, dashes and
//!   underscores, and be at most 63 characters long
//! - values have the same alphabet and length bound but may be empty and
//!   need not start with a letter
//! - a disk carries at most 64 labels
//!
//! Sanitization is deterministic and idempotent: feeding an already
//! sanitized string back through produces the same string.

use std::collections::BTreeMap;

/// Maximum byte length of a GCE label key or value
pub const MAX_LABEL_LEN: usize = 63;

/// Maximum number of labels on a GCE disk
pub const MAX_LABEL_COUNT: usize = 64;

/// Substitution applied before filtering. Slash and dot are the common
/// separators in Kubernetes label keys (domain-prefixed keys like
/// `kubernetes.io/app`) and get distinct replacements; rarer punctuation
/// all collapses to a dash.
fn replace_char(c: char) -> char {
    match c {
        '/' => '_',
        '.' | ' ' | ':' | ',' | ';' | '=' | '+' => '-',
        _ => c,
    }
}

fn is_valid_label_char(c: char) -> bool {
    c.is_alphabetic() || c.is_numeric() || c == '-' || c == '_'
}

/// Shared sanitization pipeline for keys and values. Keys additionally get
/// a leading-letter fix-up.
fn sanitize_component(raw: &str, is_key: bool) -> String {
    let mut s: String = raw
        .to_lowercase()
        .chars()
        .map(replace_char)
        .filter(|c| is_valid_label_char(*c))
        .collect();

    // Keys must start with a letter. The check looks at the first byte only;
    // a leading digit, dash or underscore triggers the prefix.
    if is_key && !s.is_empty() && !(s.as_bytes()[0] as char).is_alphabetic() {
        s.insert(0, 'k');
    }

    // Collapse runs of dashes and underscores.
    while s.contains("--") || s.contains("__") {
        s = s.replace("--", "-").replace("__", "_");
    }

    s = s.trim_end_matches(['-', '_']).to_string();

    if s.len() > MAX_LABEL_LEN {
        let mut cut = MAX_LABEL_LEN;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        // Truncation may leave a dangling separator at the cut point.
        s = s.trim_end_matches(['-', '_']).to_string();
    }

    s
}

/// Sanitize a Kubernetes label key to fit GCE's label key constraints.
/// Returns an empty string when nothing legal survives.
pub fn sanitize_key(key: &str) -> String {
    sanitize_component(key, true)
}

/// Sanitize a Kubernetes label value to fit GCE's label value constraints.
/// Unlike keys, values may legally be empty and need not start with a letter.
pub fn sanitize_value(value: &str) -> String {
    sanitize_component(value, false)
}

/// Sanitize a full label map. Input maps larger than [`MAX_LABEL_COUNT`]
/// are truncated before sanitization; entries whose key sanitizes to the
/// empty string are dropped. Two raw keys may sanitize to the same key, in
/// which case the entry later in iteration order wins.
pub fn sanitize_labels(labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut result = BTreeMap::new();
    for (k, v) in labels.iter().take(MAX_LABEL_COUNT) {
        let key = sanitize_key(k);
        if key.is_empty() {
            continue;
        }
        result.insert(key, sanitize_value(v));
    }
    result
}

/// Sanitize a list of label keys, dropping keys that sanitize to the empty
/// string and preserving the relative order of the rest.
pub fn sanitize_keys(keys: &[String]) -> Vec<String> {
    keys.iter()
        .map(|k| sanitize_key(k))
        .filter(|k| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_sanitize_key_cases() {
        let cases = [
            ("app", "app"),
            ("123-app", "k123-app"),
            ("kubernetes.io/app=name:v1", "kubernetes-io_app-name-v1"),
            ("app--name___test", "app-name_test"),
            ("app-name---_", "app-name"),
            ("APP.Name", "app-name"),
            ("_leading", "k_leading"),
            ("-leading", "k-leading"),
            ("", ""),
            // Separator-only input leaves just the fix-up prefix behind.
            ("///", "k"),
            ("...", "k"),
            // Characters outside the substitution table are dropped outright.
            ("!!!", ""),
        ];
        for (input, want) in cases {
            assert_eq!(sanitize_key(input), want, "input: {input:?}");
        }
    }

    #[test]
    fn test_sanitize_value_cases() {
        let cases = [
            ("value.with:special/chars", "value-with-special_chars"),
            ("UPPER", "upper"),
            ("1234", "1234"),
            ("", ""),
            ("trailing--", "trailing"),
            ("a b c", "a-b-c"),
        ];
        for (input, want) in cases {
            assert_eq!(sanitize_value(input), want, "input: {input:?}");
        }
    }

    #[test]
    fn test_sanitize_key_truncates_to_63() {
        assert_eq!(sanitize_key(&"a".repeat(70)), "a".repeat(63));
    }

    #[test]
    fn test_truncation_trims_dangling_separator() {
        // 62 letters followed by separators: the cut would otherwise land
        // right after a dash.
        let input = format!("{}-x", "a".repeat(62));
        let out = sanitize_key(&input);
        assert_eq!(out, "a".repeat(62));
    }

    #[test]
    fn test_international_characters_kept() {
        assert_eq!(sanitize_value("café"), "café");
        assert_eq!(sanitize_key("Über-Disk"), "über-disk");
    }

    #[test]
    fn test_value_may_start_with_digit() {
        assert_eq!(sanitize_value("123"), "123");
        assert_eq!(sanitize_key("123"), "k123");
    }

    fn assert_well_formed(s: &str, is_key: bool) {
        if s.is_empty() {
            return;
        }
        assert!(s.len() <= MAX_LABEL_LEN, "too long: {s:?}");
        assert!(!s.contains("--") && !s.contains("__"), "doubled: {s:?}");
        assert!(!s.ends_with(['-', '_']), "trailing separator: {s:?}");
        if is_key {
            assert!(
                s.chars().next().unwrap().is_alphabetic(),
                "key not letter-led: {s:?}"
            );
        }
    }

    #[test]
    fn test_sanitize_properties() {
        let long = "x".repeat(200);
        let trailing = format!("{}--", "y".repeat(64));
        let corpus: Vec<&str> = vec![
            "",
            "app",
            "123-app",
            "kubernetes.io/app=name:v1",
            "app--name___test",
            "app-name---_",
            "UPPER case AND: punctuation;=+",
            "_-_-_-_",
            "日本語ラベル",
            "é123",
            "---",
            "a/b.c d:e,f;g=h+i",
            &long,
            &trailing,
        ];
        for input in corpus {
            let key = sanitize_key(input);
            let value = sanitize_value(input);
            assert_well_formed(&key, true);
            assert_well_formed(&value, false);
            // Idempotence
            assert_eq!(sanitize_key(&key), key, "key not idempotent: {input:?}");
            assert_eq!(
                sanitize_value(&value),
                value,
                "value not idempotent: {input:?}"
            );
        }
    }

    #[test]
    fn test_sanitize_labels_basic() {
        let got = sanitize_labels(&labels(&[
            ("foo", "bar"),
            ("dom.tld/key", "value"),
            ("NUM", "42"),
        ]));
        assert_eq!(
            got,
            labels(&[("foo", "bar"), ("dom-tld_key", "value"), ("num", "42")])
        );
    }

    #[test]
    fn test_sanitize_labels_drops_empty_keys() {
        let got = sanitize_labels(&labels(&[("!!!", "kept-value"), ("ok", "v")]));
        assert_eq!(got, labels(&[("ok", "v")]));
    }

    #[test]
    fn test_sanitize_labels_cardinality() {
        let mut big = BTreeMap::new();
        for i in 0..100 {
            big.insert(format!("key-{i:03}"), format!("val-{i}"));
        }
        let got = sanitize_labels(&big);
        assert_eq!(got.len(), MAX_LABEL_COUNT);

        let small = sanitize_labels(&labels(&[("a", "1"), ("b", "2")]));
        assert_eq!(small.len(), 2);
    }

    #[test]
    fn test_sanitize_keys_drops_empties_keeps_order() {
        let keys: Vec<String> = ["key1", "...", "dom.tld/key", "key2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            sanitize_keys(&keys),
            vec!["key1", "dom-tld_key", "key2"]
        );
    }
}
