//! Parameter store keys
//!
//! Keys are hierarchical path strings like `au_00/proc_02/p_f_volume.json`.
//! Path fragments may carry a hexadecimal index suffix, and the final
//! fragment's file-type suffix encodes the value type. Processors register
//! interest in keys via patterns containing `XX` wildcards; matching a key
//! against a pattern extracts the wildcard indices.

use crate::KEY_INDICES_MAX;
use regex::Regex;
use std::sync::OnceLock;

/// The value type encoded in a key's file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Bool,
    Int,
    Float,
    Tstamp,
    Envelope,
    SampleMap,
    HitMap,
    NumList,
    Sample,
    Json,
}

impl KeyType {
    /// Determine the value type from the key's suffix.
    pub fn of_key(key: &str) -> Option<KeyType> {
        let suffix = key.rsplit('.').next()?;
        let kind = match suffix {
            "jsonb" => KeyType::Bool,
            "jsoni" => KeyType::Int,
            "jsonf" => KeyType::Float,
            "jsont" => KeyType::Tstamp,
            "jsone" => KeyType::Envelope,
            "jsonsm" => KeyType::SampleMap,
            "jsonsh" => KeyType::HitMap,
            "jsonln" => KeyType::NumList,
            "wv" => KeyType::Sample,
            "json" => KeyType::Json,
            _ => return None,
        };
        Some(kind)
    }
}

fn key_grammar() -> &'static Regex {
    static GRAMMAR: OnceLock<Regex> = OnceLock::new();
    GRAMMAR.get_or_init(|| {
        Regex::new(
            r"^([a-z][a-z0-9_]*/)*p_[a-z][a-z0-9_]*\.(jsonb|jsoni|jsonf|jsont|jsone|jsonsm|jsonsh|jsonln|json|wv)$",
        )
        .expect("key grammar is well formed")
    })
}

/// Check a key against the key grammar.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.len() <= 256 && key_grammar().is_match(key)
}

/// Extracted wildcard indices, unused entries set to -1.
pub type KeyIndices = [i32; KEY_INDICES_MAX];

pub const NO_INDICES: KeyIndices = [-1; KEY_INDICES_MAX];

/// Match `key` against `pattern`, where each `XX` in the pattern matches
/// two hexadecimal digits in the key. On success the matched indices are
/// returned in pattern order.
///
/// ```
/// use cadenza::key::match_pattern;
/// let indices = match_pattern("tone_XX/p_f_pitch.json", "tone_0a/p_f_pitch.json").unwrap();
/// assert_eq!(indices[0], 0x0a);
/// assert_eq!(indices[1], -1);
/// ```
pub fn match_pattern(pattern: &str, key: &str) -> Option<KeyIndices> {
    let mut indices = NO_INDICES;
    let mut next_index = 0;

    let p = pattern.as_bytes();
    let k = key.as_bytes();
    let mut pi = 0;
    let mut ki = 0;

    while pi < p.len() {
        if p[pi] == b'X' && pi + 1 < p.len() && p[pi + 1] == b'X' {
            if ki + 2 > k.len() || next_index >= KEY_INDICES_MAX {
                return None;
            }
            let hi = hex_digit(k[ki])?;
            let lo = hex_digit(k[ki + 1])?;
            indices[next_index] = (hi * 16 + lo) as i32;
            next_index += 1;
            pi += 2;
            ki += 2;
        } else {
            if ki >= k.len() || p[pi] != k[ki] {
                return None;
            }
            pi += 1;
            ki += 1;
        }
    }

    if ki != k.len() {
        return None;
    }
    Some(indices)
}

fn hex_digit(c: u8) -> Option<u32> {
    (c as char).to_digit(16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_types() {
        assert_eq!(KeyType::of_key("p_f_volume.jsonf"), Some(KeyType::Float));
        assert_eq!(KeyType::of_key("p_events.json"), Some(KeyType::Json));
        assert_eq!(KeyType::of_key("p_sample.wv"), Some(KeyType::Sample));
        assert_eq!(KeyType::of_key("p_nm.jsonsm"), Some(KeyType::SampleMap));
        assert_eq!(KeyType::of_key("p_oops.exe"), None);
    }

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_key("au_00/proc_02/p_f_volume.jsonf"));
        assert!(is_valid_key("pat_000/col_00/p_events.json"));
        assert!(is_valid_key("p_connections.json"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("AU_00/p_f_volume.jsonf"));
        assert!(!is_valid_key("au_00//p_f_volume.jsonf"));
    }

    #[test]
    fn test_match_literal() {
        assert!(match_pattern("p_f_volume.jsonf", "p_f_volume.jsonf").is_some());
        assert!(match_pattern("p_f_volume.jsonf", "p_f_volume.jsoni").is_none());
    }

    #[test]
    fn test_match_wildcards() {
        let indices = match_pattern("voice_XX/p_f_delay.jsonf", "voice_1f/p_f_delay.jsonf").unwrap();
        assert_eq!(indices[0], 0x1f);

        let indices = match_pattern("a_XX/b_XX/p_x.jsonf", "a_02/b_10/p_x.jsonf").unwrap();
        assert_eq!(&indices[..2], &[2, 16]);
        assert_eq!(indices[2], -1);
    }

    #[test]
    fn test_match_rejects_non_hex() {
        assert!(match_pattern("tone_XX/p_f_pitch.json", "tone_zz/p_f_pitch.json").is_none());
        assert!(match_pattern("tone_XX/p_f_pitch.json", "tone_0/p_f_pitch.json").is_none());
    }
}
