//! Text normalization shared by dedupe keys and the search index.
//!
//! `normalize` applies compatibility decomposition (NFKD), strips combining
//! marks, folds case, drops punctuation and collapses whitespace runs. Width
//! variants and ligatures fold to their plain letters:
//!
//! ```rust
//! use core_library::normalize::normalize;
//!
//! assert_eq!(normalize("  Sigur  Rós "), "sigur ros");
//! assert_eq!(normalize("AC/DC"), normalize("ACDC"));
//! assert_eq!(normalize("Guns N' Roses"), "guns n roses");
//! assert_eq!(normalize("Ｆｉｎｅ"), normalize("ﬁne"));
//! ```

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Comparison form of a display string.
pub fn normalize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;

    for c in value.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if !c.is_alphanumeric() {
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        for lower in c.to_lowercase() {
            out.push(fold_stroke(lower));
        }
    }

    out
}

/// `normalize` for optional fields; `None` and blank both become empty.
pub fn normalize_opt(value: Option<&str>) -> String {
    value.map(normalize).unwrap_or_default()
}

/// Joins the normalized, non-empty parts with single spaces.
pub fn search_text<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .flatten()
        .map(normalize)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Letters whose marks are part of the glyph and survive decomposition.
fn fold_stroke(c: char) -> char {
    match c {
        'đ' => 'd',
        'ħ' => 'h',
        'ı' => 'i',
        'ł' => 'l',
        'ø' => 'o',
        'ŧ' => 't',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace() {
        assert_eq!(normalize("  The   Beatles\t"), "the beatles");
        assert_eq!(normalize("ABBA"), normalize("abba"));
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_punctuation_is_ignored() {
        assert_eq!(normalize("Hello, World!"), "hello world");
        assert_eq!(normalize("Don't Stop"), normalize("Dont Stop"));
        assert_eq!(normalize("- Intro -"), "intro");
    }

    #[test]
    fn test_diacritics_fold() {
        assert_eq!(normalize("Beyoncé"), "beyonce");
        assert_eq!(normalize("Motörhead"), "motorhead");
        assert_eq!(normalize("Łódź"), "lodz");
        assert_eq!(normalize("Sơn Tùng M-TP"), "son tung mtp");
        assert_eq!(normalize("Tiến Lên"), "tien len");
        assert_eq!(normalize("Ngọc"), "ngoc");
    }

    #[test]
    fn test_compatibility_forms_fold() {
        assert_eq!(normalize("Ｓａｄｅ"), "sade");
        assert_eq!(normalize("ﬁre"), "fire");
        assert_eq!(normalize("Ⅳ"), "iv");
    }

    #[test]
    fn test_non_latin_scripts_survive() {
        assert_eq!(normalize("坂本 龍一"), "坂本 龍一");
        assert_eq!(normalize("Кино"), "кино");
    }

    #[test]
    fn test_search_text_skips_empty_parts() {
        let text = search_text([Some("Song One"), None, Some("  "), Some("Artist!")]);
        assert_eq!(text, "song one artist");
    }
}
