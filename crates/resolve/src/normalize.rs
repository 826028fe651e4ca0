//! Canonical form for free-text geographic names.
//!
//! Steps, in order:
//! 1. trim
//! 2. lowercase
//! 3. fold diacritics (`Querétaro` → `queretaro`)
//! 4. drop the span from the first to the last hyphen, inclusive
//!    (`-` delimited editorial notes such as `san pedro -cabecera-`)
//! 5. collapse whitespace runs and trim again
//!
//! The function is pure and idempotent.

use std::borrow::Cow;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize an optional value. Absent input stays absent.
pub fn normalize(value: Option<&str>) -> Option<String> {
    value.map(normalize_str)
}

pub fn normalize_str(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let folded = fold_diacritics(&lowered);
    let stripped = strip_annotation(&folded);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Map accented Latin letters to their base letter.
///
/// NFD splits `é` into `e` + U+0301; the combining mark is then dropped.
/// Letters that are not composed (ø, ł, ß, ...) are replaced explicitly.
pub fn fold_diacritics(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        match c {
            'ß' => out.push_str("ss"),
            'æ' => out.push_str("ae"),
            'œ' => out.push_str("oe"),
            'ø' => out.push('o'),
            'ł' => out.push('l'),
            'đ' => out.push('d'),
            'ı' => out.push('i'),
            other => out.push(other),
        }
    }
    out
}

// Greedy: `a -x- b -y- c` loses everything from the first to the last hyphen.
fn strip_annotation(text: &str) -> Cow<'_, str> {
    match (text.find('-'), text.rfind('-')) {
        (Some(first), Some(last)) if first < last => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..first]);
            out.push_str(&text[last + 1..]);
            Cow::Owned(out)
        }
        _ => Cow::Borrowed(text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trims_lowercases_and_folds() {
        assert_eq!(normalize_str("  Óaxaca  "), "oaxaca");
        assert_eq!(normalize_str("San Luis Potosí"), "san luis potosi");
        assert_eq!(normalize_str("MICHOACÁN DE OCAMPO"), "michoacan de ocampo");
        assert_eq!(normalize_str("Peñón"), "penon");
    }

    #[test]
    fn absent_passes_through() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some("Oaxaca")), Some("oaxaca".into()));
    }

    #[test]
    fn drops_hyphen_delimited_annotation() {
        assert_eq!(normalize_str("San Pedro -Cabecera- Norte"), "san pedro norte");
        assert_eq!(normalize_str("El Rosario -ver nota-"), "el rosario");
        // Greedy span
        assert_eq!(normalize_str("a -x- b -y- c"), "a c");
    }

    #[test]
    fn single_hyphen_is_kept() {
        assert_eq!(normalize_str("Tlaquepaque-Centro"), "tlaquepaque-centro");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_str("Veracruz \t de   Ignacio\nde la Llave"), "veracruz de ignacio de la llave");
    }

    #[test]
    fn already_normalized_is_unchanged() {
        assert_eq!(normalize_str("oaxaca"), "oaxaca");
    }

    #[test]
    fn non_decomposing_letters() {
        assert_eq!(fold_diacritics("straße"), "strasse");
        assert_eq!(fold_diacritics("łódź"), "lodz");
    }

    proptest! {
        #[test]
        fn idempotent(s in "[ a-zA-Z0-9áéíóúüñÁÉÍÓÚÜÑ\\-().,\t]{0,48}") {
            let once = normalize_str(&s);
            prop_assert_eq!(normalize_str(&once), once.clone());
        }

        #[test]
        fn never_has_edge_or_double_spaces(s in "[ a-zA-Záéíóúñ\\-]{0,48}") {
            let n = normalize_str(&s);
            prop_assert!(!n.starts_with(' ') && !n.ends_with(' '));
            prop_assert!(!n.contains("  "));
        }
    }
}
