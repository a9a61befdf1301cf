//! Grapheme classification shared by the cadence, typo and scramble layers

use serde::{Deserialize, Serialize};

/// Script family of a grapheme, used to pick a scramble pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptClass {
    /// Plain ASCII letters
    Latin,
    /// French, Spanish, Portuguese, Italian accents
    AccentedRomance,
    /// German umlauts and eszett
    Germanic,
    /// Danish, Norwegian, Swedish, Icelandic letters
    Nordic,
    /// Polish, Czech, Croatian, Hungarian and friends
    EasternEuropean,
    /// Greek letters and math symbols
    MathGreek,
    /// ASCII digits
    Digit,
    /// Punctuation
    Punctuation,
    /// Whitespace (never scrambled)
    Whitespace,
    /// Anything else (emoji, CJK, ...)
    Other,
}

const ROMANCE: &str = "àáâãçèéêëìíîïñòóôõùúûÀÁÂÃÇÈÉÊËÌÍÎÏÑÒÓÔÕÙÚÛ";
const GERMANIC: &str = "äöüßÄÖÜẞ";
const NORDIC: &str = "åæøðþÅÆØÐÞ";
const EASTERN: &str = "ąćčďęěłńňőřśšťůűźżžĄĆČĎĘĚŁŃŇŐŘŚŠŤŮŰŹŻŽ";
const MATH_SYMBOLS: &str = "=+−×÷<>≤≥≈≠±∑∫∂√∞∈∉∀∃^·";
const OPERATORS: &str = "=+−×÷<>≤≥≈≠±∑∫∂√^";
const PUNCTUATION: &str = ".,;:!?'\"()[]{}-–—…/\\@#&*%";
const SUPERSCRIPTS: &str = "⁰¹²³⁴⁵⁶⁷⁸⁹⁺⁻⁼⁽⁾ⁿⁱ";
const SUBSCRIPTS: &str = "₀₁₂₃₄₅₆₇₈₉₊₋₌₍₎ₐₑₒₓ";

fn single_char(grapheme: &str) -> Option<char> {
    let mut chars = grapheme.chars();
    let first = chars.next()?;
    chars.next().is_none().then_some(first)
}

/// Whether the grapheme is whitespace
#[must_use]
pub fn is_whitespace(grapheme: &str) -> bool {
    !grapheme.is_empty() && grapheme.chars().all(char::is_whitespace)
}

/// Whether the grapheme is punctuation
#[must_use]
pub fn is_punctuation(grapheme: &str) -> bool {
    single_char(grapheme).is_some_and(|c| PUNCTUATION.contains(c))
}

/// Whether the grapheme is a Greek letter
#[must_use]
pub fn is_greek(grapheme: &str) -> bool {
    single_char(grapheme).is_some_and(|c| ('\u{0391}'..='\u{03C9}').contains(&c))
}

/// Whether the grapheme is a math operator (used to detect math context)
#[must_use]
pub fn is_math_operator(grapheme: &str) -> bool {
    single_char(grapheme).is_some_and(|c| OPERATORS.contains(c))
}

/// Whether the grapheme is a superscript or subscript
#[must_use]
pub fn is_super_or_subscript(grapheme: &str) -> bool {
    single_char(grapheme).is_some_and(|c| SUPERSCRIPTS.contains(c) || SUBSCRIPTS.contains(c))
}

/// Classify a grapheme by script family
#[must_use]
pub fn script_class(grapheme: &str) -> ScriptClass {
    if is_whitespace(grapheme) {
        return ScriptClass::Whitespace;
    }
    let Some(c) = single_char(grapheme) else {
        return ScriptClass::Other;
    };
    if c.is_ascii_alphabetic() {
        ScriptClass::Latin
    } else if c.is_ascii_digit() {
        ScriptClass::Digit
    } else if is_greek(grapheme) || MATH_SYMBOLS.contains(c) || is_super_or_subscript(grapheme) {
        ScriptClass::MathGreek
    } else if PUNCTUATION.contains(c) {
        ScriptClass::Punctuation
    } else if ROMANCE.contains(c) {
        ScriptClass::AccentedRomance
    } else if GERMANIC.contains(c) {
        ScriptClass::Germanic
    } else if NORDIC.contains(c) {
        ScriptClass::Nordic
    } else if EASTERN.contains(c) {
        ScriptClass::EasternEuropean
    } else {
        ScriptClass::Other
    }
}

/// Visual complexity weight of a grapheme (1.0 for a lowercase ASCII letter)
///
/// Capitals, punctuation, diacritics and super/subscripts take longer to
/// settle during the scramble reveal.
#[must_use]
pub fn complexity(grapheme: &str) -> f64 {
    let mut weight = 1.0;
    if grapheme.chars().any(char::is_uppercase) {
        weight += 0.3;
    }
    if is_punctuation(grapheme) {
        weight += 0.4;
    }
    if is_super_or_subscript(grapheme) {
        weight += 0.6;
    }
    match script_class(grapheme) {
        ScriptClass::AccentedRomance
        | ScriptClass::Germanic
        | ScriptClass::Nordic
        | ScriptClass::EasternEuropean => weight += 0.5,
        _ => {}
    }
    // Combining marks (e + U+0301) arrive as multi-char graphemes.
    if grapheme.chars().count() > 1 && !grapheme.chars().any(|c| u32::from(c) >= 0x1F000) {
        weight += 0.5;
    }
    weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_classes() {
        assert_eq!(script_class("a"), ScriptClass::Latin);
        assert_eq!(script_class("é"), ScriptClass::AccentedRomance);
        assert_eq!(script_class("ß"), ScriptClass::Germanic);
        assert_eq!(script_class("ø"), ScriptClass::Nordic);
        assert_eq!(script_class("ł"), ScriptClass::EasternEuropean);
        assert_eq!(script_class("π"), ScriptClass::MathGreek);
        assert_eq!(script_class("≤"), ScriptClass::MathGreek);
        assert_eq!(script_class("7"), ScriptClass::Digit);
        assert_eq!(script_class("?"), ScriptClass::Punctuation);
        assert_eq!(script_class(" "), ScriptClass::Whitespace);
        assert_eq!(script_class("🦀"), ScriptClass::Other);
    }

    #[test]
    fn test_complexity_ordering() {
        assert!((complexity("a") - 1.0).abs() < f64::EPSILON);
        assert!(complexity("A") > complexity("a"));
        assert!(complexity("!") > complexity("a"));
        assert!(complexity("é") > complexity("e"));
        assert!(complexity("²") > complexity("2"));
        assert!(complexity("e\u{301}") > complexity("e"));
    }

    #[test]
    fn test_math_operator_detection() {
        assert!(is_math_operator("="));
        assert!(is_math_operator("∑"));
        assert!(!is_math_operator("a"));
        assert!(is_greek("λ"));
        assert!(!is_greek("l"));
    }
}
