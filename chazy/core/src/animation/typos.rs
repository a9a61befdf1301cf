//! Context-aware typo injection
//!
//! A typo is a plausible wrong character shown briefly, noticed, deleted and
//! replaced. Wrong characters come from two confusion sources:
//!
//! - physical QWERTY neighbours for Latin letters and digits
//! - a Greek/math look-alike table, where Latin↔Greek swaps only happen in a
//!   strong math context (an operator within three graphemes) so prose never
//!   sprouts stray Greek letters

use std::collections::HashSet;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use super::cadence::CadenceProfile;
use super::glyphs::{
    is_greek, is_math_operator, is_punctuation, is_whitespace, script_class, ScriptClass,
};
use crate::emotion::Emotion;

/// Graphemes on either side searched for math operators
const MATH_CONTEXT_RADIUS: usize = 3;

/// Upper bound on the per-character typo probability
const MAX_TYPO_PROBABILITY: f64 = 0.5;

/// Chance that a Latin letter in math context is swapped for a Greek look-alike
const GREEK_SWAP_CHANCE: f64 = 0.4;

const QWERTY_NEIGHBOURS: &[(char, &str)] = &[
    ('q', "wa"),
    ('w', "qeas"),
    ('e', "wrsd"),
    ('r', "etdf"),
    ('t', "ryfg"),
    ('y', "tugh"),
    ('u', "yihj"),
    ('i', "uojk"),
    ('o', "ipkl"),
    ('p', "ol"),
    ('a', "qwsz"),
    ('s', "awedxz"),
    ('d', "serfcx"),
    ('f', "drtgvc"),
    ('g', "ftyhbv"),
    ('h', "gyujnb"),
    ('j', "huikmn"),
    ('k', "jiolm"),
    ('l', "kop"),
    ('z', "asx"),
    ('x', "zsdc"),
    ('c', "xdfv"),
    ('v', "cfgb"),
    ('b', "vghn"),
    ('n', "bhjm"),
    ('m', "njk"),
];

const MATH_CONFUSIONS: &[(&str, &str)] = &[
    ("α", "a"),
    ("β", "b"),
    ("γ", "y"),
    ("δ", "d"),
    ("ε", "e"),
    ("η", "n"),
    ("ι", "i"),
    ("κ", "k"),
    ("ν", "v"),
    ("ο", "o"),
    ("ρ", "p"),
    ("τ", "t"),
    ("υ", "u"),
    ("χ", "x"),
    ("ω", "w"),
    ("μ", "u"),
    ("π", "n"),
    ("σ", "o"),
    ("θ", "0"),
    ("Σ", "∑"),
    ("≤", "<"),
    ("≥", ">"),
    ("≠", "="),
    ("×", "x"),
    ("∂", "d"),
    ("÷", "/"),
    ("±", "+"),
];

/// The five timed sub-phases of a typo correction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TypoTimings {
    /// Wrong character visible before it is "noticed"
    pub realize: Duration,
    /// Pause after deleting the wrong character
    pub delete: Duration,
    /// Hesitation before retyping
    pub hesitate: Duration,
    /// Scramble-in of the correct character
    pub scramble: Duration,
    /// Settle pause after the fix
    pub settle: Duration,
}

impl TypoTimings {
    /// Draw timings scaled by the emotion's typo time scale
    pub fn draw<R: Rng + ?Sized>(scale: f64, rng: &mut R) -> Self {
        let mut phase = |low: f64, high: f64| {
            Duration::from_secs_f64(rng.gen_range(low..=high) * scale / 1000.0)
        };
        Self {
            realize: phase(200.0, 320.0),
            delete: phase(70.0, 110.0),
            hesitate: phase(110.0, 180.0),
            scramble: phase(90.0, 150.0),
            settle: phase(80.0, 140.0),
        }
    }

    /// Sum of all phases
    #[must_use]
    pub fn total(&self) -> Duration {
        self.realize + self.delete + self.hesitate + self.scramble + self.settle
    }
}

/// Whether a math operator sits within three graphemes of `index`
#[must_use]
pub fn has_strong_math_context(graphemes: &[String], index: usize) -> bool {
    let start = index.saturating_sub(MATH_CONTEXT_RADIUS);
    let end = (index + MATH_CONTEXT_RADIUS + 1).min(graphemes.len());
    graphemes[start..end]
        .iter()
        .enumerate()
        .any(|(offset, g)| start + offset != index && is_math_operator(g))
}

/// Probability of a typo on `graphemes[index]`
///
/// `math_typed` holds graphemes already typed inside a math context; repeats
/// of those are typed more carefully.
#[must_use]
pub fn typo_probability(
    profile: &CadenceProfile,
    graphemes: &[String],
    index: usize,
    math_typed: &HashSet<String>,
) -> f64 {
    let Some(grapheme) = graphemes.get(index) else {
        return 0.0;
    };
    match script_class(grapheme) {
        ScriptClass::Whitespace | ScriptClass::Punctuation | ScriptClass::Other => return 0.0,
        _ => {}
    }

    let mut probability = profile.typo_chance;
    match profile.emotion {
        Emotion::Excited => probability *= 1.5,
        Emotion::Analytical => probability *= 0.5,
        _ => {}
    }

    let previous = index.checked_sub(1).and_then(|i| graphemes.get(i));
    if previous.is_some_and(|p| is_punctuation(p)) {
        probability *= 0.4;
    }
    if previous.map_or(true, |p| is_whitespace(p)) {
        probability *= 0.6;
    }
    if math_typed.contains(grapheme) {
        probability *= 0.3;
    }

    probability.clamp(0.0, MAX_TYPO_PROBABILITY)
}

fn qwerty_neighbour<R: Rng + ?Sized>(c: char, rng: &mut R) -> Option<String> {
    let lower = c.to_ascii_lowercase();
    let (_, neighbours) = QWERTY_NEIGHBOURS.iter().find(|(key, _)| *key == lower)?;
    let candidates: Vec<char> = neighbours.chars().collect();
    let pick = *candidates.choose(rng)?;
    let pick = if c.is_ascii_uppercase() {
        pick.to_ascii_uppercase()
    } else {
        pick
    };
    Some(pick.to_string())
}

fn math_look_alikes(grapheme: &str, math_context: bool) -> Vec<&'static str> {
    MATH_CONFUSIONS
        .iter()
        .filter_map(|(left, right)| {
            if *left == grapheme {
                Some(*right)
            } else if *right == grapheme {
                Some(*left)
            } else {
                None
            }
        })
        .filter(|candidate| {
            let crosses_script = is_greek(candidate) != is_greek(grapheme)
                && (is_ascii_letter(candidate) || is_ascii_letter(grapheme));
            math_context || !crosses_script
        })
        .collect()
}

fn is_ascii_letter(grapheme: &str) -> bool {
    grapheme.len() == 1 && grapheme.as_bytes()[0].is_ascii_alphabetic()
}

/// Choose a plausible wrong character for `graphemes[index]`
pub fn pick_typo<R: Rng + ?Sized>(
    graphemes: &[String],
    index: usize,
    rng: &mut R,
) -> Option<String> {
    let grapheme = graphemes.get(index)?;
    let math_context = has_strong_math_context(graphemes, index);

    match script_class(grapheme) {
        ScriptClass::Latin => {
            let c = grapheme.chars().next()?;
            if math_context && rng.gen_bool(GREEK_SWAP_CHANCE) {
                if let Some(greek) = math_look_alikes(grapheme, true)
                    .into_iter()
                    .find(|candidate| is_greek(candidate))
                {
                    return Some(greek.to_string());
                }
            }
            qwerty_neighbour(c, rng)
        }
        ScriptClass::Digit => {
            let digit = grapheme.chars().next()?.to_digit(10)?;
            let neighbour = match digit {
                0 => 9,
                9 => 8,
                d if rng.gen_bool(0.5) => d - 1,
                d => d + 1,
            };
            char::from_digit(neighbour, 10).map(String::from)
        }
        ScriptClass::MathGreek => math_look_alikes(grapheme, math_context)
            .choose(rng)
            .map(|s| (*s).to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::Tone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn split(s: &str) -> Vec<String> {
        use unicode_segmentation::UnicodeSegmentation;
        s.graphemes(true).map(str::to_string).collect()
    }

    fn profile(emotion: Emotion) -> CadenceProfile {
        let mut rng = StdRng::seed_from_u64(3);
        CadenceProfile::new(emotion, 0.5, Tone::Neutral, &mut rng)
    }

    #[test]
    fn test_math_context_detection() {
        let text = split("let x = a + b");
        assert!(has_strong_math_context(&text, 4)); // "x" near "="
        let prose = split("a quiet evening");
        assert!(!has_strong_math_context(&prose, 3));
    }

    #[test]
    fn test_no_greek_in_prose() {
        let mut rng = StdRng::seed_from_u64(11);
        let text = split("the sun sets slowly");
        for _ in 0..500 {
            for index in 0..text.len() {
                if let Some(typo) = pick_typo(&text, index, &mut rng) {
                    assert!(!is_greek(&typo), "prose produced greek typo {typo}");
                }
            }
        }
    }

    #[test]
    fn test_greek_swaps_appear_in_math_context() {
        let mut rng = StdRng::seed_from_u64(5);
        let text = split("a = b + c");
        let swapped = (0..200).any(|_| {
            pick_typo(&text, 0, &mut rng).is_some_and(|typo| typo == "α")
        });
        assert!(swapped);
    }

    #[test]
    fn test_qwerty_typo_preserves_case() {
        let mut rng = StdRng::seed_from_u64(9);
        let text = split("Q");
        let typo = pick_typo(&text, 0, &mut rng).unwrap();
        assert!(typo == "W" || typo == "A", "unexpected {typo}");
    }

    #[test]
    fn test_probability_context_modifiers() {
        let text = split("Hi, there a=b");
        let none = HashSet::new();
        let neutral = profile(Emotion::Neutral);

        // Whitespace and punctuation never typo.
        assert!(typo_probability(&neutral, &text, 2, &none).abs() < f64::EPSILON);
        assert!(typo_probability(&neutral, &text, 3, &none).abs() < f64::EPSILON);

        // Mid-word beats word start.
        let mid = typo_probability(&neutral, &text, 5, &none);
        let start = typo_probability(&neutral, &text, 4, &none);
        assert!(mid > start);

        // Excited beats analytical.
        let excited = typo_probability(&profile(Emotion::Excited), &text, 5, &none);
        let analytical = typo_probability(&profile(Emotion::Analytical), &text, 5, &none);
        assert!(excited > analytical);

        // Repeats of math-typed characters are safer.
        let mut math_typed = HashSet::new();
        math_typed.insert("h".to_string());
        assert!(typo_probability(&neutral, &text, 5, &math_typed) < mid);
    }

    #[test]
    fn test_timings_scale() {
        let mut rng = StdRng::seed_from_u64(2);
        let slow = TypoTimings::draw(2.0, &mut rng);
        assert!(slow.realize >= Duration::from_millis(400));
        assert!(slow.total() > slow.realize);
    }
}
