//! Scramble-reveal
//!
//! Before a character locks in, its slot cycles through random glyphs from
//! the same script family so an "é" flickers through accented letters and a
//! "∑" through math symbols. Complex characters scramble longer.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;

use super::glyphs::{complexity, script_class, ScriptClass};

/// Interval between scramble frames
pub const SCRAMBLE_TICK: Duration = Duration::from_millis(30);

/// Scramble length for a complexity-1.0 character
const BASE_SCRAMBLE_MS: f64 = 90.0;

/// Glyph pool for a script class
#[must_use]
pub fn pool(class: ScriptClass) -> &'static str {
    match class {
        ScriptClass::Latin | ScriptClass::Other => {
            "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ"
        }
        ScriptClass::AccentedRomance => "àáâãçèéêëìíîïñòóôõùúû",
        ScriptClass::Germanic => "äöüßÄÖÜaeou",
        ScriptClass::Nordic => "åæøðþÅÆØaeo",
        ScriptClass::EasternEuropean => "ąćčďęěłńňřśšťůźżž",
        ScriptClass::MathGreek => "αβγδεζηθλμνξπρστφχψω∑∫∂√≈≠≤≥±×÷∞",
        ScriptClass::Digit => "0123456789",
        ScriptClass::Punctuation => ".,;:!?-/*#&%",
        ScriptClass::Whitespace => "",
    }
}

/// Precomputed scramble frames for one slot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScramblePlan {
    /// Glyphs shown in order, one per tick
    pub frames: Vec<String>,
    /// Time each frame stays visible
    pub tick: Duration,
}

impl ScramblePlan {
    /// No scramble, reveal immediately
    #[must_use]
    pub fn none() -> Self {
        Self {
            frames: Vec::new(),
            tick: SCRAMBLE_TICK,
        }
    }

    /// Complexity-weighted scramble for `grapheme`
    pub fn build<R: Rng + ?Sized>(grapheme: &str, rng: &mut R) -> Self {
        let ms = BASE_SCRAMBLE_MS * complexity(grapheme) * rng.gen_range(0.8..=1.2);
        Self::for_duration(grapheme, Duration::from_secs_f64(ms / 1000.0), rng)
    }

    /// Scramble for roughly `duration`
    pub fn for_duration<R: Rng + ?Sized>(
        grapheme: &str,
        duration: Duration,
        rng: &mut R,
    ) -> Self {
        let class = script_class(grapheme);
        if class == ScriptClass::Whitespace {
            return Self::none();
        }
        let candidates: Vec<char> = pool(class)
            .chars()
            .filter(|c| c.to_string() != grapheme)
            .collect();
        if candidates.is_empty() {
            return Self::none();
        }

        let count = (duration.as_millis() / SCRAMBLE_TICK.as_millis()).max(1);
        let frames = (0..count)
            .filter_map(|_| candidates.choose(rng).map(char::to_string))
            .collect();

        Self {
            frames,
            tick: SCRAMBLE_TICK,
        }
    }

    /// Total scramble time
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.tick * u32::try_from(self.frames.len()).unwrap_or(u32::MAX)
    }

    /// Whether there is nothing to animate
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_frames_come_from_matching_pool() {
        let mut rng = StdRng::seed_from_u64(4);
        let plan = ScramblePlan::build("π", &mut rng);
        assert!(!plan.is_empty());
        for frame in &plan.frames {
            assert!(pool(ScriptClass::MathGreek).contains(frame.as_str()));
            assert_ne!(frame, "π");
        }
    }

    #[test]
    fn test_whitespace_is_not_scrambled() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!(ScramblePlan::build(" ", &mut rng).is_empty());
    }

    #[test]
    fn test_complex_characters_scramble_longer() {
        let mut rng = StdRng::seed_from_u64(8);
        let simple: Duration = (0..50)
            .map(|_| ScramblePlan::build("a", &mut rng).duration())
            .sum();
        let complex: Duration = (0..50)
            .map(|_| ScramblePlan::build("É", &mut rng).duration())
            .sum();
        assert!(complex > simple);
    }

    #[test]
    fn test_for_duration_frame_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let plan = ScramblePlan::for_duration("k", Duration::from_millis(120), &mut rng);
        assert_eq!(plan.frames.len(), 4);
        assert_eq!(plan.duration(), Duration::from_millis(120));
    }
}
