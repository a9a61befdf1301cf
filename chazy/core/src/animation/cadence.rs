//! Typing cadence
//!
//! Per-character timing is derived in three steps:
//!
//! 1. An emotion table gives base speed, variation, pause and typo rates
//!    ([`EmotionParams`]), scaled by intensity.
//! 2. A tone overlay shifts the speed and jitters the typo, pause and
//!    variation rates ([`CadenceProfile`]).
//! 3. Each character's target delay is momentum-smoothed against the previous
//!    one and clamped to `[40 ms, 200 ms]` ([`Cadence`]).

use std::time::Duration;

use rand::Rng;

use super::glyphs::{is_punctuation, is_whitespace};
use crate::emotion::{Emotion, Tone};

/// Fastest inter-character delay
pub const MIN_CHAR_DELAY_MS: f64 = 40.0;

/// Slowest inter-character delay
pub const MAX_CHAR_DELAY_MS: f64 = 200.0;

/// Fraction of the remaining gap closed per 100 ms of elapsed time
const MOMENTUM_RATE: f64 = 0.15;

/// Elapsed time beyond this no longer adds smoothing
const MOMENTUM_ELAPSED_CAP_MS: f64 = 1000.0;

/// Raw timing parameters for one emotion
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmotionParams {
    /// Base inter-character delay
    pub base_speed_ms: f64,
    /// Relative random variation of the delay (0.3 = ±30 %)
    pub variation: f64,
    /// Chance of a thinking pause at a word boundary
    pub pause_chance: f64,
    /// Typical thinking pause
    pub pause_ms: f64,
    /// Base typo probability per character
    pub typo_chance: f64,
    /// Multiplier for the five typo sub-phase timings
    pub typo_time_scale: f64,
}

impl EmotionParams {
    /// Table lookup
    #[must_use]
    pub fn for_emotion(emotion: Emotion) -> Self {
        let (base_speed_ms, variation, pause_chance, pause_ms, typo_chance, typo_time_scale) =
            match emotion {
                Emotion::Neutral => (85.0, 0.30, 0.05, 300.0, 0.030, 1.0),
                Emotion::Bored => (140.0, 0.40, 0.12, 600.0, 0.020, 1.4),
                Emotion::Excited => (55.0, 0.50, 0.03, 150.0, 0.060, 0.7),
                Emotion::Concerned => (110.0, 0.30, 0.10, 500.0, 0.030, 1.2),
                Emotion::Surprised => (65.0, 0.60, 0.08, 400.0, 0.050, 0.8),
                Emotion::Amused => (70.0, 0.45, 0.06, 250.0, 0.040, 0.9),
                Emotion::Analytical => (95.0, 0.20, 0.07, 350.0, 0.015, 1.0),
                Emotion::Contemplative => (130.0, 0.35, 0.15, 700.0, 0.020, 1.4),
                Emotion::Curious => (80.0, 0.40, 0.07, 300.0, 0.035, 0.9),
            };
        Self {
            base_speed_ms,
            variation,
            pause_chance,
            pause_ms,
            typo_chance,
            typo_time_scale,
        }
    }
}

/// Emotion parameters after intensity scaling and the tone overlay
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CadenceProfile {
    /// Emotion the profile was built for
    pub emotion: Emotion,
    /// Base inter-character delay
    pub base_ms: f64,
    /// Relative delay variation
    pub variation: f64,
    /// Chance of a thinking pause at a word boundary
    pub pause_chance: f64,
    /// Typical thinking pause
    pub pause_ms: f64,
    /// Base typo probability per character
    pub typo_chance: f64,
    /// Multiplier for typo sub-phase timings
    pub typo_time_scale: f64,
}

impl CadenceProfile {
    /// Build a profile; `intensity` is clamped to `0.0..=1.0`
    pub fn new<R: Rng + ?Sized>(emotion: Emotion, intensity: f64, tone: Tone, rng: &mut R) -> Self {
        let params = EmotionParams::for_emotion(emotion);
        let intensity = intensity.clamp(0.0, 1.0);
        let overlay = tone.overlay();

        let mut jitter = |value: f64| {
            if overlay.jitter > 0.0 {
                value * rng.gen_range(1.0 - overlay.jitter..=1.0 + overlay.jitter)
            } else {
                value
            }
        };

        let base_ms = params.base_speed_ms * (1.15 - 0.3 * intensity) + overlay.speed_delta_ms;
        let variation = jitter(params.variation * (0.8 + 0.4 * intensity));
        let pause_chance = jitter(params.pause_chance);
        let typo_chance = jitter(params.typo_chance * (0.7 + 0.6 * intensity));

        Self {
            emotion,
            base_ms: base_ms.max(MIN_CHAR_DELAY_MS),
            variation: variation.clamp(0.0, 0.9),
            pause_chance: pause_chance.clamp(0.0, 1.0),
            pause_ms: params.pause_ms,
            typo_chance: typo_chance.clamp(0.0, 1.0),
            typo_time_scale: params.typo_time_scale,
        }
    }
}

/// Timing decision for one character
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CharTiming {
    /// Delay between the previous character's start and this one's
    pub delay: Duration,
    /// Thinking pause to hold before this character, if any
    pub pause: Option<Duration>,
}

/// Stateful cadence generator with momentum smoothing
#[derive(Clone, Debug)]
pub struct Cadence {
    profile: CadenceProfile,
    current_ms: Option<f64>,
}

impl Cadence {
    /// Start a new cadence for one run
    #[must_use]
    pub fn new(profile: CadenceProfile) -> Self {
        Self {
            profile,
            current_ms: None,
        }
    }

    /// The profile driving this cadence
    #[must_use]
    pub fn profile(&self) -> &CadenceProfile {
        &self.profile
    }

    /// Move `current` toward `target`, closing 15 % of the gap per 100 ms
    #[must_use]
    pub fn smooth(current: f64, target: f64, elapsed_ms: f64) -> f64 {
        let steps = elapsed_ms.clamp(0.0, MOMENTUM_ELAPSED_CAP_MS) / 100.0;
        let factor = 1.0 - (1.0 - MOMENTUM_RATE).powf(steps);
        current + (target - current) * factor
    }

    /// Timing for `grapheme`, given the one typed before it
    pub fn next<R: Rng + ?Sized>(
        &mut self,
        grapheme: &str,
        previous: Option<&str>,
        rng: &mut R,
    ) -> CharTiming {
        let profile = self.profile;
        let spread = profile.variation;
        let mut target = profile.base_ms * (1.0 + rng.gen_range(-spread..=spread));
        if previous.is_some_and(is_punctuation) {
            target *= 1.6;
        }
        if is_whitespace(grapheme) {
            target *= 0.8;
        }

        let smoothed = match self.current_ms {
            // Elapsed time since the last character is its own delay.
            Some(current) => Self::smooth(current, target, current),
            None => target,
        };
        let clamped = smoothed.clamp(MIN_CHAR_DELAY_MS, MAX_CHAR_DELAY_MS);
        self.current_ms = Some(clamped);

        let pause = (is_whitespace(grapheme) && rng.gen_bool(profile.pause_chance)).then(|| {
            let ms = profile.pause_ms * rng.gen_range(0.7..=1.3);
            Duration::from_secs_f64(ms / 1000.0)
        });

        CharTiming {
            delay: Duration::from_secs_f64(clamped / 1000.0),
            pause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_delays_are_clamped() {
        let mut rng = StdRng::seed_from_u64(7);
        for emotion in Emotion::ALL {
            for tone in [Tone::Urgent, Tone::Deadpan, Tone::Playful] {
                let profile = CadenceProfile::new(emotion, 1.0, tone, &mut rng);
                let mut cadence = Cadence::new(profile);
                let mut previous = None;
                for grapheme in "Hello, world. Again?".split("") {
                    let timing = cadence.next(grapheme, previous, &mut rng);
                    let ms = timing.delay.as_secs_f64() * 1000.0;
                    assert!(
                        (MIN_CHAR_DELAY_MS - 0.001..=MAX_CHAR_DELAY_MS + 0.001).contains(&ms),
                        "{emotion} {tone:?}: {ms}ms out of range"
                    );
                    previous = Some(grapheme);
                }
            }
        }
    }

    #[test]
    fn test_smoothing_moves_fifteen_percent_per_100ms() {
        let next = Cadence::smooth(100.0, 200.0, 100.0);
        assert!((next - 115.0).abs() < 1e-9);
        // Elapsed is capped at one second.
        let capped = Cadence::smooth(100.0, 200.0, 5000.0);
        let at_cap = Cadence::smooth(100.0, 200.0, 1000.0);
        assert!((capped - at_cap).abs() < 1e-9);
        assert!(at_cap < 200.0);
    }

    #[test]
    fn test_intensity_speeds_up_typing() {
        let mut rng = StdRng::seed_from_u64(1);
        let calm = CadenceProfile::new(Emotion::Neutral, 0.0, Tone::Neutral, &mut rng);
        let intense = CadenceProfile::new(Emotion::Neutral, 1.0, Tone::Neutral, &mut rng);
        assert!(intense.base_ms < calm.base_ms);
        assert!(intense.typo_chance > calm.typo_chance);
    }

    #[test]
    fn test_emotion_table_shapes() {
        let excited = EmotionParams::for_emotion(Emotion::Excited);
        let contemplative = EmotionParams::for_emotion(Emotion::Contemplative);
        assert!(excited.base_speed_ms < contemplative.base_speed_ms);
        assert!(excited.typo_chance > EmotionParams::for_emotion(Emotion::Analytical).typo_chance);
        assert!(contemplative.pause_chance > excited.pause_chance);
    }
}
