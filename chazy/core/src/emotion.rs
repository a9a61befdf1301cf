//! Emotion, Tone and Theme Vocabulary
//!
//! The mind model and content selector describe *how* a line should feel with
//! three small vocabularies. The animation engines turn them into timing:
//!
//! - [`Emotion`] picks the base cadence table and typo/deletion temperament
//! - [`Tone`] overlays a speed delta and jitter on top of the emotion
//! - [`Theme`] tags content topics (humor enables chuckle pauses, heavy
//!   topics raise the minimum idle time)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Emotional state reported by the mind model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Emotion {
    /// Baseline
    #[default]
    Neutral,
    /// Slow, sighing
    Bored,
    /// Fast, sloppy
    Excited,
    /// Careful, slightly slow
    Concerned,
    /// Bursty
    Surprised,
    /// Light and quick
    Amused,
    /// Precise, few typos
    Analytical,
    /// Slow with long pauses
    Contemplative,
    /// Quick with frequent small pauses
    Curious,
}

impl Emotion {
    /// Every emotion, in declaration order
    pub const ALL: [Self; 9] = [
        Self::Neutral,
        Self::Bored,
        Self::Excited,
        Self::Concerned,
        Self::Surprised,
        Self::Amused,
        Self::Analytical,
        Self::Contemplative,
        Self::Curious,
    ];

    /// Parse an emotion name, falling back to `Neutral` for unknown input
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "neutral" => Self::Neutral,
            "bored" => Self::Bored,
            "excited" => Self::Excited,
            "concerned" => Self::Concerned,
            "surprised" => Self::Surprised,
            "amused" => Self::Amused,
            "analytical" => Self::Analytical,
            "contemplative" => Self::Contemplative,
            "curious" => Self::Curious,
            other => {
                tracing::warn!(emotion = other, "Unknown emotion, using NEUTRAL");
                Self::Neutral
            }
        }
    }

    /// Upper-case label, as used in calibration files and logs
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Neutral => "NEUTRAL",
            Self::Bored => "BORED",
            Self::Excited => "EXCITED",
            Self::Concerned => "CONCERNED",
            Self::Surprised => "SURPRISED",
            Self::Amused => "AMUSED",
            Self::Analytical => "ANALYTICAL",
            Self::Contemplative => "CONTEMPLATIVE",
            Self::Curious => "CURIOUS",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Speed and jitter overlay applied on top of an emotion's cadence
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToneOverlay {
    /// Added to the per-character base delay (negative is faster)
    pub speed_delta_ms: f64,
    /// Multiplicative jitter range applied to typo, pause and variation
    /// (0.2 means each is scaled by a factor drawn from 0.8..=1.2)
    pub jitter: f64,
}

/// Delivery tone chosen by the content selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// No overlay
    #[default]
    Neutral,
    /// Quicker, more erratic
    Playful,
    /// Slightly slower, dry
    Wry,
    /// Steady
    Earnest,
    /// Slow and flat
    Deadpan,
    /// Fast
    Urgent,
    /// Slow, drifting
    Wistful,
}

impl Tone {
    /// Parse a tone name, falling back to `Neutral` for unknown input
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "playful" => Self::Playful,
            "wry" => Self::Wry,
            "earnest" => Self::Earnest,
            "deadpan" => Self::Deadpan,
            "urgent" => Self::Urgent,
            "wistful" => Self::Wistful,
            "neutral" => Self::Neutral,
            other => {
                tracing::warn!(tone = other, "Unknown tone, using neutral");
                Self::Neutral
            }
        }
    }

    /// Overlay for this tone
    #[must_use]
    pub fn overlay(self) -> ToneOverlay {
        let (speed_delta_ms, jitter) = match self {
            Self::Neutral => (0.0, 0.0),
            Self::Playful => (-10.0, 0.35),
            Self::Wry => (8.0, 0.15),
            Self::Earnest => (0.0, 0.05),
            Self::Deadpan => (20.0, 0.05),
            Self::Urgent => (-20.0, 0.2),
            Self::Wistful => (15.0, 0.25),
        };
        ToneOverlay {
            speed_delta_ms,
            jitter,
        }
    }
}

/// Content topic tag
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    /// Small talk
    #[default]
    Everyday,
    /// Jokes; enables the chuckle pause while deleting
    Humor,
    /// Science facts
    Science,
    /// Formulas and numbers
    Math,
    /// Nature observations
    Nature,
    /// Big questions
    Philosophy,
    /// Reminiscence
    Memory,
    /// Grief and loss
    Loss,
}

impl Theme {
    /// Parse a theme name, falling back to `Everyday` for unknown input
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "humor" | "humour" | "joke" => Self::Humor,
            "science" => Self::Science,
            "math" | "maths" => Self::Math,
            "nature" => Self::Nature,
            "philosophy" => Self::Philosophy,
            "memory" => Self::Memory,
            "loss" | "grief" => Self::Loss,
            "everyday" => Self::Everyday,
            other => {
                tracing::warn!(theme = other, "Unknown theme, using everyday");
                Self::Everyday
            }
        }
    }

    /// Minimum idle time after content with this theme, in milliseconds
    ///
    /// Heavier topics get more room before the next ambient line.
    #[must_use]
    pub fn minimum_idle_ms(self) -> u64 {
        match self {
            Self::Loss | Self::Philosophy | Self::Memory => 4000,
            Self::Science | Self::Math => 3500,
            Self::Everyday | Self::Humor | Self::Nature => 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emotion_parse_roundtrips_labels() {
        for emotion in Emotion::ALL {
            assert_eq!(Emotion::parse(emotion.label()), emotion);
        }
        assert_eq!(Emotion::parse("melancholy"), Emotion::Neutral);
    }

    #[test]
    fn test_emotion_serde_uses_upper_case() {
        let json = serde_json::to_string(&Emotion::Contemplative).unwrap();
        assert_eq!(json, "\"CONTEMPLATIVE\"");
    }

    #[test]
    fn test_tone_overlay() {
        assert!(Tone::Urgent.overlay().speed_delta_ms < 0.0);
        assert!(Tone::Deadpan.overlay().speed_delta_ms > 0.0);
        assert!((Tone::Neutral.overlay().jitter).abs() < f64::EPSILON);
        assert_eq!(Tone::parse("PLAYFUL"), Tone::Playful);
        assert_eq!(Tone::parse("??"), Tone::Neutral);
    }

    #[test]
    fn test_unknown_names_fall_back() {
        assert_eq!(Tone::parse(" Neutral "), Tone::Neutral);
        assert_eq!(Tone::parse("sardonic"), Tone::Neutral);
        assert_eq!(Theme::parse("everyday"), Theme::Everyday);
        assert_eq!(Theme::parse("astrology"), Theme::Everyday);
    }

    #[test]
    fn test_theme_minimum_idle() {
        assert_eq!(Theme::Loss.minimum_idle_ms(), 4000);
        assert_eq!(Theme::Humor.minimum_idle_ms(), 3000);
        assert_eq!(Theme::parse("grief"), Theme::Loss);
    }
}
