//! Deletion engine
//!
//! Three ways to take a line back off the surface, chosen by emotion:
//!
//! | Strategy    | Feel                                                  |
//! |-------------|-------------------------------------------------------|
//! | `SelectAll` | highlight everything, hold, fade out, clear           |
//! | `Word`      | highlight and drop one word at a time, right to left  |
//! | `Character` | backspace with key-repeat: slow start, then fast ARR  |
//!
//! Character deletion mimics a held backspace key: the first few characters
//! go at the delayed-auto-shift rate, the rest at the auto-repeat rate. It
//! occasionally hesitates on punctuation, and on humorous lines it may stop
//! for a short "chuckle" partway through.

use std::ops::Range;
use std::time::Duration;

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use super::glyphs::{is_punctuation, is_whitespace};
use super::{AnimationStyle, Flow, RunContext};
use crate::emotion::{Emotion, Theme};
use crate::surface::SurfaceError;

const FADE_STEPS: u32 = 4;
const FADE_STEP: Duration = Duration::from_millis(50);
const PUNCTUATION_HESITATION_CHANCE: f64 = 0.35;
const CHUCKLE_CHANCE: f64 = 0.5;

/// How a line is deleted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionStrategy {
    /// Select all, hold, fade, clear
    SelectAll,
    /// Word by word from the end
    Word,
    /// Backspace with key repeat
    Character,
}

impl DeletionStrategy {
    /// Selection weights for `SelectAll`, `Word`, `Character`
    #[must_use]
    pub fn weights(emotion: Emotion, intensity: f64) -> [f64; 3] {
        let intensity = intensity.clamp(0.0, 1.0);
        let mut weights = [0.25, 0.35, 0.40];
        match emotion {
            Emotion::Excited | Emotion::Surprised => weights[0] += 0.3 * intensity,
            Emotion::Analytical => weights[1] += 0.25,
            Emotion::Contemplative | Emotion::Bored => weights[2] += 0.3,
            Emotion::Amused => weights[2] += 0.1,
            _ => {}
        }
        weights
    }

    /// Draw a strategy for the emotion
    pub fn choose<R: Rng + ?Sized>(emotion: Emotion, intensity: f64, rng: &mut R) -> Self {
        const ALL: [DeletionStrategy; 3] = [
            DeletionStrategy::SelectAll,
            DeletionStrategy::Word,
            DeletionStrategy::Character,
        ];
        match WeightedIndex::new(Self::weights(emotion, intensity)) {
            Ok(dist) => ALL[dist.sample(rng)],
            Err(_) => Self::Character,
        }
    }
}

/// A fully drawn deletion run
#[derive(Clone, Debug, PartialEq)]
pub enum DeletionPlan {
    /// Nothing rendered
    Empty,
    /// Select all, hold, fade, clear
    SelectAll {
        /// Highlight hold before fading
        hold: Duration,
    },
    /// Word chunks, deleted last to first
    Word {
        /// Grapheme ranges of each word with its trailing whitespace
        words: Vec<Range<usize>>,
        /// Highlight time per word
        flash: Vec<Duration>,
        /// Gap after each word
        gaps: Vec<Duration>,
    },
    /// Per-character delays, for deleting from the end
    Character {
        /// Delay before each backspace
        delays: Vec<Duration>,
    },
}

impl DeletionPlan {
    /// The strategy this plan carries out
    #[must_use]
    pub fn strategy(&self) -> Option<DeletionStrategy> {
        match self {
            Self::Empty => None,
            Self::SelectAll { .. } => Some(DeletionStrategy::SelectAll),
            Self::Word { .. } => Some(DeletionStrategy::Word),
            Self::Character { .. } => Some(DeletionStrategy::Character),
        }
    }
}

fn ms<R: Rng + ?Sized>(rng: &mut R, low: u64, high: u64) -> Duration {
    Duration::from_millis(rng.gen_range(low..=high))
}

/// Word chunks: each word owns the whitespace that follows it
fn word_ranges(graphemes: &[&str]) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut in_trailing_space = false;
    for (index, grapheme) in graphemes.iter().enumerate() {
        let space = is_whitespace(grapheme);
        if in_trailing_space && !space {
            ranges.push(start..index);
            start = index;
        }
        in_trailing_space = space;
    }
    if start < graphemes.len() {
        ranges.push(start..graphemes.len());
    }
    ranges
}

/// Draw a deletion plan for `text`, currently occupying `len` slots
pub fn plan_deletion<R: Rng + ?Sized>(
    text: &str,
    len: usize,
    style: &AnimationStyle,
    rng: &mut R,
) -> DeletionPlan {
    if len == 0 {
        return DeletionPlan::Empty;
    }
    let strategy = style
        .deletion
        .unwrap_or_else(|| DeletionStrategy::choose(style.emotion, style.intensity, rng));
    let graphemes: Vec<&str> = text.graphemes(true).collect();

    match strategy {
        DeletionStrategy::SelectAll => DeletionPlan::SelectAll {
            hold: ms(rng, 800, 1400),
        },
        // Word chunks only make sense when the text maps 1:1 onto slots.
        DeletionStrategy::Word if graphemes.len() == len => {
            let words = word_ranges(&graphemes);
            let flash = words.iter().map(|_| ms(rng, 120, 200)).collect();
            let gaps = words.iter().map(|_| ms(rng, 90, 160)).collect();
            DeletionPlan::Word { words, flash, gaps }
        }
        DeletionStrategy::Word | DeletionStrategy::Character => {
            plan_characters(&graphemes, len, &style.themes, rng)
        }
    }
}

fn plan_characters<R: Rng + ?Sized>(
    graphemes: &[&str],
    len: usize,
    themes: &[Theme],
    rng: &mut R,
) -> DeletionPlan {
    let das_count = rng.gen_range(3..=5);
    let das = ms(rng, 150, 190);
    let chuckle_at = (themes.contains(&Theme::Humor) && len > 3 && rng.gen_bool(CHUCKLE_CHANCE))
        .then(|| len * 2 / 3);

    let delays = (0..len)
        .map(|step| {
            // Deleting from the end: step 0 removes slot len-1.
            let slot = len - 1 - step;
            let mut delay = if step < das_count {
                das
            } else {
                ms(rng, 25, 45)
            };
            if graphemes.get(slot).is_some_and(|g| is_punctuation(g))
                && rng.gen_bool(PUNCTUATION_HESITATION_CHANCE)
            {
                delay += ms(rng, 150, 300);
            }
            if chuckle_at == Some(step) {
                delay += ms(rng, 400, 700);
            }
            delay
        })
        .collect();
    DeletionPlan::Character { delays }
}

/// Walk a deletion plan against the run's surface
pub(crate) async fn execute(ctx: RunContext, plan: DeletionPlan) -> Result<Flow, SurfaceError> {
    let surface = ctx.surface.clone();
    if !ctx.is_live() {
        return Ok(Flow::Aborted);
    }

    match plan {
        DeletionPlan::Empty => {}
        DeletionPlan::SelectAll { hold } => {
            surface.select(0..surface.len())?;
            if !ctx.wait(hold).await {
                return Ok(Flow::Aborted);
            }
            for step in 1..=FADE_STEPS {
                let opacity = 1.0 - step as f32 / FADE_STEPS as f32;
                surface.set_opacity(opacity)?;
                if !ctx.wait(FADE_STEP).await {
                    return Ok(Flow::Aborted);
                }
            }
            surface.clear()?;
            surface.set_opacity(1.0)?;
        }
        DeletionPlan::Word { words, flash, gaps } => {
            for ((range, flash), gap) in words.into_iter().zip(flash).zip(gaps).rev() {
                let range = range.start.min(surface.len())..range.end.min(surface.len());
                surface.select(range.clone())?;
                if !ctx.wait(flash).await {
                    return Ok(Flow::Aborted);
                }
                for index in range.clone().rev() {
                    surface.remove(index)?;
                }
                surface.select(0..0)?;
                surface.set_cursor(range.start)?;
                if !ctx.wait(gap).await {
                    return Ok(Flow::Aborted);
                }
            }
        }
        DeletionPlan::Character { delays } => {
            for delay in delays {
                if !ctx.wait(delay).await {
                    return Ok(Flow::Aborted);
                }
                let len = surface.len();
                if len == 0 {
                    break;
                }
                surface.remove(len - 1)?;
                surface.set_cursor(len - 1)?;
            }
        }
    }

    if !ctx.is_live() {
        return Ok(Flow::Aborted);
    }
    if !surface.is_empty() {
        surface.clear()?;
    }
    surface.set_cursor(0)?;
    Ok(Flow::Finished)
}
