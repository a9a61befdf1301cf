//! Typing engine
//!
//! A line is typed in two stages. [`plan_typing`] draws every random decision
//! up front (delays, thinking pauses, typos, scramble frames), so a seeded run
//! is fully reproducible. The executor then walks the plan:
//!
//! - ordinary characters claim their slot immediately and finish their
//!   scramble in a fire-and-forget task, so the next character can start
//!   while the previous one is still flickering
//! - a typo character, a thinking pause or a `\pause{N}` marker first drains
//!   every outstanding scramble task, so nothing animates during a pause
//!
//! Every await re-checks the cancellation token and the run's staleness.

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinSet;

use super::cadence::{Cadence, CadenceProfile};
use super::markers::ParsedLine;
use super::scramble::ScramblePlan;
use super::typos::{has_strong_math_context, pick_typo, typo_probability, TypoTimings};
use super::{AnimationStyle, Flow, RunContext};
use crate::surface::SurfaceError;

/// A typo to show and correct before the real character lands
#[derive(Clone, Debug, PartialEq)]
pub struct TypoStep {
    /// Wrong grapheme shown first
    pub wrong: String,
    /// Sub-phase durations
    pub timings: TypoTimings,
    /// Scramble-in of the correct grapheme after the wrong one is removed
    pub scramble: ScramblePlan,
}

/// Everything needed to type one grapheme
#[derive(Clone, Debug, PartialEq)]
pub struct CharStep {
    /// Grapheme to type
    pub grapheme: String,
    /// Delay after the previous character (zero for the first)
    pub delay: Duration,
    /// Hold before this character, after pending scrambles settle
    pub pause_before: Option<Duration>,
    /// Typo to play out first
    pub typo: Option<TypoStep>,
    /// Scramble frames before the grapheme locks in
    pub scramble: ScramblePlan,
}

/// A fully drawn typing run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypingPlan {
    /// Per-grapheme steps, in order
    pub steps: Vec<CharStep>,
    /// Pause held after the last grapheme
    pub trailing_pause: Option<Duration>,
}

impl TypingPlan {
    /// Number of graphemes to type
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether there is nothing to type
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of planned typos
    #[must_use]
    pub fn typo_count(&self) -> usize {
        self.steps.iter().filter(|step| step.typo.is_some()).count()
    }
}

fn merge(a: Option<Duration>, b: Option<Duration>) -> Option<Duration> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    }
}

/// Draw the complete typing plan for a parsed line
pub fn plan_typing<R: Rng + ?Sized>(
    parsed: &ParsedLine,
    style: &AnimationStyle,
    rng: &mut R,
) -> TypingPlan {
    let profile = CadenceProfile::new(style.emotion, style.intensity, style.tone, rng);
    let mut cadence = Cadence::new(profile);
    let graphemes = &parsed.graphemes;
    let mut math_typed: HashSet<String> = HashSet::new();
    let mut steps = Vec::with_capacity(graphemes.len());

    for (index, grapheme) in graphemes.iter().enumerate() {
        let previous = index.checked_sub(1).map(|i| graphemes[i].as_str());
        let timing = cadence.next(grapheme, previous, rng);

        let typo = if style.typos {
            let probability = typo_probability(&profile, graphemes, index, &math_typed);
            if probability > 0.0 && rng.gen_bool(probability) {
                pick_typo(graphemes, index, rng).map(|wrong| {
                    let timings = TypoTimings::draw(profile.typo_time_scale, rng);
                    let scramble = if style.scramble {
                        ScramblePlan::for_duration(grapheme, timings.scramble, rng)
                    } else {
                        ScramblePlan::none()
                    };
                    TypoStep {
                        wrong,
                        timings,
                        scramble,
                    }
                })
            } else {
                None
            }
        } else {
            None
        };

        let scramble = if style.scramble && typo.is_none() {
            ScramblePlan::build(grapheme, rng)
        } else {
            ScramblePlan::none()
        };

        if has_strong_math_context(graphemes, index) {
            math_typed.insert(grapheme.clone());
        }

        steps.push(CharStep {
            grapheme: grapheme.clone(),
            delay: if index == 0 { Duration::ZERO } else { timing.delay },
            pause_before: merge(parsed.pause_before(index), timing.pause),
            typo,
            scramble,
        });
    }

    tracing::trace!(
        graphemes = steps.len(),
        typos = steps.iter().filter(|s| s.typo.is_some()).count(),
        "Typing plan drawn"
    );

    TypingPlan {
        steps,
        trailing_pause: parsed.pause_before(graphemes.len()),
    }
}

/// Wait for every outstanding scramble task
async fn drain(pending: &mut JoinSet<Result<(), SurfaceError>>) -> Result<(), SurfaceError> {
    while let Some(joined) = pending.join_next().await {
        match joined {
            Ok(result) => result?,
            Err(error) if error.is_cancelled() => {}
            Err(error) => return Err(SurfaceError::Backend(error.to_string())),
        }
    }
    Ok(())
}

/// Flicker through `frames` in slot `index`, then lock in `grapheme`
async fn settle_slot(
    ctx: RunContext,
    index: usize,
    frames: Vec<String>,
    tick: Duration,
    grapheme: String,
) -> Result<(), SurfaceError> {
    for frame in frames.iter().skip(1) {
        if !ctx.wait(tick).await {
            return Ok(());
        }
        ctx.surface.reveal(index, frame)?;
    }
    if !ctx.wait(tick).await {
        return Ok(());
    }
    ctx.surface.reveal(index, &grapheme)
}

/// Show the wrong character, notice it, remove it and type the right one
async fn play_typo(
    ctx: &RunContext,
    index: usize,
    grapheme: &str,
    typo: TypoStep,
) -> Result<Flow, SurfaceError> {
    let surface = &ctx.surface;
    let timings = typo.timings;

    surface.reveal(index, &typo.wrong)?;
    surface.set_cursor(index + 1)?;
    if !ctx.wait(timings.realize).await {
        return Ok(Flow::Aborted);
    }

    surface.remove(index)?;
    surface.set_cursor(index)?;
    if !ctx.wait(timings.delete).await || !ctx.wait(timings.hesitate).await {
        return Ok(Flow::Aborted);
    }

    for frame in &typo.scramble.frames {
        surface.reveal(index, frame)?;
        surface.set_cursor(index + 1)?;
        if !ctx.wait(typo.scramble.tick).await {
            return Ok(Flow::Aborted);
        }
    }
    surface.reveal(index, grapheme)?;
    surface.set_cursor(index + 1)?;

    if !ctx.wait(timings.settle).await {
        return Ok(Flow::Aborted);
    }
    Ok(Flow::Finished)
}

/// Walk a typing plan against the run's surface
pub(crate) async fn execute(ctx: RunContext, plan: TypingPlan) -> Result<Flow, SurfaceError> {
    let surface = ctx.surface.clone();
    let mut pending: JoinSet<Result<(), SurfaceError>> = JoinSet::new();

    if !ctx.is_live() {
        return Ok(Flow::Aborted);
    }
    surface.clear()?;
    surface.set_cursor(0)?;

    for (index, step) in plan.steps.into_iter().enumerate() {
        if let Some(pause) = step.pause_before {
            drain(&mut pending).await?;
            if !ctx.wait(pause).await {
                return Ok(Flow::Aborted);
            }
        }
        if !step.delay.is_zero() && !ctx.wait(step.delay).await {
            return Ok(Flow::Aborted);
        }

        if let Some(typo) = step.typo {
            drain(&mut pending).await?;
            if !ctx.is_live() {
                return Ok(Flow::Aborted);
            }
            if play_typo(&ctx, index, &step.grapheme, typo).await? == Flow::Aborted {
                return Ok(Flow::Aborted);
            }
            continue;
        }

        if !ctx.is_live() {
            return Ok(Flow::Aborted);
        }
        match step.scramble.frames.first() {
            None => surface.reveal(index, &step.grapheme)?,
            Some(first) => {
                surface.reveal(index, first)?;
                pending.spawn(settle_slot(
                    ctx.clone(),
                    index,
                    step.scramble.frames.clone(),
                    step.scramble.tick,
                    step.grapheme,
                ));
            }
        }
        surface.set_cursor(index + 1)?;
    }

    drain(&mut pending).await?;
    if let Some(pause) = plan.trailing_pause {
        if !ctx.wait(pause).await {
            return Ok(Flow::Aborted);
        }
    }
    if !ctx.is_live() {
        return Ok(Flow::Aborted);
    }
    surface.set_cursor(surface.len())?;
    Ok(Flow::Finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::markers::parse_line;
    use crate::emotion::Emotion;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_plan_is_reproducible() {
        let style = AnimationStyle::default().with_emotion(Emotion::Excited, 0.9);
        let parsed = parse_line("The quick brown fox jumps over 3 lazy dogs.");
        let a = plan_typing(&parsed, &style, &mut StdRng::seed_from_u64(77));
        let b = plan_typing(&parsed, &style, &mut StdRng::seed_from_u64(77));
        assert_eq!(a, b);
    }

    #[test]
    fn test_disabled_typos_and_scramble() {
        let style = AnimationStyle::default().with_typos(false).with_scramble(false);
        let parsed = parse_line("plain text here");
        let plan = plan_typing(&parsed, &style, &mut StdRng::seed_from_u64(1));
        assert_eq!(plan.typo_count(), 0);
        assert!(plan.steps.iter().all(|s| s.scramble.is_empty()));
        assert_eq!(plan.steps[0].delay, Duration::ZERO);
    }

    #[test]
    fn test_marker_pauses_land_on_steps() {
        let style = AnimationStyle::default().with_typos(false);
        let parsed = parse_line("AB\\pause{200}CD\\pause{80}");
        let plan = plan_typing(&parsed, &style, &mut StdRng::seed_from_u64(3));
        assert_eq!(plan.len(), 4);
        assert!(plan.steps[2].pause_before >= Some(Duration::from_millis(200)));
        assert_eq!(plan.trailing_pause, Some(Duration::from_millis(80)));
    }

    #[test]
    fn test_excited_runs_produce_typos() {
        let style = AnimationStyle::default().with_emotion(Emotion::Excited, 1.0);
        let parsed = parse_line(&"typing quickly makes mistakes ".repeat(10));
        let typos: usize = (0..10)
            .map(|seed| plan_typing(&parsed, &style, &mut StdRng::seed_from_u64(seed)).typo_count())
            .sum();
        assert!(typos > 0);
    }
}
