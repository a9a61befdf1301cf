//! Animation Runs - Cancellable Typing and Deletion Passes
//!
//! An animation *run* is one typing or deletion pass over the text surface.
//! Runs are spawned as tokio tasks and identified by a monotonic [`RunId`]
//! handed out by the [`AnimationScheduler`].
//!
//! # Staleness
//!
//! Only one run is active at a time. Starting a run makes it the active run,
//! which silently invalidates every older run still in flight: their awaits
//! wake up, see they are stale, and stop without touching the surface; their
//! completion callbacks are dropped.
//!
//! # Cancellation
//!
//! ```text
//! RunHandle::cancel(mode)
//!     │
//!     ├─ token cancelled        (every suspension point re-checks it)
//!     ├─ run id invalidated     (late wake-ups become no-ops)
//!     ├─ task aborted           (pending timers and char tasks dropped)
//!     ├─ terminal visual mode   (clear / complete / freeze)
//!     └─ on_complete, once      (guarded by the finished flag)
//! ```
//!
//! Cancelling twice is a no-op.

mod cadence;
mod deletion;
mod glyphs;
mod markers;
mod scramble;
mod typing;
mod typos;

pub use cadence::{Cadence, CadenceProfile, CharTiming, EmotionParams};
pub use deletion::{plan_deletion, DeletionPlan, DeletionStrategy};
pub use glyphs::{complexity, script_class, ScriptClass};
pub use markers::{parse_line, ParsedLine, MAX_PAUSE_MS, MIN_PAUSE_MS};
pub use scramble::{ScramblePlan, SCRAMBLE_TICK};
pub use typing::{plan_typing, CharStep, TypingPlan, TypoStep};
pub use typos::{has_strong_math_context, pick_typo, typo_probability, TypoTimings};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::emotion::{Emotion, Theme, Tone};
use crate::surface::{render_complete, SurfaceError, TextSurface};

// =============================================================================
// Run identity
// =============================================================================

/// Monotonic identifier of one animation run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run_{}", self.0)
    }
}

/// Owner of the run sequence and the single active run
///
/// Cheap to clone; clones share the same sequence.
#[derive(Clone, Debug, Default)]
pub struct AnimationScheduler {
    inner: Arc<SchedulerState>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    /// Last id handed out
    sequence: AtomicU64,
    /// Active run id, 0 when nothing is active
    active: AtomicU64,
}

impl AnimationScheduler {
    /// Create a scheduler with no active run
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new run id and make it the active run
    pub fn start_run(&self) -> RunId {
        let id = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.inner.active.swap(id, Ordering::SeqCst);
        if previous != 0 {
            tracing::debug!(superseded = previous, run_id = id, "Run superseded");
        }
        RunId(id)
    }

    /// Whether `id` is no longer the active run
    #[must_use]
    pub fn is_stale(&self, id: RunId) -> bool {
        self.inner.active.load(Ordering::SeqCst) != id.0
    }

    /// The active run, if any
    #[must_use]
    pub fn active_run(&self) -> Option<RunId> {
        match self.inner.active.load(Ordering::SeqCst) {
            0 => None,
            id => Some(RunId(id)),
        }
    }

    /// Deactivate `id` if it is the active run
    ///
    /// Returns `false` when another run had already taken over.
    pub fn invalidate(&self, id: RunId) -> bool {
        self.inner
            .active
            .compare_exchange(id.0, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

// =============================================================================
// Modes and outcomes
// =============================================================================

/// Terminal visual state applied when a run is cancelled
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelMode {
    /// Empty the surface
    #[default]
    Clear,
    /// Show the run's final text
    Complete,
    /// Leave whatever is rendered
    Freeze,
}

impl CancelMode {
    /// Parse a mode name, falling back to `Clear` for unknown input
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "clear" => Self::Clear,
            "complete" => Self::Complete,
            "freeze" => Self::Freeze,
            other => {
                tracing::warn!(mode = other, "Unknown cancel mode, using clear");
                Self::Clear
            }
        }
    }
}

/// How a run ended, passed to its completion callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Ran to the end
    Completed,
    /// Cancelled through its handle
    Cancelled(CancelMode),
    /// The surface failed; the final text was rendered as a fallback
    Failed,
}

/// Completion callback of a run
pub type RunCallback = Box<dyn FnOnce(RunOutcome) + Send + 'static>;

/// Which engine a run belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunKind {
    /// Typing pass
    Typing,
    /// Deletion pass
    Deleting,
}

/// Whether a run body reached its end or bailed out at a suspension point
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Flow {
    Finished,
    Aborted,
}

// =============================================================================
// Style
// =============================================================================

/// Everything that shapes how a run animates
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationStyle {
    /// Emotion driving cadence and temperament
    pub emotion: Emotion,
    /// Emotion intensity, 0.0 to 1.0
    pub intensity: f64,
    /// Tone overlay
    pub tone: Tone,
    /// Content themes
    pub themes: Vec<Theme>,
    /// Inject typos while typing
    pub typos: bool,
    /// Scramble characters before locking them in
    pub scramble: bool,
    /// Force a deletion strategy instead of drawing one
    pub deletion: Option<DeletionStrategy>,
    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for AnimationStyle {
    fn default() -> Self {
        Self {
            emotion: Emotion::Neutral,
            intensity: 0.5,
            tone: Tone::Neutral,
            themes: Vec::new(),
            typos: true,
            scramble: true,
            deletion: None,
            seed: None,
        }
    }
}

impl AnimationStyle {
    /// Set emotion and intensity
    #[must_use]
    pub fn with_emotion(mut self, emotion: Emotion, intensity: f64) -> Self {
        self.emotion = emotion;
        self.intensity = intensity.clamp(0.0, 1.0);
        self
    }

    /// Set the tone
    #[must_use]
    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    /// Set the themes
    #[must_use]
    pub fn with_themes(mut self, themes: Vec<Theme>) -> Self {
        self.themes = themes;
        self
    }

    /// Enable or disable typos
    #[must_use]
    pub fn with_typos(mut self, enabled: bool) -> Self {
        self.typos = enabled;
        self
    }

    /// Enable or disable the scramble reveal
    #[must_use]
    pub fn with_scramble(mut self, enabled: bool) -> Self {
        self.scramble = enabled;
        self
    }

    /// Force a deletion strategy
    #[must_use]
    pub fn with_deletion(mut self, strategy: DeletionStrategy) -> Self {
        self.deletion = Some(strategy);
        self
    }

    /// Seed the run's random source
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Engine-wide typing switches, applied to every line the orchestrator shows
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingConfig {
    /// Disable typo injection
    pub disable_typos: bool,
    /// Disable the scramble reveal
    pub disable_scramble: bool,
    /// Force one deletion strategy
    pub deletion: Option<DeletionStrategy>,
    /// Base seed; line `n` is seeded with `seed + n`
    pub seed: Option<u64>,
}

impl TypingConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable typos
    #[must_use]
    pub fn with_typos(mut self, enabled: bool) -> Self {
        self.disable_typos = !enabled;
        self
    }

    /// Enable or disable the scramble reveal
    #[must_use]
    pub fn with_scramble(mut self, enabled: bool) -> Self {
        self.disable_scramble = !enabled;
        self
    }

    /// Force a deletion strategy
    #[must_use]
    pub fn with_deletion(mut self, strategy: DeletionStrategy) -> Self {
        self.deletion = Some(strategy);
        self
    }

    /// Seed every line
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Style for line number `line` of the given emotion, tone and themes
    #[must_use]
    pub fn style(
        &self,
        emotion: Emotion,
        intensity: f64,
        tone: Tone,
        themes: Vec<Theme>,
        line: u64,
    ) -> AnimationStyle {
        AnimationStyle {
            emotion,
            intensity: intensity.clamp(0.0, 1.0),
            tone,
            themes,
            typos: !self.disable_typos,
            scramble: !self.disable_scramble,
            deletion: self.deletion,
            seed: self.seed.map(|seed| seed.wrapping_add(line)),
        }
    }
}

// =============================================================================
// Run context and handle
// =============================================================================

/// What a run body needs at every suspension point
#[derive(Clone)]
pub(crate) struct RunContext {
    pub(crate) id: RunId,
    pub(crate) token: CancellationToken,
    pub(crate) scheduler: AnimationScheduler,
    pub(crate) surface: Arc<dyn TextSurface>,
}

impl RunContext {
    /// Neither cancelled nor superseded
    pub(crate) fn is_live(&self) -> bool {
        !self.token.is_cancelled() && !self.scheduler.is_stale(self.id)
    }

    /// Sleep for `duration`; `false` if the run died meanwhile
    pub(crate) async fn wait(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.is_live();
        }
        tokio::select! {
            () = self.token.cancelled() => false,
            () = tokio::time::sleep(duration) => self.is_live(),
        }
    }
}

struct RunShared {
    id: RunId,
    kind: RunKind,
    token: CancellationToken,
    finished: AtomicBool,
    on_complete: Mutex<Option<RunCallback>>,
    final_graphemes: Vec<String>,
    surface: Arc<dyn TextSurface>,
    scheduler: AnimationScheduler,
    done: watch::Sender<bool>,
    task: Mutex<Option<AbortHandle>>,
}

impl RunShared {
    /// Invoke the callback exactly once
    fn finish(&self, outcome: RunOutcome) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = self.on_complete.lock().take();
        self.done.send_replace(true);
        tracing::debug!(run_id = self.id.0, kind = ?self.kind, ?outcome, "Run finished");
        if let Some(callback) = callback {
            callback(outcome);
        }
    }

    /// Mark finished without running the callback (stale completion)
    fn discard(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.on_complete.lock().take();
        self.done.send_replace(true);
        tracing::debug!(run_id = self.id.0, "Stale run completion discarded");
    }

    fn settle(&self, result: Result<Flow, SurfaceError>) {
        match result {
            Ok(Flow::Finished) => {
                if self.token.is_cancelled() || !self.scheduler.invalidate(self.id) {
                    self.discard();
                } else {
                    self.finish(RunOutcome::Completed);
                }
            }
            Ok(Flow::Aborted) => {
                // Cancelled runs are finished by `cancel`; superseded ones are dropped.
                if !self.token.is_cancelled() {
                    self.discard();
                }
            }
            Err(error) => {
                if self.token.is_cancelled() {
                    return;
                }
                tracing::warn!(
                    run_id = self.id.0,
                    error = %error,
                    "Animation failed, rendering final text"
                );
                if self.scheduler.invalidate(self.id) {
                    if let Err(fallback) = render_complete(&*self.surface, &self.final_graphemes) {
                        tracing::warn!(error = %fallback, "Fallback render failed");
                    }
                    self.finish(RunOutcome::Failed);
                } else {
                    self.discard();
                }
            }
        }
    }
}

/// Handle to a running animation
///
/// Dropping the handle does not cancel the run.
#[derive(Clone)]
pub struct RunHandle {
    shared: Arc<RunShared>,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    /// Run id
    #[must_use]
    pub fn id(&self) -> RunId {
        self.shared.id
    }

    /// Typing or deleting
    #[must_use]
    pub fn kind(&self) -> RunKind {
        self.shared.kind
    }

    /// Whether the run has finished by any path
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    /// Whether `cancel` has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.shared.token.is_cancelled()
    }

    /// Cancel the run and apply `mode` to the surface
    ///
    /// Idempotent: only the first call has any effect.
    pub fn cancel(&self, mode: CancelMode) {
        let shared = &self.shared;
        if shared.finished.load(Ordering::SeqCst) || shared.token.is_cancelled() {
            tracing::debug!(run_id = shared.id.0, "Cancel ignored, run already settled");
            return;
        }
        shared.token.cancel();
        shared.scheduler.invalidate(shared.id);
        if let Some(task) = shared.task.lock().take() {
            task.abort();
        }

        let applied = match mode {
            CancelMode::Clear => shared.surface.clear(),
            CancelMode::Complete => render_complete(&*shared.surface, &shared.final_graphemes),
            CancelMode::Freeze => shared.surface.select(0..0),
        };
        if let Err(error) = applied {
            tracing::warn!(run_id = shared.id.0, error = %error, ?mode, "Cancel render failed");
        }

        tracing::debug!(run_id = shared.id.0, ?mode, "Run cancelled");
        shared.finish(RunOutcome::Cancelled(mode));
    }

    /// Wait until the run has finished by any path
    pub async fn wait(&self) {
        let mut done = self.shared.done.subscribe();
        // The sender lives as long as `shared`, so this only fails if we hold
        // the last reference, in which case the run is long gone.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Spawn a run body as a tokio task and return its handle
///
/// Must be called from within a tokio runtime.
fn launch<F, Fut>(
    scheduler: &AnimationScheduler,
    surface: Arc<dyn TextSurface>,
    kind: RunKind,
    final_graphemes: Vec<String>,
    on_complete: RunCallback,
    body: F,
) -> RunHandle
where
    F: FnOnce(RunContext) -> Fut,
    Fut: Future<Output = Result<Flow, SurfaceError>> + Send + 'static,
{
    let id = scheduler.start_run();
    let token = CancellationToken::new();
    let (done, _) = watch::channel(false);
    let shared = Arc::new(RunShared {
        id,
        kind,
        token: token.clone(),
        finished: AtomicBool::new(false),
        on_complete: Mutex::new(Some(on_complete)),
        final_graphemes,
        surface: Arc::clone(&surface),
        scheduler: scheduler.clone(),
        done,
        task: Mutex::new(None),
    });

    let ctx = RunContext {
        id,
        token,
        scheduler: scheduler.clone(),
        surface,
    };
    let future = body(ctx);
    let task_shared = Arc::clone(&shared);
    let task = tokio::spawn(async move {
        let result = future.await;
        task_shared.settle(result);
    });
    *shared.task.lock() = Some(task.abort_handle());

    tracing::debug!(run_id = id.0, ?kind, "Run started");
    RunHandle { shared }
}

/// Start typing `text` onto `surface`
///
/// `\pause{N}` markers are honoured; the surface ends up showing the clean
/// text. Must be called from within a tokio runtime.
pub fn start_typing(
    scheduler: &AnimationScheduler,
    surface: Arc<dyn TextSurface>,
    text: &str,
    style: &AnimationStyle,
    on_complete: RunCallback,
) -> RunHandle {
    let parsed = parse_line(text);
    let mut rng = style.rng();
    let plan = plan_typing(&parsed, style, &mut rng);
    launch(
        scheduler,
        surface,
        RunKind::Typing,
        parsed.graphemes,
        on_complete,
        move |ctx| typing::execute(ctx, plan),
    )
}

/// Start deleting whatever `surface` shows
///
/// Must be called from within a tokio runtime.
pub fn start_deleting(
    scheduler: &AnimationScheduler,
    surface: Arc<dyn TextSurface>,
    style: &AnimationStyle,
    on_complete: RunCallback,
) -> RunHandle {
    let mut rng = style.rng();
    let plan = plan_deletion(&surface.text(), surface.len(), style, &mut rng);
    launch(
        scheduler,
        surface,
        RunKind::Deleting,
        Vec::new(),
        on_complete,
        move |ctx| deletion::execute(ctx, plan),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, RunCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let callback: RunCallback = Box::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    fn plain() -> AnimationStyle {
        AnimationStyle::default()
            .with_typos(false)
            .with_scramble(false)
            .with_seed(42)
    }

    #[test]
    fn test_scheduler_single_active_run() {
        let scheduler = AnimationScheduler::new();
        let first = scheduler.start_run();
        let second = scheduler.start_run();
        assert!(second > first);
        assert!(scheduler.is_stale(first));
        assert!(!scheduler.is_stale(second));
        assert!(!scheduler.invalidate(first));
        assert!(scheduler.invalidate(second));
        assert_eq!(scheduler.active_run(), None);
    }

    #[test]
    fn test_cancel_mode_parse_defaults_to_clear() {
        assert_eq!(CancelMode::parse("freeze"), CancelMode::Freeze);
        assert_eq!(CancelMode::parse("explode"), CancelMode::Clear);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_run_completes() {
        let scheduler = AnimationScheduler::new();
        let surface = Arc::new(MemorySurface::new());
        let (count, callback) = counter();
        let run = start_typing(&scheduler, surface.clone(), "hello", &plain(), callback);
        run.wait().await;
        assert_eq!(surface.text(), "hello");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_run(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_twice_fires_once() {
        let scheduler = AnimationScheduler::new();
        let surface = Arc::new(MemorySurface::new());
        let (count, callback) = counter();
        let run = start_typing(&scheduler, surface.clone(), "a longer line", &plain(), callback);
        tokio::time::sleep(Duration::from_millis(150)).await;

        run.cancel(CancelMode::Complete);
        let after_first = surface.text();
        run.cancel(CancelMode::Clear);

        assert_eq!(after_first, "a longer line");
        assert_eq!(surface.text(), "a longer line");
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(run.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_freeze_keeps_partial_text() {
        let scheduler = AnimationScheduler::new();
        let surface = Arc::new(MemorySurface::new());
        let (_, callback) = counter();
        let run = start_typing(&scheduler, surface.clone(), "abcdefghij", &plain(), callback);
        tokio::time::sleep(Duration::from_millis(250)).await;
        run.cancel(CancelMode::Freeze);
        let frozen = surface.text();
        assert!(!frozen.is_empty());
        assert!(frozen.len() < 10);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(surface.text(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_failure_falls_back_to_final_text() {
        let scheduler = AnimationScheduler::new();
        let surface = Arc::new(MemorySurface::failing_once_after(4));
        let outcome = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&outcome);
        let run = start_typing(
            &scheduler,
            surface.clone(),
            "fallback",
            &plain(),
            Box::new(move |result: RunOutcome| *seen.lock() = Some(result)),
        );
        run.wait().await;
        assert_eq!(*outcome.lock(), Some(RunOutcome::Failed));
        assert_eq!(surface.text(), "fallback");
        assert_eq!(surface.cursor(), 8);
    }
}
