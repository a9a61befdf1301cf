//! Text State Machine
//!
//! Owns the lifecycle of the single text line and decides whether an
//! interrupt may cut in.
//!
//! ```text
//!            process_line                typing done            display timer
//!   ┌──────┐ ───────────────▶ ┌────────┐ ────────────▶ ┌─────────┐ ───────────▶ ┌──────────┐
//!   │ IDLE │                  │ TYPING │               │ DISPLAY │              │ DELETING │
//!   └──────┘ ◀─────────────────────────────────────────────────────────────────── └──────────┘
//!      ▲                                deletion done
//!      │ clear done
//!   ┌────────────────────┐
//!   │ INTERRUPT_CLEARING │ ◀──── any state, accepted interrupt
//!   └────────────────────┘
//! ```
//!
//! # Locking
//!
//! Machine state lives behind a `parking_lot` mutex that is never held across
//! an `.await` or while calling out: runs and callbacks are taken out under
//! the lock and cancelled or invoked after it is released. Run callbacks
//! carry the line generation they were created for, so a callback that lands
//! after its line was interrupted is dropped.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::animation::{
    self, parse_line, AnimationScheduler, AnimationStyle, CancelMode, RunHandle, RunOutcome,
};
use crate::error::LineError;
use crate::surface::{SurfaceError, TextSurface};
use crate::urgency::Urgency;

// =============================================================================
// Configuration
// =============================================================================

/// Timing configuration of the state machine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Shortest lead-in before the very first line
    pub first_line_delay_min_ms: u64,

    /// Longest lead-in before the very first line
    pub first_line_delay_max_ms: u64,

    /// Delay before a rejected line's callback fires
    pub fallback_delay_ms: u64,

    /// Total duration of the fast selection clear
    pub fast_clear_ms: u64,

    /// Fade portion of the fast selection clear
    pub fade_ms: u64,

    /// Display time of an empty line
    pub display_base_ms: u64,

    /// Extra display time per grapheme
    pub display_per_char_ms: u64,

    /// Upper bound on the computed display time
    pub display_max_ms: u64,

    /// Seed for the lead-in draw
    pub seed: Option<u64>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            first_line_delay_min_ms: 3000,
            first_line_delay_max_ms: 5000,
            fallback_delay_ms: 100,
            fast_clear_ms: 120,
            fade_ms: 100,
            display_base_ms: 2500,
            display_per_char_ms: 45,
            display_max_ms: 9000,
            seed: None,
        }
    }
}

impl MachineConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the first-line lead-in range
    #[must_use]
    pub fn with_first_line_delay_ms(mut self, min: u64, max: u64) -> Self {
        self.first_line_delay_min_ms = min.min(max);
        self.first_line_delay_max_ms = max.max(min);
        self
    }

    /// Set the rejected-line callback delay
    #[must_use]
    pub fn with_fallback_delay_ms(mut self, delay: u64) -> Self {
        self.fallback_delay_ms = delay;
        self
    }

    /// Set the display time parameters
    #[must_use]
    pub fn with_display_ms(mut self, base: u64, per_char: u64, max: u64) -> Self {
        self.display_base_ms = base;
        self.display_per_char_ms = per_char;
        self.display_max_ms = max;
        self
    }

    /// Seed the lead-in draw
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// No lead-in before the first line (for tests and scripted demos)
    #[must_use]
    pub fn without_lead_in(self) -> Self {
        self.with_first_line_delay_ms(0, 0)
    }

    /// Display time for a line of `graphemes` graphemes
    #[must_use]
    pub fn display_for(&self, graphemes: usize) -> Duration {
        let per_char = self
            .display_per_char_ms
            .saturating_mul(u64::try_from(graphemes).unwrap_or(u64::MAX));
        Duration::from_millis(
            self.display_base_ms
                .saturating_add(per_char)
                .min(self.display_max_ms),
        )
    }
}

// =============================================================================
// States and decisions
// =============================================================================

/// Lifecycle state of the text line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineState {
    /// Nothing on screen
    #[default]
    Idle,
    /// A line is being typed (or waiting out the first-line lead-in)
    Typing,
    /// A line is fully shown
    Display,
    /// A line is being deleted
    Deleting,
    /// An accepted interrupt is clearing the surface
    InterruptClearing,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Typing => "TYPING",
            Self::Display => "DISPLAY",
            Self::Deleting => "DELETING",
            Self::InterruptClearing => "INTERRUPT_CLEARING",
        })
    }
}

/// How the surface is cleared before an interrupting line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearStrategy {
    /// Nothing to clear
    Direct,
    /// Quick selection clear of a displayed line (polite)
    NormalDelete,
    /// Quick selection clear of a displayed line (assertive)
    FastSelectDelete,
    /// Abort typing, then quick selection clear
    AbortAndClear,
    /// Abort deletion, then clear at once
    AbortDeleteAndClear,
    /// Clear at once
    InstantClear,
    /// Wait for the current transition to finish
    QueueAfter,
}

impl ClearStrategy {
    /// Parse a strategy name, falling back to `InstantClear` for unknown input
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Self::Direct,
            "normal_delete" => Self::NormalDelete,
            "fast_select_delete" => Self::FastSelectDelete,
            "abort_and_clear" => Self::AbortAndClear,
            "abort_delete_and_clear" => Self::AbortDeleteAndClear,
            "instant_clear" => Self::InstantClear,
            "queue_after" => Self::QueueAfter,
            other => {
                tracing::warn!(strategy = other, "Unknown clear strategy, using instant clear");
                Self::InstantClear
            }
        }
    }

    /// Select, fade and remove
    #[must_use]
    pub fn is_fast_selection(self) -> bool {
        matches!(
            self,
            Self::FastSelectDelete | Self::NormalDelete | Self::AbortAndClear
        )
    }

    /// Remove immediately
    #[must_use]
    pub fn is_instant(self) -> bool {
        matches!(self, Self::InstantClear | Self::AbortDeleteAndClear)
    }
}

/// Why an interrupt was or was not allowed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Interrupt allowed
    Allowed,
    /// A locked sequence is playing
    SequenceLocked,
    /// Protected content is on screen
    Protected,
    /// Observational events never interrupt
    Observational,
    /// Polite event waits for a natural break
    Queued,
    /// Priority does not beat the current line
    PriorityInsufficient,
    /// The machine is mid-transition
    FsmBusy,
}

impl DecisionReason {
    /// Snake-case name used in route results and logs
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::SequenceLocked => "sequence_locked",
            Self::Protected => "protected",
            Self::Observational => "observational",
            Self::Queued => "queued",
            Self::PriorityInsufficient => "priority_insufficient",
            Self::FsmBusy => "fsm_busy",
        }
    }
}

/// Outcome of [`TextStateMachine::can_interrupt`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterruptDecision {
    /// The interrupt may proceed now
    pub allowed: bool,
    /// How to clear the surface (set when allowed, or `QueueAfter`)
    pub strategy: Option<ClearStrategy>,
    /// The event should be held and retried later
    pub should_wait: bool,
    /// Reason code
    pub reason: DecisionReason,
}

impl InterruptDecision {
    fn allow(strategy: ClearStrategy) -> Self {
        Self {
            allowed: true,
            strategy: Some(strategy),
            should_wait: false,
            reason: DecisionReason::Allowed,
        }
    }

    fn reject(reason: DecisionReason) -> Self {
        Self {
            allowed: false,
            strategy: None,
            should_wait: false,
            reason,
        }
    }

    fn wait(reason: DecisionReason, strategy: Option<ClearStrategy>) -> Self {
        Self {
            allowed: false,
            strategy,
            should_wait: true,
            reason,
        }
    }
}

/// Extra facts the router supplies to an interrupt decision
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InterruptContext {
    /// A locked multi-line sequence is playing
    pub sequence_locked: bool,
}

// =============================================================================
// Line requests
// =============================================================================

/// How a line request ended
#[derive(Clone, Debug, PartialEq)]
pub enum LineOutcome {
    /// Typed (and, for a full cycle, displayed and deleted)
    Completed,
    /// Cut short by an interrupt
    Interrupted,
    /// Refused before it started
    Rejected(LineError),
    /// The surface failed; the final text was rendered as a fallback
    Failed,
}

/// Completion callback of a line request
pub type LineCallback = Box<dyn FnOnce(LineOutcome) + Send + 'static>;

/// Parameters of a line request
pub struct LineConfig {
    /// Animation style
    pub style: AnimationStyle,
    /// Display time; computed from the line length when unset
    pub display: Option<Duration>,
    /// Line priority (1 to 3)
    pub priority: u8,
    /// Protected lines reject every interrupt but force
    pub protected: bool,
    on_complete: Option<LineCallback>,
}

impl fmt::Debug for LineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineConfig")
            .field("style", &self.style)
            .field("display", &self.display)
            .field("priority", &self.priority)
            .field("protected", &self.protected)
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            style: AnimationStyle::default(),
            display: None,
            priority: 1,
            protected: false,
            on_complete: None,
        }
    }
}

impl LineConfig {
    /// Defaults: priority 1, computed display time, no callback
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the animation style
    #[must_use]
    pub fn with_style(mut self, style: AnimationStyle) -> Self {
        self.style = style;
        self
    }

    /// Set the display time
    #[must_use]
    pub fn with_display(mut self, display: Duration) -> Self {
        self.display = Some(display);
        self
    }

    /// Set the line priority
    #[must_use]
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the line as protected
    #[must_use]
    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Set the completion callback
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(LineOutcome) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    fn validate(&self, line: &str) -> Result<(), LineError> {
        if line.trim().is_empty() || parse_line(line).clean.trim().is_empty() {
            return Err(LineError::EmptyLine);
        }
        let intensity = self.style.intensity;
        if !(0.0..=1.0).contains(&intensity) {
            return Err(LineError::InvalidIntensity(intensity));
        }
        if self.display.is_some_and(|d| d.is_zero()) {
            return Err(LineError::ZeroDisplay);
        }
        Ok(())
    }

    fn take_callback(&mut self) -> LineCallback {
        self.on_complete.take().unwrap_or_else(|| {
            tracing::warn!("Line request without completion callback, using no-op");
            Box::new(|_| {})
        })
    }
}

// =============================================================================
// Machine
// =============================================================================

struct ActiveLine {
    generation: u64,
    text: String,
    style: AnimationStyle,
    display: Duration,
    full_cycle: bool,
    run: Option<RunHandle>,
    timer: Option<AbortHandle>,
    callbacks: Vec<LineCallback>,
}

impl ActiveLine {
    fn disarm(&mut self) -> Option<RunHandle> {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.run.take()
    }
}

struct Inner {
    state: MachineState,
    line: Option<ActiveLine>,
    current_line_priority: u8,
    protected: bool,
    clear_in_progress: bool,
    first_line_shown: bool,
    generation: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    scheduler: AnimationScheduler,
    surface: Arc<dyn TextSurface>,
    config: MachineConfig,
    rng: Mutex<StdRng>,
    state_tx: watch::Sender<MachineState>,
}

/// The text line's lifecycle and interrupt gate
///
/// Cheap to clone; clones drive the same line. Every method that starts work
/// must be called from within a tokio runtime.
#[derive(Clone)]
pub struct TextStateMachine {
    shared: Arc<Shared>,
}

impl fmt::Debug for TextStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("TextStateMachine")
            .field("state", &inner.state)
            .field("current_line_priority", &inner.current_line_priority)
            .field("protected", &inner.protected)
            .finish_non_exhaustive()
    }
}

impl TextStateMachine {
    /// Create a machine driving `surface`
    pub fn new(surface: Arc<dyn TextSurface>, config: MachineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (state_tx, _) = watch::channel(MachineState::Idle);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: MachineState::Idle,
                    line: None,
                    current_line_priority: 0,
                    protected: false,
                    clear_in_progress: false,
                    first_line_shown: false,
                    generation: 0,
                }),
                scheduler: AnimationScheduler::new(),
                surface,
                config,
                rng: Mutex::new(rng),
                state_tx,
            }),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> MachineState {
        self.shared.inner.lock().state
    }

    /// Priority of the line on screen, 0 when idle
    #[must_use]
    pub fn current_line_priority(&self) -> u8 {
        self.shared.inner.lock().current_line_priority
    }

    /// Whether protected content is on screen
    #[must_use]
    pub fn is_protected(&self) -> bool {
        self.shared.inner.lock().protected
    }

    /// Watch state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MachineState> {
        self.shared.state_tx.subscribe()
    }

    /// The surface this machine drives
    #[must_use]
    pub fn surface(&self) -> Arc<dyn TextSurface> {
        Arc::clone(&self.shared.surface)
    }

    /// The run scheduler
    #[must_use]
    pub fn scheduler(&self) -> &AnimationScheduler {
        &self.shared.scheduler
    }

    /// Machine configuration
    #[must_use]
    pub fn config(&self) -> &MachineConfig {
        &self.shared.config
    }

    fn set_state(&self, inner: &mut Inner, next: MachineState) {
        if inner.state != next {
            tracing::debug!(from = %inner.state, to = %next, "State transition");
            inner.state = next;
            self.shared.state_tx.send_replace(next);
        }
    }

    // -------------------------------------------------------------------------
    // Interrupt policy
    // -------------------------------------------------------------------------

    /// Decide whether an event of `urgency` and `priority` may interrupt now
    #[must_use]
    pub fn can_interrupt(&self, urgency: Urgency, priority: u8) -> InterruptDecision {
        self.can_interrupt_with(urgency, priority, &InterruptContext::default())
    }

    /// [`can_interrupt`](Self::can_interrupt) with router-supplied context
    #[must_use]
    pub fn can_interrupt_with(
        &self,
        urgency: Urgency,
        priority: u8,
        context: &InterruptContext,
    ) -> InterruptDecision {
        let (state, current, protected) = {
            let inner = self.shared.inner.lock();
            (inner.state, inner.current_line_priority, inner.protected)
        };
        decide(state, current, protected, urgency, priority, context)
    }

    // -------------------------------------------------------------------------
    // Line requests
    // -------------------------------------------------------------------------

    /// Type, display and delete `line`
    ///
    /// Returns `false` when the request was refused; the callback still fires
    /// (with [`LineOutcome::Rejected`]) after the fallback delay.
    pub fn process_line(&self, line: &str, config: LineConfig) -> bool {
        self.accept_line(line, config, true)
    }

    /// Type `line` and stay in DISPLAY; the callback fires when typing ends
    pub fn start_typing(&self, line: &str, config: LineConfig) -> bool {
        self.accept_line(line, config, false)
    }

    /// Delete the displayed line
    pub fn start_deleting(&self, mut config: LineConfig) -> bool {
        let callback = config.take_callback();
        let mut inner = self.shared.inner.lock();
        let state = inner.state;
        let line = inner
            .line
            .as_mut()
            .filter(|_| state == MachineState::Display);
        let Some(line) = line else {
            drop(inner);
            self.reject(
                LineError::Busy {
                    action: "delete",
                    state,
                },
                callback,
            );
            return false;
        };

        if let Some(timer) = line.timer.take() {
            timer.abort();
        }
        line.style = config.style;
        line.callbacks.push(callback);
        let generation = line.generation;
        self.begin_deleting_locked(&mut inner, generation);
        true
    }

    fn accept_line(&self, line: &str, mut config: LineConfig, full_cycle: bool) -> bool {
        let callback = config.take_callback();
        if let Err(error) = config.validate(line) {
            self.reject(error, callback);
            return false;
        }

        let mut inner = self.shared.inner.lock();
        if inner.state != MachineState::Idle || inner.clear_in_progress {
            let state = inner.state;
            drop(inner);
            self.reject(
                LineError::Busy {
                    action: "start a line",
                    state,
                },
                callback,
            );
            return false;
        }

        inner.generation += 1;
        let generation = inner.generation;
        let graphemes = parse_line(line).graphemes.len();
        inner.current_line_priority = config.priority;
        inner.protected = config.protected;
        inner.line = Some(ActiveLine {
            generation,
            text: line.to_string(),
            style: config.style,
            display: config
                .display
                .unwrap_or_else(|| self.shared.config.display_for(graphemes)),
            full_cycle,
            run: None,
            timer: None,
            callbacks: vec![callback],
        });
        tracing::debug!(generation, priority = config.priority, full_cycle, "Line accepted");

        if inner.first_line_shown {
            self.begin_typing_locked(&mut inner, generation);
        } else {
            inner.first_line_shown = true;
            let lead_in = self.first_line_lead_in();
            self.set_state(&mut inner, MachineState::Typing);
            tracing::debug!(lead_in_ms = lead_in.as_millis() as u64, "First line lead-in");
            let machine = self.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(lead_in).await;
                let mut inner = machine.shared.inner.lock();
                machine.begin_typing_locked(&mut inner, generation);
            });
            if let Some(line) = inner.line.as_mut() {
                line.timer = Some(timer.abort_handle());
            }
        }
        true
    }

    fn first_line_lead_in(&self) -> Duration {
        let config = &self.shared.config;
        let ms = if config.first_line_delay_max_ms == 0 {
            0
        } else {
            self.shared
                .rng
                .lock()
                .gen_range(config.first_line_delay_min_ms..=config.first_line_delay_max_ms)
        };
        Duration::from_millis(ms)
    }

    /// Refuse a request and fire its callback after the fallback delay
    fn reject(&self, error: LineError, callback: LineCallback) {
        tracing::warn!(error = %error, "Line request rejected");
        let delay = Duration::from_millis(self.shared.config.fallback_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback(LineOutcome::Rejected(error));
        });
    }

    fn current_line<'a>(inner: &'a mut Inner, generation: u64) -> Option<&'a mut ActiveLine> {
        inner
            .line
            .as_mut()
            .filter(|line| line.generation == generation)
    }

    fn begin_typing_locked(&self, inner: &mut Inner, generation: u64) {
        let Some(line) = Self::current_line(inner, generation) else {
            tracing::debug!(generation, "Stale typing start dropped");
            return;
        };
        line.timer = None;
        let machine = self.clone();
        let run = animation::start_typing(
            &self.shared.scheduler,
            Arc::clone(&self.shared.surface),
            &line.text,
            &line.style,
            Box::new(move |outcome| machine.on_typing_done(generation, outcome)),
        );
        line.run = Some(run);
        self.set_state(inner, MachineState::Typing);
    }

    fn begin_deleting_locked(&self, inner: &mut Inner, generation: u64) {
        let Some(line) = Self::current_line(inner, generation) else {
            tracing::debug!(generation, "Stale deletion start dropped");
            return;
        };
        line.timer = None;
        let machine = self.clone();
        let run = animation::start_deleting(
            &self.shared.scheduler,
            Arc::clone(&self.shared.surface),
            &line.style,
            Box::new(move |outcome| machine.on_deleting_done(generation, outcome)),
        );
        line.run = Some(run);
        self.set_state(inner, MachineState::Deleting);
    }

    fn on_typing_done(&self, generation: u64, outcome: RunOutcome) {
        if let RunOutcome::Cancelled(_) = outcome {
            return;
        }
        let mut inner = self.shared.inner.lock();
        if inner.state != MachineState::Typing {
            tracing::debug!(generation, state = %inner.state, "Stale typing completion dropped");
            return;
        }
        let Some(line) = Self::current_line(&mut inner, generation) else {
            tracing::debug!(generation, "Stale typing completion dropped");
            return;
        };
        line.run = None;

        if outcome == RunOutcome::Failed {
            let callbacks = std::mem::take(&mut line.callbacks);
            self.finish_line_locked(&mut inner);
            drop(inner);
            fire(callbacks, &LineOutcome::Failed);
            return;
        }

        if line.full_cycle {
            let display = line.display;
            let machine = self.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(display).await;
                let mut inner = machine.shared.inner.lock();
                if inner.state == MachineState::Display {
                    machine.begin_deleting_locked(&mut inner, generation);
                }
            });
            line.timer = Some(timer.abort_handle());
            self.set_state(&mut inner, MachineState::Display);
        } else {
            let callbacks = std::mem::take(&mut line.callbacks);
            self.set_state(&mut inner, MachineState::Display);
            drop(inner);
            fire(callbacks, &LineOutcome::Completed);
        }
    }

    fn on_deleting_done(&self, generation: u64, outcome: RunOutcome) {
        if let RunOutcome::Cancelled(_) = outcome {
            return;
        }
        let mut inner = self.shared.inner.lock();
        if inner.state != MachineState::Deleting {
            tracing::debug!(generation, state = %inner.state, "Stale deletion completion dropped");
            return;
        }
        let Some(line) = Self::current_line(&mut inner, generation) else {
            tracing::debug!(generation, "Stale deletion completion dropped");
            return;
        };
        let callbacks = std::mem::take(&mut line.callbacks);
        self.finish_line_locked(&mut inner);
        drop(inner);

        let outcome = match outcome {
            RunOutcome::Failed => LineOutcome::Failed,
            _ => LineOutcome::Completed,
        };
        fire(callbacks, &outcome);
    }

    /// Back to IDLE with no line and no priority
    fn finish_line_locked(&self, inner: &mut Inner) {
        inner.line = None;
        inner.current_line_priority = 0;
        inner.protected = false;
        self.set_state(inner, MachineState::Idle);
    }

    // -------------------------------------------------------------------------
    // Interrupts
    // -------------------------------------------------------------------------

    /// Take the current line out for interruption
    ///
    /// Returns `None` when another clear holds the latch.
    fn begin_clear(&self) -> Option<(Option<RunHandle>, Vec<LineCallback>)> {
        let mut inner = self.shared.inner.lock();
        if inner.clear_in_progress {
            tracing::debug!("Clear already in progress");
            return None;
        }
        inner.clear_in_progress = true;
        let taken = inner.line.take().map(|mut line| {
            let run = line.disarm();
            (run, std::mem::take(&mut line.callbacks))
        });
        self.set_state(&mut inner, MachineState::InterruptClearing);
        Some(taken.unwrap_or((None, Vec::new())))
    }

    fn end_clear(&self) {
        let mut inner = self.shared.inner.lock();
        inner.clear_in_progress = false;
        self.finish_line_locked(&mut inner);
    }

    /// Clear the surface according to `strategy` and return to IDLE
    ///
    /// Returns `false` if another clear was already running; that call wins
    /// and this one does nothing.
    pub async fn execute_clear_strategy(&self, strategy: ClearStrategy) -> bool {
        if matches!(strategy, ClearStrategy::Direct | ClearStrategy::QueueAfter) {
            return true;
        }
        let Some((run, callbacks)) = self.begin_clear() else {
            return false;
        };
        tracing::debug!(?strategy, "Executing clear strategy");

        if let Some(run) = run {
            run.cancel(CancelMode::Freeze);
        }
        fire(callbacks, &LineOutcome::Interrupted);

        let cleared = if strategy.is_fast_selection() {
            self.fast_clear().await
        } else {
            self.shared.surface.clear()
        };
        if let Err(error) = cleared {
            tracing::warn!(error = %error, ?strategy, "Clear failed, forcing instant clear");
            if let Err(error) = self.shared.surface.clear() {
                tracing::warn!(error = %error, "Instant clear failed");
            }
        }

        self.end_clear();
        true
    }

    async fn fast_clear(&self) -> Result<(), SurfaceError> {
        const FADE_STEPS: u32 = 4;
        let surface = &self.shared.surface;
        let fade = Duration::from_millis(self.shared.config.fade_ms);
        let total = Duration::from_millis(self.shared.config.fast_clear_ms);

        surface.select(0..surface.len())?;
        for step in 1..=FADE_STEPS {
            surface.set_opacity(1.0 - step as f32 / FADE_STEPS as f32)?;
            tokio::time::sleep(fade / FADE_STEPS).await;
        }
        surface.clear()?;
        if let Some(rest) = total.checked_sub(fade) {
            tokio::time::sleep(rest).await;
        }
        Ok(())
    }

    /// Hard-cancel whatever is on screen, as an assertive priority-2 event
    ///
    /// Returns `false` if the interrupt is not allowed.
    pub fn interrupt(&self) -> bool {
        let decision = self.can_interrupt(Urgency::Assertive, 2);
        if !decision.allowed {
            tracing::debug!(reason = decision.reason.name(), "Interrupt refused");
            return false;
        }
        let Some((run, callbacks)) = self.begin_clear() else {
            return false;
        };
        match run {
            Some(run) => run.cancel(CancelMode::Clear),
            None => {
                if let Err(error) = self.shared.surface.clear() {
                    tracing::warn!(error = %error, "Clear failed during interrupt");
                }
            }
        }
        fire(callbacks, &LineOutcome::Interrupted);
        self.end_clear();
        tracing::info!("Line interrupted");
        true
    }
}

fn fire(callbacks: Vec<LineCallback>, outcome: &LineOutcome) {
    for callback in callbacks {
        callback(outcome.clone());
    }
}

/// The interrupt policy as a pure function of the machine's facts
fn decide(
    state: MachineState,
    current_priority: u8,
    protected: bool,
    urgency: Urgency,
    priority: u8,
    context: &InterruptContext,
) -> InterruptDecision {
    use ClearStrategy as S;
    use MachineState as M;

    if context.sequence_locked {
        return InterruptDecision::wait(DecisionReason::SequenceLocked, None);
    }
    if protected && urgency != Urgency::Force {
        return InterruptDecision::reject(DecisionReason::Protected);
    }

    match urgency {
        Urgency::Observational => InterruptDecision::reject(DecisionReason::Observational),
        Urgency::Polite => match state {
            M::Idle => InterruptDecision::allow(S::Direct),
            M::Display => InterruptDecision::allow(S::NormalDelete),
            _ => InterruptDecision::wait(DecisionReason::Queued, None),
        },
        Urgency::Assertive => match state {
            _ if priority <= current_priority => {
                InterruptDecision::reject(DecisionReason::PriorityInsufficient)
            }
            M::Deleting | M::InterruptClearing => {
                InterruptDecision::wait(DecisionReason::FsmBusy, Some(S::QueueAfter))
            }
            M::Idle => InterruptDecision::allow(S::Direct),
            M::Typing => InterruptDecision::allow(S::AbortAndClear),
            M::Display => InterruptDecision::allow(S::FastSelectDelete),
        },
        Urgency::Force => InterruptDecision::allow(match state {
            M::Idle => S::Direct,
            M::Typing => S::AbortAndClear,
            M::Display => S::FastSelectDelete,
            M::Deleting => S::AbortDeleteAndClear,
            M::InterruptClearing => S::InstantClear,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ALL_STATES: [MachineState; 5] = [
        MachineState::Idle,
        MachineState::Typing,
        MachineState::Display,
        MachineState::Deleting,
        MachineState::InterruptClearing,
    ];

    fn machine() -> (TextStateMachine, Arc<MemorySurface>) {
        let surface = Arc::new(MemorySurface::new());
        let config = MachineConfig::default().without_lead_in().with_seed(1);
        (TextStateMachine::new(surface.clone(), config), surface)
    }

    fn quiet() -> AnimationStyle {
        AnimationStyle::default()
            .with_typos(false)
            .with_scramble(false)
            .with_seed(5)
    }

    #[test]
    fn test_observational_never_allowed() {
        for state in ALL_STATES {
            let decision = decide(state, 0, false, Urgency::Observational, 3, &Default::default());
            assert!(!decision.allowed);
            assert!(!decision.should_wait);
        }
    }

    #[test]
    fn test_force_always_allowed_unless_locked() {
        for state in ALL_STATES {
            for protected in [false, true] {
                let decision = decide(state, 3, protected, Urgency::Force, 3, &Default::default());
                assert!(decision.allowed, "force refused in {state}");
            }
        }
        let locked = InterruptContext {
            sequence_locked: true,
        };
        let decision = decide(MachineState::Display, 1, false, Urgency::Force, 3, &locked);
        assert!(!decision.allowed);
        assert!(decision.should_wait);
        assert_eq!(decision.reason, DecisionReason::SequenceLocked);
    }

    #[test]
    fn test_assertive_needs_higher_priority() {
        let ctx = InterruptContext::default();
        let equal = decide(MachineState::Display, 2, false, Urgency::Assertive, 2, &ctx);
        assert!(!equal.allowed);
        assert_eq!(equal.reason, DecisionReason::PriorityInsufficient);

        let higher = decide(MachineState::Display, 1, false, Urgency::Assertive, 2, &ctx);
        assert_eq!(higher.strategy, Some(ClearStrategy::FastSelectDelete));

        let busy = decide(MachineState::Deleting, 1, false, Urgency::Assertive, 2, &ctx);
        assert!(busy.should_wait);
        assert_eq!(busy.reason, DecisionReason::FsmBusy);
        assert_eq!(busy.strategy, Some(ClearStrategy::QueueAfter));

        for state in [MachineState::Deleting, MachineState::InterruptClearing] {
            let same = decide(state, 2, false, Urgency::Assertive, 2, &ctx);
            assert!(!same.allowed);
            assert!(!same.should_wait);
            assert_eq!(same.reason, DecisionReason::PriorityInsufficient);
        }
    }

    #[test]
    fn test_polite_waits_for_natural_break() {
        let ctx = InterruptContext::default();
        assert_eq!(
            decide(MachineState::Idle, 0, false, Urgency::Polite, 1, &ctx).strategy,
            Some(ClearStrategy::Direct)
        );
        assert_eq!(
            decide(MachineState::Display, 1, false, Urgency::Polite, 1, &ctx).strategy,
            Some(ClearStrategy::NormalDelete)
        );
        let typing = decide(MachineState::Typing, 1, false, Urgency::Polite, 1, &ctx);
        assert!(!typing.allowed);
        assert!(typing.should_wait);
        assert_eq!(typing.reason, DecisionReason::Queued);
    }

    #[test]
    fn test_protected_rejects_without_queueing() {
        let decision = decide(
            MachineState::Display,
            1,
            true,
            Urgency::Polite,
            1,
            &Default::default(),
        );
        assert_eq!(decision.reason, DecisionReason::Protected);
        assert!(!decision.should_wait);
    }

    #[test]
    fn test_unknown_clear_strategy_is_instant() {
        assert_eq!(ClearStrategy::parse("obliterate"), ClearStrategy::InstantClear);
        assert_eq!(
            ClearStrategy::parse("fast_select_delete"),
            ClearStrategy::FastSelectDelete
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_cycle_returns_to_idle() {
        let (machine, surface) = machine();
        let mut states = machine.subscribe();
        let done = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&done);
        let config = LineConfig::new()
            .with_style(quiet())
            .with_display(Duration::from_millis(500))
            .on_complete(move |outcome| *seen.lock() = Some(outcome));

        assert!(machine.process_line("hello there", config));
        states
            .wait_for(|s| *s == MachineState::Display)
            .await
            .unwrap();
        assert_eq!(surface.text(), "hello there");
        states.wait_for(|s| *s == MachineState::Idle).await.unwrap();

        assert_eq!(*done.lock(), Some(LineOutcome::Completed));
        assert!(surface.is_empty());
        assert_eq!(machine.current_line_priority(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_line_lead_in() {
        let surface = Arc::new(MemorySurface::new());
        let machine = TextStateMachine::new(surface.clone(), MachineConfig::default().with_seed(3));
        assert!(machine.process_line("first", LineConfig::new().with_style(quiet())));
        assert_eq!(machine.state(), MachineState::Typing);

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert!(surface.is_empty());
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert!(!surface.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_line_rejected_with_callback() {
        let (machine, _) = machine();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let config = LineConfig::new().on_complete(move |outcome| {
            assert_eq!(outcome, LineOutcome::Rejected(LineError::EmptyLine));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!machine.process_line("   \\pause{300} ", config));
        assert_eq!(machine.state(), MachineState::Idle);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_machine_rejects_new_line() {
        let (machine, _) = machine();
        assert!(machine.process_line("first line", LineConfig::new().with_style(quiet())));
        assert!(!machine.process_line("second line", LineConfig::new().with_style(quiet())));
        assert_eq!(machine.state(), MachineState::Typing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cancels_typing() {
        let (machine, surface) = machine();
        let outcome = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&outcome);
        let config = LineConfig::new()
            .with_style(quiet())
            .on_complete(move |o| *seen.lock() = Some(o));
        machine.process_line("a line that takes a while to type", config);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(machine.interrupt());
        assert_eq!(machine.state(), MachineState::Idle);
        assert!(surface.is_empty());
        assert_eq!(*outcome.lock(), Some(LineOutcome::Interrupted));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(surface.is_empty());
        assert_eq!(machine.state(), MachineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_clear_is_latched() {
        let (machine, _) = machine();
        machine.start_typing("shown", LineConfig::new().with_style(quiet()));
        let mut states = machine.subscribe();
        states
            .wait_for(|s| *s == MachineState::Display)
            .await
            .unwrap();

        let first = machine.clone();
        let running = tokio::spawn(async move {
            first
                .execute_clear_strategy(ClearStrategy::FastSelectDelete)
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(machine.state(), MachineState::InterruptClearing);
        assert!(!machine.execute_clear_strategy(ClearStrategy::InstantClear).await);
        assert!(running.await.unwrap());
        assert_eq!(machine.state(), MachineState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_deleting_requires_display() {
        let (machine, surface) = machine();
        assert!(!machine.start_deleting(LineConfig::new()));

        machine.start_typing("gone soon", LineConfig::new().with_style(quiet()));
        let mut states = machine.subscribe();
        states
            .wait_for(|s| *s == MachineState::Display)
            .await
            .unwrap();
        assert!(machine.start_deleting(LineConfig::new().with_style(quiet())));
        assert_eq!(machine.state(), MachineState::Deleting);
        states.wait_for(|s| *s == MachineState::Idle).await.unwrap();
        assert!(surface.is_empty());
    }
}
