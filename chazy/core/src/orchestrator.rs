//! Orchestrator - Multi-line Sequences
//!
//! The orchestrator decides *when* lines are shown; a [`ContentSelector`]
//! decides *what* they say and a [`MindModel`] supplies the mood they are
//! typed in.
//!
//! # Sessions
//!
//! Every sequence gets a monotonic session token. Starting a new sequence
//! (a response to an event, an ambient cycle, the welcome) bumps the token,
//! so the continuation of an older sequence sees it is stale and stops
//! instead of typing its next line over the new one.
//!
//! ```text
//! show(content) ─▶ token n ─▶ line 1 ─▶ stage pause ─▶ line 2 ─▶ ... ─▶ text_complete(n)
//!                                  ▲
//! respond(...)  ─▶ token n+1 ──────┘ (line 1 interrupted, token n stale)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use unicode_segmentation::UnicodeSegmentation;

use crate::animation::{AnimationStyle, TypingConfig};
use crate::emotion::{Emotion, Theme, Tone};
use crate::events::{ChazyEvent, EventBus, EventData};
use crate::state_machine::{ClearStrategy, LineConfig, LineOutcome, MachineState, TextStateMachine};

// =============================================================================
// Content
// =============================================================================

/// Whether a sequence may be interrupted between its lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptStyle {
    /// Interruptible
    #[default]
    Open,
    /// Holds every interrupt until the sequence ends
    Locked,
}

/// Lines to show, with how to show them
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    /// Lines, shown in order
    pub lines: Vec<String>,
    /// Tone overlay
    pub tone: Tone,
    /// Themes (stretch the following ambient pause)
    pub themes: Vec<Theme>,
    /// Interrupt style
    pub interrupt_style: InterruptStyle,
    /// Pause between lines
    #[serde(with = "millis")]
    pub stage_pause: Duration,
    /// 0.0 to 1.0; lengthens the following ambient pause
    pub reflect_pull: f64,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl Default for Content {
    fn default() -> Self {
        Self {
            lines: Vec::new(),
            tone: Tone::Neutral,
            themes: Vec::new(),
            interrupt_style: InterruptStyle::Open,
            stage_pause: Duration::from_millis(600),
            reflect_pull: 0.0,
        }
    }
}

impl Content {
    /// A single line
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            lines: vec![text.into()],
            ..Self::default()
        }
    }

    /// Several lines
    pub fn lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
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

    /// Hold interrupts until the sequence ends
    #[must_use]
    pub fn locked(mut self) -> Self {
        self.interrupt_style = InterruptStyle::Locked;
        self
    }

    /// Set the pause between lines
    #[must_use]
    pub fn with_stage_pause(mut self, pause: Duration) -> Self {
        self.stage_pause = pause;
        self
    }

    /// Set the reflect pull
    #[must_use]
    pub fn with_reflect_pull(mut self, pull: f64) -> Self {
        self.reflect_pull = pull.clamp(0.0, 1.0);
        self
    }

    /// Total graphemes across all lines
    #[must_use]
    pub fn text_len(&self) -> usize {
        self.lines
            .iter()
            .map(|line| line.graphemes(true).count())
            .sum()
    }

    fn fill(&self, data: &EventData) -> Self {
        let fill = |line: &String| {
            line.replace("{target}", data.target.as_deref().unwrap_or(""))
                .replace("{old}", data.old_value.as_deref().unwrap_or(""))
                .replace("{new}", data.new_value.as_deref().unwrap_or(""))
        };
        Self {
            lines: self.lines.iter().map(fill).collect(),
            ..self.clone()
        }
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Why content is being asked for
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionKind {
    /// The first thing said
    Welcome,
    /// Unprompted idle chatter
    Ambient,
    /// A reaction to a UI event
    Reaction {
        /// UI event type
        event_type: String,
        /// Payload
        data: EventData,
    },
}

/// What the selector knows when choosing content
#[derive(Clone, Debug, PartialEq)]
pub struct SelectionContext {
    /// Why content is needed
    pub kind: SelectionKind,
    /// Current emotion
    pub emotion: Emotion,
    /// Current intensity
    pub intensity: f64,
    /// Last line shown, if any
    pub last_text: Option<String>,
}

/// Chooses what to say
pub trait ContentSelector: Send + Sync {
    /// Content for `context`, or `None` to stay quiet
    fn select(&self, context: &SelectionContext) -> Option<Content>;
}

/// Supplies the mood lines are typed in
pub trait MindModel: Send + Sync {
    /// Current emotion
    fn emotion(&self) -> Emotion;

    /// Emotion intensity, 0.0 to 1.0
    fn intensity(&self) -> f64;

    /// Willingness to speak unprompted, 0.0 to 1.0
    fn autonomy(&self) -> f64;
}

/// A mind that never changes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedMind {
    /// Emotion
    pub emotion: Emotion,
    /// Intensity
    pub intensity: f64,
    /// Autonomy
    pub autonomy: f64,
}

impl Default for FixedMind {
    fn default() -> Self {
        Self {
            emotion: Emotion::Neutral,
            intensity: 0.5,
            autonomy: 0.5,
        }
    }
}

impl FixedMind {
    /// A mind fixed at `emotion` and `intensity`
    #[must_use]
    pub fn new(emotion: Emotion, intensity: f64) -> Self {
        Self {
            emotion,
            intensity: intensity.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    /// Set the autonomy
    #[must_use]
    pub fn with_autonomy(mut self, autonomy: f64) -> Self {
        self.autonomy = autonomy.clamp(0.0, 1.0);
        self
    }
}

impl MindModel for FixedMind {
    fn emotion(&self) -> Emotion {
        self.emotion
    }

    fn intensity(&self) -> f64 {
        self.intensity
    }

    fn autonomy(&self) -> f64 {
        self.autonomy
    }
}

/// Selector over fixed pools, cycling through each pool in order
///
/// Reaction lines may contain `{target}`, `{old}` and `{new}`, filled from the
/// event payload.
#[derive(Debug, Default)]
pub struct StaticContentSelector {
    welcome: Option<Content>,
    ambient: Vec<Content>,
    reactions: HashMap<String, Vec<Content>>,
    fallback: Vec<Content>,
    cursor: AtomicUsize,
}

impl StaticContentSelector {
    /// Empty selector (always quiet)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the welcome content
    #[must_use]
    pub fn with_welcome(mut self, content: Content) -> Self {
        self.welcome = Some(content);
        self
    }

    /// Add ambient content
    #[must_use]
    pub fn with_ambient(mut self, content: Content) -> Self {
        self.ambient.push(content);
        self
    }

    /// Add a reaction to `event_type`
    #[must_use]
    pub fn with_reaction(mut self, event_type: impl Into<String>, content: Content) -> Self {
        self.reactions
            .entry(event_type.into())
            .or_default()
            .push(content);
        self
    }

    /// Add a reaction used for events without their own pool
    #[must_use]
    pub fn with_fallback_reaction(mut self, content: Content) -> Self {
        self.fallback.push(content);
        self
    }

    fn pick(&self, pool: &[Content]) -> Option<Content> {
        if pool.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
        pool.get(index).cloned()
    }
}

impl ContentSelector for StaticContentSelector {
    fn select(&self, context: &SelectionContext) -> Option<Content> {
        match &context.kind {
            SelectionKind::Welcome => self.welcome.clone(),
            SelectionKind::Ambient => self.pick(&self.ambient),
            SelectionKind::Reaction { event_type, data } => {
                let pool = self
                    .reactions
                    .get(event_type)
                    .filter(|pool| !pool.is_empty())
                    .unwrap_or(&self.fallback);
                self.pick(pool).map(|content| content.fill(data))
            }
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

#[derive(Default)]
struct SequenceState {
    active: bool,
    locked: bool,
    last_text: Option<String>,
    last_len: usize,
    last_themes: Vec<Theme>,
    reflect_pull: f64,
    task: Option<AbortHandle>,
}

struct OrchestratorShared {
    machine: TextStateMachine,
    selector: Arc<dyn ContentSelector>,
    mind: Arc<dyn MindModel>,
    bus: EventBus,
    typing: TypingConfig,
    session: AtomicU64,
    lines_shown: AtomicU64,
    sequence: Mutex<SequenceState>,
}

/// Sequences content onto the state machine
///
/// Cheap to clone. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<OrchestratorShared>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("session", &self.session_token())
            .field("machine", &self.shared.machine)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator
    pub fn new(
        machine: TextStateMachine,
        selector: Arc<dyn ContentSelector>,
        mind: Arc<dyn MindModel>,
        bus: EventBus,
        typing: TypingConfig,
    ) -> Self {
        Self {
            shared: Arc::new(OrchestratorShared {
                machine,
                selector,
                mind,
                bus,
                typing,
                session: AtomicU64::new(0),
                lines_shown: AtomicU64::new(0),
                sequence: Mutex::new(SequenceState::default()),
            }),
        }
    }

    /// The state machine
    #[must_use]
    pub fn machine(&self) -> &TextStateMachine {
        &self.shared.machine
    }

    /// The mind model
    #[must_use]
    pub fn mind(&self) -> &Arc<dyn MindModel> {
        &self.shared.mind
    }

    /// The event bus
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.shared.bus
    }

    /// Current session token
    #[must_use]
    pub fn session_token(&self) -> u64 {
        self.shared.session.load(Ordering::SeqCst)
    }

    /// Whether a locked sequence is playing
    #[must_use]
    pub fn sequence_locked(&self) -> bool {
        let sequence = self.shared.sequence.lock();
        sequence.active && sequence.locked
    }

    /// Whether any sequence is playing
    #[must_use]
    pub fn is_sequence_active(&self) -> bool {
        self.shared.sequence.lock().active
    }

    /// Length of the last shown content, for the ambient delay
    #[must_use]
    pub fn last_text_len(&self) -> usize {
        self.shared.sequence.lock().last_len
    }

    /// Themes of the last shown content
    #[must_use]
    pub fn last_themes(&self) -> Vec<Theme> {
        self.shared.sequence.lock().last_themes.clone()
    }

    /// Reflect pull of the last shown content
    #[must_use]
    pub fn reflect_pull(&self) -> f64 {
        self.shared.sequence.lock().reflect_pull
    }

    fn context(&self, kind: SelectionKind) -> SelectionContext {
        SelectionContext {
            kind,
            emotion: self.shared.mind.emotion(),
            intensity: self.shared.mind.intensity(),
            last_text: self.shared.sequence.lock().last_text.clone(),
        }
    }

    /// Show content now, without clearing first; returns the session token
    pub fn show(&self, content: Content, priority: u8, protected: bool) -> u64 {
        let token = self.begin_session();
        self.spawn_sequence(token, content, priority, protected);
        token
    }

    /// Show the welcome content as protected
    pub fn show_welcome(&self) -> bool {
        match self.shared.selector.select(&self.context(SelectionKind::Welcome)) {
            Some(content) if !content.lines.is_empty() => {
                self.show(content, 1, true);
                true
            }
            _ => {
                tracing::debug!("No welcome content");
                false
            }
        }
    }

    /// Show ambient content if nothing else is going on
    pub fn ambient_cycle(&self) -> bool {
        if self.shared.machine.state() != MachineState::Idle || self.is_sequence_active() {
            tracing::debug!("Ambient cycle skipped, line in progress");
            return false;
        }
        match self.shared.selector.select(&self.context(SelectionKind::Ambient)) {
            Some(content) if !content.lines.is_empty() => {
                tracing::info!(lines = content.lines.len(), "Ambient cycle");
                self.show(content, 1, false);
                true
            }
            _ => false,
        }
    }

    /// Reaction content for a UI event, if the selector has any
    #[must_use]
    pub fn reaction_content(&self, event_type: &str, data: &EventData) -> Option<Content> {
        let kind = SelectionKind::Reaction {
            event_type: event_type.to_string(),
            data: data.clone(),
        };
        self.shared
            .selector
            .select(&self.context(kind))
            .filter(|content| !content.lines.is_empty())
    }

    /// Clear with `strategy`, then show `content` at `priority`
    ///
    /// The running sequence is made stale before the clear starts.
    pub async fn respond(&self, content: Content, strategy: ClearStrategy, priority: u8) -> u64 {
        let token = self.begin_session();
        if !self.shared.machine.execute_clear_strategy(strategy).await {
            tracing::debug!(?strategy, "Clear already running, response waits for idle");
        }
        if self.is_stale(token) {
            return token;
        }
        self.spawn_sequence(token, content, priority, false);
        token
    }

    fn is_stale(&self, token: u64) -> bool {
        self.session_token() != token
    }

    /// Bump the session token and stop the running sequence task
    fn begin_session(&self) -> u64 {
        let token = self.shared.session.fetch_add(1, Ordering::SeqCst) + 1;
        let mut sequence = self.shared.sequence.lock();
        if let Some(task) = sequence.task.take() {
            task.abort();
        }
        sequence.active = false;
        sequence.locked = false;
        token
    }

    fn spawn_sequence(&self, token: u64, content: Content, priority: u8, protected: bool) {
        let mut sequence = self.shared.sequence.lock();
        sequence.active = true;
        sequence.locked = content.interrupt_style == InterruptStyle::Locked;
        sequence.last_len = content.text_len();
        sequence.last_themes = content.themes.clone();
        sequence.reflect_pull = content.reflect_pull;
        let task = tokio::spawn(self.clone().run_sequence(token, content, priority, protected));
        sequence.task = Some(task.abort_handle());
        tracing::debug!(token, priority, protected, "Sequence started");
    }

    fn style_for(&self, content: &Content) -> AnimationStyle {
        let line = self.shared.lines_shown.fetch_add(1, Ordering::Relaxed);
        self.shared.typing.style(
            self.shared.mind.emotion(),
            self.shared.mind.intensity(),
            content.tone,
            content.themes.clone(),
            line,
        )
    }

    async fn wait_idle(&self) -> bool {
        let mut states = self.shared.machine.subscribe();
        let idle = states
            .wait_for(|state| *state == MachineState::Idle)
            .await
            .is_ok();
        idle
    }

    async fn run_sequence(self, token: u64, content: Content, priority: u8, protected: bool) {
        let total = content.lines.len();
        for (index, line) in content.lines.iter().enumerate() {
            if self.is_stale(token) || !self.wait_idle().await || self.is_stale(token) {
                tracing::debug!(token, "Stale sequence continuation dropped");
                return;
            }

            let (tx, rx) = oneshot::channel();
            let mut config = LineConfig::new()
                .with_style(self.style_for(&content))
                .with_priority(priority)
                .on_complete(move |outcome| {
                    let _ = tx.send(outcome);
                });
            if protected {
                config = config.protected();
            }
            self.shared.machine.process_line(line, config);
            let outcome = rx.await.unwrap_or(LineOutcome::Interrupted);

            if self.is_stale(token) {
                tracing::debug!(token, "Stale sequence continuation dropped");
                return;
            }
            match outcome {
                LineOutcome::Completed | LineOutcome::Failed => {
                    self.shared.sequence.lock().last_text = Some(line.clone());
                    if index + 1 < total {
                        tokio::time::sleep(content.stage_pause).await;
                    }
                }
                LineOutcome::Interrupted => break,
                LineOutcome::Rejected(error) => {
                    tracing::debug!(token, error = %error, "Sequence line skipped");
                }
            }
        }

        if self.is_stale(token) {
            return;
        }
        {
            let mut sequence = self.shared.sequence.lock();
            sequence.active = false;
            sequence.locked = false;
            sequence.task = None;
        }
        tracing::debug!(token, "Sequence complete");
        self.shared.bus.publish(ChazyEvent::TextComplete { token });
    }
}
