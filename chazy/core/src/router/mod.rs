//! Event Router
//!
//! Decides whether a UI event gets a spoken response. System events drive
//! scheduling and skip rate limiting; every other event passes five layers,
//! and the first failing layer names the reason:
//!
//! ```text
//! event ─▶ 1 cooldown ─▶ 2 global lock ─▶ 3 budget ─▶ 4 suppression ─▶ 5 can_interrupt
//!             │               │               │              │                │
//!          cooldown      global_lock   budget_exhausted  suppressed     allowed → respond
//!                                                                       fsm_busy → pending slot (2 s)
//!                                                                       should_wait → polite slot (5 s)
//!                                                                       otherwise → rejected
//! ```
//!
//! A response debits the budget, records the signature for suppression, arms
//! the global lock, starts the cooldown and hands the content to the
//! orchestrator. Parked events are retried when the machine goes idle
//! (pending slot) or a sequence completes (pending, then polite). A retry
//! re-checks the budget and the interrupt policy only; the other layers were
//! passed on arrival.

mod ambient;
mod budget;
mod queue;
mod rate_limit;

pub use ambient::{
    ambient_delay, autonomy_multiplier, base_idle_ms, length_multiplier, MAX_AMBIENT_MS,
    MIN_AMBIENT_MS,
};
pub use budget::ResponseBudget;
pub use queue::{QueueSlot, QueuedEvent};
pub use rate_limit::{signature, CooldownTracker, GlobalLock, SuppressionWindow};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;

use crate::calibration::CalibrationHistory;
use crate::events::{
    is_system_event, ChazyEvent, EventData, RouteReason, RouteResult, AMBIENT_CYCLE_READY,
    MIND_SPEAK_REQUEST, PAGE_VISIBILITY, TEXT_COMPLETE,
};
use crate::orchestrator::Orchestrator;
use crate::state_machine::{ClearStrategy, DecisionReason, InterruptContext, MachineState};
use crate::urgency::{event_priority, event_urgency};

// =============================================================================
// Configuration
// =============================================================================

/// Rate limiting and queueing configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Default per event+target cooldown
    pub cooldown_ms: u64,

    /// Cooldown overrides by event type
    pub cooldown_overrides_ms: HashMap<String, u64>,

    /// Silence after any response
    pub global_lock_ms: u64,

    /// Responses that can be banked
    pub budget_max: u32,

    /// Time to regain one response
    pub budget_refill_ms: u64,

    /// Window in which identical events are ignored
    pub suppression_window_ms: u64,

    /// Lifetime of an event parked because the machine was busy
    pub pending_ttl_ms: u64,

    /// Lifetime of an event parked until a natural break
    pub polite_ttl_ms: u64,

    /// Whether ambient lines are scheduled
    pub ambient_enabled: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 4000,
            cooldown_overrides_ms: HashMap::from([
                ("hover".to_string(), 3000),
                ("button_hover".to_string(), 3000),
                ("slider_changed".to_string(), 5000),
                ("slider_drag".to_string(), 5000),
            ]),
            global_lock_ms: 8000,
            budget_max: 3,
            budget_refill_ms: 45_000,
            suppression_window_ms: 60_000,
            pending_ttl_ms: 2000,
            polite_ttl_ms: 5000,
            ambient_enabled: true,
        }
    }
}

impl RouterConfig {
    /// Create a configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default cooldown
    #[must_use]
    pub fn with_cooldown_ms(mut self, cooldown: u64) -> Self {
        self.cooldown_ms = cooldown;
        self
    }

    /// Override the cooldown of one event type
    #[must_use]
    pub fn with_cooldown_override_ms(mut self, event_type: impl Into<String>, cooldown: u64) -> Self {
        self.cooldown_overrides_ms.insert(event_type.into(), cooldown);
        self
    }

    /// Set the global lock duration
    #[must_use]
    pub fn with_global_lock_ms(mut self, lock: u64) -> Self {
        self.global_lock_ms = lock;
        self
    }

    /// Set the budget size and refill interval
    #[must_use]
    pub fn with_budget(mut self, max: u32, refill_ms: u64) -> Self {
        self.budget_max = max;
        self.budget_refill_ms = refill_ms;
        self
    }

    /// Set the suppression window
    #[must_use]
    pub fn with_suppression_window_ms(mut self, window: u64) -> Self {
        self.suppression_window_ms = window;
        self
    }

    /// Enable or disable ambient scheduling
    #[must_use]
    pub fn with_ambient(mut self, enabled: bool) -> Self {
        self.ambient_enabled = enabled;
        self
    }

    /// No cooldowns, lock or suppression, and a large budget (for tests)
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            cooldown_ms: 0,
            cooldown_overrides_ms: HashMap::new(),
            global_lock_ms: 0,
            budget_max: 1000,
            budget_refill_ms: 1000,
            suppression_window_ms: 0,
            ..Self::default()
        }
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Router counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Events routed
    pub routed: u64,
    /// System events handled
    pub system: u64,
    /// Responses dispatched
    pub responded: u64,
    /// Events parked in a slot
    pub queued: u64,
    /// Parked events displaced by a newer one
    pub displaced: u64,
    /// Parked events that expired
    pub dropped_expired: u64,
    /// Refusals by reason name
    pub rejected: BTreeMap<String, u64>,
}

impl RouterStats {
    /// Refusals for `reason`
    #[must_use]
    pub fn rejected_for(&self, reason: RouteReason) -> u64 {
        self.rejected.get(reason.name()).copied().unwrap_or(0)
    }
}

// =============================================================================
// Router
// =============================================================================

struct Limits {
    cooldowns: CooldownTracker,
    lock: GlobalLock,
    budget: ResponseBudget,
    suppression: SuppressionWindow,
    pending: QueueSlot,
    polite: QueueSlot,
    stats: RouterStats,
}

impl Limits {
    fn new(config: &RouterConfig) -> Self {
        let overrides = config
            .cooldown_overrides_ms
            .iter()
            .map(|(event, ms)| (event.clone(), Duration::from_millis(*ms)))
            .collect();
        Self {
            cooldowns: CooldownTracker::new(Duration::from_millis(config.cooldown_ms), overrides),
            lock: GlobalLock::new(Duration::from_millis(config.global_lock_ms)),
            budget: ResponseBudget::new(
                config.budget_max,
                Duration::from_millis(config.budget_refill_ms),
                Instant::now(),
            ),
            suppression: SuppressionWindow::new(Duration::from_millis(
                config.suppression_window_ms,
            )),
            pending: QueueSlot::new("pending", Duration::from_millis(config.pending_ttl_ms)),
            polite: QueueSlot::new("polite", Duration::from_millis(config.polite_ttl_ms)),
            stats: RouterStats::default(),
        }
    }

    fn refuse(&mut self, event_type: &str, reason: RouteReason) -> RouteResult {
        *self
            .stats
            .rejected
            .entry(reason.name().to_string())
            .or_default() += 1;
        tracing::debug!(event_type, reason = reason.name(), "Event not responded to");
        RouteResult::refused(reason)
    }

    fn take(&mut self, slot: Slot, now: Instant) -> Option<QueuedEvent> {
        let queue = match slot {
            Slot::Pending => &mut self.pending,
            Slot::Polite => &mut self.polite,
        };
        match queue.take(now) {
            Ok(event) => event,
            Err(_) => {
                self.stats.dropped_expired += 1;
                None
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Slot {
    Pending,
    Polite,
}

struct RouterShared {
    config: RouterConfig,
    orchestrator: Orchestrator,
    limits: Mutex<Limits>,
    ambient: Mutex<Option<AbortHandle>>,
    visible: AtomicBool,
    calibration: Mutex<Option<Arc<Mutex<CalibrationHistory>>>>,
}

/// Routes UI and system events to responses
///
/// Cheap to clone. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct EventRouter {
    shared: Arc<RouterShared>,
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRouter")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    /// Create a router in front of `orchestrator`
    pub fn new(orchestrator: Orchestrator, config: RouterConfig) -> Self {
        Self {
            shared: Arc::new(RouterShared {
                limits: Mutex::new(Limits::new(&config)),
                config,
                orchestrator,
                ambient: Mutex::new(None),
                visible: AtomicBool::new(true),
                calibration: Mutex::new(None),
            }),
        }
    }

    /// Record accepted interrupts' clear latency into `history`
    pub fn attach_calibration(&self, history: Arc<Mutex<CalibrationHistory>>) {
        *self.shared.calibration.lock() = Some(history);
    }

    /// The orchestrator responses go to
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.shared.orchestrator
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        self.shared.limits.lock().stats.clone()
    }

    /// Responses currently available
    #[must_use]
    pub fn budget_available(&self) -> u32 {
        self.shared.limits.lock().budget.available(Instant::now())
    }

    /// Whether an event is parked in either slot
    #[must_use]
    pub fn has_queued(&self) -> bool {
        let limits = self.shared.limits.lock();
        limits.pending.is_occupied() || limits.polite.is_occupied()
    }

    /// Whether an ambient timer is armed
    #[must_use]
    pub fn ambient_scheduled(&self) -> bool {
        self.shared
            .ambient
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Route one event
    pub async fn route(&self, event_type: &str, data: EventData) -> RouteResult {
        self.shared.limits.lock().stats.routed += 1;

        if is_system_event(event_type) {
            self.shared.limits.lock().stats.system += 1;
            self.handle_system(event_type, &data).await;
            return RouteResult::system();
        }

        let urgency = event_urgency(event_type);
        let priority = event_priority(event_type, urgency);
        let now = Instant::now();
        {
            let mut limits = self.shared.limits.lock();
            let target = data.target.as_deref();
            if let Some(remaining) = limits.cooldowns.remaining(event_type, target, now) {
                tracing::trace!(event_type, remaining_ms = remaining.as_millis() as u64, "Cooldown");
                return limits.refuse(event_type, RouteReason::Cooldown);
            }
            if limits.lock.is_locked(now) {
                return limits.refuse(event_type, RouteReason::GlobalLock);
            }
            if limits.budget.available(now) == 0 {
                return limits.refuse(event_type, RouteReason::BudgetExhausted);
            }
            if limits.suppression.is_suppressed(&signature(event_type, &data), now) {
                return limits.refuse(event_type, RouteReason::Suppressed);
            }
        }

        let event = QueuedEvent {
            event_type: event_type.to_string(),
            data,
            urgency,
            priority,
            queued_at: now,
        };
        self.decide_and_dispatch(event).await
    }

    /// Layer 5 and the response itself
    async fn decide_and_dispatch(&self, event: QueuedEvent) -> RouteResult {
        let orchestrator = &self.shared.orchestrator;
        let context = InterruptContext {
            sequence_locked: orchestrator.sequence_locked(),
        };
        let decision = orchestrator
            .machine()
            .can_interrupt_with(event.urgency, event.priority, &context);
        let event_type = event.event_type.clone();

        if !decision.allowed {
            let reason = RouteReason::Interrupt(decision.reason);
            let mut limits = self.shared.limits.lock();
            if decision.should_wait {
                let slot = if decision.reason == DecisionReason::FsmBusy {
                    &mut limits.pending
                } else {
                    &mut limits.polite
                };
                let displaced = slot.park(event).is_some();
                limits.stats.queued += 1;
                if displaced {
                    limits.stats.displaced += 1;
                }
                return RouteResult::refused(reason);
            }
            return limits.refuse(&event_type, reason);
        }

        let Some(content) = orchestrator.reaction_content(&event.event_type, &event.data) else {
            return self
                .shared
                .limits
                .lock()
                .refuse(&event_type, RouteReason::NoContent);
        };
        let strategy = decision.strategy.unwrap_or(ClearStrategy::Direct);

        let now = Instant::now();
        {
            let mut limits = self.shared.limits.lock();
            if !limits.budget.try_debit(now) {
                return limits.refuse(&event_type, RouteReason::BudgetExhausted);
            }
            limits
                .suppression
                .record(signature(&event.event_type, &event.data), now);
            limits.lock.arm(now);
            limits
                .cooldowns
                .record(&event.event_type, event.data.target.as_deref(), now);
            limits.stats.responded += 1;
        }

        self.cancel_ambient();
        tracing::info!(
            event_type = %event.event_type,
            urgency = %event.urgency,
            priority = event.priority,
            ?strategy,
            "Interrupt accepted"
        );
        orchestrator.bus().publish(ChazyEvent::ImmediateResponse {
            event_type: event.event_type.clone(),
            target: event.data.target.clone(),
        });

        let started = Instant::now();
        orchestrator.respond(content, strategy, event.priority).await;
        let calibration = self.shared.calibration.lock().clone();
        if let Some(history) = calibration {
            history
                .lock()
                .record(orchestrator.mind().emotion(), strategy, started.elapsed());
        }
        RouteResult::responded()
    }

    async fn handle_system(&self, event_type: &str, data: &EventData) {
        let orchestrator = &self.shared.orchestrator;
        match event_type {
            TEXT_COMPLETE => {
                if !self.drain_queues(true).await {
                    self.schedule_ambient();
                }
            }
            AMBIENT_CYCLE_READY => {
                self.shared.ambient.lock().take();
                if !self.shared.visible.load(Ordering::SeqCst) {
                    tracing::debug!("Ambient cycle skipped, page hidden");
                    return;
                }
                let quiet = orchestrator.machine().state() == MachineState::Idle
                    && !orchestrator.is_sequence_active();
                if !orchestrator.ambient_cycle() && quiet {
                    self.schedule_ambient();
                }
            }
            PAGE_VISIBILITY => match data.new_value.as_deref() {
                Some("hidden") => {
                    self.shared.visible.store(false, Ordering::SeqCst);
                    self.cancel_ambient();
                }
                Some("visible") => {
                    self.shared.visible.store(true, Ordering::SeqCst);
                    self.schedule_ambient();
                }
                other => {
                    tracing::warn!(value = ?other, "Unknown page visibility value");
                }
            },
            MIND_SPEAK_REQUEST => {
                self.cancel_ambient();
                if !orchestrator.ambient_cycle() {
                    tracing::debug!("Speak request ignored, line in progress");
                }
            }
            other => tracing::warn!(event_type = other, "Unhandled system event"),
        }
    }

    /// Retry parked events: pending first, then (optionally) polite
    ///
    /// Returns whether a response was dispatched.
    pub async fn drain_queues(&self, include_polite: bool) -> bool {
        let slots: &[Slot] = if include_polite {
            &[Slot::Pending, Slot::Polite]
        } else {
            &[Slot::Pending]
        };
        for slot in slots {
            let event = self.shared.limits.lock().take(*slot, Instant::now());
            if let Some(event) = event {
                tracing::debug!(?slot, event_type = %event.event_type, "Retrying parked event");
                if self.decide_and_dispatch(event).await.responded {
                    return true;
                }
            }
        }
        false
    }

    /// Arm the ambient timer, replacing any armed one
    pub fn schedule_ambient(&self) {
        self.cancel_ambient();
        if !self.shared.config.ambient_enabled || !self.shared.visible.load(Ordering::SeqCst) {
            return;
        }
        let orchestrator = &self.shared.orchestrator;
        let mind = orchestrator.mind();
        let delay = ambient_delay(
            mind.emotion(),
            mind.autonomy(),
            orchestrator.last_text_len(),
            &orchestrator.last_themes(),
            orchestrator.reflect_pull(),
        );
        tracing::info!(delay_ms = delay.as_millis() as u64, "Ambient cycle scheduled");

        let bus = orchestrator.bus().clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bus.publish(ChazyEvent::AmbientCycleReady);
        });
        *self.shared.ambient.lock() = Some(timer.abort_handle());
    }

    /// Disarm the ambient timer
    pub fn cancel_ambient(&self) {
        if let Some(timer) = self.shared.ambient.lock().take() {
            timer.abort();
        }
    }

    /// Start the bus loopback and the idle watcher
    ///
    /// Only system events are looped back; `immediate_response` is a
    /// notification for observers and never reaches the rate limits.
    ///
    /// The returned [`RouterTasks`] stops both when dropped.
    pub fn start(&self) -> RouterTasks {
        let router = self.clone();
        let mut events = self.shared.orchestrator.bus().subscribe();
        let loopback = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let event_type = event.event_type();
                        if !is_system_event(event_type) {
                            tracing::trace!(event_type, "Engine event not looped back");
                            continue;
                        }
                        router.route(event_type, event.data()).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Router loopback lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let router = self.clone();
        let mut states = self.shared.orchestrator.machine().subscribe();
        let idle_watch = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                if state == MachineState::Idle && router.has_queued() {
                    router.drain_queues(false).await;
                }
            }
        });

        RouterTasks {
            handles: vec![loopback, idle_watch],
        }
    }
}

/// Background tasks of a started router
#[derive(Debug)]
pub struct RouterTasks {
    handles: Vec<JoinHandle<()>>,
}

impl RouterTasks {
    /// Stop the tasks
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Drop for RouterTasks {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::TypingConfig;
    use crate::events::{EventBus, IMMEDIATE_RESPONSE};
    use crate::orchestrator::{Content, FixedMind, StaticContentSelector};
    use crate::state_machine::{MachineConfig, TextStateMachine};
    use crate::surface::MemorySurface;

    fn router(config: RouterConfig) -> EventRouter {
        let machine = TextStateMachine::new(
            Arc::new(MemorySurface::new()),
            MachineConfig::default().without_lead_in(),
        );
        let selector = StaticContentSelector::new()
            .with_fallback_reaction(Content::line("noticed"))
            .with_ambient(Content::line("idle thought"));
        let orchestrator = Orchestrator::new(
            machine,
            Arc::new(selector),
            Arc::new(FixedMind::default()),
            EventBus::default(),
            TypingConfig::new().with_typos(false).with_scramble(false).with_seed(1),
        );
        EventRouter::new(orchestrator, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_lock_follows_response() {
        let router = router(RouterConfig::default());
        let first = router.route("button_click", EventData::target("a")).await;
        assert!(first.responded);
        let second = router.route("button_click", EventData::target("b")).await;
        assert_eq!(second.reason, RouteReason::GlobalLock);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_precedes_lock() {
        let router = router(RouterConfig::default());
        router.route("button_click", EventData::target("a")).await;
        let again = router.route("button_click", EventData::target("a")).await;
        assert_eq!(again.reason, RouteReason::Cooldown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observational_discarded() {
        let router = router(RouterConfig::relaxed());
        let result = router.route("hover", EventData::target("x")).await;
        assert!(!result.responded);
        assert_eq!(
            result.reason,
            RouteReason::Interrupt(DecisionReason::Observational)
        );
        assert!(!router.has_queued());
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppression_of_identical_events() {
        let router = router(
            RouterConfig::relaxed().with_suppression_window_ms(60_000),
        );
        let data = EventData::target("go");
        assert!(router.route("button_click", data.clone()).await.responded);
        let repeat = router.route("button_click", data).await;
        assert_eq!(repeat.reason, RouteReason::Suppressed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_count_reasons() {
        let router = router(RouterConfig::default());
        router.route("button_click", EventData::target("a")).await;
        router.route("button_click", EventData::target("b")).await;
        router.route("text_complete", EventData::default()).await;
        let stats = router.stats();
        assert_eq!(stats.routed, 3);
        assert_eq!(stats.system, 1);
        assert_eq!(stats.responded, 1);
        assert_eq!(stats.rejected_for(RouteReason::GlobalLock), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_notification_not_routed() {
        let router = router(RouterConfig::default());
        let _tasks = router.start();
        let mut bus = router.orchestrator().bus().subscribe();

        assert!(router.route("button_click", EventData::target("a")).await.responded);
        let notice = bus.recv().await.unwrap();
        assert_eq!(notice.event_type(), IMMEDIATE_RESPONSE);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let stats = router.stats();
        assert_eq!(stats.routed, 1);
        assert_eq!(stats.responded, 1);
        assert!(stats.rejected.is_empty(), "unexpected refusals: {:?}", stats.rejected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_hidden_cancels_ambient() {
        let router = router(RouterConfig::default());
        router.schedule_ambient();
        assert!(router.ambient_scheduled());
        router
            .route("page_visibility", EventData::default().with_value("hidden"))
            .await;
        assert!(!router.ambient_scheduled());
        router.schedule_ambient();
        assert!(!router.ambient_scheduled());
    }
}
