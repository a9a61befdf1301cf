//! Events
//!
//! Two directions of traffic meet at the router:
//!
//! - UI events coming in ([`EventData`] plus an event type string such as
//!   `"button_click"`), which may interrupt the text line
//! - engine events going out on the [`EventBus`] ([`ChazyEvent`]), which
//!   the router's loopback feeds back in as system events
//!
//! The UI reports what happened; the router decides whether anything is said
//! about it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::state_machine::DecisionReason;

/// Default capacity of the event bus
pub const DEFAULT_BUS_CAPACITY: usize = 64;

/// System event: the ambient timer fired
pub const AMBIENT_CYCLE_READY: &str = "ambient_cycle_ready";
/// System event: a sequence finished
pub const TEXT_COMPLETE: &str = "text_complete";
/// System event: page visibility changed (`new_value` is `"visible"` or `"hidden"`)
pub const PAGE_VISIBILITY: &str = "page_visibility";
/// System event: the mind asks to speak now
pub const MIND_SPEAK_REQUEST: &str = "mind_speak_request";
/// Engine event: an immediate response was shown
pub const IMMEDIATE_RESPONSE: &str = "immediate_response";

/// Whether `event_type` is a system event that bypasses rate limiting
#[must_use]
pub fn is_system_event(event_type: &str) -> bool {
    matches!(
        event_type,
        AMBIENT_CYCLE_READY | TEXT_COMPLETE | PAGE_VISIBILITY | MIND_SPEAK_REQUEST
    )
}

/// Payload of a UI event
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventData {
    /// Element the event happened on (slider id, button id, ...)
    pub target: Option<String>,
    /// Value before the change
    pub old_value: Option<String>,
    /// Value after the change
    pub new_value: Option<String>,
}

impl EventData {
    /// Payload with only a target
    pub fn target(target: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Set the value change
    #[must_use]
    pub fn with_change(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.old_value = Some(old.into());
        self.new_value = Some(new.into());
        self
    }

    /// Set the new value only
    #[must_use]
    pub fn with_value(mut self, new: impl Into<String>) -> Self {
        self.new_value = Some(new.into());
        self
    }
}

/// Events emitted by the engine
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChazyEvent {
    /// A sequence finished typing, displaying and deleting
    TextComplete {
        /// Session token of the finished sequence
        token: u64,
    },
    /// An immediate response to a UI event was shown
    ImmediateResponse {
        /// The UI event type responded to
        event_type: String,
        /// The UI event target, if any
        target: Option<String>,
    },
    /// The ambient idle timer fired
    AmbientCycleReady,
}

impl ChazyEvent {
    /// Event type string as seen by the router
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextComplete { .. } => TEXT_COMPLETE,
            Self::ImmediateResponse { .. } => IMMEDIATE_RESPONSE,
            Self::AmbientCycleReady => AMBIENT_CYCLE_READY,
        }
    }

    /// Router payload for this event
    #[must_use]
    pub fn data(&self) -> EventData {
        match self {
            Self::ImmediateResponse { target, .. } => EventData {
                target: target.clone(),
                ..EventData::default()
            },
            Self::TextComplete { .. } | Self::AmbientCycleReady => EventData::default(),
        }
    }
}

/// Broadcast bus for [`ChazyEvent`]s
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ChazyEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus holding up to `capacity` unread events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; returns the number of subscribers reached
    pub fn publish(&self, event: ChazyEvent) -> usize {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::trace!(event_type, receivers, "Event published");
                receivers
            }
            Err(_) => {
                tracing::trace!(event_type, "Event published with no subscribers");
                0
            }
        }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChazyEvent> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Route results
// =============================================================================

/// Which path an event took through the router
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Scheduling event, no rate limiting
    System,
    /// UI event through the five layers
    Immediate,
}

/// Why the router did what it did
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    /// A response was dispatched
    Responded,
    /// A system event was handled
    Handled,
    /// Same event and target responded to recently
    Cooldown,
    /// Another response happened moments ago
    GlobalLock,
    /// No response budget left
    BudgetExhausted,
    /// Identical event seen within the suppression window
    Suppressed,
    /// Interrupt policy refusal or deferral
    Interrupt(DecisionReason),
    /// The content selector had nothing to say
    NoContent,
}

impl RouteReason {
    /// Snake-case name used in logs and stats
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Responded => "responded",
            Self::Handled => "handled",
            Self::Cooldown => "cooldown",
            Self::GlobalLock => "global_lock",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Suppressed => "suppressed",
            Self::Interrupt(reason) => reason.name(),
            Self::NoContent => "no_content",
        }
    }
}

/// Outcome of [`EventRouter::route`](crate::router::EventRouter::route)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteResult {
    /// A response was dispatched
    pub responded: bool,
    /// Path taken
    pub kind: RouteKind,
    /// Reason code
    pub reason: RouteReason,
}

impl RouteResult {
    pub(crate) fn responded() -> Self {
        Self {
            responded: true,
            kind: RouteKind::Immediate,
            reason: RouteReason::Responded,
        }
    }

    pub(crate) fn refused(reason: RouteReason) -> Self {
        Self {
            responded: false,
            kind: RouteKind::Immediate,
            reason,
        }
    }

    pub(crate) fn system() -> Self {
        Self {
            responded: false,
            kind: RouteKind::System,
            reason: RouteReason::Handled,
        }
    }

    /// Whether the event was parked in a queue slot
    #[must_use]
    pub fn is_queued(&self) -> bool {
        matches!(
            self.reason,
            RouteReason::Interrupt(
                DecisionReason::Queued | DecisionReason::FsmBusy | DecisionReason::SequenceLocked
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_events() {
        assert!(is_system_event("text_complete"));
        assert!(is_system_event("mind_speak_request"));
        assert!(!is_system_event("immediate_response"));
        assert!(!is_system_event("button_click"));
    }

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(ChazyEvent::AmbientCycleReady), 0);
        let mut rx = bus.subscribe();
        assert_eq!(bus.publish(ChazyEvent::TextComplete { token: 4 }), 1);
        assert_eq!(rx.recv().await.unwrap(), ChazyEvent::TextComplete { token: 4 });
    }

    #[test]
    fn test_reason_names() {
        assert_eq!(RouteReason::BudgetExhausted.name(), "budget_exhausted");
        assert_eq!(
            RouteReason::Interrupt(DecisionReason::FsmBusy).name(),
            "fsm_busy"
        );
    }
}
