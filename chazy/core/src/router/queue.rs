//! Single-event holding slots
//!
//! The router parks at most one deferred event per slot. A newer event
//! replaces the older one, and an event that outlives its slot's TTL is
//! dropped when the slot is drained.

use std::time::Duration;

use tokio::time::Instant;

use crate::events::EventData;
use crate::urgency::Urgency;

/// An event waiting for a better moment
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedEvent {
    /// UI event type
    pub event_type: String,
    /// Payload
    pub data: EventData,
    /// Urgency at arrival
    pub urgency: Urgency,
    /// Response priority
    pub priority: u8,
    /// When the event first arrived
    pub queued_at: Instant,
}

/// One-event slot with a time-to-live
#[derive(Clone, Debug)]
pub struct QueueSlot {
    name: &'static str,
    ttl: Duration,
    slot: Option<QueuedEvent>,
}

impl QueueSlot {
    /// Empty slot
    #[must_use]
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            slot: None,
        }
    }

    /// Park `event`, returning the one it displaced
    pub fn park(&mut self, event: QueuedEvent) -> Option<QueuedEvent> {
        tracing::debug!(slot = self.name, event_type = %event.event_type, "Event parked");
        let displaced = self.slot.replace(event);
        if let Some(old) = &displaced {
            tracing::debug!(slot = self.name, event_type = %old.event_type, "Parked event displaced");
        }
        displaced
    }

    /// Take the parked event
    ///
    /// `Err` carries an event that expired while waiting.
    pub fn take(&mut self, now: Instant) -> Result<Option<QueuedEvent>, QueuedEvent> {
        match self.slot.take() {
            Some(event) if now.saturating_duration_since(event.queued_at) > self.ttl => {
                tracing::debug!(slot = self.name, event_type = %event.event_type, "Parked event expired");
                Err(event)
            }
            other => Ok(other),
        }
    }

    /// Whether an event is parked
    #[must_use]
    pub fn is_occupied(&self) -> bool {
        self.slot.is_some()
    }

    /// Peek at the parked event
    #[must_use]
    pub fn peek(&self) -> Option<&QueuedEvent> {
        self.slot.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str, at: Instant) -> QueuedEvent {
        QueuedEvent {
            event_type: kind.to_string(),
            data: EventData::default(),
            urgency: Urgency::Polite,
            priority: 1,
            queued_at: at,
        }
    }

    #[test]
    fn test_newer_event_replaces_older() {
        let now = Instant::now();
        let mut slot = QueueSlot::new("polite", Duration::from_secs(5));
        assert!(slot.park(event("slider_changed", now)).is_none());
        let displaced = slot.park(event("select_changed", now)).unwrap();
        assert_eq!(displaced.event_type, "slider_changed");
        assert_eq!(
            slot.take(now).unwrap().unwrap().event_type,
            "select_changed"
        );
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_expired_event_is_dropped() {
        let now = Instant::now();
        let mut slot = QueueSlot::new("pending", Duration::from_secs(2));
        slot.park(event("button_click", now));
        assert!(slot.take(now + Duration::from_millis(2500)).is_err());
        assert_eq!(slot.take(now + Duration::from_secs(3)), Ok(None));
    }
}
