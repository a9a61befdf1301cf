//! Rate limiting layers 1, 2 and 4
//!
//! - [`CooldownTracker`]: one response per event type and target per cooldown
//! - [`GlobalLock`]: silence after any response
//! - [`SuppressionWindow`]: identical event signatures ignored for a window
//!
//! All three take the current instant explicitly so the router can evaluate
//! every layer against one clock reading.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::events::EventData;

// =============================================================================
// Cooldown
// =============================================================================

/// Per event+target cooldown
#[derive(Clone, Debug)]
pub struct CooldownTracker {
    default: Duration,
    overrides: HashMap<String, Duration>,
    last: HashMap<String, Instant>,
}

impl CooldownTracker {
    /// Tracker with a default cooldown and per-event-type overrides
    #[must_use]
    pub fn new(default: Duration, overrides: HashMap<String, Duration>) -> Self {
        Self {
            default,
            overrides,
            last: HashMap::new(),
        }
    }

    fn key(event_type: &str, target: Option<&str>) -> String {
        format!("{event_type}:{}", target.unwrap_or("*"))
    }

    fn cooldown_for(&self, event_type: &str) -> Duration {
        self.overrides
            .get(event_type)
            .copied()
            .unwrap_or(self.default)
    }

    /// Time left on the cooldown, if any
    #[must_use]
    pub fn remaining(&self, event_type: &str, target: Option<&str>, now: Instant) -> Option<Duration> {
        let last = self.last.get(&Self::key(event_type, target))?;
        let until = *last + self.cooldown_for(event_type);
        (until > now).then(|| until - now)
    }

    /// Start the cooldown for a responded event
    pub fn record(&mut self, event_type: &str, target: Option<&str>, now: Instant) {
        self.last.insert(Self::key(event_type, target), now);
        let longest = self
            .overrides
            .values()
            .copied()
            .fold(self.default, Duration::max);
        self.last
            .retain(|_, at| now.saturating_duration_since(*at) < longest);
    }
}

// =============================================================================
// Global lock
// =============================================================================

/// Lock armed after every successful response
#[derive(Clone, Debug)]
pub struct GlobalLock {
    duration: Duration,
    until: Option<Instant>,
}

impl GlobalLock {
    /// Lock that holds for `duration` once armed
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: None,
        }
    }

    /// Whether the lock holds at `now`
    #[must_use]
    pub fn is_locked(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Arm the lock from `now`
    pub fn arm(&mut self, now: Instant) {
        self.until = Some(now + self.duration);
    }
}

// =============================================================================
// Suppression
// =============================================================================

/// Signature of an event for duplicate suppression
#[must_use]
pub fn signature(event_type: &str, data: &EventData) -> String {
    format!(
        "{event_type}|{}|{}",
        data.target.as_deref().unwrap_or(""),
        data.new_value.as_deref().unwrap_or("")
    )
}

/// Sliding window of recently responded signatures
#[derive(Clone, Debug)]
pub struct SuppressionWindow {
    window: Duration,
    seen: VecDeque<(Instant, String)>,
}

impl SuppressionWindow {
    /// Window of `window` length
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some((at, _)) = self.seen.front() {
            if now.saturating_duration_since(*at) >= self.window {
                self.seen.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether `signature` was recorded within the window
    pub fn is_suppressed(&mut self, signature: &str, now: Instant) -> bool {
        self.prune(now);
        self.seen.iter().any(|(_, seen)| seen == signature)
    }

    /// Remember `signature` at `now`
    pub fn record(&mut self, signature: String, now: Instant) {
        self.prune(now);
        self.seen.push_back((now, signature));
    }

    /// Signatures currently inside the window
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
