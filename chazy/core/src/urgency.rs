//! Interrupt urgency policy
//!
//! Every UI event maps to one of four urgency levels. Urgency decides
//! *whether* an event may interrupt the text line; priority (1 to 3) decides
//! whether an assertive event outranks the line currently on screen.
//!
//! | Urgency         | Events                                                  |
//! |-----------------|---------------------------------------------------------|
//! | `Observational` | hover, button_hover, scroll, immediate_response         |
//! | `Polite`        | slider_changed, slider_drag, select_changed, pattern_detected |
//! | `Assertive`     | button_click(ed), select_opened, dialog_opened, *unknown* |
//! | `Force`         | reset_clicked, emergency_stop, mode_switch              |

use std::fmt;

use serde::{Deserialize, Serialize};

/// How strongly an event wants the text line's attention
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    /// Noticed but never interrupts
    Observational,
    /// Waits for a natural break
    Polite,
    /// Interrupts lower-priority lines
    #[default]
    Assertive,
    /// Always interrupts
    Force,
}

impl Urgency {
    /// Ordinal, 0 (observational) to 3 (force)
    #[must_use]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Lowercase name used in logs and scripts
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Observational => "observational",
            Self::Polite => "polite",
            Self::Assertive => "assertive",
            Self::Force => "force",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Urgency of a UI event type; unknown types are assertive
#[must_use]
pub fn event_urgency(event_type: &str) -> Urgency {
    match event_type {
        "hover" | "button_hover" | "scroll" | "immediate_response" => Urgency::Observational,
        "slider_changed" | "slider_drag" | "select_changed" | "pattern_detected" => {
            Urgency::Polite
        }
        "button_click" | "button_clicked" | "select_opened" | "dialog_opened" => {
            Urgency::Assertive
        }
        "reset_clicked" | "emergency_stop" | "mode_switch" => Urgency::Force,
        other => {
            tracing::debug!(event_type = other, "Unmapped event type, treating as assertive");
            Urgency::Assertive
        }
    }
}

/// Line priority of a response to an event
///
/// Force responses are priority 3, assertive 2, everything else 1. The event
/// type is accepted for future per-event overrides.
#[must_use]
pub fn event_priority(_event_type: &str, urgency: Urgency) -> u8 {
    match urgency {
        Urgency::Force => 3,
        Urgency::Assertive => 2,
        Urgency::Polite | Urgency::Observational => 1,
    }
}
